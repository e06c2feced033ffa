//! Zip archive streaming.
//!
//! Archives are produced by a background task and delivered as a stream of
//! byte chunks. The zip writer rewrites the local header of the entry it is
//! currently writing, so bytes are held in a spool until the next entry
//! starts and then emitted; memory use is bounded by one compressed entry.

use std::collections::HashSet;
use std::io::{self, Seek, SeekFrom, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::name::available_copy_name;
use super::physical::PhysicalStorage;

/// A zip archive delivered incrementally.
pub type ArchiveStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// One member of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    /// An (empty) directory entry, e.g. `docs/drafts/`.
    Directory { path: String },
    /// A file entry whose bytes are read from the physical storage.
    File { path: String, location: String },
}

impl ArchiveEntry {
    /// Path of the entry inside the archive.
    pub fn path(&self) -> &str {
        match self {
            ArchiveEntry::Directory { path } | ArchiveEntry::File { path, .. } => path,
        }
    }
}

/// What to do when a member cannot be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberFailure {
    /// Log the failure and continue with the next member.
    Skip,
    /// Emit the error and end the stream.
    Abort,
}

/// Picks unique entry names within each archive folder.
#[derive(Debug, Default)]
pub struct EntryNamer {
    taken: HashSet<String>,
}

impl EntryNamer {
    /// Create an empty namer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a unique path for `name` under `prefix` (empty or ending in `/`).
    pub fn reserve(&mut self, prefix: &str, name: &str) -> String {
        let taken_here: HashSet<String> = self
            .taken
            .iter()
            .filter_map(|path| path.strip_prefix(prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();

        let unique = available_copy_name(name, &taken_here);
        let path = format!("{prefix}{unique}");
        self.taken.insert(path.clone());
        path
    }
}

/// Start streaming an archive of `entries`.
///
/// # Memory
/// The entry being written stays in memory until the next one starts, so
/// peak use is about the compressed size of the largest member. Members
/// come from uploads, which are capped at the configured upload size; an
/// archive of 1 GiB files can hold roughly 1 GiB at a time.
pub fn stream_archive(
    storage: PhysicalStorage,
    entries: Vec<ArchiveEntry>,
    on_failure: MemberFailure,
    chunk_size: usize,
) -> ArchiveStream {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(4);

    tokio::spawn(async move {
        debug!("Streaming archive with {} entries", entries.len());
        if let Err(e) = write_archive(&storage, entries, on_failure, chunk_size.max(1), &tx).await {
            warn!("Archive aborted: {}", e);
            let _ = tx.send(Err(e)).await;
        }
    });

    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

async fn write_archive(
    storage: &PhysicalStorage,
    entries: Vec<ArchiveEntry>,
    on_failure: MemberFailure,
    chunk_size: usize,
    tx: &mpsc::Sender<io::Result<Bytes>>,
) -> io::Result<()> {
    let spool = SpoolHandle::default();
    let mut zip = ZipWriter::new(spool.clone());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut chunk = vec![0u8; chunk_size];

    for entry in entries {
        let mark = spool.len()?;

        match entry {
            ArchiveEntry::Directory { path } => {
                zip.add_directory(path, options).map_err(io::Error::other)?;
            }
            ArchiveEntry::File { path, location } => {
                let opened = storage.read_stream(&location).await;
                let mut file = match opened {
                    Ok(file) => file,
                    Err(e) if on_failure == MemberFailure::Skip => {
                        warn!("Skipping archive member {}: {}", path, e);
                        continue;
                    }
                    Err(e) => return Err(io::Error::other(e)),
                };

                match zip.start_file(path.as_str(), options) {
                    Ok(()) => {}
                    Err(e) if on_failure == MemberFailure::Skip => {
                        warn!("Skipping archive member {}: {}", path, e);
                        continue;
                    }
                    Err(e) => return Err(io::Error::other(e)),
                }

                // Past this point the entry is half written; a read error ends
                // the archive under either policy.
                loop {
                    let n = file.read(&mut chunk).await?;
                    if n == 0 {
                        break;
                    }
                    zip.write_all(&chunk[..n])?;
                }
            }
        }

        let ready = spool.take_until(mark)?;
        if !ready.is_empty() && tx.send(Ok(ready)).await.is_err() {
            debug!("Archive receiver dropped");
            return Ok(());
        }
    }

    zip.finish().map_err(io::Error::other)?;
    let rest = spool.take_all()?;
    if !rest.is_empty() {
        let _ = tx.send(Ok(rest)).await;
    }

    Ok(())
}

/// Write + Seek buffer that can release its already-final prefix.
#[derive(Debug, Default)]
struct Spool {
    /// Bytes already handed to the consumer.
    emitted: u64,
    /// Bytes after `emitted` still subject to rewriting.
    buf: Vec<u8>,
    /// Current logical write position.
    pos: u64,
}

impl Spool {
    fn len(&self) -> u64 {
        self.emitted + self.buf.len() as u64
    }

    fn take_until(&mut self, offset: u64) -> Bytes {
        let n = offset.saturating_sub(self.emitted).min(self.buf.len() as u64) as usize;
        let head: Vec<u8> = self.buf.drain(..n).collect();
        self.emitted += n as u64;
        Bytes::from(head)
    }
}

#[derive(Debug, Clone, Default)]
struct SpoolHandle(Arc<Mutex<Spool>>);

impl SpoolHandle {
    fn with<T>(&self, f: impl FnOnce(&mut Spool) -> io::Result<T>) -> io::Result<T> {
        let mut spool = self
            .0
            .lock()
            .map_err(|_| io::Error::other("archive spool poisoned"))?;
        f(&mut spool)
    }

    fn len(&self) -> io::Result<u64> {
        self.with(|s| Ok(s.len()))
    }

    fn take_until(&self, offset: u64) -> io::Result<Bytes> {
        self.with(|s| Ok(s.take_until(offset)))
    }

    fn take_all(&self) -> io::Result<Bytes> {
        self.with(|s| {
            let end = s.len();
            Ok(s.take_until(end))
        })
    }
}

impl Write for SpoolHandle {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.with(|s| {
            if s.pos < s.emitted {
                return Err(io::Error::other("cannot rewrite bytes already streamed"));
            }
            let start = (s.pos - s.emitted) as usize;
            let end = start + data.len();
            if end > s.buf.len() {
                s.buf.resize(end, 0);
            }
            s.buf[start..end].copy_from_slice(data);
            s.pos += data.len() as u64;
            Ok(data.len())
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SpoolHandle {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.with(|s| {
            let next = match target {
                SeekFrom::Start(n) => Some(n),
                SeekFrom::End(delta) => s.len().checked_add_signed(delta),
                SeekFrom::Current(delta) => s.pos.checked_add_signed(delta),
            };
            match next {
                Some(n) if n >= s.emitted => {
                    s.pos = n;
                    Ok(n)
                }
                _ => Err(io::Error::other("cannot seek into bytes already streamed")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    async fn collect(mut stream: ArchiveStream) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    fn read_member(archive: &[u8], name: &str) -> Vec<u8> {
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut member = zip.by_name(name).unwrap();
        let mut buf = Vec::new();
        member.read_to_end(&mut buf).unwrap();
        buf
    }

    fn member_names(archive: &[u8]) -> Vec<String> {
        let zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        zip.file_names().map(str::to_string).collect()
    }

    async fn setup() -> (TempDir, PhysicalStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = PhysicalStorage::new(temp_dir.path()).unwrap();
        storage
            .save_stream("/1/a", &mut &b"alpha"[..])
            .await
            .unwrap();
        storage
            .save_stream("/1/b", &mut &b"bravo bravo"[..])
            .await
            .unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_spool_releases_prefix_only() {
        let mut handle = SpoolHandle::default();
        handle.write_all(b"header-body").unwrap();

        assert_eq!(handle.take_until(6).unwrap(), Bytes::from_static(b"header"));
        assert!(handle.seek(SeekFrom::Start(2)).is_err());

        handle.seek(SeekFrom::Start(7)).unwrap();
        handle.write_all(b"B").unwrap();
        handle.seek(SeekFrom::End(0)).unwrap();
        handle.write_all(b"!").unwrap();

        assert_eq!(handle.take_all().unwrap(), Bytes::from_static(b"-Body!"));
    }

    #[test]
    fn test_entry_namer_deduplicates_per_folder() {
        let mut namer = EntryNamer::new();

        assert_eq!(namer.reserve("", "a.txt"), "a.txt");
        assert_eq!(namer.reserve("", "a.txt"), "a (1).txt");
        assert_eq!(namer.reserve("docs/", "a.txt"), "docs/a.txt");
        assert_eq!(namer.reserve("docs/", "a.txt"), "docs/a (1).txt");
    }

    #[tokio::test]
    async fn test_stream_archive_contents() {
        let (_temp_dir, storage) = setup().await;
        let entries = vec![
            ArchiveEntry::File {
                path: "a.txt".to_string(),
                location: "/1/a".to_string(),
            },
            ArchiveEntry::Directory {
                path: "docs/".to_string(),
            },
            ArchiveEntry::File {
                path: "docs/b.txt".to_string(),
                location: "/1/b".to_string(),
            },
        ];

        let archive = collect(stream_archive(storage, entries, MemberFailure::Abort, 4))
            .await
            .unwrap();

        assert_eq!(member_names(&archive).len(), 3);
        assert_eq!(read_member(&archive, "a.txt"), b"alpha");
        assert_eq!(read_member(&archive, "docs/b.txt"), b"bravo bravo");
    }

    #[tokio::test]
    async fn test_skip_policy_drops_missing_member() {
        let (_temp_dir, storage) = setup().await;
        let entries = vec![
            ArchiveEntry::File {
                path: "missing.txt".to_string(),
                location: "/1/nope".to_string(),
            },
            ArchiveEntry::File {
                path: "a.txt".to_string(),
                location: "/1/a".to_string(),
            },
        ];

        let archive = collect(stream_archive(storage, entries, MemberFailure::Skip, 1024))
            .await
            .unwrap();

        assert_eq!(member_names(&archive), vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_abort_policy_fails_stream() {
        let (_temp_dir, storage) = setup().await;
        let entries = vec![
            ArchiveEntry::File {
                path: "a.txt".to_string(),
                location: "/1/a".to_string(),
            },
            ArchiveEntry::File {
                path: "missing.txt".to_string(),
                location: "/1/nope".to_string(),
            },
        ];

        let result = collect(stream_archive(storage, entries, MemberFailure::Abort, 1024)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_archive_is_valid() {
        let (_temp_dir, storage) = setup().await;

        let archive = collect(stream_archive(storage, Vec::new(), MemberFailure::Abort, 1024))
            .await
            .unwrap();

        assert!(member_names(&archive).is_empty());
    }
}
