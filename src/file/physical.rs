//! Physical storage gateway for hoard.
//!
//! Bytes live on the local filesystem under a single base directory. Logical
//! paths are always rooted at a storage id:
//!
//! ```text
//! {base_path}/
//! └── 1/                                        # storage id
//!     ├── 0b6f3c1e-...-9a41                     # file bytes, by physical id
//!     ├── docs/                                 # mirrored directory tree
//!     │   └── drafts/
//!     └── photos/
//! ```
//!
//! File bytes are addressed by physical id and never move when the logical
//! file is renamed or moved. Directories are addressed by name, so the
//! mirrored layout follows the logical tree.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::PhysicalError;

/// Maximum length in bytes of a resolved physical path.
pub const MAX_PATH_LENGTH: usize = 4096;

/// Maximum length in bytes of a single path component.
pub const MAX_COMPONENT_LENGTH: usize = 255;

type PhysicalResult<T> = std::result::Result<T, PhysicalError>;

/// Logical location of a storage's root directory.
pub fn storage_location(storage_id: i64) -> String {
    format!("/{storage_id}")
}

/// Logical location of the bytes for a physical file id.
pub fn blob_location(storage_id: i64, physical_file_id: &str) -> String {
    format!("/{storage_id}/{physical_file_id}")
}

/// Generate a fresh physical file id.
pub fn generate_physical_id() -> String {
    Uuid::new_v4().to_string()
}

/// Local-filesystem implementation of the physical storage gateway.
#[derive(Debug, Clone)]
pub struct PhysicalStorage {
    base_path: PathBuf,
}

impl PhysicalStorage {
    /// Create a new gateway rooted at `base_path`.
    ///
    /// The base directory will be created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> crate::Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a logical path to a filesystem path under the base directory.
    pub fn resolve(&self, logical: &str) -> PhysicalResult<PathBuf> {
        let mut resolved = self.base_path.clone();

        for component in Path::new(logical).components() {
            match component {
                Component::RootDir => {}
                Component::Normal(part) => {
                    if part.len() > MAX_COMPONENT_LENGTH {
                        return Err(PhysicalError::PathTooLong(PathBuf::from(logical)));
                    }
                    resolved.push(part);
                }
                _ => return Err(PhysicalError::OutsideBase(PathBuf::from(logical))),
            }
        }

        if resolved == self.base_path {
            return Err(PhysicalError::OutsideBase(PathBuf::from(logical)));
        }
        if resolved.as_os_str().len() > MAX_PATH_LENGTH {
            return Err(PhysicalError::PathTooLong(PathBuf::from(logical)));
        }

        Ok(resolved)
    }

    /// Check whether anything exists at a logical path.
    pub async fn exists(&self, logical: &str) -> bool {
        match self.resolve(logical) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Create a directory (and any missing parents).
    pub async fn mkdir(&self, logical: &str) -> PhysicalResult<()> {
        let path = self.resolve(logical)?;
        if fs::try_exists(&path).await.map_err(|e| map_io(e, logical))? {
            return Err(PhysicalError::AlreadyExists(PathBuf::from(logical)));
        }
        fs::create_dir_all(&path)
            .await
            .map_err(|e| map_io(e, logical))
    }

    /// Remove a file or directory.
    ///
    /// Non-empty directories require `recursive`.
    pub async fn rm(&self, logical: &str, recursive: bool) -> PhysicalResult<()> {
        let path = self.resolve(logical)?;
        let metadata = fs::metadata(&path).await.map_err(|e| map_io(e, logical))?;

        let result = if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_dir(&path).await
            }
        } else {
            fs::remove_file(&path).await
        };

        result.map_err(|e| map_io(e, logical))
    }

    /// Copy a file or a whole directory tree. The destination must not exist.
    pub async fn copy(&self, src: &str, dst: &str) -> PhysicalResult<()> {
        let src_path = self.resolve(src)?;
        let dst_path = self.resolve(dst)?;

        if fs::try_exists(&dst_path).await.map_err(|e| map_io(e, dst))? {
            return Err(PhysicalError::AlreadyExists(PathBuf::from(dst)));
        }
        let metadata = fs::metadata(&src_path).await.map_err(|e| map_io(e, src))?;

        if !metadata.is_dir() {
            ensure_parent(&dst_path, dst).await?;
            fs::copy(&src_path, &dst_path)
                .await
                .map_err(|e| map_io(e, dst))?;
            return Ok(());
        }

        let mut pending = vec![(src_path, dst_path)];
        while let Some((from, to)) = pending.pop() {
            fs::create_dir_all(&to).await.map_err(|e| map_io(e, dst))?;

            let mut entries = fs::read_dir(&from).await.map_err(|e| map_io(e, src))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| map_io(e, src))? {
                let target = to.join(entry.file_name());
                let file_type = entry.file_type().await.map_err(|e| map_io(e, src))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), target));
                } else {
                    fs::copy(entry.path(), &target)
                        .await
                        .map_err(|e| map_io(e, dst))?;
                }
            }
        }

        Ok(())
    }

    /// Rename a file or directory. The destination must not exist.
    pub async fn rename(&self, src: &str, dst: &str) -> PhysicalResult<()> {
        let src_path = self.resolve(src)?;
        let dst_path = self.resolve(dst)?;

        if fs::try_exists(&dst_path).await.map_err(|e| map_io(e, dst))? {
            return Err(PhysicalError::AlreadyExists(PathBuf::from(dst)));
        }
        ensure_parent(&dst_path, dst).await?;

        fs::rename(&src_path, &dst_path)
            .await
            .map_err(|e| map_io(e, src))
    }

    /// Write a new file from a byte stream. Fails if the file exists.
    ///
    /// A partially written file is removed when the stream fails.
    pub async fn save_stream<R>(&self, logical: &str, reader: &mut R) -> PhysicalResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.save_stream_within(logical, reader, u64::MAX).await
    }

    /// Like [`save_stream`](Self::save_stream), but a stream longer than
    /// `limit` bytes fails with `TooLarge` and leaves nothing behind.
    pub async fn save_stream_within<R>(
        &self,
        logical: &str,
        reader: &mut R,
        limit: u64,
    ) -> PhysicalResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.resolve(logical)?;
        ensure_parent(&path, logical).await?;

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| map_io(e, logical))?;

        match write_all_from(file, reader, limit, logical).await {
            Ok(written) => Ok(written),
            Err(e) => {
                let _ = fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    /// Replace the contents of an existing file from a byte stream.
    ///
    /// Bytes are written to a sibling temporary file first and renamed over
    /// the original, so a failed stream leaves the old contents intact.
    pub async fn overwrite_stream<R>(&self, logical: &str, reader: &mut R) -> PhysicalResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.overwrite_stream_within(logical, reader, u64::MAX).await
    }

    /// Like [`overwrite_stream`](Self::overwrite_stream), but a stream longer
    /// than `limit` bytes fails with `TooLarge` and the old contents stay.
    pub async fn overwrite_stream_within<R>(
        &self,
        logical: &str,
        reader: &mut R,
        limit: u64,
    ) -> PhysicalResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.resolve(logical)?;
        if !fs::try_exists(&path).await.map_err(|e| map_io(e, logical))? {
            return Err(PhysicalError::NotFound(PathBuf::from(logical)));
        }

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(format!(".{}.partial", Uuid::new_v4().simple()));
        let temp_path = PathBuf::from(temp_name);

        let file = fs::File::create(&temp_path)
            .await
            .map_err(|e| map_io(e, logical))?;

        let written = match write_all_from(file, reader, limit, logical).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(map_io(e, logical));
        }

        Ok(written)
    }

    /// Open a file for streaming reads.
    pub async fn read_stream(&self, logical: &str) -> PhysicalResult<fs::File> {
        let path = self.resolve(logical)?;
        fs::File::open(&path).await.map_err(|e| map_io(e, logical))
    }
}

async fn write_all_from<R>(
    mut file: fs::File,
    reader: &mut R,
    limit: u64,
    logical: &str,
) -> PhysicalResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    // One byte past the limit is enough to tell an oversized stream apart.
    let mut bounded = reader.take(limit.saturating_add(1));
    let written = tokio::io::copy(&mut bounded, &mut file)
        .await
        .map_err(|e| map_io(e, logical))?;
    if written > limit {
        return Err(PhysicalError::TooLarge {
            path: PathBuf::from(logical),
            limit,
        });
    }
    file.flush().await.map_err(|e| map_io(e, logical))?;
    Ok(written)
}

async fn ensure_parent(path: &Path, logical: &str) -> PhysicalResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| map_io(e, logical))?;
    }
    Ok(())
}

fn map_io(e: io::Error, logical: &str) -> PhysicalError {
    match e.kind() {
        io::ErrorKind::NotFound => PhysicalError::NotFound(PathBuf::from(logical)),
        io::ErrorKind::AlreadyExists => PhysicalError::AlreadyExists(PathBuf::from(logical)),
        _ => PhysicalError::Io(e),
    }
}
