//! File service for hoard.
//!
//! This module provides high-level file operations including:
//! - Streaming upload with size checks and rollback
//! - Rename, move and copy with collision handling
//! - Reference-counted overwrite and delete of shared bytes
//! - Single-file download and multi-file zip download

use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::db::Database;
use crate::error::PhysicalError;
use crate::link::FileLinkRepository;
use crate::storage::StorageRepository;
use crate::{HoardError, Result};

use super::archive::{stream_archive, ArchiveEntry, ArchiveStream, EntryNamer, MemberFailure};
use super::directory::DirectoryRepository;
use super::name::{available_copy_name, validate_name};
use super::physical::{blob_location, generate_physical_id, PhysicalStorage};
use super::record::{FileRecord, FileRecordRepository, NewFileRecord};
use super::{DEFAULT_ARCHIVE_CHUNK_SIZE, DEFAULT_MAX_UPLOAD_SIZE};

/// How often a copy re-picks its name after losing it to a concurrent write.
const COPY_NAME_ATTEMPTS: u32 = 16;

/// Request data for moving a file.
#[derive(Debug, Clone)]
pub struct MoveFile {
    /// File to move.
    pub file_id: i64,
    /// Destination directory (None for the storage root).
    pub destination_id: Option<i64>,
    /// New name at the destination (optional).
    pub new_name: Option<String>,
    /// Replace a file already holding the name at the destination.
    pub overwrite: bool,
}

impl MoveFile {
    /// Create a new move request.
    pub fn new(file_id: i64, destination_id: Option<i64>) -> Self {
        Self {
            file_id,
            destination_id,
            new_name: None,
            overwrite: false,
        }
    }

    /// Rename the file as part of the move.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.new_name = Some(name.into());
        self
    }

    /// Set whether a colliding file at the destination is replaced.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Result of a file download.
#[derive(Debug)]
pub struct DownloadResult {
    /// File record.
    pub record: FileRecord,
    /// File content, read on demand.
    pub content: tokio::fs::File,
}

/// File service for managing file records and their bytes.
pub struct FileService<'a> {
    db: &'a Database,
    storage: &'a PhysicalStorage,
    max_upload_size: u64,
    archive_chunk_size: usize,
}

impl<'a> FileService<'a> {
    /// Create a new FileService.
    pub fn new(db: &'a Database, storage: &'a PhysicalStorage) -> Self {
        Self {
            db,
            storage,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            archive_chunk_size: DEFAULT_ARCHIVE_CHUNK_SIZE,
        }
    }

    /// Create a new FileService with a custom max upload size.
    pub fn with_max_upload_size(mut self, max_size: u64) -> Self {
        self.max_upload_size = max_size;
        self
    }

    /// Set the read buffer size used when archiving.
    pub fn with_archive_chunk_size(mut self, chunk_size: usize) -> Self {
        self.archive_chunk_size = chunk_size;
        self
    }

    /// Apply the upload and archive limits from the storage configuration.
    pub fn with_storage_config(self, config: &StorageConfig) -> Self {
        self.with_max_upload_size(config.max_upload_size_bytes())
            .with_archive_chunk_size(config.archive_chunk_bytes())
    }

    /// Maximum accepted upload size in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    fn records(&self) -> FileRecordRepository<'_> {
        FileRecordRepository::new(self.db.pool())
    }

    fn directories(&self) -> DirectoryRepository<'_> {
        DirectoryRepository::new(self.db.pool())
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_upload_size {
            return Err(HoardError::Validation(format!(
                "file is too large ({size} bytes, maximum {} bytes)",
                self.max_upload_size
            )));
        }
        Ok(())
    }

    /// Map a failed bounded write to the error callers see.
    fn stored_error(&self, e: PhysicalError) -> HoardError {
        match e {
            PhysicalError::TooLarge { limit, .. } => HoardError::Validation(format!(
                "file is too large (maximum {limit} bytes)"
            )),
            e => e.into(),
        }
    }

    /// Remove bytes written for a change that is being rolled back.
    async fn discard_bytes(&self, file_id: i64, location: &str) {
        if let Err(e) = self.storage.rm(location, false).await {
            warn!(
                file_id = file_id,
                location = location,
                error = %e,
                "Could not remove orphaned bytes"
            );
        }
    }

    async fn ensure_free(&self, storage_id: i64, parent_id: Option<i64>, name: &str) -> Result<()> {
        if let Some(existing) = self.records().find_by_name(storage_id, parent_id, name).await? {
            return Err(HoardError::Collision {
                name: name.to_string(),
                conflicting_id: existing.id,
            });
        }
        Ok(())
    }

    /// Upload a file.
    ///
    /// # Validation
    /// - Name rules shared with directories
    /// - File size: max configured size, checked against the declared `size`
    ///   up front and against the bytes actually read while storing
    ///
    /// The record is written first; if the bytes cannot be stored the record
    /// is deleted again and the error returned. The stored record carries
    /// the number of bytes written, whatever `size` claimed.
    pub async fn upload<R>(
        &self,
        name: &str,
        reader: &mut R,
        storage_id: i64,
        size: u64,
        parent_id: Option<i64>,
    ) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        validate_name(name)?;
        self.check_size(size)?;

        StorageRepository::new(self.db.pool())
            .require(storage_id)
            .await?;
        self.directories().check_parent(storage_id, parent_id).await?;
        self.ensure_free(storage_id, parent_id, name).await?;

        let new_file = NewFileRecord::new(name, storage_id, size as i64, generate_physical_id())
            .with_parent(parent_id);
        let record = self.records().create(&new_file).await?;
        let location = record.blob_location();

        let written = match self
            .storage
            .save_stream_within(&location, reader, self.max_upload_size)
            .await
        {
            Ok(written) => written,
            Err(e) => {
                warn!(file_id = record.id, error = %e, "Upload failed, removing record");
                self.records().delete(record.id).await?;
                return Err(self.stored_error(e));
            }
        };

        if written != size {
            debug!(
                file_id = record.id,
                declared = size,
                written = written,
                "Upload size differs from declared size"
            );
            if let Err(e) = self
                .records()
                .update_content(record.id, &record.physical_file_id, written as i64)
                .await
            {
                warn!(file_id = record.id, error = %e, "Recording size failed, removing upload");
                self.discard_bytes(record.id, &location).await;
                self.records().delete(record.id).await?;
                return Err(e);
            }
        }

        info!(
            file_id = record.id,
            storage_id = storage_id,
            size = written,
            "File uploaded"
        );
        self.records().require(record.id).await
    }

    /// Get a file record.
    pub async fn get(&self, id: i64) -> Result<FileRecord> {
        self.records().require(id).await
    }

    /// Rename a file. Only metadata changes; the bytes are keyed by
    /// physical ID.
    pub async fn rename(&self, id: i64, new_name: &str) -> Result<FileRecord> {
        validate_name(new_name)?;

        let record = self.records().require(id).await?;
        if record.name == new_name {
            return Ok(record);
        }
        self.ensure_free(record.storage_id, record.parent_id, new_name)
            .await?;

        self.records().rename(id, new_name).await?;
        info!(file_id = id, "File renamed");
        self.records().require(id).await
    }

    /// Move a file to another directory, optionally renaming it.
    ///
    /// With `overwrite`, a file already holding the name at the destination
    /// is deleted first; otherwise the move fails with a collision.
    pub async fn move_file(&self, request: &MoveFile) -> Result<FileRecord> {
        let record = self.records().require(request.file_id).await?;
        if record.parent_id == request.destination_id {
            return Err(HoardError::SameDestination);
        }
        self.directories()
            .check_parent(record.storage_id, request.destination_id)
            .await?;

        let name = match &request.new_name {
            Some(name) => {
                validate_name(name)?;
                name.as_str()
            }
            None => record.name.as_str(),
        };

        let existing = self
            .records()
            .find_by_name(record.storage_id, request.destination_id, name)
            .await?;
        if let Some(existing) = existing {
            if !request.overwrite {
                return Err(HoardError::Collision {
                    name: name.to_string(),
                    conflicting_id: existing.id,
                });
            }
            debug!(file_id = existing.id, "Replacing file at move destination");
            self.delete(existing.id).await?;
        }

        self.records()
            .relocate(record.id, request.destination_id, name)
            .await?;
        info!(
            file_id = record.id,
            destination_id = ?request.destination_id,
            "File moved"
        );
        self.records().require(record.id).await
    }

    /// Copy a file into a directory (or the storage root).
    ///
    /// The copy shares the source's bytes. When the name is taken the copy
    /// is called `name (n).ext` with the smallest free `n`.
    pub async fn copy(&self, id: i64, parent_id: Option<i64>) -> Result<FileRecord> {
        let record = self.records().require(id).await?;
        self.directories()
            .check_parent(record.storage_id, parent_id)
            .await?;

        let mut attempt = 1;
        loop {
            let taken = self.records().names_in(record.storage_id, parent_id).await?;
            let name = available_copy_name(&record.name, &taken);

            let new_file = NewFileRecord::new(
                &name,
                record.storage_id,
                record.size,
                &record.physical_file_id,
            )
            .with_parent(parent_id);

            match self.records().create(&new_file).await {
                Ok(copy) => {
                    info!(file_id = id, copy_id = copy.id, "File copied");
                    return Ok(copy);
                }
                // The name went to a concurrent write after it was picked.
                Err(HoardError::AlreadyExists(_)) if attempt < COPY_NAME_ATTEMPTS => {
                    debug!(file_id = id, name = %name, attempt = attempt, "Copy name taken, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replace a file's contents.
    ///
    /// Bytes shared with copies are left alone: the new contents go to a
    /// fresh physical ID and only this record is repointed. Unshared bytes
    /// are replaced in place. Contents longer than the upload limit are
    /// rejected and the old contents kept.
    pub async fn overwrite<R>(&self, id: i64, reader: &mut R, new_size: u64) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.check_size(new_size)?;

        let record = self.records().require(id).await?;
        let references = self.records().ref_count(&record.physical_file_id).await?;

        let written = if references > 1 {
            let physical_file_id = generate_physical_id();
            let location = blob_location(record.storage_id, &physical_file_id);

            // save_stream_within removes its own partial file on failure
            let written = self
                .storage
                .save_stream_within(&location, reader, self.max_upload_size)
                .await
                .map_err(|e| self.stored_error(e))?;

            if let Err(e) = self
                .records()
                .update_content(id, &physical_file_id, written as i64)
                .await
            {
                warn!(file_id = id, error = %e, "Repointing failed, removing new bytes");
                self.discard_bytes(id, &location).await;
                return Err(e);
            }
            debug!(file_id = id, references = references, "Shared file split on overwrite");
            written
        } else {
            let written = self
                .storage
                .overwrite_stream_within(&record.blob_location(), reader, self.max_upload_size)
                .await
                .map_err(|e| self.stored_error(e))?;
            self.records()
                .update_content(id, &record.physical_file_id, written as i64)
                .await?;
            written
        };

        info!(file_id = id, size = written, "File overwritten");
        self.records().require(id).await
    }

    /// Delete a file.
    ///
    /// The link bound to the file goes first, then the record. The bytes
    /// are removed only when no other record references them.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let record = self.records().require(id).await?;

        FileLinkRepository::new(self.db.pool())
            .delete_by_file(id)
            .await?;
        self.records().delete(id).await?;

        let remaining = self.records().ref_count(&record.physical_file_id).await?;
        if remaining == 0 {
            match self.storage.rm(&record.blob_location(), false).await {
                Ok(()) => {}
                Err(PhysicalError::NotFound(_)) => {
                    warn!(file_id = id, "Bytes were already missing");
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            debug!(file_id = id, remaining = remaining, "Bytes still referenced");
        }

        info!(file_id = id, "File deleted");
        Ok(())
    }

    /// Open a file for download.
    pub async fn download(&self, id: i64) -> Result<DownloadResult> {
        let record = self.records().require(id).await?;
        let content = self.storage.read_stream(&record.blob_location()).await?;

        debug!(file_id = id, "File download opened");
        Ok(DownloadResult { record, content })
    }

    /// Download several files as one zip archive.
    ///
    /// Each file is stored under its own name at the archive root. Files
    /// that are missing or cannot be read are logged and left out.
    pub async fn download_multiple(&self, ids: &[i64]) -> Result<ArchiveStream> {
        let mut namer = EntryNamer::new();
        let mut entries = Vec::with_capacity(ids.len());

        for &id in ids {
            match self.records().get_by_id(id).await? {
                Some(record) => entries.push(ArchiveEntry::File {
                    path: namer.reserve("", &record.name),
                    location: record.blob_location(),
                }),
                None => warn!(file_id = id, "Skipping missing file in archive"),
            }
        }

        Ok(stream_archive(
            self.storage.clone(),
            entries,
            MemberFailure::Skip,
            self.archive_chunk_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{DirectoryRepository, NewDirectory};
    use crate::link::LinkOptions;
    use futures::StreamExt;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    struct Fixture {
        _temp_dir: TempDir,
        db: Database,
        storage: PhysicalStorage,
        storage_id: i64,
    }

    impl Fixture {
        fn service(&self) -> FileService<'_> {
            FileService::new(&self.db, &self.storage)
        }

        async fn mkdir(&self, name: &str) -> i64 {
            DirectoryRepository::new(self.db.pool())
                .create(&NewDirectory::new(name, self.storage_id))
                .await
                .unwrap()
                .id
        }

        async fn upload(&self, name: &str, content: &[u8], parent_id: Option<i64>) -> FileRecord {
            self.service()
                .upload(
                    name,
                    &mut &content[..],
                    self.storage_id,
                    content.len() as u64,
                    parent_id,
                )
                .await
                .unwrap()
        }

        async fn read(&self, id: i64) -> Vec<u8> {
            let mut download = self.service().download(id).await.unwrap();
            let mut buf = Vec::new();
            download.content.read_to_end(&mut buf).await.unwrap();
            buf
        }
    }

    async fn setup() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let storage = PhysicalStorage::new(temp_dir.path()).unwrap();
        let storage_id = StorageRepository::new(db.pool())
            .create("main", 1)
            .await
            .unwrap()
            .id;
        Fixture {
            _temp_dir: temp_dir,
            db,
            storage,
            storage_id,
        }
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let f = setup().await;

        let record = f.upload("hello.txt", b"Hello, World!", None).await;

        assert_eq!(record.name, "hello.txt");
        assert_eq!(record.size, 13);
        assert!(record.parent_id.is_none());
        assert_eq!(f.read(record.id).await, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let f = setup().await;
        let service = f.service().with_max_upload_size(4);

        let too_large = service
            .upload("big.bin", &mut &b"12345"[..], f.storage_id, 5, None)
            .await;
        assert!(matches!(too_large, Err(HoardError::Validation(_))));

        let bad_name = service
            .upload("a:b", &mut &b"1"[..], f.storage_id, 1, None)
            .await;
        assert!(matches!(bad_name, Err(HoardError::Validation(_))));

        let no_storage = service.upload("a", &mut &b"1"[..], 999, 1, None).await;
        assert!(matches!(no_storage, Err(HoardError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upload_limit_checks_actual_bytes() {
        let f = setup().await;
        let service = f.service().with_max_upload_size(10);
        let content = vec![7u8; 5000];

        let result = service
            .upload("big.bin", &mut content.as_slice(), f.storage_id, 1, None)
            .await;

        assert!(matches!(result, Err(HoardError::Validation(_))));
        assert!(FileRecordRepository::new(f.db.pool())
            .list_by_storage(f.storage_id)
            .await
            .unwrap()
            .is_empty());
        let leftovers = std::fs::read_dir(f.storage.base_path().join(f.storage_id.to_string()))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_upload_records_written_size() {
        let f = setup().await;

        let record = f
            .service()
            .upload("a.txt", &mut &b"twelve bytes"[..], f.storage_id, 3, None)
            .await
            .unwrap();

        assert_eq!(record.size, 12);
        assert_eq!(f.service().get(record.id).await.unwrap().size, 12);
    }

    #[tokio::test]
    async fn test_with_storage_config() {
        let f = setup().await;
        let config = StorageConfig {
            max_upload_size_mb: 2,
            archive_chunk_kb: 8,
            ..StorageConfig::default()
        };

        let service = f.service().with_storage_config(&config);

        assert_eq!(service.max_upload_size(), 2 * 1024 * 1024);
        assert_eq!(service.archive_chunk_size, 8 * 1024);
    }

    #[tokio::test]
    async fn test_upload_collision() {
        let f = setup().await;
        let first = f.upload("a.txt", b"1", None).await;

        let result = f
            .service()
            .upload("a.txt", &mut &b"2"[..], f.storage_id, 1, None)
            .await;

        match result {
            Err(HoardError::Collision { conflicting_id, .. }) => {
                assert_eq!(conflicting_id, first.id)
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_failure_removes_record() {
        let f = setup().await;
        // A plain file where the storage root should be makes every write fail.
        f.storage
            .save_stream(&format!("/{}", f.storage_id), &mut &b"x"[..])
            .await
            .unwrap();

        let result = f
            .service()
            .upload("a.txt", &mut &b"abc"[..], f.storage_id, 3, None)
            .await;

        assert!(result.is_err());
        assert!(FileRecordRepository::new(f.db.pool())
            .list_by_storage(f.storage_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_rename() {
        let f = setup().await;
        let a = f.upload("a.txt", b"1", None).await;
        let b = f.upload("b.txt", b"2", None).await;

        let renamed = f.service().rename(a.id, "c.txt").await.unwrap();
        assert_eq!(renamed.name, "c.txt");
        assert!(renamed.updated_at.is_some());
        assert_eq!(renamed.physical_file_id, a.physical_file_id);

        let collision = f.service().rename(a.id, "b.txt").await;
        assert!(matches!(
            collision,
            Err(HoardError::Collision { conflicting_id, .. }) if conflicting_id == b.id
        ));
    }

    #[tokio::test]
    async fn test_move_file() {
        let f = setup().await;
        let dir = f.mkdir("docs").await;
        let file = f.upload("a.txt", b"abc", None).await;

        let moved = f
            .service()
            .move_file(&MoveFile::new(file.id, Some(dir)).with_name("b.txt"))
            .await
            .unwrap();

        assert_eq!(moved.parent_id, Some(dir));
        assert_eq!(moved.name, "b.txt");
        assert_eq!(f.read(file.id).await, b"abc");

        let again = f.service().move_file(&MoveFile::new(file.id, Some(dir))).await;
        assert!(matches!(again, Err(HoardError::SameDestination)));
    }

    #[tokio::test]
    async fn test_move_collision_and_overwrite() {
        let f = setup().await;
        let dir = f.mkdir("docs").await;
        let original = f.upload("a.txt", b"old", Some(dir)).await;
        let incoming = f.upload("a.txt", b"new", None).await;

        let collision = f
            .service()
            .move_file(&MoveFile::new(incoming.id, Some(dir)))
            .await;
        assert!(matches!(
            collision,
            Err(HoardError::Collision { conflicting_id, .. }) if conflicting_id == original.id
        ));

        let moved = f
            .service()
            .move_file(&MoveFile::new(incoming.id, Some(dir)).with_overwrite(true))
            .await
            .unwrap();

        assert_eq!(moved.parent_id, Some(dir));
        assert!(matches!(
            f.service().get(original.id).await,
            Err(HoardError::NotFound(_))
        ));
        assert!(!f.storage.exists(&original.blob_location()).await);
        assert_eq!(f.read(incoming.id).await, b"new");
    }

    #[tokio::test]
    async fn test_copy_names_and_shares_bytes() {
        let f = setup().await;
        let file = f.upload("report.txt", b"data", None).await;

        let first = f.service().copy(file.id, None).await.unwrap();
        let second = f.service().copy(file.id, None).await.unwrap();
        let third = f.service().copy(first.id, None).await.unwrap();

        assert_eq!(first.name, "report (1).txt");
        assert_eq!(second.name, "report (2).txt");
        assert_eq!(third.name, "report (3).txt");
        assert_eq!(first.physical_file_id, file.physical_file_id);

        let dir = f.mkdir("other").await;
        let elsewhere = f.service().copy(file.id, Some(dir)).await.unwrap();
        assert_eq!(elsewhere.name, "report.txt");

        assert_eq!(
            FileRecordRepository::new(f.db.pool())
                .ref_count(&file.physical_file_id)
                .await
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn test_concurrent_copies_get_distinct_names() {
        let f = setup().await;
        let file = f.upload("report.txt", b"data", None).await;
        let service = f.service();

        let results =
            futures::future::join_all((0..4).map(|_| service.copy(file.id, None))).await;

        let mut names: Vec<String> = results.into_iter().map(|r| r.unwrap().name).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "report (1).txt",
                "report (2).txt",
                "report (3).txt",
                "report (4).txt"
            ]
        );
    }

    #[tokio::test]
    async fn test_overwrite_over_limit_keeps_contents() {
        let f = setup().await;
        let file = f.upload("a.txt", b"small", None).await;
        let service = f.service().with_max_upload_size(8);

        let in_place = service
            .overwrite(file.id, &mut &b"much too large"[..], 1)
            .await;
        assert!(matches!(in_place, Err(HoardError::Validation(_))));
        assert_eq!(f.read(file.id).await, b"small");

        let copy = service.copy(file.id, None).await.unwrap();
        let shared = service
            .overwrite(file.id, &mut &b"much too large"[..], 1)
            .await;
        assert!(matches!(shared, Err(HoardError::Validation(_))));

        let after = service.get(file.id).await.unwrap();
        assert_eq!(after.physical_file_id, file.physical_file_id);
        assert_eq!(after.size, 5);
        assert_eq!(f.read(copy.id).await, b"small");
    }

    #[tokio::test]
    async fn test_overwrite_records_written_size() {
        let f = setup().await;
        let file = f.upload("a.txt", b"old", None).await;

        let updated = f
            .service()
            .overwrite(file.id, &mut &b"longer contents"[..], 2)
            .await
            .unwrap();

        assert_eq!(updated.size, 15);
    }

    #[tokio::test]
    async fn test_delete_keeps_shared_bytes() {
        let f = setup().await;
        let file = f.upload("a.txt", b"shared", None).await;
        let copy = f.service().copy(file.id, None).await.unwrap();

        f.service().delete(file.id).await.unwrap();
        assert!(f.storage.exists(&copy.blob_location()).await);
        assert_eq!(f.read(copy.id).await, b"shared");

        f.service().delete(copy.id).await.unwrap();
        assert!(!f.storage.exists(&copy.blob_location()).await);
    }

    #[tokio::test]
    async fn test_delete_removes_link() {
        let f = setup().await;
        let file = f.upload("a.txt", b"1", None).await;
        let links = FileLinkRepository::new(f.db.pool());
        links
            .create("token", 1, file.id, &LinkOptions::public())
            .await
            .unwrap();

        f.service().delete(file.id).await.unwrap();
        assert!(links.get_by_token("token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_in_place() {
        let f = setup().await;
        let file = f.upload("a.txt", b"old", None).await;

        let updated = f
            .service()
            .overwrite(file.id, &mut &b"brand new"[..], 9)
            .await
            .unwrap();

        assert_eq!(updated.physical_file_id, file.physical_file_id);
        assert_eq!(updated.size, 9);
        assert!(updated.updated_at.is_some());
        assert_eq!(f.read(file.id).await, b"brand new");
    }

    #[tokio::test]
    async fn test_overwrite_shared_splits() {
        let f = setup().await;
        let file = f.upload("a.txt", b"original", None).await;
        let copy = f.service().copy(file.id, None).await.unwrap();

        let updated = f
            .service()
            .overwrite(file.id, &mut &b"changed"[..], 7)
            .await
            .unwrap();

        assert_ne!(updated.physical_file_id, file.physical_file_id);
        assert_eq!(f.read(file.id).await, b"changed");
        assert_eq!(f.read(copy.id).await, b"original");
    }

    #[tokio::test]
    async fn test_download_multiple_skips_missing() {
        let f = setup().await;
        let a = f.upload("a.txt", b"alpha", None).await;
        let dir = f.mkdir("d").await;
        let b = f.upload("a.txt", b"bravo", Some(dir)).await;

        let mut stream = f
            .service()
            .with_archive_chunk_size(2)
            .download_multiple(&[a.id, 999, b.id])
            .await
            .unwrap();
        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            archive.extend_from_slice(&chunk.unwrap());
        }

        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        assert_eq!(zip.len(), 2);
        let mut buf = String::new();
        zip.by_name("a (1).txt")
            .unwrap()
            .read_to_string(&mut buf)
            .unwrap();
        assert_eq!(buf, "bravo");
    }
}
