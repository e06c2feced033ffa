//! Bulk operations over files and directories.
//!
//! Copy and move run in two phases. Every item is validated first without
//! touching anything; a single invalid item rejects the whole batch. The
//! validated items are then applied concurrently and each one reports its
//! own outcome.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::db::Database;
use crate::error::ItemError;
use crate::link::FileLinkRepository;
use crate::storage::StorageRepository;
use crate::{HoardError, Result};

use super::archive::{stream_archive, ArchiveEntry, ArchiveStream, EntryNamer, MemberFailure};
use super::directory::DirectoryRepository;
use super::directory_service::DirectoryService;
use super::file_service::{FileService, MoveFile};
use super::physical::PhysicalStorage;
use super::record::FileRecordRepository;
use super::{EntityKind, DEFAULT_ARCHIVE_CHUNK_SIZE};

/// Files and directories to copy or move to one destination.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Storage the items and the destination belong to.
    pub storage_id: i64,
    /// Destination directory (None for the storage root).
    pub destination_id: Option<i64>,
    pub file_ids: Vec<i64>,
    pub directory_ids: Vec<i64>,
    /// Replace files already holding a name at the destination (move only).
    pub overwrite: bool,
}

impl BatchRequest {
    /// Create an empty batch targeting `destination_id` in `storage_id`.
    pub fn new(storage_id: i64, destination_id: Option<i64>) -> Self {
        Self {
            storage_id,
            destination_id,
            ..Self::default()
        }
    }

    /// Add files to the batch.
    pub fn with_files(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.file_ids.extend(ids);
        self
    }

    /// Add directories to the batch.
    pub fn with_directories(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.directory_ids.extend(ids);
        self
    }

    /// Set whether colliding files are replaced.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Files and directories to delete.
#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    pub file_ids: Vec<i64>,
    pub directory_ids: Vec<i64>,
    /// Delete non-empty directories too.
    pub force: bool,
}

/// Files and directories to bundle into one archive.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub file_ids: Vec<i64>,
    pub directory_ids: Vec<i64>,
}

/// Lifecycle of one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Validated,
    Applied,
    /// A sibling already held the item's name at the destination.
    Conflicted,
    Failed,
}

/// One item of a batch and where it ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: i64,
    pub kind: EntityKind,
    pub state: ItemState,
}

/// An item that could not be placed because of a name collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    /// The item from the batch.
    pub moved_id: i64,
    /// The entity already holding the name at the destination.
    pub original_id: i64,
}

/// Per-item results of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// True when every item was applied.
    pub success: bool,
    pub items: Vec<BatchItem>,
    pub errors: Vec<ItemError>,
    pub conflicting_files: Vec<Conflict>,
    pub conflicting_directories: Vec<Conflict>,
}

impl BatchOutcome {
    fn record(&mut self, id: i64, kind: EntityKind, result: Result<()>) {
        let state = match result {
            Ok(()) => ItemState::Applied,
            Err(HoardError::Collision { conflicting_id, .. }) => {
                let conflict = Conflict {
                    moved_id: id,
                    original_id: conflicting_id,
                };
                match kind {
                    EntityKind::File => self.conflicting_files.push(conflict),
                    EntityKind::Directory => self.conflicting_directories.push(conflict),
                }
                ItemState::Conflicted
            }
            Err(e) => {
                self.errors.push(ItemError {
                    id,
                    kind,
                    reason: e.to_string(),
                });
                ItemState::Failed
            }
        };
        self.items.push(BatchItem { id, kind, state });
    }

    fn finish(mut self) -> Self {
        self.success = self.items.iter().all(|item| item.state == ItemState::Applied);
        self
    }
}

/// Something that has an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    File(i64),
    Directory(i64),
    Storage(i64),
    Link(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchMode {
    Copy,
    Move,
}

/// Service for operations spanning many files and directories.
pub struct EntityService<'a> {
    db: &'a Database,
    storage: &'a PhysicalStorage,
    archive_chunk_size: usize,
}

impl<'a> EntityService<'a> {
    /// Create a new EntityService.
    pub fn new(db: &'a Database, storage: &'a PhysicalStorage) -> Self {
        Self {
            db,
            storage,
            archive_chunk_size: DEFAULT_ARCHIVE_CHUNK_SIZE,
        }
    }

    /// Set the read buffer size used when archiving.
    pub fn with_archive_chunk_size(mut self, chunk_size: usize) -> Self {
        self.archive_chunk_size = chunk_size;
        self
    }

    /// Apply the archive settings from the storage configuration.
    pub fn with_storage_config(self, config: &StorageConfig) -> Self {
        self.with_archive_chunk_size(config.archive_chunk_bytes())
    }

    fn files(&self) -> FileService<'a> {
        FileService::new(self.db, self.storage)
    }

    fn directory_service(&self) -> DirectoryService<'a> {
        DirectoryService::new(self.db, self.storage)
    }

    fn directories(&self) -> DirectoryRepository<'_> {
        DirectoryRepository::new(self.db.pool())
    }

    fn records(&self) -> FileRecordRepository<'_> {
        FileRecordRepository::new(self.db.pool())
    }

    /// Copy files and directories to one destination.
    pub async fn copy_multiple(&self, request: &BatchRequest) -> Result<BatchOutcome> {
        self.run_batch(request, BatchMode::Copy).await
    }

    /// Move files and directories to one destination.
    pub async fn move_multiple(&self, request: &BatchRequest) -> Result<BatchOutcome> {
        self.run_batch(request, BatchMode::Move).await
    }

    async fn run_batch(&self, request: &BatchRequest, mode: BatchMode) -> Result<BatchOutcome> {
        let mut items: Vec<BatchItem> = request
            .file_ids
            .iter()
            .map(|&id| (id, EntityKind::File))
            .chain(request.directory_ids.iter().map(|&id| (id, EntityKind::Directory)))
            .map(|(id, kind)| BatchItem {
                id,
                kind,
                state: ItemState::Pending,
            })
            .collect();

        let rejected = self.validate_batch(request, mode, &mut items).await?;
        if !rejected.is_empty() {
            warn!(
                rejected = rejected.len(),
                mode = ?mode,
                "Batch rejected during validation"
            );
            return Err(HoardError::BatchRejected(rejected));
        }

        let files = self.files();
        let directories = self.directory_service();
        let destination_id = request.destination_id;

        let results = join_all(items.iter().map(|item| {
            let files = &files;
            let directories = &directories;
            async move {
                let result = match (mode, item.kind) {
                    (BatchMode::Copy, EntityKind::File) => {
                        files.copy(item.id, destination_id).await.map(|_| ())
                    }
                    (BatchMode::Copy, EntityKind::Directory) => {
                        directories.copy(item.id, destination_id).await.map(|_| ())
                    }
                    (BatchMode::Move, EntityKind::File) => {
                        let request = MoveFile::new(item.id, destination_id)
                            .with_overwrite(request.overwrite);
                        files.move_file(&request).await.map(|_| ())
                    }
                    (BatchMode::Move, EntityKind::Directory) => {
                        directories.move_to(item.id, destination_id).await.map(|_| ())
                    }
                };
                (item.id, item.kind, result)
            }
        }))
        .await;

        let mut outcome = BatchOutcome::default();
        for (id, kind, result) in results {
            outcome.record(id, kind, result);
        }
        let outcome = outcome.finish();

        info!(
            mode = ?mode,
            items = outcome.items.len(),
            conflicts = outcome.conflicting_files.len() + outcome.conflicting_directories.len(),
            failed = outcome.errors.len(),
            "Batch applied"
        );
        Ok(outcome)
    }

    /// Check every item without mutating anything.
    async fn validate_batch(
        &self,
        request: &BatchRequest,
        mode: BatchMode,
        items: &mut [BatchItem],
    ) -> Result<Vec<ItemError>> {
        let mut rejected = Vec::new();

        if let Some(destination_id) = request.destination_id {
            if let Err(e) = self
                .directories()
                .check_parent(request.storage_id, Some(destination_id))
                .await
            {
                rejected.push(ItemError {
                    id: destination_id,
                    kind: EntityKind::Directory,
                    reason: format!("destination: {e}"),
                });
                return Ok(rejected);
            }
        }

        for item in items.iter_mut() {
            match self.validate_item(request, mode, item).await? {
                None => item.state = ItemState::Validated,
                Some(reason) => {
                    item.state = ItemState::Failed;
                    rejected.push(ItemError {
                        id: item.id,
                        kind: item.kind,
                        reason,
                    });
                }
            }
        }

        Ok(rejected)
    }

    async fn validate_item(
        &self,
        request: &BatchRequest,
        mode: BatchMode,
        item: &BatchItem,
    ) -> Result<Option<String>> {
        let destination_id = request.destination_id;

        let (storage_id, parent_id) = match item.kind {
            EntityKind::File => match self.records().get_by_id(item.id).await? {
                Some(record) => (record.storage_id, record.parent_id),
                None => return Ok(Some(format!("file {} not found", item.id))),
            },
            EntityKind::Directory => match self.directories().get_by_id(item.id).await? {
                Some(node) => (node.storage_id, node.parent_id),
                None => return Ok(Some(format!("directory {} not found", item.id))),
            },
        };

        if storage_id != request.storage_id {
            return Ok(Some(HoardError::CrossStorage.to_string()));
        }

        match (mode, item.kind, destination_id) {
            (BatchMode::Move, _, _) if parent_id == destination_id => {
                Ok(Some(HoardError::SameDestination.to_string()))
            }
            (_, EntityKind::Directory, Some(destination_id)) if destination_id == item.id => {
                Ok(Some(HoardError::SelfMove.to_string()))
            }
            (BatchMode::Move, EntityKind::Directory, Some(destination_id)) => {
                if self.directories().is_within(destination_id, item.id).await? {
                    Ok(Some(HoardError::MoveIntoDescendant.to_string()))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    /// Delete files and directories. Each item succeeds or fails on its own.
    ///
    /// Files go before directories so that a file inside a listed directory
    /// is not reported missing.
    pub async fn delete_multiple(&self, request: &DeleteRequest) -> Result<BatchOutcome> {
        let files = self.files();
        let directories = self.directory_service();
        let mut outcome = BatchOutcome::default();

        for &id in &request.file_ids {
            outcome.record(id, EntityKind::File, files.delete(id).await);
        }
        for &id in &request.directory_ids {
            let result = directories.delete(id, request.force).await;
            outcome.record(id, EntityKind::Directory, result);
        }

        let outcome = outcome.finish();
        info!(
            items = outcome.items.len(),
            failed = outcome.errors.len(),
            "Batch delete finished"
        );
        Ok(outcome)
    }

    /// Bundle files and whole directories into one zip archive.
    ///
    /// Files sit at the archive root. Each directory becomes a folder holding
    /// its contents depth first. Unlike single-file archives, any member that
    /// cannot be read ends the stream with an error.
    pub async fn download_multiple(&self, request: &DownloadRequest) -> Result<ArchiveStream> {
        let mut namer = EntryNamer::new();
        let mut entries = Vec::new();

        for &id in &request.file_ids {
            let record = self.records().require(id).await?;
            entries.push(ArchiveEntry::File {
                path: namer.reserve("", &record.name),
                location: record.blob_location(),
            });
        }

        for &id in &request.directory_ids {
            let node = self.directories().require(id).await?;
            let mut pending = vec![(node.id, node.storage_id, String::new(), node.name)];

            while let Some((directory_id, storage_id, parent_prefix, name)) = pending.pop() {
                let prefix = format!("{}/", namer.reserve(&parent_prefix, &name));
                entries.push(ArchiveEntry::Directory {
                    path: prefix.clone(),
                });

                for record in self.records().list_in(storage_id, Some(directory_id)).await? {
                    entries.push(ArchiveEntry::File {
                        path: namer.reserve(&prefix, &record.name),
                        location: record.blob_location(),
                    });
                }

                let children = self
                    .directories()
                    .list_children(storage_id, Some(directory_id))
                    .await?;
                for child in children.into_iter().rev() {
                    pending.push((child.id, child.storage_id, prefix.clone(), child.name));
                }
            }
        }

        debug!(entries = entries.len(), "Prepared archive");
        Ok(stream_archive(
            self.storage.clone(),
            entries,
            MemberFailure::Abort,
            self.archive_chunk_size,
        ))
    }

    /// Resolve the user who owns an entity.
    pub async fn owner_of(&self, entity: EntityRef) -> Result<i64> {
        let storages = StorageRepository::new(self.db.pool());

        let storage_id = match entity {
            EntityRef::File(id) => self.records().require(id).await?.storage_id,
            EntityRef::Directory(id) => self.directories().require(id).await?.storage_id,
            EntityRef::Storage(id) => id,
            EntityRef::Link(id) => {
                return FileLinkRepository::new(self.db.pool())
                    .get_by_id(id)
                    .await?
                    .map(|link| link.owner_id)
                    .ok_or_else(|| HoardError::NotFound(format!("link {id}")));
            }
        };

        Ok(storages.require(storage_id).await?.owner_id)
    }
}
