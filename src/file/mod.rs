//! File and directory management for hoard.
//!
//! This module provides the storage tree engine:
//! - Directory tree with a mirrored physical layout
//! - File records sharing reference-counted physical bytes
//! - Bulk copy, move and delete with collision reporting
//! - Zip archive downloads

mod archive;
mod directory;
mod directory_service;
mod entity_service;
mod file_service;
mod name;
mod physical;
mod record;

pub use archive::{stream_archive, ArchiveEntry, ArchiveStream, EntryNamer, MemberFailure};
pub use directory::{DirectoryContents, DirectoryNode, DirectoryRepository, NewDirectory};
pub use directory_service::{DirectoryInfo, DirectoryListing, DirectoryService};
pub use entity_service::{
    BatchItem, BatchOutcome, BatchRequest, Conflict, DeleteRequest, DownloadRequest, EntityRef,
    EntityService, ItemState,
};
pub use file_service::{DownloadResult, FileService, MoveFile};
pub use name::{available_copy_name, validate_name};
pub use physical::{
    blob_location, generate_physical_id, storage_location, PhysicalStorage, MAX_COMPONENT_LENGTH,
    MAX_PATH_LENGTH,
};
pub use record::{FileRecord, FileRecordRepository, NewFileRecord};

/// Maximum length for file and directory names (in characters).
pub const MAX_NAME_LENGTH: usize = 255;

/// Default maximum upload size (1GB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 1024 * 1024 * 1024;

/// Default size of the read buffer used when archiving file contents.
pub const DEFAULT_ARCHIVE_CHUNK_SIZE: usize = 64 * 1024;

/// The two kinds of entity in a storage tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    File,
    Directory,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::File => write!(f, "file"),
            EntityKind::Directory => write!(f, "directory"),
        }
    }
}
