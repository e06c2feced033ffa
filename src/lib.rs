//! hoard - hierarchical file-storage backend
//!
//! Users own storages holding a tree of directories and files. File bytes
//! live in a physical storage addressed by physical ID and are shared between
//! copies until one of them is overwritten.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod link;
pub mod logging;
pub mod storage;

pub use app::Hoard;
pub use config::{Config, StorageConfig};
pub use db::Database;
pub use error::{HoardError, ItemError, PhysicalError, Result};
pub use file::{
    BatchOutcome, BatchRequest, DirectoryNode, DirectoryService, EntityKind, EntityService,
    FileRecord, FileService, PhysicalStorage,
};
pub use link::{FileLink, LinkOptions, LinkService};
pub use storage::{StorageService, UserStorage};
