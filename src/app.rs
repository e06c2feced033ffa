//! Application handle.
//!
//! Owns the database and the physical storage and hands out services with
//! the configured limits applied.

use crate::config::{Config, StorageConfig};
use crate::db::Database;
use crate::file::{DirectoryService, EntityService, FileService, PhysicalStorage};
use crate::link::LinkService;
use crate::storage::StorageService;
use crate::Result;

/// Storage backend with its configuration.
pub struct Hoard {
    db: Database,
    storage: PhysicalStorage,
    settings: StorageConfig,
}

impl Hoard {
    /// Create a handle from already opened parts.
    pub fn new(db: Database, storage: PhysicalStorage, settings: StorageConfig) -> Self {
        Self {
            db,
            storage,
            settings,
        }
    }

    /// Open the database and prepare the storage root named in `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database.path).await?;
        let storage = PhysicalStorage::new(&config.storage.root_path)?;
        Ok(Self::new(db, storage, config.storage.clone()))
    }

    /// Get the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get the physical storage.
    pub fn storage(&self) -> &PhysicalStorage {
        &self.storage
    }

    /// Get the storage settings.
    pub fn settings(&self) -> &StorageConfig {
        &self.settings
    }

    pub fn files(&self) -> FileService<'_> {
        FileService::new(&self.db, &self.storage).with_storage_config(&self.settings)
    }

    pub fn directories(&self) -> DirectoryService<'_> {
        DirectoryService::new(&self.db, &self.storage)
    }

    pub fn entities(&self) -> EntityService<'_> {
        EntityService::new(&self.db, &self.storage).with_storage_config(&self.settings)
    }

    pub fn storages(&self) -> StorageService<'_> {
        StorageService::new(&self.db, &self.storage)
    }

    pub fn links(&self) -> LinkService<'_> {
        LinkService::new(&self.db)
    }
}
