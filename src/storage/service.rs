//! User storage service.

use tracing::{info, warn};

use crate::db::Database;
use crate::error::PhysicalError;
use crate::file::{storage_location, validate_name, PhysicalStorage};
use crate::{HoardError, Result};

use super::repository::{StorageRepository, UserStorage};

/// Service for creating and removing user storages.
pub struct StorageService<'a> {
    db: &'a Database,
    storage: &'a PhysicalStorage,
}

impl<'a> StorageService<'a> {
    /// Create a new StorageService.
    pub fn new(db: &'a Database, storage: &'a PhysicalStorage) -> Self {
        Self { db, storage }
    }

    fn repo(&self) -> StorageRepository<'_> {
        StorageRepository::new(self.db.pool())
    }

    /// Create a storage and its physical root directory.
    ///
    /// The record is removed again if the directory cannot be created.
    pub async fn create(&self, name: &str, owner_id: i64) -> Result<UserStorage> {
        validate_name(name)?;

        let storage = self.repo().create(name, owner_id).await?;
        if let Err(e) = self.storage.mkdir(&storage_location(storage.id)).await {
            warn!(storage_id = storage.id, error = %e, "Storage mkdir failed, removing record");
            self.repo().delete(storage.id).await?;
            return Err(e.into());
        }

        info!(storage_id = storage.id, owner_id = owner_id, "Storage created");
        Ok(storage)
    }

    /// Get a storage by ID.
    pub async fn get(&self, id: i64) -> Result<UserStorage> {
        self.repo().require(id).await
    }

    /// List a user's storages.
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UserStorage>> {
        self.repo().list_by_owner(owner_id).await
    }

    /// Rename a storage. The physical layout is keyed by ID and does not change.
    pub async fn rename(&self, id: i64, name: &str) -> Result<UserStorage> {
        validate_name(name)?;

        let repo = self.repo();
        if !repo.rename(id, name).await? {
            return Err(HoardError::NotFound(format!("storage {id}")));
        }

        info!(storage_id = id, "Storage renamed");
        repo.require(id).await
    }

    /// Delete a storage.
    ///
    /// A storage with content is only deleted when `force` is set; its
    /// directories, files and links then go with it, along with every byte
    /// under its physical root.
    pub async fn delete(&self, id: i64, force: bool) -> Result<()> {
        let repo = self.repo();
        repo.require(id).await?;

        if !force && repo.has_content(id).await? {
            return Err(HoardError::StorageNotEmpty(id));
        }

        repo.delete(id).await?;

        match self.storage.rm(&storage_location(id), true).await {
            Ok(()) => {}
            Err(PhysicalError::NotFound(_)) => {
                warn!(storage_id = id, "Storage root was already missing");
            }
            Err(e) => return Err(e.into()),
        }

        info!(storage_id = id, force = force, "Storage deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileService;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database, PhysicalStorage) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let storage = PhysicalStorage::new(temp_dir.path()).unwrap();
        (temp_dir, db, storage)
    }

    #[tokio::test]
    async fn test_create_makes_physical_root() {
        let (_temp_dir, db, physical) = setup().await;
        let service = StorageService::new(&db, &physical);

        let storage = service.create("docs", 1).await.unwrap();

        assert!(physical.exists(&storage_location(storage.id)).await);
        assert_eq!(service.get(storage.id).await.unwrap(), storage);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_name() {
        let (_temp_dir, db, physical) = setup().await;
        let service = StorageService::new(&db, &physical);

        let result = service.create("a/b", 1).await;
        assert!(matches!(result, Err(HoardError::Validation(_))));
        assert!(service.list_by_owner(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename() {
        let (_temp_dir, db, physical) = setup().await;
        let service = StorageService::new(&db, &physical);

        let storage = service.create("old", 1).await.unwrap();
        let renamed = service.rename(storage.id, "new").await.unwrap();

        assert_eq!(renamed.name, "new");
        assert!(physical.exists(&storage_location(storage.id)).await);
        assert!(matches!(
            service.rename(999, "x").await,
            Err(HoardError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_non_empty_requires_force() {
        let (_temp_dir, db, physical) = setup().await;
        let service = StorageService::new(&db, &physical);
        let storage = service.create("s", 1).await.unwrap();

        let file = FileService::new(&db, &physical)
            .upload("a.txt", &mut &b"abc"[..], storage.id, 3, None)
            .await
            .unwrap();

        let result = service.delete(storage.id, false).await;
        assert!(matches!(result, Err(HoardError::StorageNotEmpty(id)) if id == storage.id));
        assert!(physical.exists(&file.blob_location()).await);

        service.delete(storage.id, true).await.unwrap();
        assert!(!physical.exists(&storage_location(storage.id)).await);
        assert!(matches!(
            service.get(storage.id).await,
            Err(HoardError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_empty_storage() {
        let (_temp_dir, db, physical) = setup().await;
        let service = StorageService::new(&db, &physical);
        let storage = service.create("s", 1).await.unwrap();

        service.delete(storage.id, false).await.unwrap();
        assert!(service.list_by_owner(1).await.unwrap().is_empty());
    }
}
