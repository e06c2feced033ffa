//! User storage types and repository.

use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::{HoardError, Result};

/// A user-owned storage: the root of one directory and file tree.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserStorage {
    /// Unique storage ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Owning user.
    pub owner_id: i64,
    /// When the storage was created.
    pub created_at: DateTime<Utc>,
}

/// Repository for user storages.
pub struct StorageRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> StorageRepository<'a> {
    /// Create a new StorageRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a storage.
    pub async fn create(&self, name: &str, owner_id: i64) -> Result<UserStorage> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO storages (name, owner_id, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(owner_id)
        .bind(Utc::now())
        .fetch_one(self.pool)
        .await?;

        self.require(id).await
    }

    /// Get a storage by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<UserStorage>> {
        let storage = sqlx::query_as::<_, UserStorage>(
            "SELECT id, name, owner_id, created_at FROM storages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(storage)
    }

    /// Get a storage by ID, failing with `NotFound` when absent.
    pub async fn require(&self, id: i64) -> Result<UserStorage> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("storage {id}")))
    }

    /// List the storages owned by a user, oldest first.
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UserStorage>> {
        let storages = sqlx::query_as::<_, UserStorage>(
            "SELECT id, name, owner_id, created_at FROM storages WHERE owner_id = ? ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(self.pool)
        .await?;

        Ok(storages)
    }

    /// Rename a storage.
    pub async fn rename(&self, id: i64, name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE storages SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a storage. Its directories, files and links cascade.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM storages WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// True if the storage holds any directory or file.
    pub async fn has_content(&self, id: i64) -> Result<bool> {
        let has: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM directories WHERE storage_id = ?)
                 OR EXISTS(SELECT 1 FROM files WHERE storage_id = ?)",
        )
        .bind(id)
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        Ok(has != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_create_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = StorageRepository::new(db.pool());

        let storage = repo.create("photos", 7).await.unwrap();
        assert_eq!(storage.name, "photos");
        assert_eq!(storage.owner_id, 7);

        assert_eq!(repo.get_by_id(storage.id).await.unwrap(), Some(storage));
        assert!(repo.get_by_id(999).await.unwrap().is_none());
        assert!(matches!(repo.require(999).await, Err(HoardError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = StorageRepository::new(db.pool());

        repo.create("a", 1).await.unwrap();
        repo.create("b", 2).await.unwrap();
        repo.create("c", 1).await.unwrap();

        let names: Vec<String> = repo
            .list_by_owner(1)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = StorageRepository::new(db.pool());

        let storage = repo.create("old", 1).await.unwrap();
        assert!(repo.rename(storage.id, "new").await.unwrap());
        assert_eq!(repo.require(storage.id).await.unwrap().name, "new");

        assert!(repo.delete(storage.id).await.unwrap());
        assert!(!repo.delete(storage.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_content() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = StorageRepository::new(db.pool());

        let storage = repo.create("s", 1).await.unwrap();
        assert!(!repo.has_content(storage.id).await.unwrap());

        sqlx::query(
            "INSERT INTO files (name, storage_id, size, physical_file_id, uploaded_at)
             VALUES ('f', ?, 1, 'p', ?)",
        )
        .bind(storage.id)
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        assert!(repo.has_content(storage.id).await.unwrap());
    }
}
