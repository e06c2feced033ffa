//! File record types and repository.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::{HoardError, Result};

const FILE_COLUMNS: &str =
    "id, name, parent_id, storage_id, size, physical_file_id, uploaded_at, updated_at";

/// Metadata for a file in a storage tree.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FileRecord {
    /// Unique file ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Parent directory ID (None at the storage root).
    pub parent_id: Option<i64>,
    /// Owning storage.
    pub storage_id: i64,
    /// File size in bytes.
    pub size: i64,
    /// Key of the bytes in the physical storage gateway. Shared by copies.
    pub physical_file_id: String,
    /// When the file was uploaded.
    pub uploaded_at: DateTime<Utc>,
    /// When the contents were last overwritten or the record renamed/moved.
    pub updated_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Logical location of this file's bytes.
    pub fn blob_location(&self) -> String {
        super::physical::blob_location(self.storage_id, &self.physical_file_id)
    }
}

/// Data for creating a new file record.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    /// Display name.
    pub name: String,
    /// Parent directory ID (None at the storage root).
    pub parent_id: Option<i64>,
    /// Owning storage.
    pub storage_id: i64,
    /// File size in bytes.
    pub size: i64,
    /// Key of the bytes in the physical storage gateway.
    pub physical_file_id: String,
}

impl NewFileRecord {
    /// Create a new NewFileRecord.
    pub fn new(
        name: impl Into<String>,
        storage_id: i64,
        size: i64,
        physical_file_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
            storage_id,
            size,
            physical_file_id: physical_file_id.into(),
        }
    }

    /// Set the parent directory.
    pub fn with_parent(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// Repository for file records.
pub struct FileRecordRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileRecordRepository<'a> {
    /// Create a new FileRecordRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a file record.
    ///
    /// A duplicate (name, parent, storage) is rejected by the store with
    /// [`HoardError::AlreadyExists`].
    pub async fn create(&self, file: &NewFileRecord) -> Result<FileRecord> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO files (name, parent_id, storage_id, size, physical_file_id, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&file.name)
        .bind(file.parent_id)
        .bind(file.storage_id)
        .bind(file.size)
        .bind(&file.physical_file_id)
        .bind(Utc::now())
        .fetch_one(self.pool)
        .await?;

        self.require(id).await
    }

    /// Get a file by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(file)
    }

    /// Get a file by ID, failing with `NotFound` when absent.
    pub async fn require(&self, id: i64) -> Result<FileRecord> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("file {id}")))
    }

    /// Find a file by exact name within a parent (or the storage root).
    pub async fn find_by_name(
        &self,
        storage_id: i64,
        parent_id: Option<i64>,
        name: &str,
    ) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE storage_id = ? AND parent_id IS ? AND name = ?"
        ))
        .bind(storage_id)
        .bind(parent_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(file)
    }

    /// List files directly under a parent (or the storage root), by name.
    pub async fn list_in(&self, storage_id: i64, parent_id: Option<i64>) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE storage_id = ? AND parent_id IS ? ORDER BY name, id"
        ))
        .bind(storage_id)
        .bind(parent_id)
        .fetch_all(self.pool)
        .await?;

        Ok(files)
    }

    /// Names of the files directly under a parent (or the storage root).
    pub async fn names_in(&self, storage_id: i64, parent_id: Option<i64>) -> Result<HashSet<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM files WHERE storage_id = ? AND parent_id IS ?")
                .bind(storage_id)
                .bind(parent_id)
                .fetch_all(self.pool)
                .await?;

        Ok(names.into_iter().collect())
    }

    /// Every file anywhere below a directory.
    pub async fn list_in_subtree(&self, directory_id: i64) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM directories WHERE id = ?
                 UNION ALL
                 SELECT d.id FROM directories d JOIN subtree s ON d.parent_id = s.id
             )
             SELECT {FILE_COLUMNS} FROM files
             WHERE parent_id IN (SELECT id FROM subtree) ORDER BY id"
        ))
        .bind(directory_id)
        .fetch_all(self.pool)
        .await?;

        Ok(files)
    }

    /// Every file in a storage.
    pub async fn list_by_storage(&self, storage_id: i64) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE storage_id = ? ORDER BY id"
        ))
        .bind(storage_id)
        .fetch_all(self.pool)
        .await?;

        Ok(files)
    }

    /// Rename a file.
    pub async fn rename(&self, id: i64, name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE files SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a file to a new parent under the given name.
    pub async fn relocate(&self, id: i64, parent_id: Option<i64>, name: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE files SET parent_id = ?, name = ?, updated_at = ? WHERE id = ?")
                .bind(parent_id)
                .bind(name)
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Point a file at (possibly new) bytes with a new size.
    pub async fn update_content(&self, id: i64, physical_file_id: &str, size: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE files SET physical_file_id = ?, size = ?, updated_at = ? WHERE id = ?",
        )
        .bind(physical_file_id)
        .bind(size)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a file record.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of file records sharing the given physical bytes.
    pub async fn ref_count(&self, physical_file_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE physical_file_id = ?")
            .bind(physical_file_id)
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }

    /// Count files in a storage.
    pub async fn count_by_storage(&self, storage_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE storage_id = ?")
            .bind(storage_id)
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }
}
