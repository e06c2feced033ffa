//! Directory node types and repository.

use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::{HoardError, Result};

const DIRECTORY_COLUMNS: &str = "id, name, parent_id, storage_id, created_at";

/// A directory in a storage tree.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DirectoryNode {
    /// Unique directory ID.
    pub id: i64,
    /// Directory name.
    pub name: String,
    /// Parent directory ID (None at the storage root).
    pub parent_id: Option<i64>,
    /// Owning storage.
    pub storage_id: i64,
    /// When the directory was created.
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new directory.
#[derive(Debug, Clone)]
pub struct NewDirectory {
    /// Directory name.
    pub name: String,
    /// Parent directory ID (None at the storage root).
    pub parent_id: Option<i64>,
    /// Owning storage.
    pub storage_id: i64,
}

impl NewDirectory {
    /// Create a new root-level directory description.
    pub fn new(name: impl Into<String>, storage_id: i64) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
            storage_id,
        }
    }

    /// Set the parent directory.
    pub fn with_parent(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// Direct children of a directory, derived from the children's parent
/// pointers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryContents {
    /// IDs of files directly inside the directory.
    pub file_ids: Vec<i64>,
    /// IDs of directories directly inside the directory.
    pub subdirectory_ids: Vec<i64>,
}

impl DirectoryContents {
    /// True when the directory has no direct children.
    pub fn is_empty(&self) -> bool {
        self.file_ids.is_empty() && self.subdirectory_ids.is_empty()
    }
}

/// Repository for directory nodes.
pub struct DirectoryRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> DirectoryRepository<'a> {
    /// Create a new DirectoryRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a directory.
    ///
    /// A duplicate (name, parent, storage) is rejected by the store with
    /// [`HoardError::AlreadyExists`].
    pub async fn create(&self, directory: &NewDirectory) -> Result<DirectoryNode> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO directories (name, parent_id, storage_id, created_at)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&directory.name)
        .bind(directory.parent_id)
        .bind(directory.storage_id)
        .bind(Utc::now())
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("directory {id}")))
    }

    /// Get a directory by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<DirectoryNode>> {
        let directory = sqlx::query_as::<_, DirectoryNode>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(directory)
    }

    /// Get a directory by ID, failing with `NotFound` when absent.
    pub async fn require(&self, id: i64) -> Result<DirectoryNode> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("directory {id}")))
    }

    /// Check that `parent_id`, when set, is a directory of `storage_id`.
    pub async fn check_parent(&self, storage_id: i64, parent_id: Option<i64>) -> Result<()> {
        if let Some(parent_id) = parent_id {
            let parent = self.require(parent_id).await?;
            if parent.storage_id != storage_id {
                return Err(HoardError::CrossStorage);
            }
        }
        Ok(())
    }

    /// Find a directory by its name within a parent (or the storage root).
    pub async fn find_by_name(
        &self,
        storage_id: i64,
        parent_id: Option<i64>,
        name: &str,
    ) -> Result<Option<DirectoryNode>> {
        let directory = sqlx::query_as::<_, DirectoryNode>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories
             WHERE storage_id = ? AND parent_id IS ? AND name = ?"
        ))
        .bind(storage_id)
        .bind(parent_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(directory)
    }

    /// List the directories directly under a parent (or the storage root).
    pub async fn list_children(
        &self,
        storage_id: i64,
        parent_id: Option<i64>,
    ) -> Result<Vec<DirectoryNode>> {
        let directories = sqlx::query_as::<_, DirectoryNode>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directories
             WHERE storage_id = ? AND parent_id IS ? ORDER BY name, id"
        ))
        .bind(storage_id)
        .bind(parent_id)
        .fetch_all(self.pool)
        .await?;

        Ok(directories)
    }

    /// Direct file and subdirectory IDs of a directory.
    pub async fn contents(&self, id: i64) -> Result<DirectoryContents> {
        let file_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM files WHERE parent_id = ? ORDER BY id")
                .bind(id)
                .fetch_all(self.pool)
                .await?;

        let subdirectory_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM directories WHERE parent_id = ? ORDER BY id")
                .bind(id)
                .fetch_all(self.pool)
                .await?;

        Ok(DirectoryContents {
            file_ids,
            subdirectory_ids,
        })
    }

    /// Rename a directory.
    pub async fn rename(&self, id: i64, name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE directories SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Point a directory at a new parent.
    pub async fn set_parent(&self, id: i64, parent_id: Option<i64>) -> Result<bool> {
        let result = sqlx::query("UPDATE directories SET parent_id = ? WHERE id = ?")
            .bind(parent_id)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a directory. Descendant directories and files cascade.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM directories WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get the chain of directories from the storage root down to `id`.
    pub async fn get_ancestors(&self, id: i64) -> Result<Vec<DirectoryNode>> {
        let mut chain = Vec::new();
        let mut current_id = Some(id);

        while let Some(directory_id) = current_id {
            let directory = self.require(directory_id).await?;
            current_id = directory.parent_id;
            chain.push(directory);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Absolute logical path of a directory: `/{storage_id}/a/b/c`.
    pub async fn get_path(&self, id: i64) -> Result<String> {
        let chain = self.get_ancestors(id).await?;
        let storage_id = chain
            .first()
            .map(|d| d.storage_id)
            .ok_or_else(|| HoardError::NotFound(format!("directory {id}")))?;

        let mut path = format!("/{storage_id}");
        for directory in &chain {
            path.push('/');
            path.push_str(&directory.name);
        }
        Ok(path)
    }

    /// True if `candidate` is `ancestor` itself or lies below it.
    pub async fn is_within(&self, candidate: i64, ancestor: i64) -> Result<bool> {
        let mut current_id = Some(candidate);

        while let Some(directory_id) = current_id {
            if directory_id == ancestor {
                return Ok(true);
            }
            current_id = self.require(directory_id).await?.parent_id;
        }

        Ok(false)
    }

    /// The directory and all its descendants, parents before children.
    pub async fn subtree(&self, id: i64) -> Result<Vec<DirectoryNode>> {
        let directories = sqlx::query_as::<_, DirectoryNode>(
            "WITH RECURSIVE subtree(id, depth) AS (
                 SELECT id, 0 FROM directories WHERE id = ?
                 UNION ALL
                 SELECT d.id, s.depth + 1 FROM directories d JOIN subtree s ON d.parent_id = s.id
             )
             SELECT d.id, d.name, d.parent_id, d.storage_id, d.created_at
             FROM directories d JOIN subtree s ON d.id = s.id
             ORDER BY s.depth, d.id",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(directories)
    }

    /// Total size of every file below a directory, recursively.
    pub async fn get_size(&self, id: i64) -> Result<i64> {
        let size: i64 = sqlx::query_scalar(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM directories WHERE id = ?
                 UNION ALL
                 SELECT d.id FROM directories d JOIN subtree s ON d.parent_id = s.id
             )
             SELECT COALESCE(SUM(size), 0) FROM files
             WHERE parent_id IN (SELECT id FROM subtree)",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        Ok(size)
    }
}
