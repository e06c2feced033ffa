//! Test helpers for integration tests.
//!
//! Provides a storage environment backed by an in-memory database and a
//! temporary physical base directory.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use hoard::file::{DirectoryNode, FileRecord};
use hoard::{Database, DirectoryService, EntityService, FileService, PhysicalStorage, StorageService};

/// A database, a physical base directory and one storage owned by user 1.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub db: Arc<Database>,
    pub storage: Arc<PhysicalStorage>,
    pub storage_id: i64,
}

impl TestEnv {
    /// Create a fresh environment.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let storage = Arc::new(PhysicalStorage::new(temp_dir.path()).unwrap());
        let storage_id = StorageService::new(&db, &storage)
            .create("main", 1)
            .await
            .unwrap()
            .id;

        Self {
            temp_dir,
            db,
            storage,
            storage_id,
        }
    }

    pub fn directories(&self) -> DirectoryService<'_> {
        DirectoryService::new(&self.db, &self.storage)
    }

    pub fn files(&self) -> FileService<'_> {
        FileService::new(&self.db, &self.storage)
    }

    pub fn entities(&self) -> EntityService<'_> {
        EntityService::new(&self.db, &self.storage)
    }

    /// Create a directory, panicking on failure.
    pub async fn mkdir(&self, name: &str, parent_id: Option<i64>) -> DirectoryNode {
        self.directories()
            .create(name, self.storage_id, parent_id)
            .await
            .unwrap()
    }

    /// Upload a file, panicking on failure.
    pub async fn upload(&self, name: &str, content: &[u8], parent_id: Option<i64>) -> FileRecord {
        self.files()
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

    /// Read a file's full contents.
    pub async fn read(&self, file_id: i64) -> Vec<u8> {
        let mut download = self.files().download(file_id).await.unwrap();
        let mut buf = Vec::new();
        download.content.read_to_end(&mut buf).await.unwrap();
        buf
    }

    /// Logical path of `path` inside this environment's storage.
    pub fn path(&self, path: &str) -> String {
        format!("/{}{path}", self.storage_id)
    }
}
