//! Directory service for hoard.
//!
//! Every directory node has a mirrored directory in the physical storage
//! at `/{storage_id}/{ancestor names}/{name}`. Metadata is written first and
//! the physical layout follows it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::PhysicalError;
use crate::storage::StorageRepository;
use crate::{HoardError, Result};

use super::directory::{DirectoryNode, DirectoryRepository, NewDirectory};
use super::file_service::FileService;
use super::name::validate_name;
use super::physical::{storage_location, PhysicalStorage};
use super::record::{FileRecord, FileRecordRepository, NewFileRecord};

/// Summary of a directory for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryInfo {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Files directly inside the directory.
    pub file_count: usize,
    /// Directories directly inside the directory.
    pub directory_count: usize,
    /// Direct files plus the direct files of each subdirectory.
    pub total_files: usize,
    /// Direct subdirectories plus their own direct subdirectories.
    pub total_directories: usize,
    /// Recursive size in bytes.
    pub size: i64,
    /// Path inside the storage, e.g. `/docs/drafts`.
    pub path: String,
}

/// Entries directly under a directory or the storage root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub directories: Vec<DirectoryNode>,
    pub files: Vec<FileRecord>,
}

/// Directory service for managing the directory tree.
pub struct DirectoryService<'a> {
    db: &'a Database,
    storage: &'a PhysicalStorage,
}

impl<'a> DirectoryService<'a> {
    /// Create a new DirectoryService.
    pub fn new(db: &'a Database, storage: &'a PhysicalStorage) -> Self {
        Self { db, storage }
    }

    fn directories(&self) -> DirectoryRepository<'_> {
        DirectoryRepository::new(self.db.pool())
    }

    fn records(&self) -> FileRecordRepository<'_> {
        FileRecordRepository::new(self.db.pool())
    }

    async fn ensure_free(&self, storage_id: i64, parent_id: Option<i64>, name: &str) -> Result<()> {
        let existing = self
            .directories()
            .find_by_name(storage_id, parent_id, name)
            .await?;
        if let Some(existing) = existing {
            return Err(HoardError::Collision {
                name: name.to_string(),
                conflicting_id: existing.id,
            });
        }
        Ok(())
    }

    /// Physical path of a directory, or of the storage root for `None`.
    async fn location_of(&self, storage_id: i64, id: Option<i64>) -> Result<String> {
        match id {
            Some(id) => self.directories().get_path(id).await,
            None => Ok(storage_location(storage_id)),
        }
    }

    /// Copy the mirrored directory to its new path and drop the old one.
    async fn relocate_physical(&self, from: &str, to: &str) -> Result<()> {
        self.storage.copy(from, to).await?;
        self.storage.rm(from, true).await?;
        Ok(())
    }

    /// Create a directory.
    ///
    /// The node is removed again if the physical directory cannot be made.
    pub async fn create(
        &self,
        name: &str,
        storage_id: i64,
        parent_id: Option<i64>,
    ) -> Result<DirectoryNode> {
        validate_name(name)?;

        StorageRepository::new(self.db.pool())
            .require(storage_id)
            .await?;
        self.directories().check_parent(storage_id, parent_id).await?;
        self.ensure_free(storage_id, parent_id, name).await?;

        let node = self
            .directories()
            .create(&NewDirectory::new(name, storage_id).with_parent(parent_id))
            .await?;

        let path = self.directories().get_path(node.id).await?;
        if let Err(e) = self.storage.mkdir(&path).await {
            warn!(directory_id = node.id, error = %e, "mkdir failed, removing directory");
            self.directories().delete(node.id).await?;
            return Err(e.into());
        }

        info!(
            directory_id = node.id,
            storage_id = storage_id,
            "Directory created"
        );
        Ok(node)
    }

    /// Get a directory.
    pub async fn get(&self, id: i64) -> Result<DirectoryNode> {
        self.directories().require(id).await
    }

    /// Absolute logical path of a directory: `/{storage_id}/a/b`.
    pub async fn get_path(&self, id: i64) -> Result<String> {
        self.directories().get_path(id).await
    }

    /// Total size of every file below a directory.
    pub async fn get_size(&self, id: i64) -> Result<i64> {
        self.directories().require(id).await?;
        self.directories().get_size(id).await
    }

    /// Rename a directory. No-op when the name is unchanged.
    pub async fn rename(&self, id: i64, new_name: &str) -> Result<DirectoryNode> {
        validate_name(new_name)?;

        let node = self.directories().require(id).await?;
        if node.name == new_name {
            return Ok(node);
        }
        self.ensure_free(node.storage_id, node.parent_id, new_name)
            .await?;

        let old_path = self.directories().get_path(id).await?;
        self.directories().rename(id, new_name).await?;
        let new_path = self.directories().get_path(id).await?;
        self.relocate_physical(&old_path, &new_path).await?;

        info!(directory_id = id, "Directory renamed");
        self.directories().require(id).await
    }

    /// Move a directory under another directory (or the storage root).
    ///
    /// Checks run in order: moving into itself, the destination's storage,
    /// moving to the current parent, a name collision at the destination,
    /// then moving into its own subtree. Nothing is written until all of
    /// them pass.
    pub async fn move_to(&self, id: i64, destination_id: Option<i64>) -> Result<DirectoryNode> {
        if destination_id == Some(id) {
            return Err(HoardError::SelfMove);
        }

        let node = self.directories().require(id).await?;
        self.directories()
            .check_parent(node.storage_id, destination_id)
            .await?;
        if node.parent_id == destination_id {
            return Err(HoardError::SameDestination);
        }

        self.ensure_free(node.storage_id, destination_id, &node.name)
            .await?;

        if let Some(destination_id) = destination_id {
            if self.directories().is_within(destination_id, id).await? {
                return Err(HoardError::MoveIntoDescendant);
            }
        }

        let old_path = self.directories().get_path(id).await?;
        self.directories().set_parent(id, destination_id).await?;
        let new_path = self.directories().get_path(id).await?;
        self.relocate_physical(&old_path, &new_path).await?;

        info!(
            directory_id = id,
            destination_id = ?destination_id,
            "Directory moved"
        );
        self.directories().require(id).await
    }

    /// Deep-copy a directory under another directory (or the storage root).
    ///
    /// Every descendant directory gets a new node and every descendant file a
    /// new record sharing the original bytes. The subtree is read before
    /// anything is written, so copying into a descendant terminates.
    pub async fn copy(&self, id: i64, destination_id: Option<i64>) -> Result<DirectoryNode> {
        let node = self.directories().require(id).await?;
        self.directories()
            .check_parent(node.storage_id, destination_id)
            .await?;
        self.ensure_free(node.storage_id, destination_id, &node.name)
            .await?;

        let subtree = self.directories().subtree(id).await?;
        let files = self.records().list_in_subtree(id).await?;
        let base = self.location_of(node.storage_id, destination_id).await?;

        // old id -> (new id, new physical path)
        let mut copies: HashMap<i64, (i64, String)> = HashMap::with_capacity(subtree.len());

        for source in &subtree {
            let (parent_id, parent_path) = if source.id == id {
                (destination_id, base.clone())
            } else {
                let parent = source
                    .parent_id
                    .and_then(|parent_id| copies.get(&parent_id))
                    .ok_or_else(|| HoardError::NotFound(format!("parent of directory {}", source.id)))?;
                (Some(parent.0), parent.1.clone())
            };

            let created = self
                .directories()
                .create(&NewDirectory::new(&source.name, source.storage_id).with_parent(parent_id))
                .await?;
            let path = format!("{parent_path}/{}", source.name);
            self.storage.mkdir(&path).await?;
            copies.insert(source.id, (created.id, path));
        }

        for file in &files {
            let parent_id = file
                .parent_id
                .and_then(|parent_id| copies.get(&parent_id))
                .map(|(new_id, _)| *new_id);
            let new_file = NewFileRecord::new(
                &file.name,
                file.storage_id,
                file.size,
                &file.physical_file_id,
            )
            .with_parent(parent_id);
            self.records().create(&new_file).await?;
        }

        let root_id = copies
            .get(&id)
            .map(|(new_id, _)| *new_id)
            .ok_or_else(|| HoardError::NotFound(format!("directory {id}")))?;

        info!(
            directory_id = id,
            copy_id = root_id,
            directories = subtree.len(),
            files = files.len(),
            "Directory copied"
        );
        self.directories().require(root_id).await
    }

    /// Delete a directory.
    ///
    /// A non-empty directory is only deleted when `force` is set. Its files
    /// are then released one by one so that shared bytes survive.
    pub async fn delete(&self, id: i64, force: bool) -> Result<()> {
        self.directories().require(id).await?;

        let contents = self.directories().contents(id).await?;
        if !contents.is_empty() && !force {
            return Err(HoardError::DirectoryNotEmpty(id));
        }

        let path = self.directories().get_path(id).await?;

        if force {
            let files = FileService::new(self.db, self.storage);
            for file in self.records().list_in_subtree(id).await? {
                files.delete(file.id).await?;
            }
        }

        self.directories().delete(id).await?;

        match self.storage.rm(&path, true).await {
            Ok(()) => {}
            Err(PhysicalError::NotFound(_)) => {
                warn!(directory_id = id, "Physical directory was already missing");
            }
            Err(e) => return Err(e.into()),
        }

        info!(directory_id = id, force = force, "Directory deleted");
        Ok(())
    }

    /// Counts, size and display path of a directory.
    ///
    /// The totals only look one level below the direct children.
    pub async fn get_full_info(&self, id: i64) -> Result<DirectoryInfo> {
        let node = self.directories().require(id).await?;
        let contents = self.directories().contents(id).await?;

        let mut total_files = contents.file_ids.len();
        let mut total_directories = contents.subdirectory_ids.len();
        for &child_id in &contents.subdirectory_ids {
            let child = self.directories().contents(child_id).await?;
            total_files += child.file_ids.len();
            total_directories += child.subdirectory_ids.len();
        }

        let size = self.directories().get_size(id).await?;
        let full_path = self.directories().get_path(id).await?;
        let path = full_path
            .strip_prefix(&storage_location(node.storage_id))
            .unwrap_or(&full_path)
            .to_string();

        Ok(DirectoryInfo {
            id: node.id,
            name: node.name,
            created_at: node.created_at,
            file_count: contents.file_ids.len(),
            directory_count: contents.subdirectory_ids.len(),
            total_files,
            total_directories,
            size,
            path,
        })
    }

    /// List the directories and files directly inside a directory.
    pub async fn list_contents(&self, id: i64) -> Result<DirectoryListing> {
        let node = self.directories().require(id).await?;
        self.list(node.storage_id, Some(id)).await
    }

    /// List the directories and files at the root of a storage.
    pub async fn list_root(&self, storage_id: i64) -> Result<DirectoryListing> {
        StorageRepository::new(self.db.pool())
            .require(storage_id)
            .await?;
        self.list(storage_id, None).await
    }

    async fn list(&self, storage_id: i64, parent_id: Option<i64>) -> Result<DirectoryListing> {
        let directories = self
            .directories()
            .list_children(storage_id, parent_id)
            .await?;
        let files = self.records().list_in(storage_id, parent_id).await?;

        debug!(
            storage_id = storage_id,
            parent_id = ?parent_id,
            directories = directories.len(),
            files = files.len(),
            "Listed directory"
        );
        Ok(DirectoryListing { directories, files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        db: Database,
        storage: PhysicalStorage,
        storage_id: i64,
    }

    impl Fixture {
        fn service(&self) -> DirectoryService<'_> {
            DirectoryService::new(&self.db, &self.storage)
        }

        fn files(&self) -> FileService<'_> {
            FileService::new(&self.db, &self.storage)
        }

        async fn mkdir(&self, name: &str, parent_id: Option<i64>) -> DirectoryNode {
            self.service()
                .create(name, self.storage_id, parent_id)
                .await
                .unwrap()
        }

        async fn upload(&self, name: &str, content: &[u8], parent_id: Option<i64>) -> FileRecord {
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

        fn physical(&self, path: &str) -> String {
            format!("/{}{path}", self.storage_id)
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
    async fn test_create_mirrors_physical_directory() {
        let f = setup().await;

        let docs = f.mkdir("docs", None).await;
        let drafts = f.mkdir("drafts", Some(docs.id)).await;

        assert_eq!(drafts.parent_id, Some(docs.id));
        assert!(f.storage.exists(&f.physical("/docs/drafts")).await);
        assert_eq!(
            f.service().get_path(drafts.id).await.unwrap(),
            f.physical("/docs/drafts")
        );
    }

    #[tokio::test]
    async fn test_create_validation_and_collision() {
        let f = setup().await;
        let docs = f.mkdir("docs", None).await;

        let bad = f.service().create("..", f.storage_id, None).await;
        assert!(matches!(bad, Err(HoardError::Validation(_))));

        let dup = f.service().create("docs", f.storage_id, None).await;
        assert!(matches!(
            dup,
            Err(HoardError::Collision { conflicting_id, .. }) if conflicting_id == docs.id
        ));

        let missing_parent = f.service().create("x", f.storage_id, Some(999)).await;
        assert!(matches!(missing_parent, Err(HoardError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_compensates_failed_mkdir() {
        let f = setup().await;
        f.storage.mkdir(&f.physical("/stray")).await.unwrap();

        let result = f.service().create("stray", f.storage_id, None).await;

        assert!(matches!(
            result,
            Err(HoardError::Physical(PhysicalError::AlreadyExists(_)))
        ));
        assert!(f.service().list_root(f.storage_id).await.unwrap().directories.is_empty());
    }

    #[tokio::test]
    async fn test_rename_updates_path() {
        let f = setup().await;
        let docs = f.mkdir("docs", None).await;
        let inner = f.mkdir("inner", Some(docs.id)).await;

        let renamed = f.service().rename(docs.id, "papers").await.unwrap();

        assert_eq!(renamed.name, "papers");
        assert_eq!(
            f.service().get_path(inner.id).await.unwrap(),
            f.physical("/papers/inner")
        );
        assert!(f.storage.exists(&f.physical("/papers/inner")).await);
        assert!(!f.storage.exists(&f.physical("/docs")).await);

        let unchanged = f.service().rename(docs.id, "papers").await.unwrap();
        assert_eq!(unchanged, renamed);
    }

    #[tokio::test]
    async fn test_move_updates_path() {
        let f = setup().await;
        let a = f.mkdir("a", None).await;
        let b = f.mkdir("b", None).await;
        let child = f.mkdir("child", Some(a.id)).await;

        let moved = f.service().move_to(child.id, Some(b.id)).await.unwrap();

        assert_eq!(moved.parent_id, Some(b.id));
        assert_eq!(
            f.service().get_path(child.id).await.unwrap(),
            f.physical("/b/child")
        );
        assert!(f.storage.exists(&f.physical("/b/child")).await);
        assert!(!f.storage.exists(&f.physical("/a/child")).await);

        let to_root = f.service().move_to(child.id, None).await.unwrap();
        assert!(to_root.parent_id.is_none());
    }

    #[tokio::test]
    async fn test_move_structural_errors() {
        let f = setup().await;
        let a = f.mkdir("a", None).await;
        let b = f.mkdir("b", Some(a.id)).await;
        let c = f.mkdir("c", Some(b.id)).await;

        assert!(matches!(
            f.service().move_to(a.id, Some(a.id)).await,
            Err(HoardError::SelfMove)
        ));
        assert!(matches!(
            f.service().move_to(a.id, Some(c.id)).await,
            Err(HoardError::MoveIntoDescendant)
        ));
        assert!(matches!(
            f.service().move_to(c.id, Some(b.id)).await,
            Err(HoardError::SameDestination)
        ));
        assert!(matches!(
            f.service().move_to(a.id, None).await,
            Err(HoardError::SameDestination)
        ));
        assert_eq!(
            f.service().get_path(c.id).await.unwrap(),
            f.physical("/a/b/c")
        );
    }

    #[tokio::test]
    async fn test_move_collision() {
        let f = setup().await;
        let a = f.mkdir("a", None).await;
        let target = f.mkdir("target", None).await;
        let existing = f.mkdir("a", Some(target.id)).await;

        let result = f.service().move_to(a.id, Some(target.id)).await;
        assert!(matches!(
            result,
            Err(HoardError::Collision { conflicting_id, .. }) if conflicting_id == existing.id
        ));
    }

    #[tokio::test]
    async fn test_move_across_storages_rejected() {
        let f = setup().await;
        let other = StorageRepository::new(f.db.pool())
            .create("other", 1)
            .await
            .unwrap();
        let a = f.mkdir("a", None).await;
        let foreign = f.service().create("x", other.id, None).await.unwrap();

        let result = f.service().move_to(a.id, Some(foreign.id)).await;
        assert!(matches!(result, Err(HoardError::CrossStorage)));
    }

    #[tokio::test]
    async fn test_copy_is_deep() {
        let f = setup().await;
        let src = f.mkdir("src", None).await;
        let inner = f.mkdir("inner", Some(src.id)).await;
        let top_file = f.upload("top.txt", b"top", Some(src.id)).await;
        let deep_file = f.upload("deep.txt", b"deep", Some(inner.id)).await;
        let dest = f.mkdir("dest", None).await;

        let copy = f.service().copy(src.id, Some(dest.id)).await.unwrap();

        assert_ne!(copy.id, src.id);
        assert_eq!(copy.name, "src");
        assert!(f.storage.exists(&f.physical("/dest/src/inner")).await);

        let listing = f.service().list_contents(copy.id).await.unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].physical_file_id, top_file.physical_file_id);
        assert_ne!(listing.files[0].id, top_file.id);
        assert_eq!(listing.directories.len(), 1);
        assert_ne!(listing.directories[0].id, inner.id);

        let inner_copy = f
            .service()
            .list_contents(listing.directories[0].id)
            .await
            .unwrap();
        assert_eq!(inner_copy.files[0].physical_file_id, deep_file.physical_file_id);

        assert_eq!(f.service().get_size(copy.id).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_copy_into_own_descendant_terminates() {
        let f = setup().await;
        let a = f.mkdir("a", None).await;
        let b = f.mkdir("b", Some(a.id)).await;

        let copy = f.service().copy(a.id, Some(b.id)).await.unwrap();

        assert_eq!(
            f.service().get_path(copy.id).await.unwrap(),
            f.physical("/a/b/a")
        );
        let listing = f.service().list_contents(copy.id).await.unwrap();
        assert_eq!(listing.directories.len(), 1);
        assert!(f
            .service()
            .list_contents(listing.directories[0].id)
            .await
            .unwrap()
            .directories
            .is_empty());
    }

    #[tokio::test]
    async fn test_copy_into_same_parent_collides() {
        let f = setup().await;
        let a = f.mkdir("a", None).await;

        let result = f.service().copy(a.id, None).await;
        assert!(matches!(
            result,
            Err(HoardError::Collision { conflicting_id, .. }) if conflicting_id == a.id
        ));
    }

    #[tokio::test]
    async fn test_delete_non_empty_without_force() {
        let f = setup().await;
        let a = f.mkdir("a", None).await;
        let file = f.upload("f.txt", b"x", Some(a.id)).await;

        let result = f.service().delete(a.id, false).await;

        assert!(matches!(result, Err(HoardError::DirectoryNotEmpty(id)) if id == a.id));
        assert!(f.service().get(a.id).await.is_ok());
        assert!(f.files().get(file.id).await.is_ok());
        assert!(f.storage.exists(&f.physical("/a")).await);
    }

    #[tokio::test]
    async fn test_force_delete_releases_files() {
        let f = setup().await;
        let a = f.mkdir("a", None).await;
        let inner = f.mkdir("inner", Some(a.id)).await;
        let only_here = f.upload("one.txt", b"1", Some(inner.id)).await;
        let shared = f.upload("two.txt", b"2", Some(a.id)).await;
        let outside = f.files().copy(shared.id, None).await.unwrap();

        f.service().delete(a.id, true).await.unwrap();

        assert!(matches!(f.service().get(inner.id).await, Err(HoardError::NotFound(_))));
        assert!(!f.storage.exists(&f.physical("/a")).await);
        assert!(!f.storage.exists(&only_here.blob_location()).await);
        assert!(f.storage.exists(&outside.blob_location()).await);
    }

    #[tokio::test]
    async fn test_delete_empty_directory() {
        let f = setup().await;
        let a = f.mkdir("a", None).await;

        f.service().delete(a.id, false).await.unwrap();
        assert!(!f.storage.exists(&f.physical("/a")).await);
    }

    #[tokio::test]
    async fn test_full_info_counts_one_extra_level() {
        let f = setup().await;
        let top = f.mkdir("top", None).await;
        let mid = f.mkdir("mid", Some(top.id)).await;
        let low = f.mkdir("low", Some(mid.id)).await;
        f.mkdir("deepest", Some(low.id)).await;
        f.upload("a", b"aa", Some(top.id)).await;
        f.upload("b", b"bbb", Some(mid.id)).await;
        f.upload("c", b"c", Some(low.id)).await;

        let info = f.service().get_full_info(top.id).await.unwrap();

        assert_eq!(info.name, "top");
        assert_eq!(info.file_count, 1);
        assert_eq!(info.directory_count, 1);
        assert_eq!(info.total_files, 2);
        assert_eq!(info.total_directories, 2);
        assert_eq!(info.size, 6);
        assert_eq!(info.path, "/top");

        let low_info = f.service().get_full_info(low.id).await.unwrap();
        assert_eq!(low_info.path, "/top/mid/low");
    }

    #[tokio::test]
    async fn test_list_root() {
        let f = setup().await;
        f.mkdir("b", None).await;
        f.mkdir("a", None).await;
        f.upload("file.txt", b"x", None).await;

        let listing = f.service().list_root(f.storage_id).await.unwrap();
        let names: Vec<_> = listing.directories.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(listing.files.len(), 1);

        assert!(matches!(
            f.service().list_root(999).await,
            Err(HoardError::NotFound(_))
        ));
    }
}
