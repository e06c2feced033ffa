//! Share link types and repository.

use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::{HoardError, Result};

const LINK_COLUMNS: &str =
    "id, link, owner_id, file_id, friends, is_public, created_at, download_count, name, description";

/// User IDs allowed to open a private link, stored as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendList(pub Vec<i64>);

impl FriendList {
    /// True if the user is on the list.
    pub fn contains(&self, user_id: i64) -> bool {
        self.0.contains(&user_id)
    }

    fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }
}

impl TryFrom<String> for FriendList {
    type Error = serde_json::Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        serde_json::from_str(&value).map(FriendList)
    }
}

/// A share link bound to one file.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FileLink {
    /// Unique link ID.
    pub id: i64,
    /// Public token used in URLs.
    pub link: String,
    /// User who created the link.
    pub owner_id: i64,
    /// The shared file.
    pub file_id: i64,
    /// Users allowed when the link is private.
    #[sqlx(try_from = "String")]
    pub friends: FriendList,
    /// Whether anyone holding the token may open the link.
    pub is_public: bool,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
    /// Number of downloads through the link.
    pub download_count: i64,
    /// Optional display name.
    pub name: Option<String>,
    /// Optional description.
    pub description: Option<String>,
}

impl FileLink {
    /// Whether a viewer (or an anonymous caller) may open this link.
    pub fn permits(&self, viewer: Option<i64>) -> bool {
        if self.is_public {
            return true;
        }
        match viewer {
            Some(user_id) => user_id == self.owner_id || self.friends.contains(user_id),
            None => false,
        }
    }
}

/// Settings applied when creating or updating a link.
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    /// Whether anyone holding the token may open the link.
    pub is_public: bool,
    /// Users allowed when the link is private.
    pub friends: Vec<i64>,
    /// Optional display name.
    pub name: Option<String>,
    /// Optional description.
    pub description: Option<String>,
}

impl LinkOptions {
    /// Options for a public link.
    pub fn public() -> Self {
        Self {
            is_public: true,
            ..Self::default()
        }
    }

    /// Options for a private link shared with the given users.
    pub fn private_with(friends: impl IntoIterator<Item = i64>) -> Self {
        Self {
            is_public: false,
            friends: friends.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Repository for share links.
pub struct FileLinkRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileLinkRepository<'a> {
    /// Create a new FileLinkRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a link. A second link for the same file is rejected by the store.
    pub async fn create(
        &self,
        token: &str,
        owner_id: i64,
        file_id: i64,
        options: &LinkOptions,
    ) -> Result<FileLink> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO file_links (link, owner_id, file_id, friends, is_public, created_at, name, description)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(token)
        .bind(owner_id)
        .bind(file_id)
        .bind(FriendList(options.friends.clone()).to_json())
        .bind(options.is_public)
        .bind(Utc::now())
        .bind(&options.name)
        .bind(&options.description)
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("link {id}")))
    }

    /// Get a link by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<FileLink>> {
        let link = sqlx::query_as::<_, FileLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM file_links WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(link)
    }

    /// Get a link by its token.
    pub async fn get_by_token(&self, token: &str) -> Result<Option<FileLink>> {
        let link = sqlx::query_as::<_, FileLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM file_links WHERE link = ?"
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(link)
    }

    /// Get the link bound to a file.
    pub async fn get_by_file(&self, file_id: i64) -> Result<Option<FileLink>> {
        let link = sqlx::query_as::<_, FileLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM file_links WHERE file_id = ?"
        ))
        .bind(file_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(link)
    }

    /// Replace a link's settings.
    pub async fn update(&self, id: i64, options: &LinkOptions) -> Result<Option<FileLink>> {
        let result = sqlx::query(
            "UPDATE file_links SET is_public = ?, friends = ?, name = ?, description = ? WHERE id = ?",
        )
        .bind(options.is_public)
        .bind(FriendList(options.friends.clone()).to_json())
        .bind(&options.name)
        .bind(&options.description)
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    /// Increment the download counter and return the new value.
    pub async fn increment_downloads(&self, id: i64) -> Result<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE file_links SET download_count = download_count + 1 WHERE id = ?
             RETURNING download_count",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        count.ok_or_else(|| HoardError::NotFound(format!("link {id}")))
    }

    /// Delete the link bound to a file.
    pub async fn delete_by_file(&self, file_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM file_links WHERE file_id = ?")
            .bind(file_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
