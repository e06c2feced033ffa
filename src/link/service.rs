//! Share link service.

use rand::Rng;
use tracing::{debug, info};

use crate::db::Database;
use crate::file::{FileRecord, FileRecordRepository};
use crate::{HoardError, Result};

use super::repository::{FileLink, FileLinkRepository, LinkOptions};

/// Length of generated link tokens.
pub const TOKEN_LENGTH: usize = 32;

const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random alphanumeric link token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..TOKEN_CHARS.len());
            TOKEN_CHARS[idx] as char
        })
        .collect()
}

/// A link together with the file it shares.
#[derive(Debug, Clone)]
pub struct ResolvedLink {
    pub link: FileLink,
    pub file: FileRecord,
}

/// Service for sharing files through links.
pub struct LinkService<'a> {
    db: &'a Database,
}

impl<'a> LinkService<'a> {
    /// Create a new LinkService.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn links(&self) -> FileLinkRepository<'_> {
        FileLinkRepository::new(self.db.pool())
    }

    /// Create the link for a file.
    ///
    /// A file has at most one link; if it already has one, that link is
    /// returned unchanged.
    pub async fn generate(
        &self,
        file_id: i64,
        owner_id: i64,
        options: &LinkOptions,
    ) -> Result<FileLink> {
        FileRecordRepository::new(self.db.pool())
            .require(file_id)
            .await?;

        if let Some(existing) = self.links().get_by_file(file_id).await? {
            debug!(file_id = file_id, link_id = existing.id, "Link already exists");
            return Ok(existing);
        }

        match self
            .links()
            .create(&generate_token(), owner_id, file_id, options)
            .await
        {
            Ok(link) => {
                info!(file_id = file_id, link_id = link.id, "Link created");
                Ok(link)
            }
            // Another request linked the file first.
            Err(HoardError::AlreadyExists(_)) => self
                .links()
                .get_by_file(file_id)
                .await?
                .ok_or_else(|| HoardError::NotFound(format!("link for file {file_id}"))),
            Err(e) => Err(e),
        }
    }

    /// Change a link's visibility, friends, name and description.
    pub async fn update(&self, link_id: i64, options: &LinkOptions) -> Result<FileLink> {
        let link = self
            .links()
            .update(link_id, options)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("link {link_id}")))?;

        info!(link_id = link_id, is_public = link.is_public, "Link updated");
        Ok(link)
    }

    /// Remove the link of a file. Returns false if there was none.
    pub async fn revoke(&self, file_id: i64) -> Result<bool> {
        let removed = self.links().delete_by_file(file_id).await?;
        if removed {
            info!(file_id = file_id, "Link revoked");
        }
        Ok(removed)
    }

    /// Get the link of a file, if any.
    pub async fn get_for_file(&self, file_id: i64) -> Result<Option<FileLink>> {
        self.links().get_by_file(file_id).await
    }

    /// Open a link as `viewer` (None for anonymous callers).
    ///
    /// A link the viewer may not open is reported as not found.
    pub async fn resolve(&self, token: &str, viewer: Option<i64>) -> Result<ResolvedLink> {
        let link = self
            .links()
            .get_by_token(token)
            .await?
            .filter(|link| link.permits(viewer))
            .ok_or_else(|| HoardError::NotFound("link".to_string()))?;

        let file = FileRecordRepository::new(self.db.pool())
            .require(link.file_id)
            .await?;

        Ok(ResolvedLink { link, file })
    }

    /// Count a download through a link and return the new total.
    pub async fn record_download(&self, link_id: i64) -> Result<i64> {
        self.links().increment_downloads(link_id).await
    }
}
