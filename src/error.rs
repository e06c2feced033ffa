//! Error types for hoard.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by the physical storage gateway.
#[derive(Error, Debug)]
pub enum PhysicalError {
    /// Nothing exists at the path.
    #[error("physical path not found: {0}")]
    NotFound(PathBuf),

    /// Something already exists at the path.
    #[error("physical path already exists: {0}")]
    AlreadyExists(PathBuf),

    /// The logical path escapes the storage base directory.
    #[error("path is outside the storage base: {0}")]
    OutsideBase(PathBuf),

    /// The resolved path exceeds the supported length.
    #[error("path is too long: {0}")]
    PathTooLong(PathBuf),

    /// The stream was longer than the allowed number of bytes.
    #[error("stream for {path} exceeds {limit} bytes")]
    TooLarge {
        /// Logical destination of the write.
        path: PathBuf,
        /// Maximum number of bytes accepted.
        limit: u64,
    },

    /// Any other I/O failure.
    #[error("physical I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-item failure collected by batch operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    /// ID of the file or directory.
    pub id: i64,
    /// Whether the item is a file or a directory.
    pub kind: crate::file::EntityKind,
    /// Human-readable reason.
    pub reason: String,
}

/// Common error type for hoard.
#[derive(Error, Debug)]
pub enum HoardError {
    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error outside the physical storage gateway.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Physical storage gateway failure.
    #[error(transparent)]
    Physical(#[from] PhysicalError),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A sibling with the same name already exists at the destination.
    #[error("'{name}' already exists at the destination (id {conflicting_id})")]
    Collision {
        /// The colliding name.
        name: String,
        /// ID of the entity already holding the name.
        conflicting_id: i64,
    },

    /// The store rejected a write because of a uniqueness constraint.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A directory was asked to move into itself.
    #[error("cannot move a directory into itself")]
    SelfMove,

    /// A directory was asked to move into one of its own descendants.
    #[error("cannot move a directory into its own subtree")]
    MoveIntoDescendant,

    /// A file was asked to move to the directory it is already in.
    #[error("file is already in the destination directory")]
    SameDestination,

    /// Source and destination belong to different storages.
    #[error("source and destination belong to different storages")]
    CrossStorage,

    /// The directory has children and `force` was not set.
    #[error("directory {0} is not empty")]
    DirectoryNotEmpty(i64),

    /// The storage has content and `force` was not set.
    #[error("storage {0} is not empty")]
    StorageNotEmpty(i64),

    /// A batch failed validation; nothing was mutated.
    #[error("batch rejected: {} item(s) failed validation", .0.len())]
    BatchRejected(Vec<ItemError>),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for HoardError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                HoardError::AlreadyExists(db.message().to_string())
            }
            _ => HoardError::Database(e.to_string()),
        }
    }
}

/// Result type alias for hoard operations.
pub type Result<T> = std::result::Result<T, HoardError>;
