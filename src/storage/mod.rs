//! User storages.
//!
//! A storage is the root of one directory and file tree. Its bytes live
//! under `/{storage_id}` in the physical storage gateway.

mod repository;
mod service;

pub use repository::{StorageRepository, UserStorage};
pub use service::StorageService;
