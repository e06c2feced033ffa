//! Share links for files.
//!
//! Each file can have one link. A public link opens for anyone holding its
//! token; a private one only for its owner and the listed friends.

mod repository;
mod service;

pub use repository::{FileLink, FileLinkRepository, FriendList, LinkOptions};
pub use service::{generate_token, LinkService, ResolvedLink, TOKEN_LENGTH};
