//! # parley-store
//!
//! Local backend for the Parley client, backed by SQLite.
//!
//! The crate implements every collaborator trait from `parley-shared` without
//! a hosted platform: profile and message rows live in a `rusqlite` database,
//! attachments in a directory-per-bucket object store with signed URLs,
//! change events fan out through an in-process broadcast feed, and sessions
//! are issued by [`LocalAuth`].

pub mod auth;
pub mod backend;
pub mod database;
pub mod feed;
pub mod messages;
pub mod migrations;
pub mod objects;
pub mod profiles;
pub mod sessions;

mod error;

pub use auth::LocalAuth;
pub use backend::{BackendConfig, LocalBackend};
pub use database::Database;
pub use error::StoreError;
pub use feed::Feed;
pub use objects::ObjectStore;
