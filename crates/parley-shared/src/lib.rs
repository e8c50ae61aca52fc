//! # parley-shared
//!
//! Types shared by every Parley crate: the profile/message data model, the
//! realtime change-feed payload format, the error taxonomy, and the
//! collaborator traits the client is wired against.

pub mod backend;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use backend::{
    AuthProvider, Backend, ChannelStatus, FeedEvent, MessageStore, NotificationPermission,
    Notifier, ObjectStorage, ProfileStore, RealtimeFeed, Subscription, SubscriptionId,
};
pub use error::{BackendError, ChatError, ProtocolError};
pub use protocol::ChangeEvent;
pub use types::*;
