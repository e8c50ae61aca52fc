//! Collaborator traits.
//!
//! The client never talks to a concrete platform.  Every external capability
//! (identity, profile rows, message rows, realtime change-feed, object
//! storage, desktop notifications) sits behind one of these traits and is
//! handed to the client explicitly, so tests can substitute fakes.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};

use crate::error::BackendError;
use crate::types::{ConversationKey, Message, MessageId, MessageStatus, NewMessage, Profile, ProfileId, Session};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current session, if the user is signed in.
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Session-change notifications.  Dropping the receiver unsubscribes.
    fn watch_session(&self) -> watch::Receiver<Option<Session>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn list_profiles(&self) -> Result<Vec<Profile>, BackendError>;

    async fn get_profile(&self, id: &ProfileId) -> Result<Profile, BackendError>;

    /// Rename `id` and return the updated row.
    async fn update_username(&self, id: &ProfileId, username: &str) -> Result<Profile, BackendError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All messages between the two participants, oldest first, with the
    /// sender profile joined.
    async fn fetch_conversation(&self, key: &ConversationKey) -> Result<Vec<Message>, BackendError>;

    async fn fetch_message(&self, id: MessageId) -> Result<Message, BackendError>;

    /// Insert and return the stored row (server-assigned id and timestamp).
    async fn insert_message(&self, message: NewMessage) -> Result<Message, BackendError>;

    async fn update_status(&self, id: MessageId, status: MessageStatus) -> Result<Message, BackendError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, data: &[u8]) -> Result<(), BackendError>;

    async fn create_signed_url(&self, path: &str, ttl_secs: u64) -> Result<String, BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Channel status reported by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The server acknowledged the subscription.
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

/// Events pushed onto a subscription's channel.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Status(ChannelStatus),
    /// Raw change payload, decoded with [`crate::ChangeEvent::from_json`].
    Change(Value),
}

/// Handle for one open realtime subscription.
///
/// Events arrive on `events` in delivery order.  Dropping the handle closes
/// the receiver; [`RealtimeFeed::unsubscribe`] also tears down the server side.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub key: ConversationKey,
    pub events: mpsc::Receiver<FeedEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// `Empty` when nothing is queued, `Disconnected` once the feed side
    /// has dropped the channel.
    pub fn try_recv(&mut self) -> Result<FeedEvent, TryRecvError> {
        self.events.try_recv()
    }
}

#[async_trait]
pub trait RealtimeFeed: Send + Sync {
    /// Subscribe to insert/update events on messages of `key`'s pair.
    async fn subscribe(&self, key: &ConversationKey) -> Result<Subscription, BackendError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    /// Not asked yet.
    Default,
    Granted,
    Denied,
}

pub trait Notifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    fn request_permission(&self) -> NotificationPermission;

    /// Whether the application window currently has focus.
    fn is_focused(&self) -> bool;

    fn notify(&self, title: &str, body: &str, tag: &str);
}

/// A platform implementing every data collaborator.
pub trait Backend: AuthProvider + ProfileStore + MessageStore + RealtimeFeed + ObjectStorage {}

impl<T> Backend for T where T: AuthProvider + ProfileStore + MessageStore + RealtimeFeed + ObjectStorage {}
