//! Shared fixtures for the client tests: a seeded local backend and
//! collaborator fakes for failure injection.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use parley_shared::{
    BackendError, ConversationKey, Message, MessageId, MessageStatus, MessageStore, NewMessage,
    NotificationPermission, Notifier, ObjectStorage, Profile, ProfileId, ProfileStore,
    RealtimeFeed, Subscription, SubscriptionId,
};
use parley_store::{BackendConfig, LocalBackend};
use tempfile::TempDir;

use crate::config::ClientConfig;
use crate::context::ChatContext;

pub struct TestEnv {
    pub backend: Arc<LocalBackend>,
    pub ctx: ChatContext,
    pub alice: Profile,
    pub bob: Profile,
    pub carol: Profile,
    _dir: TempDir,
}

impl TestEnv {
    /// A fresh backend with alice, bob and carol signed up and alice signed in.
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(
            LocalBackend::open(BackendConfig::new(dir.path()))
                .await
                .unwrap(),
        );

        let mut profiles = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let session = backend.auth().sign_up(name).await.unwrap();
            profiles.push(backend.get_profile(&session.user_id).await.unwrap());
        }
        let carol = profiles.pop().unwrap();
        let bob = profiles.pop().unwrap();
        let alice = profiles.pop().unwrap();
        backend.auth().sign_in(&alice.id).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::new(NotificationPermission::Denied, true));
        let ctx = ChatContext::from_backend(backend.clone(), notifier, ClientConfig::default());

        Self {
            backend,
            ctx,
            alice,
            bob,
            carol,
            _dir: dir,
        }
    }

    /// Insert a message directly through the backend.
    pub async fn send(&self, from: &Profile, to: &Profile, body: &str) -> Message {
        self.backend
            .insert_message(NewMessage {
                sender_id: from.id.clone(),
                recipient_id: to.id.clone(),
                content: Some(body.to_string()),
                attachment: None,
            })
            .await
            .unwrap()
    }
}

static NEXT_ID: AtomicI64 = AtomicI64::new(10_000);

/// A feed-shaped message with no joined sender.
pub fn message_from(sender: &str, recipient: &str, content: Option<&str>) -> Message {
    Message {
        id: MessageId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
        created_at: Utc::now(),
        sender_id: sender.into(),
        recipient_id: recipient.into(),
        content: content.map(str::to_string),
        attachment: None,
        status: MessageStatus::Sent,
        sender: None,
    }
}

pub struct RecordingNotifier {
    permission: Mutex<NotificationPermission>,
    focused: AtomicBool,
    shown: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn new(permission: NotificationPermission, focused: bool) -> Self {
        Self {
            permission: Mutex::new(permission),
            focused: AtomicBool::new(focused),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn shown(&self) -> Vec<(String, String, String)> {
        self.shown.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock().unwrap()
    }

    fn request_permission(&self) -> NotificationPermission {
        let mut permission = self.permission.lock().unwrap();
        if *permission == NotificationPermission::Default {
            *permission = NotificationPermission::Granted;
        }
        *permission
    }

    fn is_focused(&self) -> bool {
        self.focused.load(Ordering::Relaxed)
    }

    fn notify(&self, title: &str, body: &str, tag: &str) {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string(), tag.to_string()));
    }
}

/// Counts writes and can fail fetches; everything else goes to the backend.
pub struct CountingMessages {
    inner: Arc<LocalBackend>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    fail_fetch: bool,
}

impl CountingMessages {
    pub fn new(inner: Arc<LocalBackend>) -> Self {
        Self {
            inner,
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            fail_fetch: false,
        }
    }

    pub fn failing_fetch(inner: Arc<LocalBackend>) -> Self {
        Self {
            fail_fetch: true,
            ..Self::new(inner)
        }
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageStore for CountingMessages {
    async fn fetch_conversation(&self, key: &ConversationKey) -> Result<Vec<Message>, BackendError> {
        if self.fail_fetch {
            return Err(BackendError::Storage("connection reset".into()));
        }
        self.inner.fetch_conversation(key).await
    }

    async fn fetch_message(&self, id: MessageId) -> Result<Message, BackendError> {
        self.inner.fetch_message(id).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, BackendError> {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        self.inner.insert_message(message).await
    }

    async fn update_status(&self, id: MessageId, status: MessageStatus) -> Result<Message, BackendError> {
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.inner.update_status(id, status).await
    }
}

pub struct FailingStorage;

#[async_trait]
impl ObjectStorage for FailingStorage {
    async fn upload(&self, _path: &str, _data: &[u8]) -> Result<(), BackendError> {
        Err(BackendError::Storage("Bucket not found".into()))
    }

    async fn create_signed_url(&self, _path: &str, _ttl_secs: u64) -> Result<String, BackendError> {
        Err(BackendError::Storage("Bucket not found".into()))
    }
}

pub struct FailingFeed;

#[async_trait]
impl RealtimeFeed for FailingFeed {
    async fn subscribe(&self, _key: &ConversationKey) -> Result<Subscription, BackendError> {
        Err(BackendError::Unauthorized("realtime disabled".into()))
    }

    async fn unsubscribe(&self, _id: SubscriptionId) -> Result<(), BackendError> {
        Ok(())
    }
}

pub struct FailingProfiles;

#[async_trait]
impl ProfileStore for FailingProfiles {
    async fn list_profiles(&self) -> Result<Vec<Profile>, BackendError> {
        Err(BackendError::Storage("profiles unavailable".into()))
    }

    async fn get_profile(&self, _id: &ProfileId) -> Result<Profile, BackendError> {
        Err(BackendError::NotFound)
    }

    async fn update_username(&self, _id: &ProfileId, _username: &str) -> Result<Profile, BackendError> {
        Err(BackendError::Rejected("permission denied".into()))
    }
}
