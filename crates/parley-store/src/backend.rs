//! [`LocalBackend`] wires the database, object store, feed and auth together
//! and implements the collaborator traits on top of them.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parley_shared::constants::{DEFAULT_STORAGE_BUCKET, MAX_UPLOAD_SIZE};
use parley_shared::{
    AuthProvider, BackendError, ChangeEvent, ConversationKey, Message, MessageId, MessageStatus,
    MessageStore, NewMessage, ObjectStorage, Profile, ProfileId, ProfileStore, RealtimeFeed,
    Session, Subscription, SubscriptionId,
};
use rand::RngCore;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::auth::LocalAuth;
use crate::database::Database;
use crate::error::Result;
use crate::feed::Feed;
use crate::objects::ObjectStore;

/// Where and how the local backend keeps its data.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Directory holding `parley.db` and the `storage/` tree.
    pub data_dir: PathBuf,
    /// Object storage bucket for attachments.
    pub bucket: String,
    /// Largest accepted object, in bytes.
    pub max_object_size: usize,
    /// Key for signing attachment URLs.  Random per process when `None`.
    pub signing_key: Option<[u8; 32]>,
}

impl BackendConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            bucket: DEFAULT_STORAGE_BUCKET.to_string(),
            max_object_size: MAX_UPLOAD_SIZE,
            signing_key: None,
        }
    }
}

#[derive(Clone)]
pub struct LocalBackend {
    db: Arc<Mutex<Database>>,
    objects: ObjectStore,
    feed: Feed,
    auth: LocalAuth,
}

impl LocalBackend {
    pub async fn open(config: BackendConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let db = Database::open_at(&config.data_dir.join("parley.db"))?;
        let db = Arc::new(Mutex::new(db));

        let signing_key = config.signing_key.unwrap_or_else(|| {
            let mut key = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            key
        });
        let objects = ObjectStore::new(
            &config.data_dir.join("storage"),
            &config.bucket,
            config.max_object_size,
            signing_key,
        )
        .await?;

        info!(dir = %config.data_dir.display(), bucket = %config.bucket, "Local backend ready");

        Ok(Self {
            auth: LocalAuth::new(db.clone()),
            db,
            objects,
            feed: Feed::new(),
        })
    }

    pub fn auth(&self) -> &LocalAuth {
        &self.auth
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }
}

#[async_trait]
impl AuthProvider for LocalBackend {
    async fn current_session(&self) -> std::result::Result<Option<Session>, BackendError> {
        Ok(self.auth.current())
    }

    async fn sign_out(&self) -> std::result::Result<(), BackendError> {
        self.auth.sign_out().await
    }

    fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.auth.watch()
    }
}

#[async_trait]
impl ProfileStore for LocalBackend {
    async fn list_profiles(&self) -> std::result::Result<Vec<Profile>, BackendError> {
        Ok(self.db.lock().await.list_profiles()?)
    }

    async fn get_profile(&self, id: &ProfileId) -> std::result::Result<Profile, BackendError> {
        Ok(self.db.lock().await.get_profile(id)?)
    }

    async fn update_username(
        &self,
        id: &ProfileId,
        username: &str,
    ) -> std::result::Result<Profile, BackendError> {
        Ok(self.db.lock().await.update_username(id, username)?)
    }
}

#[async_trait]
impl MessageStore for LocalBackend {
    async fn fetch_conversation(
        &self,
        key: &ConversationKey,
    ) -> std::result::Result<Vec<Message>, BackendError> {
        Ok(self.db.lock().await.messages_between(key)?)
    }

    async fn fetch_message(&self, id: MessageId) -> std::result::Result<Message, BackendError> {
        Ok(self.db.lock().await.get_message(id)?)
    }

    async fn insert_message(
        &self,
        message: NewMessage,
    ) -> std::result::Result<Message, BackendError> {
        let stored = self.db.lock().await.insert_message(&message, Utc::now())?;

        let key = ConversationKey::new(stored.sender_id.clone(), stored.recipient_id.clone());
        self.feed.publish(&key, ChangeEvent::insert_json(&stored));

        debug!(msg_id = %stored.id, topic = %key, "Message inserted");
        Ok(stored)
    }

    async fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
    ) -> std::result::Result<Message, BackendError> {
        let updated = self.db.lock().await.update_message_status(id, status)?;

        let key = ConversationKey::new(updated.sender_id.clone(), updated.recipient_id.clone());
        self.feed.publish(&key, ChangeEvent::update_json(&updated));

        debug!(msg_id = %id, status = %status, "Message status updated");
        Ok(updated)
    }
}

#[async_trait]
impl RealtimeFeed for LocalBackend {
    async fn subscribe(
        &self,
        key: &ConversationKey,
    ) -> std::result::Result<Subscription, BackendError> {
        Ok(self.feed.subscribe(key).await)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> std::result::Result<(), BackendError> {
        if !self.feed.unsubscribe(id) {
            debug!(sub = %id, "Unsubscribe for unknown subscription");
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for LocalBackend {
    async fn upload(&self, path: &str, data: &[u8]) -> std::result::Result<(), BackendError> {
        Ok(self.objects.put(path, data).await?)
    }

    async fn create_signed_url(
        &self,
        path: &str,
        ttl_secs: u64,
    ) -> std::result::Result<String, BackendError> {
        Ok(self.objects.sign_url(path, ttl_secs).await?)
    }
}
