//! Message log for one (self, peer) pair.
//!
//! The cache is append-ordered: history arrives oldest first, later
//! messages are appended in arrival order.  Sends are applied as soon as
//! the insert returns; the realtime echo of our own inserts is dropped, and
//! UPDATE events patch cached rows in place.
//!
//! Selecting a peer bumps a generation counter.  History responses carry
//! the generation they were requested under, so a slow response for an
//! earlier selection never lands in the current log.

use chrono::Utc;
use parley_shared::constants::UNKNOWN_USER;
use parley_shared::{
    Attachment, BackendError, ChangeEvent, ChannelStatus, ChatError, ConversationKey, FeedEvent,
    Message, MessageId, MessagePatch, MessageStatus, NewMessage, OutgoingFile, Profile, ProfileId,
    Subscription,
};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::context::ChatContext;
use crate::events::{emit_event, ChatEvent, EventSender};
use crate::notifications;
use crate::read_receipts::ReadReceipts;
use crate::subscription::SubscriptionState;

/// A pending history load for one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub generation: u64,
    pub key: ConversationKey,
}

impl HistoryRequest {
    pub async fn fetch(&self, ctx: &ChatContext) -> Result<Vec<Message>, BackendError> {
        ctx.messages.fetch_conversation(&self.key).await
    }
}

/// What a realtime change did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Appended(MessageId),
    Updated(MessageId),
    Ignored,
}

pub struct Conversation {
    ctx: ChatContext,
    me: Profile,
    peer: Option<Profile>,
    key: Option<ConversationKey>,
    generation: u64,
    messages: Vec<Message>,
    subscription: Option<Subscription>,
    state: SubscriptionState,
    receipts: ReadReceipts,
    error: Option<String>,
    is_sending: bool,
    events: Option<EventSender>,
}

impl Conversation {
    pub fn new(ctx: ChatContext, me: Profile) -> Self {
        let receipts = ReadReceipts::new(ctx.config.read_receipt_delay);
        Self {
            ctx,
            me,
            peer: None,
            key: None,
            generation: 0,
            messages: Vec::new(),
            subscription: None,
            state: SubscriptionState::Closed,
            receipts,
            error: None,
            is_sending: false,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn me(&self) -> &Profile {
        &self.me
    }

    /// Replace the local profile, e.g. after a rename.
    pub fn set_me(&mut self, me: Profile) {
        for msg in self.messages.iter_mut().filter(|m| m.is_from(&me.id)) {
            msg.sender = Some(me.clone());
        }
        self.me = me;
    }

    pub fn peer(&self) -> Option<&Profile> {
        self.peer.as_ref()
    }

    pub fn key(&self) -> Option<&ConversationKey> {
        self.key.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn subscription_state(&self) -> &SubscriptionState {
        &self.state
    }

    /// The inline error banner, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.set_banner(None);
    }

    pub fn is_sending(&self) -> bool {
        self.is_sending
    }

    // -- Selection --

    /// Select `peer`: load its history and open the realtime subscription.
    pub async fn select_peer(&mut self, peer: Profile) -> Result<(), ChatError> {
        let request = self.begin_select(peer).await;

        let ctx = self.ctx.clone();
        let (subscription, history) = futures::join!(
            ctx.feed.subscribe(&request.key),
            request.fetch(&ctx)
        );

        self.attach_subscription(&request, subscription).await;
        self.finish_load(&request, history)
    }

    /// Tear down the current conversation and start a new selection.  The
    /// caller completes it with [`Self::attach_subscription`] and
    /// [`Self::finish_load`].
    pub async fn begin_select(&mut self, peer: Profile) -> HistoryRequest {
        self.close().await;

        self.generation += 1;
        let key = ConversationKey::new(self.me.id.clone(), peer.id.clone());
        info!(topic = %key, generation = self.generation, "Selecting conversation");

        self.peer = Some(peer);
        self.key = Some(key.clone());
        self.messages.clear();
        self.set_banner(None);
        self.set_state(SubscriptionState::Subscribing);

        HistoryRequest {
            generation: self.generation,
            key,
        }
    }

    /// Install the subscription opened for `request`.
    pub async fn attach_subscription(
        &mut self,
        request: &HistoryRequest,
        result: Result<Subscription, BackendError>,
    ) {
        if request.generation != self.generation {
            if let Ok(stale) = result {
                debug!(sub = %stale.id, "Dropping subscription for a superseded selection");
                if let Err(e) = self.ctx.feed.unsubscribe(stale.id).await {
                    warn!(sub = %stale.id, error = %e, "Failed to unsubscribe");
                }
            }
            return;
        }

        match result {
            Ok(subscription) => {
                debug!(sub = %subscription.id, topic = %request.key, "Subscription attached");
                self.subscription = Some(subscription);
            }
            Err(e) => {
                let err = ChatError::Subscription(e.to_string());
                error!(topic = %request.key, error = %err, "Subscribe failed");
                self.set_state(SubscriptionState::Error(e.to_string()));
                self.set_banner(Some(err.to_string()));
            }
        }
    }

    /// Apply the history response for `request`.  Responses for a superseded
    /// selection are discarded.
    pub fn finish_load(
        &mut self,
        request: &HistoryRequest,
        result: Result<Vec<Message>, BackendError>,
    ) -> Result<(), ChatError> {
        if request.generation != self.generation {
            debug!(
                generation = request.generation,
                current = self.generation,
                "Discarding stale history response"
            );
            return Ok(());
        }

        match result {
            Ok(history) => {
                let mut log: Vec<Message> = history
                    .into_iter()
                    .filter(|m| request.key.includes(m))
                    .collect();
                // Keep realtime arrivals that raced ahead of the fetch.
                let early: Vec<Message> = self
                    .messages
                    .drain(..)
                    .filter(|m| !log.iter().any(|h| h.id == m.id))
                    .collect();
                log.extend(early);
                self.messages = log;

                info!(topic = %request.key, count = self.messages.len(), "History loaded");
                emit_event(
                    self.events.as_ref(),
                    ChatEvent::HistoryLoaded {
                        topic: request.key.to_topic(),
                        count: self.messages.len(),
                    },
                );
                Ok(())
            }
            Err(e) => {
                let err = ChatError::FetchMessages(e);
                error!(topic = %request.key, error = %err, "Failed to load history");
                self.set_banner(Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Unsubscribe and forget pending read receipts.  The log is kept.
    pub async fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = self.ctx.feed.unsubscribe(subscription.id).await {
                warn!(sub = %subscription.id, error = %e, "Failed to unsubscribe");
            }
            debug!(sub = %subscription.id, "Subscription torn down");
        }
        self.receipts.clear();
        if self.state != SubscriptionState::Closed {
            self.set_state(SubscriptionState::Closed);
        }
    }

    // -- Sending --

    /// Send a message to the selected peer.
    ///
    /// Returns `Ok(None)` without touching the network when there is no
    /// peer or nothing to send.  On success the stored row is appended to
    /// the log.  On failure the log is untouched and the banner is set.
    pub async fn submit(
        &mut self,
        content: Option<&str>,
        file: Option<OutgoingFile>,
    ) -> Result<Option<MessageId>, ChatError> {
        let content = content
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string);
        if content.is_none() && file.is_none() {
            return Ok(None);
        }
        let Some(peer_id) = self.peer.as_ref().map(|p| p.id.clone()) else {
            debug!("Submit without a selected peer");
            return Ok(None);
        };

        self.is_sending = true;
        self.set_banner(None);

        let result = self.persist(content, file, peer_id).await;
        self.is_sending = false;

        match result {
            Ok(stored) => {
                let id = stored.id;
                info!(msg_id = %id, "Message sent");
                let stamped = stored.with_sender(self.me.clone());
                self.append(stamped);
                Ok(Some(id))
            }
            Err(e) => {
                error!(error = %e, "Send failed");
                self.set_banner(Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn persist(
        &self,
        content: Option<String>,
        file: Option<OutgoingFile>,
        recipient_id: ProfileId,
    ) -> Result<Message, ChatError> {
        let attachment = match file {
            Some(file) => Some(self.upload(file).await?),
            None => None,
        };

        let message = NewMessage {
            sender_id: self.me.id.clone(),
            recipient_id,
            content,
            attachment,
        };
        self.ctx
            .messages
            .insert_message(message)
            .await
            .map_err(ChatError::Send)
    }

    async fn upload(&self, file: OutgoingFile) -> Result<Attachment, ChatError> {
        let config = &self.ctx.config;
        if file.bytes.len() > config.max_upload_bytes {
            return Err(ChatError::Upload(BackendError::Rejected(format!(
                "file too large: {} bytes (max {})",
                file.bytes.len(),
                config.max_upload_bytes
            ))));
        }

        let path = attachment_path(&self.me, &file, Utc::now().timestamp_millis());
        self.ctx
            .storage
            .upload(&path, &file.bytes)
            .await
            .map_err(ChatError::Upload)?;
        let url = self
            .ctx
            .storage
            .create_signed_url(&path, config.signed_url_ttl_secs)
            .await
            .map_err(ChatError::Upload)?;

        debug!(path = %path, size = file.size(), "Attachment uploaded");
        Ok(Attachment {
            url,
            size_bytes: file.size(),
            name: file.name,
            mime_type: file.mime_type,
        })
    }

    // -- Realtime --

    /// Handle every event already queued on the subscription without
    /// waiting.  Returns how many were handled.
    pub fn drain_events(&mut self) -> usize {
        let mut batch = Vec::new();
        let mut closed = false;
        if let Some(subscription) = self.subscription.as_mut() {
            loop {
                match subscription.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
        }
        let handled = batch.len();
        for event in batch {
            self.handle_feed_event(event);
        }
        if closed {
            self.on_feed_closed();
        }
        handled
    }

    /// Wait for the next feed event and handle it.  Returns `false` when
    /// there is no subscription or its channel has closed.
    pub async fn next_event(&mut self) -> bool {
        let event = match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => return false,
        };
        match event {
            Some(event) => {
                self.handle_feed_event(event);
                true
            }
            None => {
                self.on_feed_closed();
                false
            }
        }
    }

    /// The feed dropped our channel without an unsubscribe.
    fn on_feed_closed(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            warn!(sub = %subscription.id, "Subscription channel closed by the feed");
        }
        self.handle_feed_event(FeedEvent::Status(ChannelStatus::ChannelError(
            "connection closed".to_string(),
        )));
    }

    pub fn handle_feed_event(&mut self, event: FeedEvent) -> ChangeOutcome {
        match event {
            FeedEvent::Status(status) => {
                self.on_status(status);
                ChangeOutcome::Ignored
            }
            FeedEvent::Change(payload) => match ChangeEvent::from_json(&payload) {
                Ok(Some(change)) => self.apply_change(change),
                Ok(None) => ChangeOutcome::Ignored,
                Err(e) => {
                    warn!(error = %ChatError::InvalidPayload(e), "Dropping change event");
                    ChangeOutcome::Ignored
                }
            },
        }
    }

    fn on_status(&mut self, status: ChannelStatus) {
        let next = self.state.on_status(&status);
        if next == self.state {
            return;
        }
        match &next {
            SubscriptionState::Open => info!(topic = ?self.key, "Realtime subscription open"),
            SubscriptionState::Error(reason) => {
                let err = ChatError::Subscription(reason.clone());
                error!(topic = ?self.key, error = %err, "Realtime subscription failed");
                self.set_banner(Some(err.to_string()));
            }
            _ => debug!(topic = ?self.key, state = %next, "Subscription state changed"),
        }
        self.set_state(next);
    }

    /// Reconcile one decoded change with the cache.
    pub fn apply_change(&mut self, change: ChangeEvent) -> ChangeOutcome {
        match change {
            ChangeEvent::Insert(message) => self.apply_insert(message),
            ChangeEvent::Update(patch) => self.apply_update(&patch),
        }
    }

    fn apply_insert(&mut self, mut message: Message) -> ChangeOutcome {
        let in_conversation = self.key.as_ref().is_some_and(|k| k.includes(&message));
        if !in_conversation {
            debug!(msg_id = %message.id, "Insert for another conversation");
            return ChangeOutcome::Ignored;
        }
        if message.is_from(&self.me.id) {
            return ChangeOutcome::Ignored;
        }
        if self.message(message.id).is_some() {
            debug!(msg_id = %message.id, "Duplicate insert");
            return ChangeOutcome::Ignored;
        }

        if message.sender.is_none() {
            message.sender = self.peer.clone().filter(|p| p.id == message.sender_id);
        }
        notifications::notify_incoming(self.ctx.notifier.as_ref(), &message);

        let id = message.id;
        self.append(message);
        ChangeOutcome::Appended(id)
    }

    fn apply_update(&mut self, patch: &MessagePatch) -> ChangeOutcome {
        let Some(cached) = self.messages.iter_mut().find(|m| m.id == patch.id) else {
            debug!(msg_id = %patch.id, "Update for uncached message");
            return ChangeOutcome::Ignored;
        };
        cached.apply_patch(patch);

        debug!(msg_id = %patch.id, status = %cached.status, "Message updated");
        emit_event(self.events.as_ref(), ChatEvent::MessageUpdated { id: patch.id });
        ChangeOutcome::Updated(patch.id)
    }

    fn append(&mut self, message: Message) {
        let id = message.id;
        self.messages.push(message);
        emit_event(self.events.as_ref(), ChatEvent::MessageAppended { id });
    }

    // -- Read receipts --

    /// `id` scrolled into view.  Arms the read-receipt timer for unread
    /// messages from the peer.
    pub fn message_visible(&mut self, id: MessageId, now: Instant) {
        if self.needs_receipt(id) {
            self.receipts.visible(id, now);
        }
    }

    pub fn message_hidden(&mut self, id: MessageId) {
        self.receipts.hidden(id);
    }

    pub fn next_receipt_deadline(&self) -> Option<Instant> {
        self.receipts.next_deadline()
    }

    /// Mark every message whose debounce has elapsed as read.  Returns the
    /// number of writes issued.
    pub async fn flush_read_receipts(&mut self, now: Instant) -> usize {
        let mut written = 0;
        for id in self.receipts.due(now) {
            if self.mark_as_read(id).await {
                written += 1;
            }
        }
        written
    }

    /// Wait for the earliest armed deadline, then flush.
    pub async fn run_read_receipts(&mut self) -> usize {
        let Some(deadline) = self.receipts.next_deadline() else {
            return 0;
        };
        tokio::time::sleep_until(deadline).await;
        self.flush_read_receipts(Instant::now()).await
    }

    /// Write `read` for `id`.  Own or already-read messages issue no write.
    /// Returns whether a write was attempted.
    pub async fn mark_as_read(&mut self, id: MessageId) -> bool {
        if !self.needs_receipt(id) {
            return false;
        }

        match self.ctx.messages.update_status(id, MessageStatus::Read).await {
            Ok(updated) => {
                debug!(msg_id = %id, "Marked as read");
                self.apply_update(&MessagePatch::from(&updated));
            }
            Err(e) => {
                error!(msg_id = %id, error = %ChatError::Update(e), "Error marking message as read");
            }
        }
        true
    }

    fn needs_receipt(&self, id: MessageId) -> bool {
        self.message(id)
            .is_some_and(|m| !m.is_from(&self.me.id) && !m.is_read())
    }

    // -- State plumbing --

    fn set_state(&mut self, state: SubscriptionState) {
        self.state = state.clone();
        emit_event(self.events.as_ref(), ChatEvent::SubscriptionChanged { state });
    }

    fn set_banner(&mut self, message: Option<String>) {
        if self.error == message {
            return;
        }
        self.error = message.clone();
        emit_event(self.events.as_ref(), ChatEvent::Banner { message });
    }
}

/// Display name for a message's sender.
pub fn sender_name(message: &Message) -> &str {
    message
        .sender
        .as_ref()
        .map(|p| p.username.as_str())
        .unwrap_or(UNKNOWN_USER)
}

/// Storage path for an attachment: `<owner>/<unix millis>.<ext>`.
fn attachment_path(owner: &Profile, file: &OutgoingFile, millis: i64) -> String {
    match file.extension() {
        Some(ext) => format!("{}/{millis}.{ext}", owner.id),
        None => format!("{}/{millis}", owner.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use parley_shared::{MessageStore, NotificationPermission, RealtimeFeed};
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::testing::{
        message_from, CountingMessages, FailingFeed, FailingStorage, RecordingNotifier, TestEnv,
    };

    async fn open_with_bob(env: &TestEnv) -> Conversation {
        let mut convo = Conversation::new(env.ctx.clone(), env.alice.clone());
        convo.select_peer(env.bob.clone()).await.unwrap();
        convo.drain_events();
        convo
    }

    #[test]
    fn test_attachment_path() {
        let me = Profile {
            id: "u1".into(),
            username: "alice".into(),
            avatar_url: None,
        };
        let pic = OutgoingFile::new("cat.photo.png", None, vec![0u8]);
        assert_eq!(attachment_path(&me, &pic, 1700), "u1/1700.png");
        let bare = OutgoingFile::new("Makefile", None, vec![0u8]);
        assert_eq!(attachment_path(&me, &bare, 1700), "u1/1700");
    }

    #[tokio::test]
    async fn test_submit_appends_stamped_row() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;
        assert!(convo.subscription_state().is_open());

        let id = convo.submit(Some("hello"), None).await.unwrap().unwrap();

        assert_eq!(convo.messages().len(), 1);
        let sent = &convo.messages()[0];
        assert_eq!(sent.id, id);
        assert_eq!(sent.status, MessageStatus::Sent);
        assert_eq!(sent.sender.as_ref(), Some(&env.alice));
        assert!(!convo.is_sending());

        // The echo of our own insert is dropped.
        convo.drain_events();
        assert_eq!(convo.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_submit_is_a_noop() {
        let mut env = TestEnv::new().await;
        let counting = Arc::new(CountingMessages::new(env.backend.clone()));
        env.ctx.messages = counting.clone();
        let mut convo = open_with_bob(&env).await;

        assert_eq!(convo.submit(None, None).await.unwrap(), None);
        assert_eq!(convo.submit(Some("  \t"), None).await.unwrap(), None);
        assert!(convo.messages().is_empty());
        assert_eq!(counting.inserts(), 0);
    }

    #[tokio::test]
    async fn test_submit_with_file_uploads_first() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;

        let file = OutgoingFile::new("notes.txt", Some("text/plain".into()), &b"some notes"[..]);
        convo.submit(Some("  "), Some(file)).await.unwrap();

        let sent = &convo.messages()[0];
        assert_eq!(sent.content, None);
        let attachment = sent.attachment.as_ref().unwrap();
        assert_eq!(attachment.name, "notes.txt");
        assert_eq!(attachment.size_bytes, 10);

        let prefix = format!("parley://images/{}/", env.alice.id);
        assert!(attachment.url.starts_with(&prefix));
        let path = env
            .backend
            .objects()
            .verify_url(&attachment.url, Utc::now().timestamp())
            .unwrap();
        assert!(path.ends_with(".txt"));
        assert_eq!(env.backend.objects().get(&path).await.unwrap(), b"some notes");
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_cache_unchanged() {
        let mut env = TestEnv::new().await;
        env.ctx.storage = Arc::new(FailingStorage);
        let counting = Arc::new(CountingMessages::new(env.backend.clone()));
        env.ctx.messages = counting.clone();
        let mut convo = open_with_bob(&env).await;

        let file = OutgoingFile::new("a.png", Some("image/png".into()), vec![1u8; 4]);
        let err = convo.submit(Some("look"), Some(file)).await.unwrap_err();

        assert!(matches!(err, ChatError::Upload(_)));
        assert!(convo.messages().is_empty());
        assert_eq!(counting.inserts(), 0);
        assert!(convo.error().unwrap().starts_with("Error sending message:"));
        assert!(!convo.is_sending());
    }

    #[tokio::test]
    async fn test_oversize_upload_is_rejected_locally() {
        let mut env = TestEnv::new().await;
        let mut config = (*env.ctx.config).clone();
        config.max_upload_bytes = 3;
        env.ctx.config = Arc::new(config);
        let mut convo = open_with_bob(&env).await;

        let file = OutgoingFile::new("big.bin", None, vec![0u8; 4]);
        assert!(matches!(
            convo.submit(None, Some(file)).await,
            Err(ChatError::Upload(BackendError::Rejected(_)))
        ));
        assert!(convo.messages().is_empty());
    }

    #[tokio::test]
    async fn test_next_submit_clears_banner() {
        let mut env = TestEnv::new().await;
        env.ctx.storage = Arc::new(FailingStorage);
        let mut convo = open_with_bob(&env).await;

        let file = OutgoingFile::new("a.png", None, vec![1u8]);
        assert!(convo.submit(None, Some(file)).await.is_err());
        assert!(convo.error().is_some());

        convo.submit(Some("text only"), None).await.unwrap();
        assert!(convo.error().is_none());
        assert_eq!(convo.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_peer_insert_is_appended_and_stamped() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;

        let incoming = message_from(env.bob.id.as_str(), env.alice.id.as_str(), Some("hi"));
        let outcome = convo.apply_change(ChangeEvent::Insert(incoming.clone()));

        assert_eq!(outcome, ChangeOutcome::Appended(incoming.id));
        assert_eq!(convo.messages()[0].sender.as_ref(), Some(&env.bob));
        assert_eq!(sender_name(&convo.messages()[0]), "bob");
    }

    #[tokio::test]
    async fn test_insert_from_self_and_other_pairs_ignored() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;

        let own = message_from(env.alice.id.as_str(), env.bob.id.as_str(), Some("mine"));
        assert_eq!(convo.apply_change(ChangeEvent::Insert(own)), ChangeOutcome::Ignored);

        let elsewhere = message_from(env.carol.id.as_str(), env.alice.id.as_str(), Some("psst"));
        assert_eq!(
            convo.apply_change(ChangeEvent::Insert(elsewhere)),
            ChangeOutcome::Ignored
        );
        assert!(convo.messages().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_insert_is_appended() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;

        let mut late = message_from(env.bob.id.as_str(), env.alice.id.as_str(), Some("late"));
        late.id = MessageId(50);
        let mut early = message_from(env.bob.id.as_str(), env.alice.id.as_str(), Some("early"));
        early.id = MessageId(10);
        early.created_at = late.created_at - chrono::Duration::seconds(30);

        convo.apply_change(ChangeEvent::Insert(late));
        convo.apply_change(ChangeEvent::Insert(early));

        let ids: Vec<_> = convo.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![MessageId(50), MessageId(10)]);
    }

    #[tokio::test]
    async fn test_update_replaces_cached_entry() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;
        let id = convo.submit(Some("hello"), None).await.unwrap().unwrap();

        let payload = json!({ "eventType": "UPDATE", "new": { "id": id.0, "status": "read" } });
        assert_eq!(
            convo.handle_feed_event(FeedEvent::Change(payload)),
            ChangeOutcome::Updated(id)
        );
        let msg = convo.message(id).unwrap();
        assert!(msg.is_read());
        assert_eq!(msg.content.as_deref(), Some("hello"));
        assert_eq!(msg.sender.as_ref(), Some(&env.alice));

        let unknown = json!({ "eventType": "UPDATE", "new": { "id": 424242, "status": "read" } });
        assert_eq!(
            convo.handle_feed_event(FeedEvent::Change(unknown)),
            ChangeOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_malformed_and_delete_payloads_ignored() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;

        let garbage = json!({ "eventType": "INSERT", "new": { "id": "x" } });
        assert_eq!(
            convo.handle_feed_event(FeedEvent::Change(garbage)),
            ChangeOutcome::Ignored
        );
        let delete = json!({ "eventType": "DELETE", "old": { "id": 1 } });
        assert_eq!(
            convo.handle_feed_event(FeedEvent::Change(delete)),
            ChangeOutcome::Ignored
        );
        assert!(convo.error().is_none());
    }

    #[tokio::test]
    async fn test_insert_without_body_is_dropped() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;

        let empty = json!({
            "eventType": "INSERT",
            "new": {
                "id": 777,
                "created_at": "2026-01-05T10:00:00Z",
                "user_id": env.bob.id.as_str(),
                "recipient_id": env.alice.id.as_str(),
                "content": null,
                "image_url": null
            }
        });
        assert_eq!(
            convo.handle_feed_event(FeedEvent::Change(empty)),
            ChangeOutcome::Ignored
        );
        assert!(convo.message(MessageId(777)).is_none());
    }

    #[tokio::test]
    async fn test_url_only_update_keeps_file_metadata() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;
        let file = OutgoingFile::new("report.pdf", Some("application/pdf".into()), vec![0u8; 2048]);
        let id = convo.submit(None, Some(file)).await.unwrap().unwrap();

        let url = "parley://images/elsewhere/1.pdf?expires=9&sig=cd";
        let payload = json!({ "eventType": "UPDATE", "new": { "id": id.0, "image_url": url } });
        assert_eq!(
            convo.handle_feed_event(FeedEvent::Change(payload)),
            ChangeOutcome::Updated(id)
        );

        let attachment = convo.message(id).unwrap().attachment.clone().unwrap();
        assert_eq!(attachment.url, url);
        assert_eq!(attachment.name, "report.pdf");
        assert_eq!(attachment.mime_type, "application/pdf");
        assert_eq!(attachment.size_bytes, 2048);
    }

    #[tokio::test]
    async fn test_switching_peers_scopes_the_log() {
        let env = TestEnv::new().await;
        env.send(&env.alice, &env.bob, "to bob").await;
        env.send(&env.carol, &env.alice, "from carol").await;
        env.send(&env.bob, &env.alice, "from bob").await;

        let mut convo = open_with_bob(&env).await;
        let bodies: Vec<_> = convo
            .messages()
            .iter()
            .filter_map(|m| m.content.clone())
            .collect();
        assert_eq!(bodies, vec!["to bob", "from bob"]);
        assert_eq!(env.backend.feed().active_subscriptions(), 1);

        convo.select_peer(env.carol.clone()).await.unwrap();
        let bodies: Vec<_> = convo
            .messages()
            .iter()
            .filter_map(|m| m.content.clone())
            .collect();
        assert_eq!(bodies, vec!["from carol"]);
        assert_eq!(env.backend.feed().active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_stale_history_is_discarded() {
        let env = TestEnv::new().await;
        env.send(&env.bob, &env.alice, "bob history").await;
        env.send(&env.carol, &env.alice, "carol history").await;

        let mut convo = Conversation::new(env.ctx.clone(), env.alice.clone());
        let to_bob = convo.begin_select(env.bob.clone()).await;
        let bob_history = to_bob.fetch(&env.ctx).await;

        let to_carol = convo.begin_select(env.carol.clone()).await;
        let carol_history = to_carol.fetch(&env.ctx).await;
        convo.finish_load(&to_carol, carol_history).unwrap();

        // Bob's response lands late.
        convo.finish_load(&to_bob, bob_history).unwrap();

        assert_eq!(convo.generation(), 2);
        assert_eq!(convo.messages().len(), 1);
        assert_eq!(convo.messages()[0].content.as_deref(), Some("carol history"));
    }

    #[tokio::test]
    async fn test_stale_subscription_is_released() {
        let env = TestEnv::new().await;
        let mut convo = Conversation::new(env.ctx.clone(), env.alice.clone());

        let to_bob = convo.begin_select(env.bob.clone()).await;
        let bob_sub = env.backend.subscribe(&to_bob.key).await;
        let to_carol = convo.begin_select(env.carol.clone()).await;

        convo.attach_subscription(&to_bob, bob_sub).await;
        assert_eq!(env.backend.feed().active_subscriptions(), 0);

        let carol_sub = env.backend.subscribe(&to_carol.key).await;
        convo.attach_subscription(&to_carol, carol_sub).await;
        assert_eq!(env.backend.feed().active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_sets_banner() {
        let mut env = TestEnv::new().await;
        let counting = Arc::new(CountingMessages::failing_fetch(env.backend.clone()));
        env.ctx.messages = counting;

        let mut convo = Conversation::new(env.ctx.clone(), env.alice.clone());
        let err = convo.select_peer(env.bob.clone()).await.unwrap_err();
        assert!(matches!(err, ChatError::FetchMessages(_)));
        assert!(convo.error().unwrap().starts_with("Could not fetch messages"));
    }

    #[tokio::test]
    async fn test_channel_error_is_terminal() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;

        convo.handle_feed_event(FeedEvent::Status(ChannelStatus::ChannelError(
            "A channel error occurred.".into(),
        )));
        assert_eq!(
            convo.subscription_state(),
            &SubscriptionState::Error("A channel error occurred.".into())
        );
        assert_eq!(
            convo.error(),
            Some("Real-time connection failed: A channel error occurred.")
        );

        convo.handle_feed_event(FeedEvent::Status(ChannelStatus::Subscribed));
        assert!(!convo.subscription_state().is_open());
        assert_eq!(env.backend.feed().active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_failure() {
        let mut env = TestEnv::new().await;
        env.ctx.feed = Arc::new(FailingFeed);

        let mut convo = Conversation::new(env.ctx.clone(), env.alice.clone());
        convo.select_peer(env.bob.clone()).await.unwrap();

        assert!(convo.subscription_state().error().is_some());
        assert!(convo.error().unwrap().starts_with("Real-time connection failed"));
    }

    #[tokio::test]
    async fn test_close_unsubscribes() {
        let env = TestEnv::new().await;
        let mut convo = open_with_bob(&env).await;
        assert_eq!(env.backend.feed().active_subscriptions(), 1);

        convo.close().await;
        assert_eq!(convo.subscription_state(), &SubscriptionState::Closed);
        assert_eq!(env.backend.feed().active_subscriptions(), 0);
        assert!(!convo.next_event().await);
    }

    #[tokio::test]
    async fn test_drain_sees_feed_side_close() {
        let env = TestEnv::new().await;
        let mut convo = Conversation::new(env.ctx.clone(), env.alice.clone());
        let request = convo.begin_select(env.bob.clone()).await;

        let (tx, rx) = mpsc::channel(4);
        tx.send(FeedEvent::Status(ChannelStatus::Subscribed)).await.unwrap();
        drop(tx);
        let subscription = Subscription {
            id: parley_shared::SubscriptionId(99),
            key: request.key.clone(),
            events: rx,
        };
        convo.attach_subscription(&request, Ok(subscription)).await;
        convo.finish_load(&request, Ok(Vec::new())).unwrap();

        assert_eq!(convo.drain_events(), 1);
        assert_eq!(
            convo.subscription_state(),
            &SubscriptionState::Error("connection closed".into())
        );
        assert_eq!(
            convo.error(),
            Some("Real-time connection failed: connection closed")
        );
        assert_eq!(convo.drain_events(), 0);
    }

    #[tokio::test]
    async fn test_mark_as_read_is_idempotent() {
        let mut env = TestEnv::new().await;
        let counting = Arc::new(CountingMessages::new(env.backend.clone()));
        env.ctx.messages = counting.clone();
        let incoming = env.send(&env.bob, &env.alice, "hi").await;
        let mut convo = open_with_bob(&env).await;

        assert!(convo.mark_as_read(incoming.id).await);
        assert!(convo.message(incoming.id).unwrap().is_read());
        assert!(!convo.mark_as_read(incoming.id).await);
        assert_eq!(counting.updates(), 1);

        let own = convo.submit(Some("reply"), None).await.unwrap().unwrap();
        assert!(!convo.mark_as_read(own).await);
        assert_eq!(counting.updates(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_receipt_waits_for_debounce() {
        let mut env = TestEnv::new().await;
        let counting = Arc::new(CountingMessages::new(env.backend.clone()));
        env.ctx.messages = counting.clone();
        let incoming = env.send(&env.bob, &env.alice, "hi").await;
        let mut convo = open_with_bob(&env).await;

        convo.message_visible(incoming.id, Instant::now());
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(convo.flush_read_receipts(Instant::now()).await, 0);

        convo.message_hidden(incoming.id);
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(convo.flush_read_receipts(Instant::now()).await, 0);
        assert_eq!(counting.updates(), 0);

        convo.message_visible(incoming.id, Instant::now());
        assert_eq!(convo.run_read_receipts().await, 1);
        assert_eq!(counting.updates(), 1);
        assert!(convo.message(incoming.id).unwrap().is_read());
    }

    #[tokio::test]
    async fn test_incoming_notifies_when_unfocused() {
        let mut env = TestEnv::new().await;
        let notifier = Arc::new(RecordingNotifier::new(NotificationPermission::Granted, false));
        env.ctx.notifier = notifier.clone();
        let mut convo = open_with_bob(&env).await;

        let incoming = message_from(env.bob.id.as_str(), env.alice.id.as_str(), Some("ping"));
        convo.apply_change(ChangeEvent::Insert(incoming));

        let shown = notifier.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, "New message from bob");
        assert_eq!(shown[0].1, "ping");
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let env = TestEnv::new().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut convo = Conversation::new(env.ctx.clone(), env.alice.clone()).with_events(tx);

        convo.select_peer(env.bob.clone()).await.unwrap();
        convo.drain_events();
        let id = convo.submit(Some("hello"), None).await.unwrap().unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&ChatEvent::SubscriptionChanged {
            state: SubscriptionState::Subscribing
        }));
        assert!(seen.contains(&ChatEvent::SubscriptionChanged {
            state: SubscriptionState::Open
        }));
        assert!(seen.iter().any(|e| matches!(e, ChatEvent::HistoryLoaded { count: 0, .. })));
        assert_eq!(seen.last(), Some(&ChatEvent::MessageAppended { id }));
    }

    /// u1 sends "hello"; u2 replies "hi"; the reply is marked read after
    /// staying visible for the debounce interval.
    #[tokio::test(start_paused = true)]
    async fn test_two_party_scenario() {
        let env = TestEnv::new().await;
        let mut alice = open_with_bob(&env).await;

        let mut bob = Conversation::new(env.ctx.clone(), env.bob.clone());
        bob.select_peer(env.alice.clone()).await.unwrap();
        bob.drain_events();

        let hello = alice.submit(Some("hello"), None).await.unwrap().unwrap();
        assert_eq!(alice.messages().len(), 1);
        assert_eq!(alice.message(hello).unwrap().status, MessageStatus::Sent);

        let hi = bob.submit(Some("hi"), None).await.unwrap().unwrap();
        assert!(alice.next_event().await);
        assert!(alice.next_event().await);
        assert_eq!(alice.messages().len(), 2);
        assert_eq!(alice.messages()[1].id, hi);
        assert_eq!(alice.messages()[1].sender.as_ref(), Some(&env.bob));

        alice.message_visible(hi, Instant::now());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(alice.flush_read_receipts(Instant::now()).await, 1);

        let stored = env.backend.fetch_message(hi).await.unwrap();
        assert!(stored.is_read());

        // Bob sees the receipt on his side.
        bob.drain_events();
        while bob.message(hi).is_some_and(|m| !m.is_read()) {
            assert!(bob.next_event().await);
        }
        assert!(bob.message(hi).unwrap().is_read());
    }
}
