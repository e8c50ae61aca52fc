use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MIME_TYPE, TOPIC_PREFIX};

// User identity = opaque id issued by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Server-assigned message id, monotonic per store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user's public identity record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: ProfileId,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Uppercased first character of the username, `?` when empty.
    pub fn initial(&self) -> String {
        self.username
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Read => "read",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "read" => Ok(Self::Read),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file attached to a message, reachable through a signed URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl Attachment {
    /// An attachment known only by its URL.
    pub fn from_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            name: "file".to_string(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            size_bytes: 0,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// A single chat message as cached by the client.
///
/// `content` and `attachment` are never both absent.  `sender` is the joined
/// sender profile; it is filled in by fetches and by local stamping, and may
/// be missing on records decoded from the change-feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
    pub sender_id: ProfileId,
    pub recipient_id: ProfileId,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Profile>,
}

impl Message {
    pub fn is_from(&self, id: &ProfileId) -> bool {
        &self.sender_id == id
    }

    pub fn is_read(&self) -> bool {
        self.status == MessageStatus::Read
    }

    pub fn with_sender(mut self, profile: Profile) -> Self {
        self.sender = Some(profile);
        self
    }

    /// Apply a partial update in place.  The joined sender profile is kept.
    pub fn apply_patch(&mut self, patch: &MessagePatch) {
        debug_assert_eq!(self.id, patch.id);
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ref content) = patch.content {
            self.content = Some(content.clone());
        }
        if let Some(ref attachment) = patch.attachment {
            self.attachment = Some(attachment.clone());
        } else if let Some(ref url) = patch.attachment_url {
            match self.attachment.as_mut() {
                Some(cached) => cached.url = url.clone(),
                None => self.attachment = Some(Attachment::from_url(url)),
            }
        }
        if let Some(created_at) = patch.created_at {
            self.created_at = created_at;
        }
    }
}

/// Insert payload for a new message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: ProfileId,
    pub recipient_id: ProfileId,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.attachment.is_none()
    }
}

/// Partial row delivered by an UPDATE event: only `id` is guaranteed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePatch {
    pub id: MessageId,
    pub status: Option<MessageStatus>,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    /// New attachment URL with no metadata alongside.
    pub attachment_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Message> for MessagePatch {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            status: Some(m.status),
            content: m.content.clone(),
            attachment: m.attachment.clone(),
            attachment_url: None,
            created_at: Some(m.created_at),
        }
    }
}

/// The unordered pair of participants identifying a conversation.
///
/// Stored in canonical (sorted) order so `{a, b}` and `{b, a}` compare equal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    lo: ProfileId,
    hi: ProfileId,
}

impl ConversationKey {
    pub fn new(a: ProfileId, b: ProfileId) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    pub fn participants(&self) -> (&ProfileId, &ProfileId) {
        (&self.lo, &self.hi)
    }

    /// Whether a message from `sender` to `recipient` belongs to this thread.
    pub fn matches(&self, sender: &ProfileId, recipient: &ProfileId) -> bool {
        (sender == &self.lo && recipient == &self.hi)
            || (sender == &self.hi && recipient == &self.lo)
    }

    pub fn includes(&self, message: &Message) -> bool {
        self.matches(&message.sender_id, &message.recipient_id)
    }

    /// The participant that is not `me`.
    pub fn other(&self, me: &ProfileId) -> &ProfileId {
        if &self.lo == me {
            &self.hi
        } else {
            &self.lo
        }
    }

    pub fn to_topic(&self) -> String {
        format!("{}:{}:{}", TOPIC_PREFIX, self.lo, self.hi)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_topic())
    }
}

/// An authenticated session handed out by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token.
    pub access_token: String,
    pub user_id: ProfileId,
}

/// A file picked in the composer, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl OutgoingFile {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Text after the last `.` of the file name, if any.
    pub fn extension(&self) -> Option<&str> {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }
}
