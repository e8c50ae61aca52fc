//! Change-feed payload format.
//!
//! The realtime feed delivers one JSON object per row change:
//!
//! ```json
//! { "eventType": "INSERT", "new": { "id": 1, "user_id": "u1", ... } }
//! ```
//!
//! Row columns follow the `messages` table: the sender is `user_id`, the
//! attachment URL lives in `image_url` and its metadata in `file_metadata`.
//! INSERT rows are complete; UPDATE rows may carry only the changed columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{Attachment, Message, MessageId, MessagePatch, MessageStatus, ProfileId};

/// Attachment metadata column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
}

/// A complete `messages` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub recipient_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub file_metadata: Option<FileMetadata>,
    #[serde(default)]
    pub status: MessageStatus,
}

/// A possibly partial `messages` row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialMessageRow {
    pub id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub file_metadata: Option<FileMetadata>,
    #[serde(default)]
    pub status: Option<MessageStatus>,
}

fn attachment_from(url: Option<String>, meta: Option<FileMetadata>) -> Option<Attachment> {
    let url = url?;
    Some(match meta {
        Some(m) => Attachment {
            url,
            name: m.name,
            mime_type: m.mime_type,
            size_bytes: m.size,
        },
        None => Attachment::from_url(&url),
    })
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId(row.id),
            created_at: row.created_at,
            sender_id: ProfileId(row.user_id),
            recipient_id: ProfileId(row.recipient_id),
            content: row.content,
            attachment: attachment_from(row.image_url, row.file_metadata),
            status: row.status,
            sender: None,
        }
    }
}

impl From<&Message> for MessageRow {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.0,
            created_at: m.created_at,
            user_id: m.sender_id.0.clone(),
            recipient_id: m.recipient_id.0.clone(),
            content: m.content.clone(),
            image_url: m.attachment.as_ref().map(|a| a.url.clone()),
            file_metadata: m.attachment.as_ref().map(|a| FileMetadata {
                name: a.name.clone(),
                mime_type: a.mime_type.clone(),
                size: a.size_bytes,
            }),
            status: m.status,
        }
    }
}

impl TryFrom<PartialMessageRow> for MessagePatch {
    type Error = ProtocolError;

    fn try_from(row: PartialMessageRow) -> Result<Self, Self::Error> {
        let id = row.id.ok_or(ProtocolError::MissingField("id"))?;
        // Without metadata only the URL changes; the cached name, type and
        // size stay.
        let (attachment, attachment_url) = match row.file_metadata {
            Some(meta) => (attachment_from(row.image_url, Some(meta)), None),
            None => (None, row.image_url),
        };
        Ok(Self {
            id: MessageId(id),
            status: row.status,
            content: row.content,
            attachment,
            attachment_url,
            created_at: row.created_at,
        })
    }
}

/// A decoded row change for the `messages` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(Message),
    Update(MessagePatch),
}

#[derive(Deserialize)]
struct RawChange {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(default)]
    new: Value,
}

impl ChangeEvent {
    /// Decode a feed payload.  Event types other than INSERT and UPDATE
    /// yield `Ok(None)`.
    pub fn from_json(payload: &Value) -> Result<Option<Self>, ProtocolError> {
        let raw = RawChange::deserialize(payload)?;
        match raw.event_type.as_str() {
            "INSERT" => {
                let row: MessageRow = serde_json::from_value(raw.new)?;
                if row.content.is_none() && row.image_url.is_none() {
                    return Err(ProtocolError::EmptyMessage);
                }
                Ok(Some(Self::Insert(row.into())))
            }
            "UPDATE" => {
                let row: PartialMessageRow = serde_json::from_value(raw.new)?;
                Ok(Some(Self::Update(row.try_into()?)))
            }
            other => {
                tracing::debug!(event_type = %other, "Ignoring change event");
                Ok(None)
            }
        }
    }

    /// Encode as a complete-row feed payload.
    pub fn insert_json(message: &Message) -> Value {
        serde_json::json!({
            "eventType": "INSERT",
            "new": MessageRow::from(message),
        })
    }

    pub fn update_json(message: &Message) -> Value {
        serde_json::json!({
            "eventType": "UPDATE",
            "new": MessageRow::from(message),
        })
    }
}
