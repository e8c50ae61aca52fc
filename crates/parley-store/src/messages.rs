use chrono::{DateTime, Utc};
use parley_shared::{
    Attachment, ConversationKey, Message, MessageId, MessageStatus, NewMessage, Profile, ProfileId,
};
use rusqlite::params;

use crate::database::{decode_ts, encode_ts, not_found, Database};
use crate::error::{Result, StoreError};

const SELECT_JOINED: &str = "SELECT m.id, m.created_at, m.user_id, m.recipient_id, m.content,
            m.image_url, m.file_name, m.file_type, m.file_size, m.status,
            p.id, p.username, p.avatar_url
     FROM messages m
     LEFT JOIN profiles p ON p.id = m.user_id";

impl Database {
    /// Insert a message and return the stored row (without the joined
    /// sender profile).
    pub fn insert_message(&self, message: &NewMessage, created_at: DateTime<Utc>) -> Result<Message> {
        if message.is_empty() {
            return Err(StoreError::Invalid(
                "message needs content or an attachment".into(),
            ));
        }

        let attachment = message.attachment.as_ref();
        self.conn().execute(
            "INSERT INTO messages
                (created_at, user_id, recipient_id, content, image_url, file_name, file_type, file_size, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'sent')",
            params![
                encode_ts(&created_at),
                message.sender_id.as_str(),
                message.recipient_id.as_str(),
                message.content,
                attachment.map(|a| a.url.as_str()),
                attachment.map(|a| a.name.as_str()),
                attachment.map(|a| a.mime_type.as_str()),
                attachment.map(|a| a.size_bytes as i64),
            ],
        )?;

        let id = MessageId(self.conn().last_insert_rowid());
        tracing::debug!(msg_id = %id, "message row inserted");

        Ok(Message {
            id,
            created_at: decode_ts(1, &encode_ts(&created_at))?,
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            content: message.content.clone(),
            attachment: message.attachment.clone(),
            status: MessageStatus::Sent,
            sender: None,
        })
    }

    /// Fetch one message with its sender profile joined.
    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("{SELECT_JOINED} WHERE m.id = ?1"),
                params![id.0],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// All messages exchanged between the two participants, oldest first.
    pub fn messages_between(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let (a, b) = key.participants();
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_JOINED}
             WHERE (m.user_id = ?1 AND m.recipient_id = ?2)
                OR (m.user_id = ?2 AND m.recipient_id = ?1)
             ORDER BY m.created_at ASC, m.id ASC"
        ))?;

        let rows = stmt.query_map(params![a.as_str(), b.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Set the status of a message and return the updated row.
    pub fn update_message_status(&self, id: MessageId, status: MessageStatus) -> Result<Message> {
        let affected = self.conn().execute(
            "UPDATE messages SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.0],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_message(id)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let created_str: String = row.get(1)?;
    let image_url: Option<String> = row.get(5)?;
    let file_name: Option<String> = row.get(6)?;
    let file_type: Option<String> = row.get(7)?;
    let file_size: Option<i64> = row.get(8)?;
    let status_str: String = row.get(9)?;
    let profile_id: Option<String> = row.get(10)?;

    let status = status_str.parse::<MessageStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(e),
        )
    })?;

    let attachment = image_url.map(|url| Attachment {
        url,
        name: file_name.unwrap_or_else(|| "file".to_string()),
        mime_type: file_type
            .unwrap_or_else(|| parley_shared::constants::DEFAULT_MIME_TYPE.to_string()),
        size_bytes: file_size.unwrap_or(0).max(0) as u64,
    });

    let sender = match profile_id {
        Some(id) => Some(Profile {
            id: ProfileId(id),
            username: row.get(11)?,
            avatar_url: row.get(12)?,
        }),
        None => None,
    };

    Ok(Message {
        id: MessageId(row.get(0)?),
        created_at: decode_ts(1, &created_str)?,
        sender_id: ProfileId(row.get(2)?),
        recipient_id: ProfileId(row.get(3)?),
        content: row.get(4)?,
        attachment,
        status,
        sender,
    })
}
