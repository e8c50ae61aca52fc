//! Presentation shell: layout flags plus a render snapshot of the other
//! components.  Nothing here talks to a collaborator.

use chrono::Local;
use parley_shared::{Message, MessageStatus, NotificationPermission, Profile, ProfileId};
use serde::Serialize;

use crate::conversation::{sender_name, Conversation};
use crate::directory::Directory;
use crate::notifications;
use crate::session::SessionStore;

pub const EMPTY_LOG_TEXT: &str = "No messages in this conversation yet. Say hello!";
pub const NO_SELECTION_TEXT: &str = "Select a user to start chatting";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentView {
    Image { url: String, alt: String },
    File { url: String, name: String, size: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    pub is_own: bool,
    pub sender_name: String,
    pub sender_initial: String,
    pub content: Option<String>,
    pub attachment: Option<AttachmentView>,
    /// Local `HH:MM`.
    pub time: String,
    /// Delivery glyph, own messages only.
    pub receipt: Option<MessageStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LogView {
    NoSelection(&'static str),
    Empty(&'static str),
    Messages(Vec<MessageView>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerEntry {
    pub id: ProfileId,
    pub username: String,
    pub initial: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoPanelView {
    pub initial: String,
    pub username: String,
    pub id: ProfileId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellView {
    pub sidebar_open: bool,
    pub me: Option<PeerEntry>,
    pub status_line: &'static str,
    pub peers: Vec<PeerEntry>,
    pub header: Option<String>,
    pub log: LogView,
    pub banner: Option<String>,
    pub is_sending: bool,
    pub notification_prompt: bool,
    pub info_panel: Option<InfoPanelView>,
}

#[derive(Debug, Default)]
pub struct Shell {
    sidebar_open: bool,
    info_panel_open: bool,
}

impl Shell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
    }

    pub fn close_sidebar(&mut self) {
        self.sidebar_open = false;
    }

    pub fn toggle_info_panel(&mut self) {
        self.info_panel_open = !self.info_panel_open;
    }

    pub fn close_info_panel(&mut self) {
        self.info_panel_open = false;
    }

    pub fn sidebar_open(&self) -> bool {
        self.sidebar_open
    }

    pub fn info_panel_open(&self) -> bool {
        self.info_panel_open
    }

    pub fn render(
        &self,
        session: &SessionStore,
        directory: &Directory,
        conversation: &Conversation,
        permission: NotificationPermission,
    ) -> ShellView {
        let selected = directory.selected().map(|p| &p.id);
        let peers = directory
            .profiles()
            .iter()
            .map(|p| entry(p, selected == Some(&p.id)))
            .collect();

        let peer = conversation.peer();
        let log = match peer {
            None => LogView::NoSelection(NO_SELECTION_TEXT),
            Some(_) => render_log(conversation.messages(), &conversation.me().id),
        };

        let banner = conversation
            .error()
            .or_else(|| directory.error())
            .map(str::to_string);

        ShellView {
            sidebar_open: self.sidebar_open,
            me: session.profile().map(|p| entry(p, false)),
            status_line: session.status_line(),
            peers,
            header: peer.map(|p| p.username.clone()),
            log,
            banner,
            is_sending: conversation.is_sending(),
            notification_prompt: notifications::should_prompt(permission),
            info_panel: peer.filter(|_| self.info_panel_open).map(|p| InfoPanelView {
                initial: p.initial(),
                username: p.username.clone(),
                id: p.id.clone(),
            }),
        }
    }
}

fn entry(profile: &Profile, selected: bool) -> PeerEntry {
    PeerEntry {
        id: profile.id.clone(),
        username: profile.username.clone(),
        initial: profile.initial(),
        selected,
    }
}

pub fn render_log(messages: &[Message], me: &ProfileId) -> LogView {
    if messages.is_empty() {
        return LogView::Empty(EMPTY_LOG_TEXT);
    }
    LogView::Messages(messages.iter().map(|m| render_message(m, me)).collect())
}

pub fn render_message(message: &Message, me: &ProfileId) -> MessageView {
    let is_own = message.is_from(me);
    let attachment = message.attachment.as_ref().map(|a| {
        if a.is_image() {
            AttachmentView::Image {
                url: a.url.clone(),
                alt: a.name.clone(),
            }
        } else {
            AttachmentView::File {
                url: a.url.clone(),
                name: a.name.clone(),
                size: attachment_size(a.size_bytes),
            }
        }
    });

    MessageView {
        is_own,
        sender_name: sender_name(message).to_string(),
        sender_initial: message
            .sender
            .as_ref()
            .map(Profile::initial)
            .unwrap_or_else(|| "?".to_string()),
        content: message.content.clone(),
        attachment,
        time: message
            .created_at
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string(),
        receipt: is_own.then_some(message.status),
    }
}

/// Size label for a file attachment; unknown sizes read "File".
fn attachment_size(bytes: u64) -> String {
    if bytes == 0 {
        "File".to_string()
    } else {
        format_bytes(bytes)
    }
}

/// Human-readable size in base-1024 units with at most one decimal.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut threshold = 1024u64;
    while unit + 1 < UNITS.len() && bytes >= threshold {
        unit += 1;
        threshold = threshold.saturating_mul(1024);
    }

    let value = bytes as f64 / 1024f64.powi(unit as i32);
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0} {}", UNITS[unit])
    } else {
        format!("{rounded:.1} {}", UNITS[unit])
    }
}
