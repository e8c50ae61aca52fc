use serde::Serialize;
use tokio::sync::mpsc;

use parley_shared::MessageId;

use crate::subscription::SubscriptionState;

/// State changes a front end redraws on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    HistoryLoaded { topic: String, count: usize },
    MessageAppended { id: MessageId },
    MessageUpdated { id: MessageId },
    SubscriptionChanged { state: SubscriptionState },
    Banner { message: Option<String> },
}

pub type EventSender = mpsc::UnboundedSender<ChatEvent>;

pub fn emit_event(tx: Option<&EventSender>, event: ChatEvent) {
    let Some(tx) = tx else { return };
    if let Err(e) = tx.send(event) {
        tracing::error!(event = ?e.0, "Failed to emit event");
    }
}
