//! Realtime subscription lifecycle for one open conversation.
//!
//! `Closed -> Subscribing -> Open -> (Error | Closed)`.  Errors are terminal
//! for the subscription: nothing resubscribes until the next selection.

use std::fmt;

use parley_shared::ChannelStatus;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    #[default]
    Closed,
    Subscribing,
    Open,
    Error(String),
}

impl SubscriptionState {
    /// Next state after the feed reports `status`.
    pub fn on_status(&self, status: &ChannelStatus) -> SubscriptionState {
        match (self, status) {
            (Self::Closed, _) | (Self::Error(_), _) => self.clone(),
            (_, ChannelStatus::Subscribed) => Self::Open,
            (_, ChannelStatus::ChannelError(reason)) => Self::Error(reason.clone()),
            (_, ChannelStatus::TimedOut) => Self::Error("subscription timed out".to_string()),
            (_, ChannelStatus::Closed) => Self::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Subscribing => f.write_str("subscribing"),
            Self::Open => f.write_str("open"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}
