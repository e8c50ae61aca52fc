//! Client core for Parley: session, directory, conversation state with
//! optimistic send and realtime reconciliation, read receipts and a
//! render-only presentation shell.  Every platform capability is reached
//! through the collaborator traits carried by [`ChatContext`].

pub mod client;
pub mod composer;
pub mod config;
pub mod context;
pub mod conversation;
pub mod directory;
pub mod events;
pub mod notifications;
pub mod read_receipts;
pub mod session;
pub mod shell;
pub mod subscription;

#[cfg(test)]
mod testing;

pub use client::{ChatClient, Screen};
pub use composer::{Composer, Draft};
pub use config::ClientConfig;
pub use context::ChatContext;
pub use conversation::{ChangeOutcome, Conversation, HistoryRequest};
pub use directory::Directory;
pub use events::ChatEvent;
pub use session::{RenameStatus, SessionStore};
pub use shell::{Shell, ShellView};
pub use subscription::SubscriptionState;

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "parley_client=debug,parley_store=info,warn";

/// Install the global `tracing` subscriber.  `RUST_LOG` overrides the
/// default filter.  Calling this more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if installed.is_ok() {
        tracing::info!("Parley client logging initialised");
    }
}
