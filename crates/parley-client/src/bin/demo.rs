//! # parley-demo
//!
//! Runs two participants against the local backend: alice through the full
//! client, bob through a bare conversation.  Prints alice's rendered log.

use std::sync::Arc;

use anyhow::Context;
use parley_client::notifications::SilentNotifier;
use parley_client::shell::{AttachmentView, LogView};
use parley_client::{ChatClient, ChatContext, ClientConfig, Conversation, Screen};
use parley_shared::ProfileStore;
use parley_store::{BackendConfig, LocalBackend};
use tokio::time::Instant;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    parley_client::init_tracing();

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let data_dir = config
        .resolve_data_dir()
        .context("no data directory available, set PARLEY_DATA_DIR")?;

    let mut backend_config = BackendConfig::new(data_dir.join("demo"));
    backend_config.bucket = config.bucket.clone();
    backend_config.max_object_size = config.max_upload_bytes;
    let backend = Arc::new(LocalBackend::open(backend_config).await?);

    let bob_session = backend.auth().sign_up("bob").await?;
    let bob = backend.get_profile(&bob_session.user_id).await?;
    let alice_session = backend.auth().sign_up("alice").await?;
    let alice = backend.get_profile(&alice_session.user_id).await?;

    let delay = config.read_receipt_delay;
    let ctx = ChatContext::from_backend(backend.clone(), Arc::new(SilentNotifier), config);

    let mut client = ChatClient::new(ctx.clone());
    if client.start().await? != Screen::Chat {
        anyhow::bail!("alice is not signed in");
    }

    let mut bob_side = Conversation::new(ctx, bob.clone());
    bob_side.select_peer(alice).await?;
    client.select_peer(&bob.id).await?;

    client.composer_mut().set_text("hello");
    client.send().await?;
    let reply = bob_side
        .submit(Some("hi"), None)
        .await?
        .context("reply was not sent")?;

    // Wait for the reply to come through the feed.
    if let Some(conversation) = client.conversation_mut() {
        while conversation.message(reply).is_none() {
            if !conversation.next_event().await {
                anyhow::bail!("realtime feed closed");
            }
        }
        conversation.message_visible(reply, Instant::now());
    }
    tokio::time::sleep(delay).await;
    client.pump().await;

    let view = client.render().context("chat screen not available")?;
    println!("== {} ==", view.header.unwrap_or_default());
    match view.log {
        LogView::Messages(messages) => {
            for m in messages {
                let receipt = m.receipt.map(|s| format!(" [{s}]")).unwrap_or_default();
                let body = match (m.content, m.attachment) {
                    (Some(text), _) => text,
                    (None, Some(AttachmentView::Image { alt, .. })) => format!("<image {alt}>"),
                    (None, Some(AttachmentView::File { name, size, .. })) => {
                        format!("<file {name}, {size}>")
                    }
                    (None, None) => String::new(),
                };
                println!("{} {}: {}{}", m.time, m.sender_name, body, receipt);
            }
        }
        LogView::Empty(text) | LogView::NoSelection(text) => println!("{text}"),
    }

    Ok(())
}
