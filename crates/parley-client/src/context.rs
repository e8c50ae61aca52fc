//! The explicit dependency bundle handed to every client component.

use std::sync::Arc;

use parley_shared::{
    AuthProvider, Backend, MessageStore, Notifier, ObjectStorage, ProfileStore, RealtimeFeed,
};

use crate::config::ClientConfig;

/// Collaborators and configuration shared by the client components.
///
/// Cloning is cheap; every field is reference-counted.
#[derive(Clone)]
pub struct ChatContext {
    pub auth: Arc<dyn AuthProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub messages: Arc<dyn MessageStore>,
    pub feed: Arc<dyn RealtimeFeed>,
    pub storage: Arc<dyn ObjectStorage>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<ClientConfig>,
}

impl ChatContext {
    /// Use one platform for every data collaborator.
    pub fn from_backend<B>(backend: Arc<B>, notifier: Arc<dyn Notifier>, config: ClientConfig) -> Self
    where
        B: Backend + 'static,
    {
        Self {
            auth: backend.clone(),
            profiles: backend.clone(),
            messages: backend.clone(),
            feed: backend.clone(),
            storage: backend,
            notifier,
            config: Arc::new(config),
        }
    }
}
