//! Peer directory: every profile except our own.

use parley_shared::{ChatError, Profile, ProfileId};
use tracing::{debug, error};

use crate::context::ChatContext;

pub struct Directory {
    ctx: ChatContext,
    me: ProfileId,
    profiles: Vec<Profile>,
    selected: Option<ProfileId>,
    error: Option<String>,
}

impl Directory {
    pub fn new(ctx: ChatContext, me: ProfileId) -> Self {
        Self {
            ctx,
            me,
            profiles: Vec::new(),
            selected: None,
            error: None,
        }
    }

    /// Reload the peer list.  On failure the previous list is kept and the
    /// banner is set.
    pub async fn refresh(&mut self) -> Result<usize, ChatError> {
        match self.ctx.profiles.list_profiles().await {
            Ok(all) => {
                self.profiles = all.into_iter().filter(|p| p.id != self.me).collect();
                self.error = None;
                if let Some(id) = &self.selected {
                    if !self.profiles.iter().any(|p| &p.id == id) {
                        self.selected = None;
                    }
                }
                debug!(count = self.profiles.len(), "Directory refreshed");
                Ok(self.profiles.len())
            }
            Err(e) => {
                let err = ChatError::FetchProfiles(e);
                error!(error = %err, "Directory refresh failed");
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn profile(&self, id: &ProfileId) -> Option<&Profile> {
        self.profiles.iter().find(|p| &p.id == id)
    }

    /// Mark `id` as the conversation target.
    pub fn select(&mut self, id: &ProfileId) -> Option<Profile> {
        let profile = self.profile(id).cloned()?;
        self.selected = Some(profile.id.clone());
        Some(profile)
    }

    pub fn selected(&self) -> Option<&Profile> {
        self.selected.as_ref().and_then(|id| self.profile(id))
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
