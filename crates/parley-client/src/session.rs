//! The signed-in identity and its profile.

use parley_shared::{BackendError, ChatError, Profile, ProfileId, Session};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::context::ChatContext;

/// Progress of the last username change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenameStatus {
    #[default]
    Idle,
    Saving,
    Failed,
}

pub struct SessionStore {
    ctx: ChatContext,
    session: Option<Session>,
    profile: Option<Profile>,
    rename_status: RenameStatus,
}

impl SessionStore {
    pub fn new(ctx: ChatContext) -> Self {
        Self {
            ctx,
            session: None,
            profile: None,
            rename_status: RenameStatus::Idle,
        }
    }

    /// Load the current session and its profile.  No session is an
    /// [`ChatError::Auth`] and the caller shows the sign-in screen.
    pub async fn restore(&mut self) -> Result<&Profile, ChatError> {
        let session = self
            .ctx
            .auth
            .current_session()
            .await
            .map_err(ChatError::Auth)?
            .ok_or_else(|| ChatError::Auth(BackendError::Unauthorized("no active session".into())))?;
        self.apply(session).await
    }

    /// Follow a session change reported by [`Self::watch`].
    pub async fn on_session_changed(&mut self, session: Option<Session>) -> Result<Option<&Profile>, ChatError> {
        match session {
            Some(session) if self.session.as_ref() == Some(&session) => Ok(self.profile.as_ref()),
            Some(session) => self.apply(session).await.map(Some),
            None => {
                if self.session.is_some() {
                    info!("Session ended");
                }
                self.clear();
                Ok(None)
            }
        }
    }

    async fn apply(&mut self, session: Session) -> Result<&Profile, ChatError> {
        let profile = match self.ctx.profiles.get_profile(&session.user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                self.clear();
                return Err(ChatError::Auth(e));
            }
        };
        info!(user = %profile.id, "Session restored");
        self.session = Some(session);
        Ok(&*self.profile.insert(profile))
    }

    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.ctx.auth.watch_session()
    }

    pub fn is_signed_in(&self) -> bool {
        self.profile.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn user_id(&self) -> Option<&ProfileId> {
        self.profile.as_ref().map(|p| &p.id)
    }

    pub async fn sign_out(&mut self) -> Result<(), ChatError> {
        self.ctx.auth.sign_out().await.map_err(ChatError::Auth)?;
        self.clear();
        info!("Signed out");
        Ok(())
    }

    fn clear(&mut self) {
        self.session = None;
        self.profile = None;
        self.rename_status = RenameStatus::Idle;
    }

    /// Change the username.  Returns `Ok(false)` when the trimmed name is
    /// empty or unchanged, without writing.
    pub async fn rename(&mut self, username: &str) -> Result<bool, ChatError> {
        let username = username.trim();
        let Some(profile) = self.profile.as_ref() else {
            return Err(ChatError::Auth(BackendError::Unauthorized("not signed in".into())));
        };
        if username.is_empty() || username == profile.username {
            debug!("Rename skipped");
            self.rename_status = RenameStatus::Idle;
            return Ok(false);
        }

        self.rename_status = RenameStatus::Saving;
        let id = profile.id.clone();
        match self.ctx.profiles.update_username(&id, username).await {
            Ok(updated) => {
                info!(user = %id, username = %updated.username, "Username updated");
                if let Some(profile) = self.profile.as_mut() {
                    profile.username = updated.username;
                }
                self.rename_status = RenameStatus::Idle;
                Ok(true)
            }
            Err(e) => {
                let err = ChatError::Rename(e);
                error!(user = %id, error = %err, "Rename failed");
                self.rename_status = RenameStatus::Failed;
                Err(err)
            }
        }
    }

    pub fn rename_status(&self) -> RenameStatus {
        self.rename_status
    }

    /// Status line under the user's name.
    pub fn status_line(&self) -> &'static str {
        match self.rename_status {
            RenameStatus::Failed => "Update failed!",
            RenameStatus::Saving => "Saving...",
            RenameStatus::Idle => "Online",
        }
    }
}
