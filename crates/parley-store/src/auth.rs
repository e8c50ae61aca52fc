//! Local identity provider.
//!
//! Issues opaque session tokens for profiles in the local database and
//! publishes session changes on a `watch` channel.  Sign-up creates the
//! profile row, mirroring what a hosted provider's signup trigger does.

use std::sync::Arc;

use parley_shared::{BackendError, Profile, ProfileId, Session};
use tokio::sync::{watch, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone)]
pub struct LocalAuth {
    db: Arc<Mutex<Database>>,
    session_tx: Arc<watch::Sender<Option<Session>>>,
}

impl LocalAuth {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        let (session_tx, _) = watch::channel(None);
        Self {
            db,
            session_tx: Arc::new(session_tx),
        }
    }

    /// Create a new identity with `username` and sign it in.
    pub async fn sign_up(&self, username: &str) -> Result<Session, BackendError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(BackendError::Rejected("username must not be empty".into()));
        }

        let profile = Profile {
            id: ProfileId(Uuid::new_v4().to_string()),
            username: username.to_string(),
            avatar_url: None,
        };
        let session = new_session(&profile.id);
        {
            let db = self.db.lock().await;
            db.insert_profile(&profile)?;
            db.insert_session(&session)?;
        }

        info!(user = %profile.id, "Signed up");
        self.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    /// Sign in as an existing profile.
    pub async fn sign_in(&self, id: &ProfileId) -> Result<Session, BackendError> {
        let session = new_session(id);
        {
            let db = self.db.lock().await;
            db.get_profile(id).map_err(|e| match e {
                StoreError::NotFound => BackendError::Unauthorized(format!("unknown user {id}")),
                other => other.into(),
            })?;
            db.insert_session(&session)?;
        }

        info!(user = %id, "Signed in");
        self.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    /// Resume a previously issued session token.
    pub async fn resume(&self, token: &str) -> Result<Session, BackendError> {
        let session = {
            let db = self.db.lock().await;
            db.get_session(token).map_err(|e| match e {
                StoreError::NotFound => BackendError::Unauthorized("session expired".into()),
                other => other.into(),
            })?
        };
        self.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    pub fn current(&self) -> Option<Session> {
        self.session_tx.borrow().clone()
    }

    pub async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.current() {
            self.db.lock().await.delete_session(&session.access_token)?;
            info!(user = %session.user_id, "Signed out");
        }
        self.session_tx.send_replace(None);
        Ok(())
    }

    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.session_tx.subscribe()
    }
}

fn new_session(user_id: &ProfileId) -> Session {
    Session {
        access_token: Uuid::new_v4().simple().to_string(),
        user_id: user_id.clone(),
    }
}
