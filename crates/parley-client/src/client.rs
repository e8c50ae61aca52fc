//! Top-level client: owns the session, and while signed in the directory,
//! conversation, composer and shell.

use parley_shared::{ChatError, MessageId, NotificationPermission, Profile, ProfileId, Session};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::composer::Composer;
use crate::context::ChatContext;
use crate::conversation::Conversation;
use crate::directory::Directory;
use crate::events::EventSender;
use crate::session::SessionStore;
use crate::shell::{Shell, ShellView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    Chat,
}

struct ChatState {
    directory: Directory,
    conversation: Conversation,
}

pub struct ChatClient {
    ctx: ChatContext,
    session: SessionStore,
    chat: Option<ChatState>,
    composer: Composer,
    shell: Shell,
    events: Option<EventSender>,
}

impl ChatClient {
    pub fn new(ctx: ChatContext) -> Self {
        Self {
            session: SessionStore::new(ctx.clone()),
            ctx,
            chat: None,
            composer: Composer::new(),
            shell: Shell::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    /// Restore the session and decide which screen to show.
    pub async fn start(&mut self) -> Result<Screen, ChatError> {
        match self.session.restore().await.cloned() {
            Ok(me) => {
                self.enter_chat(me).await;
                Ok(Screen::Chat)
            }
            Err(ChatError::Auth(e)) => {
                info!(reason = %e, "No session, showing sign-in");
                Ok(Screen::SignIn)
            }
            Err(e) => Err(e),
        }
    }

    /// Follow a session change from [`SessionStore::watch`].
    pub async fn on_session_changed(&mut self, session: Option<Session>) -> Result<Screen, ChatError> {
        let previous = self.session.user_id().cloned();
        let me = match self.session.on_session_changed(session).await {
            Ok(profile) => profile.cloned(),
            Err(ChatError::Auth(e)) => {
                warn!(reason = %e, "Session change without a usable profile");
                None
            }
            Err(e) => return Err(e),
        };

        match me {
            Some(me) if previous.as_ref() == Some(&me.id) && self.chat.is_some() => Ok(Screen::Chat),
            Some(me) => {
                self.leave_chat().await;
                self.enter_chat(me).await;
                Ok(Screen::Chat)
            }
            None => {
                self.leave_chat().await;
                Ok(Screen::SignIn)
            }
        }
    }

    async fn enter_chat(&mut self, me: Profile) {
        let mut directory = Directory::new(self.ctx.clone(), me.id.clone());
        // A failed load is shown as a banner; the chat screen still opens.
        let _ = directory.refresh().await;

        let mut conversation = Conversation::new(self.ctx.clone(), me);
        if let Some(tx) = &self.events {
            conversation = conversation.with_events(tx.clone());
        }
        self.chat = Some(ChatState {
            directory,
            conversation,
        });
    }

    async fn leave_chat(&mut self) {
        if let Some(mut chat) = self.chat.take() {
            chat.conversation.close().await;
        }
        self.composer = Composer::new();
        self.shell = Shell::new();
    }

    pub fn screen(&self) -> Screen {
        if self.chat.is_some() {
            Screen::Chat
        } else {
            Screen::SignIn
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn directory(&self) -> Option<&Directory> {
        self.chat.as_ref().map(|c| &c.directory)
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.chat.as_ref().map(|c| &c.conversation)
    }

    pub fn conversation_mut(&mut self) -> Option<&mut Conversation> {
        self.chat.as_mut().map(|c| &mut c.conversation)
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn shell_mut(&mut self) -> &mut Shell {
        &mut self.shell
    }

    pub async fn refresh_directory(&mut self) -> Result<usize, ChatError> {
        match self.chat.as_mut() {
            Some(chat) => chat.directory.refresh().await,
            None => Ok(0),
        }
    }

    /// Open the conversation with `peer`.  Unknown ids are ignored.
    pub async fn select_peer(&mut self, peer: &ProfileId) -> Result<(), ChatError> {
        let Some(chat) = self.chat.as_mut() else {
            return Ok(());
        };
        let Some(profile) = chat.directory.select(peer) else {
            warn!(peer = %peer, "Selected peer is not in the directory");
            return Ok(());
        };
        self.shell.close_sidebar();
        chat.conversation.select_peer(profile).await
    }

    /// Send the composer's draft to the selected peer.
    pub async fn send(&mut self) -> Result<Option<MessageId>, ChatError> {
        match self.chat.as_mut() {
            Some(chat) => self.composer.send(&mut chat.conversation).await,
            None => Ok(None),
        }
    }

    pub async fn rename(&mut self, username: &str) -> Result<bool, ChatError> {
        let changed = self.session.rename(username).await?;
        if changed {
            if let (Some(chat), Some(me)) = (self.chat.as_mut(), self.session.profile()) {
                chat.conversation.set_me(me.clone());
            }
        }
        Ok(changed)
    }

    pub async fn sign_out(&mut self) -> Result<(), ChatError> {
        self.leave_chat().await;
        self.session.sign_out().await
    }

    pub fn notification_permission(&self) -> NotificationPermission {
        self.ctx.notifier.permission()
    }

    /// Answer the shell's "Enable notifications" prompt.
    pub fn request_notifications(&self) -> NotificationPermission {
        let permission = self.ctx.notifier.request_permission();
        info!(?permission, "Notification permission requested");
        permission
    }

    /// Handle queued realtime events and due read receipts without waiting.
    pub async fn pump(&mut self) -> usize {
        let Some(chat) = self.chat.as_mut() else {
            return 0;
        };
        let handled = chat.conversation.drain_events();
        handled + chat.conversation.flush_read_receipts(Instant::now()).await
    }

    pub fn render(&self) -> Option<ShellView> {
        let chat = self.chat.as_ref()?;
        Some(self.shell.render(
            &self.session,
            &chat.directory,
            &chat.conversation,
            self.notification_permission(),
        ))
    }
}
