//! Draft input for the message composer.

use parley_shared::{ChatError, MessageId, OutgoingFile};

use crate::conversation::Conversation;

/// What the composer hands to the conversation on submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub content: Option<String>,
    pub file: Option<OutgoingFile>,
}

#[derive(Debug, Default)]
pub struct Composer {
    text: String,
    file: Option<OutgoingFile>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn attach(&mut self, file: OutgoingFile) {
        self.file = Some(file);
    }

    pub fn detach(&mut self) -> Option<OutgoingFile> {
        self.file.take()
    }

    pub fn attachment(&self) -> Option<&OutgoingFile> {
        self.file.as_ref()
    }

    pub fn can_submit(&self) -> bool {
        !self.text.trim().is_empty() || self.file.is_some()
    }

    /// Take the draft and reset the input.  `None` when there is nothing to send.
    pub fn take(&mut self) -> Option<Draft> {
        if !self.can_submit() {
            return None;
        }
        let text = std::mem::take(&mut self.text);
        Some(Draft {
            content: (!text.trim().is_empty()).then_some(text),
            file: self.file.take(),
        })
    }

    /// Submit the current draft to `conversation`.  The input is cleared
    /// before the send completes, even when it then fails.
    pub async fn send(&mut self, conversation: &mut Conversation) -> Result<Option<MessageId>, ChatError> {
        match self.take() {
            Some(draft) => conversation.submit(draft.content.as_deref(), draft.file).await,
            None => Ok(None),
        }
    }
}
