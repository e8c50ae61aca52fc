//! Desktop notifications for incoming messages.

use parley_shared::constants::{NOTIFICATION_TAG, UNKNOWN_USER};
use parley_shared::{Message, NotificationPermission, Notifier};
use tracing::debug;

/// Title and body for an incoming message.
pub fn describe(message: &Message) -> (String, String) {
    let sender = message
        .sender
        .as_ref()
        .map(|p| p.username.as_str())
        .unwrap_or(UNKNOWN_USER);
    let title = format!("New message from {sender}");

    let body = match (&message.content, &message.attachment) {
        (Some(content), _) => content.clone(),
        (None, Some(file)) if !file.name.is_empty() => format!("Sent: {}.", file.name),
        (None, _) => "Sent: a file.".to_string(),
    };
    (title, body)
}

/// Fire a notification for `message` unless the window has focus or
/// permission was not granted.  Returns whether one was shown.
pub fn notify_incoming(notifier: &dyn Notifier, message: &Message) -> bool {
    if notifier.is_focused() {
        return false;
    }
    if notifier.permission() != NotificationPermission::Granted {
        debug!(msg_id = %message.id, "Notification permission not granted");
        return false;
    }
    let (title, body) = describe(message);
    notifier.notify(&title, &body, NOTIFICATION_TAG);
    true
}

/// Whether the shell should offer the "Enable notifications" prompt.
pub fn should_prompt(permission: NotificationPermission) -> bool {
    permission == NotificationPermission::Default
}

/// A notifier for headless use: permission denied, window always focused.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Denied
    }

    fn request_permission(&self) -> NotificationPermission {
        NotificationPermission::Denied
    }

    fn is_focused(&self) -> bool {
        true
    }

    fn notify(&self, _title: &str, _body: &str, _tag: &str) {}
}
