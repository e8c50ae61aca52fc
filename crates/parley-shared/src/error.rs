use thiserror::Error;

/// Errors returned by collaborator implementations (auth, stores, feed,
/// object storage).
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Record not found")]
    NotFound,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client-side error taxonomy.  The `Display` text of each variant is the
/// string surfaced to the user.
#[derive(Error, Debug)]
pub enum ChatError {
    /// No usable session; the caller shows the sign-in screen.
    #[error("Authentication required: {0}")]
    Auth(#[source] BackendError),

    #[error("Could not fetch profiles: {0}")]
    FetchProfiles(#[source] BackendError),

    #[error("Could not fetch messages: {0}")]
    FetchMessages(#[source] BackendError),

    /// Attachment upload or URL signing failed; the send was aborted.
    #[error("Error sending message: {0}")]
    Upload(#[source] BackendError),

    /// Message insert failed.
    #[error("Error sending message: {0}")]
    Send(#[source] BackendError),

    #[error("Real-time connection failed: {0}")]
    Subscription(String),

    /// Best-effort writes (read receipts).  Logged, never surfaced.
    #[error("Could not update message: {0}")]
    Update(#[source] BackendError),

    #[error("Could not update username: {0}")]
    Rename(#[source] BackendError),

    #[error("Invalid change payload: {0}")]
    InvalidPayload(#[from] ProtocolError),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Message has neither content nor attachment")]
    EmptyMessage,
}
