/// Default object storage bucket for attachments
pub const DEFAULT_STORAGE_BUCKET: &str = "images";

/// Lifetime of attachment signed URLs in seconds (one year)
pub const SIGNED_URL_TTL_SECS: u64 = 31_536_000;

/// How long a message must stay visible before it is marked read, in milliseconds
pub const READ_RECEIPT_DELAY_MS: u64 = 500;

/// Maximum attachment size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Buffer size of a single subscription's event channel
pub const FEED_CHANNEL_CAPACITY: usize = 256;

/// Buffer size of the backend-wide change broadcast
pub const FEED_BROADCAST_CAPACITY: usize = 1024;

/// Prefix of realtime conversation topics
pub const TOPIC_PREFIX: &str = "conversation";

/// Notification tag used for incoming messages so they replace each other
pub const NOTIFICATION_TAG: &str = "new-message";

/// Display name used when a sender profile is not known
pub const UNKNOWN_USER: &str = "Unknown User";

/// MIME type assumed when an attachment carries none
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
