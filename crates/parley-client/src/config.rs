//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so the client runs with no configuration.

use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{
    DEFAULT_STORAGE_BUCKET, MAX_UPLOAD_SIZE, READ_RECEIPT_DELAY_MS, SIGNED_URL_TTL_SECS,
};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Object storage bucket for attachments.
    /// Env: `PARLEY_BUCKET`
    /// Default: `images`
    pub bucket: String,

    /// Lifetime of attachment URLs.
    /// Env: `PARLEY_SIGNED_URL_TTL_SECS`
    /// Default: one year.
    pub signed_url_ttl_secs: u64,

    /// How long an incoming message must stay visible before it is marked read.
    /// Env: `PARLEY_READ_RECEIPT_DELAY_MS`
    /// Default: `500`
    pub read_receipt_delay: Duration,

    /// Largest attachment accepted for upload (50 MiB).
    /// Env: `PARLEY_MAX_UPLOAD_BYTES`
    pub max_upload_bytes: usize,

    /// Local data directory (database, object storage).
    /// Env: `PARLEY_DATA_DIR`
    /// Default: the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_STORAGE_BUCKET.to_string(),
            signed_url_ttl_secs: SIGNED_URL_TTL_SECS,
            read_receipt_delay: Duration::from_millis(READ_RECEIPT_DELAY_MS),
            max_upload_bytes: MAX_UPLOAD_SIZE,
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(bucket) = lookup("PARLEY_BUCKET") {
            if bucket.is_empty() || bucket.contains('/') {
                tracing::warn!(value = %bucket, "Invalid PARLEY_BUCKET, using default");
            } else {
                config.bucket = bucket;
            }
        }

        if let Some(val) = lookup("PARLEY_SIGNED_URL_TTL_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.signed_url_ttl_secs = n,
                _ => tracing::warn!(value = %val, "Invalid PARLEY_SIGNED_URL_TTL_SECS, using default"),
            }
        }

        if let Some(val) = lookup("PARLEY_READ_RECEIPT_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.read_receipt_delay = Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid PARLEY_READ_RECEIPT_DELAY_MS, using default")
                }
            }
        }

        if let Some(val) = lookup("PARLEY_MAX_UPLOAD_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_bytes = n,
                _ => tracing::warn!(value = %val, "Invalid PARLEY_MAX_UPLOAD_BYTES, using default"),
            }
        }

        if let Some(dir) = lookup("PARLEY_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        config
    }

    /// The configured data directory, or the platform default.
    pub fn resolve_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| parley_store::database::default_data_dir().ok())
    }
}
