//! Filesystem object storage with signed URLs.
//!
//! Objects live under `<base>/<bucket>/<path>`.  A signed URL has the form
//! `parley://<bucket>/<path>?expires=<unix secs>&sig=<hex>` where `sig` is a
//! BLAKE3 keyed hash of `<bucket>/<path>:<expires>`.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

const URL_SCHEME: &str = "parley://";

/// Validate a relative object path and join it under `base`.
/// Rejects absolute paths and any `..` component.
fn ensure_within(base: &Path, object_path: &str) -> Result<PathBuf> {
    if object_path.is_empty() || object_path.contains('\\') {
        return Err(StoreError::Invalid(format!("invalid object path: {object_path:?}")));
    }

    let mut resolved = base.to_path_buf();
    for component in Path::new(object_path).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            _ => {
                return Err(StoreError::Invalid(
                    "Path traversal detected".to_string(),
                ));
            }
        }
    }
    if !resolved.starts_with(base) || resolved == base {
        return Err(StoreError::Invalid("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    bucket_path: PathBuf,
    bucket: String,
    max_size: usize,
    signing_key: [u8; 32],
}

impl ObjectStore {
    pub async fn new(
        base_path: &Path,
        bucket: &str,
        max_size: usize,
        signing_key: [u8; 32],
    ) -> Result<Self> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == ".." {
            return Err(StoreError::Invalid(format!("invalid bucket name: {bucket:?}")));
        }
        let bucket_path = base_path.join(bucket);
        fs::create_dir_all(&bucket_path).await?;

        info!(path = %bucket_path.display(), bucket, "Object store initialized");

        Ok(Self {
            bucket_path,
            bucket: bucket.to_string(),
            max_size,
            signing_key,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store `data` at `path`.  Existing objects are never overwritten.
    pub async fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        if data.len() > self.max_size {
            return Err(StoreError::Invalid(format!(
                "object too large: {} bytes (max {})",
                data.len(),
                self.max_size
            )));
        }

        let target = ensure_within(&self.bucket_path, path)?;
        if fs::try_exists(&target).await? {
            return Err(StoreError::Invalid(format!("object already exists: {path}")));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&target, data).await?;

        debug!(bucket = %self.bucket, path, size = data.len(), "Stored object");
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let target = ensure_within(&self.bucket_path, path)?;
        if !fs::try_exists(&target).await? {
            return Err(StoreError::NotFound);
        }
        Ok(fs::read(&target).await?)
    }

    /// Issue a URL for an existing object, valid for `ttl_secs`.
    pub async fn sign_url(&self, path: &str, ttl_secs: u64) -> Result<String> {
        let target = ensure_within(&self.bucket_path, path)?;
        if !fs::try_exists(&target).await? {
            return Err(StoreError::NotFound);
        }

        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl);
        let sig = self.signature(path, expires).to_hex();
        Ok(format!(
            "{URL_SCHEME}{}/{path}?expires={expires}&sig={sig}",
            self.bucket
        ))
    }

    /// Check a signed URL against `now` (unix seconds) and return the object
    /// path it grants access to.
    pub fn verify_url(&self, url: &str, now: i64) -> Result<String> {
        let invalid = || StoreError::Invalid("malformed signed URL".to_string());

        let rest = url.strip_prefix(URL_SCHEME).ok_or_else(invalid)?;
        let (location, query) = rest.split_once('?').ok_or_else(invalid)?;
        let (bucket, path) = location.split_once('/').ok_or_else(invalid)?;
        if bucket != self.bucket {
            return Err(StoreError::Invalid(format!("wrong bucket: {bucket}")));
        }

        let mut expires = None;
        let mut sig = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse::<i64>().ok(),
                Some(("sig", v)) => sig = Some(v),
                _ => {}
            }
        }
        let expires = expires.ok_or_else(invalid)?;
        let sig = sig.ok_or_else(invalid)?;

        let provided: [u8; 32] = hex::decode(sig)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(invalid)?;
        // blake3::Hash equality is constant-time
        if self.signature(path, expires) != blake3::Hash::from_bytes(provided) {
            return Err(StoreError::Invalid("signature mismatch".to_string()));
        }
        if now > expires {
            return Err(StoreError::Invalid("signed URL expired".to_string()));
        }
        Ok(path.to_string())
    }

    fn signature(&self, path: &str, expires: i64) -> blake3::Hash {
        let message = format!("{}/{path}:{expires}", self.bucket);
        blake3::keyed_hash(&self.signing_key, message.as_bytes())
    }
}
