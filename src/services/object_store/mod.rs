//! Object storage backends.
//!
//! The [`ObjectStore`] trait abstracts over where image bytes physically
//! live. [`local::LocalObjectStore`] keeps them on disk and serves them
//! through HMAC-signed links; `s3::S3ObjectStore` (feature `s3`) forwards to
//! an S3 bucket and hands out presigned URLs.

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;
pub mod signing;

use bytes::Bytes;
use std::{future::Future, pin::Pin, time::Duration};
use thiserror::Error;

pub use local::LocalObjectStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// The store could not be reached or failed mid-operation.
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("object `{0}` not found")]
    NotFound(String),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

pub type ObjectFuture<'a, T> = Pin<Box<dyn Future<Output = ObjectStoreResult<T>> + Send + 'a>>;

/// Async object storage contract.
pub trait ObjectStore: Send + Sync + 'static {
    /// Write `data` under `key`, replacing anything already there.
    fn put(&self, key: &str, data: Bytes, content_type: &str) -> ObjectFuture<'_, ()>;

    /// Remove the object under `key`. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> ObjectFuture<'_, ()>;

    /// Mint a URL granting read access to `key` for `ttl`.
    ///
    /// The object is not required to exist.
    fn signed_read_url(&self, key: &str, ttl: Duration) -> ObjectFuture<'_, String>;

    /// Check whether an object exists under `key`.
    fn exists(&self, key: &str) -> ObjectFuture<'_, bool>;

    /// Short backend name for logs and readiness output.
    fn backend(&self) -> &'static str;
}

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Basic key validation to avoid trivial path traversal vectors.
pub fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
    let reject = || Err(ObjectStoreError::InvalidKey(key.to_string()));
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return reject();
    }
    if key.starts_with('/') || key.contains("..") {
        return reject();
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'?' || b == b'#')
    {
        return reject();
    }
    Ok(())
}
