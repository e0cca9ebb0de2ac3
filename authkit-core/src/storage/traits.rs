//! Backend interface the storage client drives.

use async_trait::async_trait;
use thiserror::Error;

/// Per-user namespace all file paths resolve under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageRoot {
    /// Base URL of the storage hub.
    pub hub_url: String,
    /// User-specific address under the hub.
    pub address: String,
}

impl StorageRoot {
    /// Builds a root from a hub URL and user address.
    #[must_use]
    pub fn new(hub_url: &str, address: &str) -> Self {
        Self {
            hub_url: hub_url.trim_end_matches('/').to_string(),
            address: address.to_string(),
        }
    }
}

/// Raw object fetched from a backend.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object bytes as stored.
    pub bytes: Vec<u8>,
    /// Content type reported by the backend, if any.
    pub content_type: Option<String>,
}

/// Failures reported by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),
    /// Any other backend failure, with a backend-supplied message.
    #[error("{0}")]
    Unavailable(String),
}

/// Path-addressed object transport against a storage provider.
///
/// Implementations must be safe to share across concurrent file operations;
/// the client never serializes calls through a global lock.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stores `bytes` at `path` under `root` and returns the object's public
    /// URL.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the write fails or times out.
    async fn put_object(
        &self,
        root: &StorageRoot,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError>;

    /// Fetches the object at `path` under `root`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the read fails or times out.
    async fn get_object(
        &self,
        root: &StorageRoot,
        path: &str,
    ) -> Result<Option<StoredObject>, BackendError>;
}
