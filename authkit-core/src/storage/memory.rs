//! In-memory storage backend for tests.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;

use super::traits::{BackendError, StorageBackend, StorageRoot, StoredObject};

/// A backend keeping objects in a process-local map.
#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects, across all roots.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock is recovered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn object_key(root: &StorageRoot, path: &str) -> String {
        format!("{}/{}/{}", root.hub_url, root.address, path)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn put_object(
        &self,
        root: &StorageRoot,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let key = Self::object_key(root, path);
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                StoredObject {
                    bytes,
                    content_type: Some(content_type.to_string()),
                },
            );
        Ok(format!("{}/store/{}/{}", root.hub_url, root.address, path))
    }

    async fn get_object(
        &self,
        root: &StorageRoot,
        path: &str,
    ) -> Result<Option<StoredObject>, BackendError> {
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::object_key(root, path))
            .cloned())
    }
}
