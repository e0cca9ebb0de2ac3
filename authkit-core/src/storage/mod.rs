//! Path-addressed encrypted file storage against a per-user storage root.
//!
//! The [`StorageClient`] snapshots the session's credentials when an
//! operation starts and re-checks them before reporting success, so a
//! sign-out or session replacement racing a write is observed rather than
//! silently completing against stale credentials.

mod envelope;
mod http;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
mod traits;

pub use http::HttpBackend;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryBackend;
pub use traits::{BackendError, StorageBackend, StorageRoot, StoredObject};

use std::sync::Arc;

use crate::{error::AuthKitError, session::SessionHandle};

/// File content, preserving the text/binary distinction across the storage
/// boundary.
///
/// Callers must be able to branch on the distinction: text is handed over as
/// UTF-8, binary as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// UTF-8 text content.
    Text(String),
    /// Opaque binary content.
    Binary(Vec<u8>),
}

/// Options for a file write.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Encrypt the content with the app private key before transfer.
    pub encrypt: bool,
}

/// Options for a file read.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Decrypt the fetched envelope with the app private key.
    pub decrypt: bool,
}

/// Reads and writes files under the signed-in user's storage root.
///
/// Operations are independent: concurrent calls never contend on a client
/// lock, only on the backend itself.
pub struct StorageClient {
    backend: Arc<dyn StorageBackend>,
}

impl StorageClient {
    /// Client over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Stores `content` at `path` and returns the object's public URL.
    ///
    /// With `options.encrypt` the content is sealed into an envelope with the
    /// app private key; otherwise it is transferred verbatim.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::SessionNotLoaded`] unless the session is signed in,
    /// [`AuthKitError::SessionInvalidated`] if the session changed while the
    /// write was in flight, [`AuthKitError::Timeout`] on backend deadline,
    /// [`AuthKitError::StorageWrite`] on any other backend failure.
    pub async fn put_file(
        &self,
        session: &SessionHandle,
        path: &str,
        content: FileContent,
        options: PutOptions,
    ) -> Result<String, AuthKitError> {
        validate_path(path).map_err(AuthKitError::StorageWrite)?;
        let (user, epoch) = session.credentials()?;

        let (bytes, content_type) = if options.encrypt {
            (
                envelope::seal(&user.app_private_key, path, &content)?,
                envelope::ENVELOPE_CONTENT_TYPE,
            )
        } else {
            match content {
                FileContent::Text(text) => {
                    (text.into_bytes(), "text/plain; charset=utf-8")
                }
                FileContent::Binary(bytes) => {
                    (bytes, "application/octet-stream")
                }
            }
        };

        let url = self
            .backend
            .put_object(&user.storage_root(), path, bytes, content_type)
            .await
            .map_err(|err| match err {
                BackendError::Timeout(message) => AuthKitError::Timeout(message),
                BackendError::Unavailable(message) => {
                    AuthKitError::StorageWrite(message)
                }
            })?;

        // fail rather than report success against credentials that were
        // replaced mid-flight
        session.verify_epoch(epoch)?;
        log::debug!("stored `{path}` at {url}");
        Ok(url)
    }

    /// Fetches the file at `path`.
    ///
    /// With `options.decrypt` the fetched envelope is opened with the app
    /// private key; otherwise raw content is classified as text or binary by
    /// the backend-reported content type.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::SessionNotLoaded`] unless the session is signed in,
    /// [`AuthKitError::StorageRead`] if the object is absent or the backend
    /// fails, [`AuthKitError::Decryption`] if the envelope is malformed or
    /// fails its integrity check, [`AuthKitError::Timeout`] on backend
    /// deadline.
    pub async fn get_file(
        &self,
        session: &SessionHandle,
        path: &str,
        options: GetOptions,
    ) -> Result<FileContent, AuthKitError> {
        validate_path(path).map_err(AuthKitError::StorageRead)?;
        let (user, _epoch) = session.credentials()?;

        let object = self
            .backend
            .get_object(&user.storage_root(), path)
            .await
            .map_err(|err| match err {
                BackendError::Timeout(message) => AuthKitError::Timeout(message),
                BackendError::Unavailable(message) => {
                    AuthKitError::StorageRead(message)
                }
            })?
            .ok_or_else(|| {
                AuthKitError::StorageRead(format!("no file stored at `{path}`"))
            })?;

        if options.decrypt {
            envelope::open(&user.app_private_key, path, &object.bytes)
        } else {
            Ok(classify(object))
        }
    }
}

/// Maps a raw stored object to text or binary content using the
/// backend-reported content type.
fn classify(object: StoredObject) -> FileContent {
    let is_text = object.content_type.as_deref().is_some_and(|content_type| {
        content_type.starts_with("text/")
            || content_type.starts_with("application/json")
    });
    if is_text {
        match String::from_utf8(object.bytes) {
            Ok(text) => FileContent::Text(text),
            Err(err) => FileContent::Binary(err.into_bytes()),
        }
    } else {
        FileContent::Binary(object.bytes)
    }
}

fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("file path must not be empty".to_string());
    }
    if path.starts_with('/') {
        return Err(format!("file path `{path}` must be relative"));
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(format!("file path `{path}` contains invalid segments"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppConfig, Scope},
        handshake::HandshakeManager,
        provider::IdentityProvider,
        session::{SessionHandle, SessionStore},
    };
    use async_trait::async_trait;

    const NOW: u64 = 1_700_000_000;

    fn signed_in_session(store: &SessionStore) -> SessionHandle {
        let config = AppConfig::new(
            "https://app.example.com",
            None,
            None,
            vec![Scope::StoreWrite],
        )
        .expect("config");
        let session = store.create(config);
        let manager = HandshakeManager::new();
        let provider = IdentityProvider::new("https://hub.example.com");
        let uri = manager.begin_sign_in(&session, Some(NOW)).expect("begin");
        let token = provider.respond(&uri, NOW).expect("respond");
        manager
            .complete_sign_in(&session, &token, Some(NOW))
            .expect("complete");
        session
    }

    #[tokio::test]
    async fn test_encrypted_text_round_trip() {
        let store = SessionStore::new();
        let session = signed_in_session(&store);
        let client = StorageClient::new(Arc::new(MemoryBackend::new()));

        let url = client
            .put_file(
                &session,
                "notes/today.txt",
                FileContent::Text("dear diary".to_string()),
                PutOptions { encrypt: true },
            )
            .await
            .expect("put");
        assert!(url.contains("notes/today.txt"));

        let content = client
            .get_file(&session, "notes/today.txt", GetOptions { decrypt: true })
            .await
            .expect("get");
        assert_eq!(content, FileContent::Text("dear diary".to_string()));
    }

    #[tokio::test]
    async fn test_encrypted_binary_round_trip() {
        let store = SessionStore::new();
        let session = signed_in_session(&store);
        let client = StorageClient::new(Arc::new(MemoryBackend::new()));
        let payload: Vec<u8> = (0..=255).collect();

        client
            .put_file(
                &session,
                "blob.bin",
                FileContent::Binary(payload.clone()),
                PutOptions { encrypt: true },
            )
            .await
            .expect("put");

        let content = client
            .get_file(&session, "blob.bin", GetOptions { decrypt: true })
            .await
            .expect("get");
        assert_eq!(content, FileContent::Binary(payload));
    }

    #[tokio::test]
    async fn test_plain_content_classified_by_content_type() {
        let store = SessionStore::new();
        let session = signed_in_session(&store);
        let client = StorageClient::new(Arc::new(MemoryBackend::new()));

        client
            .put_file(
                &session,
                "readme.txt",
                FileContent::Text("plain".to_string()),
                PutOptions { encrypt: false },
            )
            .await
            .expect("put text");
        client
            .put_file(
                &session,
                "image.raw",
                FileContent::Binary(vec![1, 2, 3]),
                PutOptions { encrypt: false },
            )
            .await
            .expect("put binary");

        let text = client
            .get_file(&session, "readme.txt", GetOptions { decrypt: false })
            .await
            .expect("get text");
        assert_eq!(text, FileContent::Text("plain".to_string()));

        let binary = client
            .get_file(&session, "image.raw", GetOptions { decrypt: false })
            .await
            .expect("get binary");
        assert_eq!(binary, FileContent::Binary(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_get_missing_file_is_storage_read_error() {
        let store = SessionStore::new();
        let session = signed_in_session(&store);
        let client = StorageClient::new(Arc::new(MemoryBackend::new()));

        let err = client
            .get_file(&session, "never-written.txt", GetOptions::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, AuthKitError::StorageRead(_)));
    }

    #[tokio::test]
    async fn test_file_ops_require_signed_in_session() {
        let store = SessionStore::new();
        let session = store.create(
            AppConfig::new(
                "https://app.example.com",
                None,
                None,
                vec![Scope::StoreWrite],
            )
            .expect("config"),
        );
        let client = StorageClient::new(Arc::new(MemoryBackend::new()));

        let err = client
            .put_file(
                &session,
                "notes.txt",
                FileContent::Text("x".to_string()),
                PutOptions::default(),
            )
            .await
            .expect_err("must fail");
        assert!(matches!(err, AuthKitError::SessionNotLoaded));

        let err = client
            .get_file(&session, "notes.txt", GetOptions::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, AuthKitError::SessionNotLoaded));
    }

    #[tokio::test]
    async fn test_invalid_paths_are_rejected() {
        let store = SessionStore::new();
        let session = signed_in_session(&store);
        let client = StorageClient::new(Arc::new(MemoryBackend::new()));

        for path in ["", "/absolute.txt", "a//b.txt", "../escape.txt"] {
            let err = client
                .put_file(
                    &session,
                    path,
                    FileContent::Text("x".to_string()),
                    PutOptions::default(),
                )
                .await
                .expect_err("must fail");
            assert!(matches!(err, AuthKitError::StorageWrite(_)), "{path}");
        }
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_distinct_paths_both_succeed() {
        let store = SessionStore::new();
        let session = signed_in_session(&store);
        let backend = Arc::new(MemoryBackend::new());
        let client = StorageClient::new(Arc::clone(&backend) as Arc<dyn StorageBackend>);

        let (first, second) = tokio::join!(
            client.put_file(
                &session,
                "a.txt",
                FileContent::Text("first".to_string()),
                PutOptions { encrypt: true },
            ),
            client.put_file(
                &session,
                "b.txt",
                FileContent::Text("second".to_string()),
                PutOptions { encrypt: true },
            ),
        );
        first.expect("first put");
        second.expect("second put");
        assert_eq!(backend.len(), 2);
    }

    /// Backend that signs the session out between accepting the write and
    /// acknowledging it, simulating a sign-out racing an in-flight put.
    struct SignOutDuringPut {
        inner: MemoryBackend,
        session: SessionHandle,
    }

    #[async_trait]
    impl StorageBackend for SignOutDuringPut {
        async fn put_object(
            &self,
            root: &StorageRoot,
            path: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<String, BackendError> {
            let url = self.inner.put_object(root, path, bytes, content_type).await?;
            self.session.sign_out().map_err(|err| {
                BackendError::Unavailable(err.to_string())
            })?;
            Ok(url)
        }

        async fn get_object(
            &self,
            root: &StorageRoot,
            path: &str,
        ) -> Result<Option<StoredObject>, BackendError> {
            self.inner.get_object(root, path).await
        }
    }

    #[tokio::test]
    async fn test_put_racing_sign_out_fails_with_session_invalidated() {
        let store = SessionStore::new();
        let session = signed_in_session(&store);
        let backend = SignOutDuringPut {
            inner: MemoryBackend::new(),
            session: session.clone(),
        };
        let client = StorageClient::new(Arc::new(backend));

        let err = client
            .put_file(
                &session,
                "racy.txt",
                FileContent::Text("x".to_string()),
                PutOptions { encrypt: true },
            )
            .await
            .expect_err("must fail");
        assert!(matches!(err, AuthKitError::SessionInvalidated));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_timeout_error() {
        struct TimingOut;

        #[async_trait]
        impl StorageBackend for TimingOut {
            async fn put_object(
                &self,
                _root: &StorageRoot,
                _path: &str,
                _bytes: Vec<u8>,
                _content_type: &str,
            ) -> Result<String, BackendError> {
                Err(BackendError::Timeout("deadline exceeded".to_string()))
            }

            async fn get_object(
                &self,
                _root: &StorageRoot,
                _path: &str,
            ) -> Result<Option<StoredObject>, BackendError> {
                Err(BackendError::Timeout("deadline exceeded".to_string()))
            }
        }

        let store = SessionStore::new();
        let session = signed_in_session(&store);
        let client = StorageClient::new(Arc::new(TimingOut));

        let err = client
            .put_file(
                &session,
                "slow.txt",
                FileContent::Text("x".to_string()),
                PutOptions::default(),
            )
            .await
            .expect_err("must fail");
        assert!(matches!(err, AuthKitError::Timeout(_)));

        let err = client
            .get_file(&session, "slow.txt", GetOptions::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, AuthKitError::Timeout(_)));
    }
}
