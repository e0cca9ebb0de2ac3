#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! The request gateway a scripting-layer bridge calls into.
//!
//! [`Gateway`] owns exactly one session handle at a time and exposes the
//! caller surface of the original bridge: configuration arrives as a JSON
//! map, results leave as JSON maps, and every failure is a stable
//! `code + message` pair. All protocol behavior lives in `authkit-core`;
//! this crate only validates inputs, dispatches, and marshals results.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Map, Value};
use thiserror::Error;

use authkit_core::{
    storage::{FileContent, GetOptions, PutOptions, StorageBackend, StorageClient},
    AppConfig, AuthKitError, HandshakeManager, SessionHandle, SessionStore,
};

/// A caller-visible failure: a stable code plus a human-readable message.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    /// Stable error code, e.g. `session_not_loaded`.
    pub code: String,
    /// Human-readable description of the failure.
    pub message: String,
}

impl From<AuthKitError> for GatewayError {
    fn from(err: AuthKitError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn invalid_config(message: &str) -> GatewayError {
    GatewayError::from(AuthKitError::InvalidConfig(message.to_string()))
}

/// Result map returned by gateway operations.
pub type GatewayResult = Result<Value, GatewayError>;

/// Single entry point for all caller operations.
///
/// Holds the one live session, the handshake manager and the storage client,
/// and guarantees that no operation is dispatched without a loaded session.
pub struct Gateway {
    sessions: SessionStore,
    handshake: HandshakeManager,
    storage: StorageClient,
}

impl Gateway {
    /// Gateway storing files through `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            sessions: SessionStore::new(),
            handshake: HandshakeManager::new(),
            storage: StorageClient::new(backend),
        }
    }

    /// Creates (or replaces) the session from a caller configuration map:
    /// `{appDomain, manifestUrl?, redirectUrl?, scopes[]}`.
    ///
    /// # Errors
    ///
    /// `invalid_config` if the map is malformed or the configuration is
    /// rejected.
    pub fn create_session(&self, config: &Value) -> GatewayResult {
        let map = config
            .as_object()
            .ok_or_else(|| invalid_config("config must be an object"))?;
        let app_domain = required_str(map, "appDomain")?;
        let manifest_path = optional_str(map, "manifestUrl")?;
        let redirect_path = optional_str(map, "redirectUrl")?;

        let raw_scopes = map
            .get("scopes")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid_config("'scopes' array is required"))?
            .iter()
            .map(|value| {
                value
                    .as_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| invalid_config("scopes must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let scopes = AppConfig::parse_scopes(&raw_scopes)?;

        let config = AppConfig::new(app_domain, manifest_path, redirect_path, scopes)?;
        let handle = self.sessions.create(config);
        log::debug!("gateway created session {}", handle.id());
        Ok(json!({ "loaded": true }))
    }

    /// Reports whether the current session is signed in.
    ///
    /// # Errors
    ///
    /// `session_not_loaded` if no session was created.
    pub fn is_user_signed_in(&self) -> GatewayResult {
        let session = self.session()?;
        Ok(json!({ "signedIn": session.is_signed_in() }))
    }

    /// Begins the sign-in handshake and returns the auth request URI the UI
    /// host must open.
    ///
    /// # Errors
    ///
    /// `session_not_loaded` without a session,
    /// `sign_in_already_in_progress` when a handshake is pending.
    pub fn sign_in(&self) -> GatewayResult {
        let session = self.session()?;
        let uri = self.handshake.begin_sign_in(&session, None)?;
        Ok(json!({ "authRequestUri": uri }))
    }

    /// Consumes the redirect callback token and finalizes the sign-in.
    ///
    /// # Errors
    ///
    /// `session_not_loaded` without a session; otherwise the handshake
    /// failure codes (`decryption_error`, `signature_invalid`,
    /// `handshake_expired`, `no_handshake_in_progress`).
    pub fn complete_sign_in(&self, response_token: &str) -> GatewayResult {
        let session = self.session()?;
        let user = self
            .handshake
            .complete_sign_in(&session, response_token, None)?;
        Ok(json!({ "decentralizedID": user.decentralized_id }))
    }

    /// Abandons a pending handshake, if any.
    ///
    /// # Errors
    ///
    /// `session_not_loaded` without a session, `session_invalidated` if the
    /// held session was replaced.
    pub fn cancel_sign_in(&self) -> GatewayResult {
        let session = self.session()?;
        self.handshake.cancel_sign_in(&session)?;
        Ok(json!({ "cancelled": true }))
    }

    /// Signs the user out, clearing credentials.
    ///
    /// # Errors
    ///
    /// `session_not_loaded` without a session.
    pub fn sign_user_out(&self) -> GatewayResult {
        let session = self.session()?;
        session.sign_out()?;
        Ok(json!({ "signedOut": true }))
    }

    /// Returns the signed-in user's decentralized identifier.
    ///
    /// # Errors
    ///
    /// `session_not_loaded` without a session or when not signed in.
    pub fn load_user_data(&self) -> GatewayResult {
        let session = self.session()?;
        let user = session.load_user_data()?;
        Ok(json!({ "decentralizedID": user.decentralized_id }))
    }

    /// Stores text content at `path`; options: `{encrypt?: bool}`, default
    /// encrypted.
    ///
    /// # Errors
    ///
    /// `session_not_loaded`, `storage_write_error`, `timeout`, or
    /// `session_invalidated`.
    pub async fn put_file(
        &self,
        path: &str,
        content: &str,
        options: &Value,
    ) -> GatewayResult {
        let session = self.session()?;
        let encrypt = options
            .get("encrypt")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let url = self
            .storage
            .put_file(
                &session,
                path,
                FileContent::Text(content.to_string()),
                PutOptions { encrypt },
            )
            .await?;
        Ok(json!({ "fileUrl": url }))
    }

    /// Fetches the file at `path`; options: `{decrypt?: bool}`, default
    /// decrypted. Text content comes back under `fileContents`, binary
    /// content base64-encoded under `fileContentsEncoded`.
    ///
    /// # Errors
    ///
    /// `session_not_loaded`, `storage_read_error`, `decryption_error`, or
    /// `timeout`.
    pub async fn get_file(&self, path: &str, options: &Value) -> GatewayResult {
        let session = self.session()?;
        let decrypt = options
            .get("decrypt")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let content = self
            .storage
            .get_file(&session, path, GetOptions { decrypt })
            .await?;
        Ok(match content {
            FileContent::Text(text) => json!({ "fileContents": text }),
            FileContent::Binary(bytes) => {
                json!({ "fileContentsEncoded": STANDARD.encode(bytes) })
            }
        })
    }

    fn session(&self) -> Result<SessionHandle, GatewayError> {
        self.sessions
            .current()
            .ok_or_else(|| GatewayError::from(AuthKitError::SessionNotLoaded))
    }
}

fn required_str<'a>(
    map: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, GatewayError> {
    map.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_config(&format!("'{key}' is required")))
}

fn optional_str(
    map: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, GatewayError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(invalid_config(&format!("'{key}' must be a string"))),
    }
}
