//! The three-message sign-in handshake against a decentralized identity
//! provider.
//!
//! 1. [`HandshakeManager::begin_sign_in`] builds a signed auth request and
//!    returns the URI the UI host navigates the user to.
//! 2. The provider's web flow authenticates the user and redirects back with
//!    a response token sealed to the transit key.
//! 3. [`HandshakeManager::complete_sign_in`] opens and verifies the token and
//!    installs the signed-in credentials.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    config::Scope,
    defaults::{
        AUTH_REQUEST_TTL_SECS, AUTH_REQUEST_VERSION, AUTH_RESPONSE_VERSION,
        DEFAULT_PROVIDER_AUTH_URI,
    },
    error::AuthKitError,
    keys::{did_for_verifying_key, AppPrivateKey, SealedPayload, TransitKeyPair},
    session::{SessionHandle, SessionState, UserData},
};

/// Claims carried by an outgoing auth request token.
///
/// Serialized as camelCase JSON, base64url-encoded and signed with the
/// transit signing key; the provider's web flow decodes it from the
/// `authRequest` query parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequestPayload {
    /// Request format version.
    pub version: u32,
    /// Origin URI of the requesting application.
    pub app_domain: String,
    /// Absolute URI of the application manifest.
    pub manifest_uri: String,
    /// Absolute URI the provider redirects back to.
    pub redirect_uri: String,
    /// Permission scopes requested at sign-in.
    pub scopes: Vec<Scope>,
    /// base64url x25519 public key the response must be sealed to.
    pub transit_public_key: String,
    /// base64url ed25519 key that signed this request.
    pub signing_public_key: String,
    /// Issued-at, UNIX seconds.
    pub iat: u64,
    /// Expiry, UNIX seconds.
    pub exp: u64,
}

/// Claims carried by a decrypted auth response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponsePayload {
    /// Response format version.
    pub version: u32,
    /// Decentralized identifier of the authenticated user.
    pub decentralized_id: String,
    /// Base URL of the user's storage hub.
    pub hub_url: String,
    /// Address of the user's storage root under the hub.
    pub storage_address: String,
    /// base64url app-scoped private key (32 bytes).
    pub app_private_key: String,
    /// Issued-at, UNIX seconds.
    pub iat: u64,
    /// Expiry, UNIX seconds.
    pub exp: u64,
}

/// Signature framing inside the sealed response: the canonical payload bytes
/// are signed as-is, so verification never depends on JSON field ordering.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedResponse {
    pub(crate) payload: Vec<u8>,
    pub(crate) public_key: Vec<u8>,
    pub(crate) signature: Vec<u8>,
}

/// Drives sign-in handshakes for a session.
#[derive(Debug, Clone)]
pub struct HandshakeManager {
    provider_uri: String,
}

impl Default for HandshakeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeManager {
    /// Manager pointed at the default identity provider web flow.
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider_uri: DEFAULT_PROVIDER_AUTH_URI.to_string(),
        }
    }

    /// Manager pointed at a custom identity provider web flow.
    #[must_use]
    pub fn with_provider(provider: &Url) -> Self {
        Self {
            provider_uri: provider.to_string(),
        }
    }

    /// Starts a sign-in handshake and returns the auth request URI to hand to
    /// the UI host.
    ///
    /// `now` overrides the clock (UNIX seconds) and defaults to the system
    /// time.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::AlreadyInProgress`] if a handshake is already awaiting
    /// its redirect, [`AuthKitError::SessionInvalidated`] if the session was
    /// replaced. Re-starting from `SignedIn` or `SignedOut` is permitted.
    pub fn begin_sign_in(
        &self,
        session: &SessionHandle,
        now: Option<u64>,
    ) -> Result<String, AuthKitError> {
        let now = resolve_now(now)?;
        let mut record = session.write();
        if record.invalidated {
            return Err(AuthKitError::SessionInvalidated);
        }
        if record.state == SessionState::AwaitingRedirect {
            return Err(AuthKitError::AlreadyInProgress);
        }

        let transit = TransitKeyPair::generate();
        let payload = AuthRequestPayload {
            version: AUTH_REQUEST_VERSION,
            app_domain: record.config.app_domain().to_string(),
            manifest_uri: record.config.manifest_uri().to_string(),
            redirect_uri: record.config.redirect_uri().to_string(),
            scopes: record.config.scopes().to_vec(),
            transit_public_key: URL_SAFE_NO_PAD.encode(transit.dh_public_bytes()),
            signing_public_key: URL_SAFE_NO_PAD
                .encode(transit.verifying_key_bytes()),
            iat: now,
            exp: now + AUTH_REQUEST_TTL_SECS,
        };
        let payload_bytes = serde_json::to_vec(&payload)
            .map_err(|err| AuthKitError::Serialization(err.to_string()))?;
        let signature = transit.sign(&payload_bytes);
        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload_bytes),
            URL_SAFE_NO_PAD.encode(signature)
        );

        record.transit = Some(transit);
        record.state = SessionState::AwaitingRedirect;
        // re-login from SignedIn starts a fresh identity; userData is only
        // valid while the state is SignedIn
        record.user_data = None;
        record.epoch += 1;
        log::info!("sign-in handshake started for {}", payload.app_domain);
        Ok(format!("{}?authRequest={token}", self.provider_uri))
    }

    /// Consumes the redirect callback token and finalizes the sign-in.
    ///
    /// On success the session moves to `SignedIn`, the transit key is
    /// discarded and the new [`UserData`] is returned. On any failure the
    /// session resets to `Uninitialized` so the caller can retry cleanly.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::NoHandshakeInProgress`] without a pending handshake;
    /// [`AuthKitError::Decryption`] if the token is malformed or was sealed
    /// to a different transit key; [`AuthKitError::SignatureInvalid`] if the
    /// provider signature or identifier binding does not verify;
    /// [`AuthKitError::HandshakeExpired`] if the token expired.
    pub fn complete_sign_in(
        &self,
        session: &SessionHandle,
        response_token: &str,
        now: Option<u64>,
    ) -> Result<UserData, AuthKitError> {
        let now = resolve_now(now)?;
        let mut record = session.write();
        if record.invalidated {
            return Err(AuthKitError::SessionInvalidated);
        }
        if record.state != SessionState::AwaitingRedirect {
            return Err(AuthKitError::NoHandshakeInProgress);
        }
        let transit = record
            .transit
            .take()
            .ok_or(AuthKitError::NoHandshakeInProgress)?;

        match finalize(&transit, response_token, now) {
            Ok(user_data) => {
                record.user_data = Some(user_data.clone());
                record.state = SessionState::SignedIn;
                record.epoch += 1;
                log::info!("signed in as {}", user_data.decentralized_id);
                Ok(user_data)
            }
            Err(err) => {
                record.state = SessionState::Uninitialized;
                record.user_data = None;
                log::warn!("sign-in handshake failed: {err}");
                Err(err)
            }
        }
    }

    /// Abandons a pending handshake, discarding the transit key.
    ///
    /// Safe to call when no handshake is in progress (no-op).
    ///
    /// # Errors
    ///
    /// [`AuthKitError::SessionInvalidated`] if the session was replaced.
    pub fn cancel_sign_in(
        &self,
        session: &SessionHandle,
    ) -> Result<(), AuthKitError> {
        let mut record = session.write();
        if record.invalidated {
            return Err(AuthKitError::SessionInvalidated);
        }
        if record.state == SessionState::AwaitingRedirect {
            record.transit = None;
            record.state = SessionState::Uninitialized;
            log::debug!("sign-in handshake cancelled");
        }
        Ok(())
    }
}

fn finalize(
    transit: &TransitKeyPair,
    response_token: &str,
    now: u64,
) -> Result<UserData, AuthKitError> {
    let raw = URL_SAFE_NO_PAD.decode(response_token.trim()).map_err(|_| {
        AuthKitError::Decryption(
            "response token is not valid base64url".to_string(),
        )
    })?;
    let sealed: SealedPayload =
        ciborium::de::from_reader(raw.as_slice()).map_err(|_| {
            AuthKitError::Decryption("response token envelope is malformed".to_string())
        })?;
    let plaintext = transit.open(&sealed)?;

    let signed: SignedResponse = ciborium::de::from_reader(plaintext.as_slice())
        .map_err(|_| {
            AuthKitError::Decryption("decrypted response is malformed".to_string())
        })?;
    let verifying_key = verify_provider_signature(&signed)?;

    let payload: AuthResponsePayload = serde_json::from_slice(&signed.payload)
        .map_err(|_| {
            AuthKitError::Decryption("response payload is malformed".to_string())
        })?;
    if payload.version != AUTH_RESPONSE_VERSION {
        return Err(AuthKitError::Decryption(format!(
            "unsupported response version {}",
            payload.version
        )));
    }
    if payload.exp <= now {
        return Err(AuthKitError::HandshakeExpired);
    }
    if payload.decentralized_id != did_for_verifying_key(&verifying_key) {
        return Err(AuthKitError::SignatureInvalid(
            "identifier is not bound to the signing key".to_string(),
        ));
    }

    let key_bytes = URL_SAFE_NO_PAD
        .decode(&payload.app_private_key)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or_else(|| {
            AuthKitError::Decryption(
                "app private key must be 32 base64url bytes".to_string(),
            )
        })?;

    Ok(UserData {
        decentralized_id: payload.decentralized_id,
        hub_url: payload.hub_url,
        storage_address: payload.storage_address,
        app_private_key: AppPrivateKey::from_bytes(key_bytes),
    })
}

fn verify_provider_signature(
    signed: &SignedResponse,
) -> Result<[u8; 32], AuthKitError> {
    let key_bytes: [u8; 32] =
        signed.public_key.as_slice().try_into().map_err(|_| {
            AuthKitError::SignatureInvalid(
                "provider key must be 32 bytes".to_string(),
            )
        })?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| {
        AuthKitError::SignatureInvalid("provider key is not valid".to_string())
    })?;
    let signature_bytes: [u8; 64] =
        signed.signature.as_slice().try_into().map_err(|_| {
            AuthKitError::SignatureInvalid(
                "signature must be 64 bytes".to_string(),
            )
        })?;
    verifying_key
        .verify(&signed.payload, &Signature::from_bytes(&signature_bytes))
        .map_err(|_| {
            AuthKitError::SignatureInvalid(
                "provider signature does not verify".to_string(),
            )
        })?;
    Ok(key_bytes)
}

pub(crate) fn resolve_now(now: Option<u64>) -> Result<u64, AuthKitError> {
    now.map_or_else(
        || {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .map_err(|err| {
                    AuthKitError::Serialization(format!(
                        "system clock is before the UNIX epoch: {err}"
                    ))
                })
        },
        Ok,
    )
}
