//! A reference identity provider driving the handshake in-process.
//!
//! Stands in for the provider's web flow: it consumes an auth request URI and
//! produces the sealed response token the redirect callback would deliver.
//! Only available with the `test-utils` feature (or in this crate's tests).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use rand::{rngs::OsRng, RngCore};

use crate::{
    defaults::AUTH_RESPONSE_VERSION,
    error::AuthKitError,
    handshake::{AuthRequestPayload, AuthResponsePayload, SignedResponse},
    keys::{did_for_verifying_key, seal_to},
};

/// Validity window granted to responses issued by [`IdentityProvider::respond`].
const RESPONSE_TTL_SECS: u64 = 3600;

/// An in-process identity provider with a stable signing key.
pub struct IdentityProvider {
    signing: SigningKey,
    hub_url: String,
}

impl IdentityProvider {
    /// Creates a provider whose users live under `hub_url`.
    #[must_use]
    pub fn new(hub_url: &str) -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            hub_url: hub_url.to_string(),
        }
    }

    /// The decentralized identifier this provider signs in as.
    #[must_use]
    pub fn decentralized_id(&self) -> String {
        did_for_verifying_key(&self.signing.verifying_key().to_bytes())
    }

    /// Storage address assigned to this provider's user.
    #[must_use]
    pub fn storage_address(&self) -> String {
        // address is the identifier-specific suffix of the DID
        self.decentralized_id()
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Decodes and verifies the auth request embedded in a request URI.
    ///
    /// # Errors
    ///
    /// Returns [`AuthKitError::Serialization`] if the URI does not carry a
    /// well-formed token and [`AuthKitError::SignatureInvalid`] if the
    /// request signature does not verify.
    pub fn parse_auth_request(
        auth_request_uri: &str,
    ) -> Result<AuthRequestPayload, AuthKitError> {
        let (_, token) =
            auth_request_uri.split_once("authRequest=").ok_or_else(|| {
                AuthKitError::Serialization(
                    "missing authRequest parameter".to_string(),
                )
            })?;
        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or_else(|| {
                AuthKitError::Serialization("malformed request token".to_string())
            })?;
        let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| {
            AuthKitError::Serialization("request payload is not base64url".to_string())
        })?;
        let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| {
            AuthKitError::Serialization(
                "request signature is not base64url".to_string(),
            )
        })?;

        let payload: AuthRequestPayload = serde_json::from_slice(&payload_bytes)
            .map_err(|err| AuthKitError::Serialization(err.to_string()))?;

        let signing_key = decode_key32(&payload.signing_public_key)?;
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&signing_key)
            .map_err(|_| {
                AuthKitError::SignatureInvalid(
                    "request signing key is not valid".to_string(),
                )
            })?;
        let signature: [u8; 64] =
            signature.as_slice().try_into().map_err(|_| {
                AuthKitError::SignatureInvalid(
                    "request signature must be 64 bytes".to_string(),
                )
            })?;
        ed25519_dalek::Verifier::verify(
            &verifying_key,
            &payload_bytes,
            &ed25519_dalek::Signature::from_bytes(&signature),
        )
        .map_err(|_| {
            AuthKitError::SignatureInvalid(
                "request signature does not verify".to_string(),
            )
        })?;
        Ok(payload)
    }

    /// Issues a response token for the given auth request, valid for one hour
    /// from `now`.
    ///
    /// # Errors
    ///
    /// Propagates request parsing and sealing failures.
    pub fn respond(
        &self,
        auth_request_uri: &str,
        now: u64,
    ) -> Result<String, AuthKitError> {
        self.respond_at(auth_request_uri, now, now + RESPONSE_TTL_SECS)
    }

    /// Issues a response token with explicit `iat`/`exp` claims.
    ///
    /// # Errors
    ///
    /// Propagates request parsing and sealing failures.
    pub fn respond_at(
        &self,
        auth_request_uri: &str,
        iat: u64,
        exp: u64,
    ) -> Result<String, AuthKitError> {
        self.build_token(auth_request_uri, iat, exp, false)
    }

    /// Issues a token whose payload was modified after signing, so the
    /// provider signature no longer verifies.
    ///
    /// # Errors
    ///
    /// Propagates request parsing and sealing failures.
    pub fn respond_tampered(
        &self,
        auth_request_uri: &str,
        now: u64,
    ) -> Result<String, AuthKitError> {
        self.build_token(auth_request_uri, now, now + RESPONSE_TTL_SECS, true)
    }

    fn build_token(
        &self,
        auth_request_uri: &str,
        iat: u64,
        exp: u64,
        tamper: bool,
    ) -> Result<String, AuthKitError> {
        let request = Self::parse_auth_request(auth_request_uri)?;
        let transit_public = decode_key32(&request.transit_public_key)?;

        let mut app_private_key = [0u8; 32];
        OsRng.fill_bytes(&mut app_private_key);

        let payload = AuthResponsePayload {
            version: AUTH_RESPONSE_VERSION,
            decentralized_id: self.decentralized_id(),
            hub_url: self.hub_url.clone(),
            storage_address: self.storage_address(),
            app_private_key: URL_SAFE_NO_PAD.encode(app_private_key),
            iat,
            exp,
        };
        let mut payload_bytes = serde_json::to_vec(&payload)
            .map_err(|err| AuthKitError::Serialization(err.to_string()))?;
        let signature = self.signing.sign(&payload_bytes).to_bytes();
        if tamper {
            // flip a byte inside the signed region
            let last = payload_bytes.len() - 2;
            payload_bytes[last] ^= 0x01;
        }

        let signed = SignedResponse {
            payload: payload_bytes,
            public_key: self.signing.verifying_key().to_bytes().to_vec(),
            signature: signature.to_vec(),
        };
        let mut plaintext = Vec::new();
        ciborium::ser::into_writer(&signed, &mut plaintext)
            .map_err(|err| AuthKitError::Serialization(err.to_string()))?;

        let sealed = seal_to(&transit_public, &plaintext)?;
        let mut token_bytes = Vec::new();
        ciborium::ser::into_writer(&sealed, &mut token_bytes)
            .map_err(|err| AuthKitError::Serialization(err.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(token_bytes))
    }
}

fn decode_key32(encoded: &str) -> Result<[u8; 32], AuthKitError> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or_else(|| {
            AuthKitError::Serialization(
                "key must be 32 base64url bytes".to_string(),
            )
        })
}
