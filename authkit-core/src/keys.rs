//! Key material for the sign-in handshake and file encryption.
//!
//! The transit key pair secures exactly one handshake: an x25519 key the
//! provider seals its response to, plus an ephemeral ed25519 key that signs
//! the outgoing auth request. Neither half is ever serialized or persisted.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::{Signer, SigningKey};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::AuthKitError;

const TRANSIT_KEY_INFO: &[u8] = b"authkit-transit-v1";
const FILE_KEY_INFO: &[u8] = b"authkit-file-encryption-v1";

/// Ephemeral key material backing one sign-in handshake.
///
/// Generated at `begin_sign_in`, consumed (and dropped) at `complete_sign_in`
/// or `cancel_sign_in`. The secret halves zeroize on drop and never leave the
/// process.
pub struct TransitKeyPair {
    dh_secret: StaticSecret,
    dh_public: PublicKey,
    signing: SigningKey,
}

impl std::fmt::Debug for TransitKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitKeyPair").finish_non_exhaustive()
    }
}

impl TransitKeyPair {
    pub(crate) fn generate() -> Self {
        let dh_secret = StaticSecret::random_from_rng(OsRng);
        let dh_public = PublicKey::from(&dh_secret);
        let signing = SigningKey::generate(&mut OsRng);
        Self {
            dh_secret,
            dh_public,
            signing,
        }
    }

    /// Public x25519 key the provider seals the auth response to.
    pub(crate) fn dh_public_bytes(&self) -> [u8; 32] {
        *self.dh_public.as_bytes()
    }

    /// Public half of the request-signing key.
    pub(crate) fn verifying_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Signs the canonical auth request bytes.
    pub(crate) fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// Opens a payload sealed to this transit key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthKitError::Decryption`] if the payload is structurally
    /// malformed or fails AEAD authentication.
    pub(crate) fn open(
        &self,
        sealed: &SealedPayload,
    ) -> Result<Vec<u8>, AuthKitError> {
        let ephemeral: [u8; 32] =
            sealed.ephemeral_public.as_slice().try_into().map_err(|_| {
                AuthKitError::Decryption(
                    "ephemeral public key must be 32 bytes".to_string(),
                )
            })?;
        if sealed.nonce.len() != 24 {
            return Err(AuthKitError::Decryption(
                "nonce must be 24 bytes".to_string(),
            ));
        }
        let shared = self.dh_secret.diffie_hellman(&PublicKey::from(ephemeral));
        let key = derive_aead_key(shared.as_bytes(), TRANSIT_KEY_INFO)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        cipher
            .decrypt(
                XNonce::from_slice(&sealed.nonce),
                sealed.ciphertext.as_slice(),
            )
            .map_err(|_| {
                AuthKitError::Decryption(
                    "transit payload failed authentication".to_string(),
                )
            })
    }
}

/// Wire form of a payload sealed to a transit public key.
///
/// ECIES-style: an ephemeral x25519 key agrees a shared secret with the
/// recipient, HKDF-SHA256 derives the AEAD key, XChaCha20-Poly1305 seals the
/// plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedPayload {
    /// Sender's ephemeral x25519 public key (32 bytes).
    pub ephemeral_public: Vec<u8>,
    /// Random XChaCha20 nonce (24 bytes).
    pub nonce: Vec<u8>,
    /// Ciphertext with the Poly1305 tag appended.
    pub ciphertext: Vec<u8>,
}

/// Seals `plaintext` to the holder of `recipient`, the transit public key
/// advertised in an auth request.
///
/// This is the provider-side half of [`TransitKeyPair::open`]; it exists in
/// the public API so identity-provider implementations (and tests) can
/// produce response tokens this crate accepts.
///
/// # Errors
///
/// Returns [`AuthKitError::Decryption`] if key derivation or sealing fails.
pub fn seal_to(
    recipient: &[u8; 32],
    plaintext: &[u8],
) -> Result<SealedPayload, AuthKitError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient));
    let key = derive_aead_key(shared.as_bytes(), TRANSIT_KEY_INFO)?;

    let mut nonce = [0u8; 24];
    OsRng.fill_bytes(&mut nonce);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|_| {
            AuthKitError::Decryption("sealing transit payload failed".to_string())
        })?;

    Ok(SealedPayload {
        ephemeral_public: ephemeral_public.as_bytes().to_vec(),
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

/// App-scoped private key material issued by the identity provider at sign-in.
///
/// Used (through HKDF) as the root of per-file encryption keys. Zeroized on
/// drop; `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AppPrivateKey([u8; 32]);

impl std::fmt::Debug for AppPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AppPrivateKey(..)")
    }
}

impl AppPrivateKey {
    /// Wraps 32 bytes of key material.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derives the symmetric key used for file envelopes.
    pub(crate) fn file_key(&self) -> Result<[u8; 32], AuthKitError> {
        derive_aead_key(&self.0, FILE_KEY_INFO)
    }
}

/// Derives the decentralized identifier bound to an ed25519 verifying key.
///
/// The identifier commits to the key: `complete_sign_in` recomputes it and
/// rejects responses whose claimed identifier does not match the signing key.
#[must_use]
pub fn did_for_verifying_key(verifying_key: &[u8; 32]) -> String {
    let digest = Sha256::digest(verifying_key);
    format!("did:ak:{}", hex::encode(&digest[..20]))
}

fn derive_aead_key(ikm: &[u8], info: &[u8]) -> Result<[u8; 32], AuthKitError> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; 32];
    hkdf.expand(info, &mut okm).map_err(|_| {
        AuthKitError::Decryption("key derivation failed".to_string())
    })?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let transit = TransitKeyPair::generate();
        let sealed =
            seal_to(&transit.dh_public_bytes(), b"hello handshake").expect("seal");
        let plaintext = transit.open(&sealed).expect("open");
        assert_eq!(plaintext, b"hello handshake");
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let transit = TransitKeyPair::generate();
        let other = TransitKeyPair::generate();
        let sealed =
            seal_to(&transit.dh_public_bytes(), b"hello handshake").expect("seal");
        let err = other.open(&sealed).expect_err("must fail");
        assert!(matches!(err, AuthKitError::Decryption(_)));
    }

    #[test]
    fn test_open_tampered_ciphertext_fails() {
        let transit = TransitKeyPair::generate();
        let mut sealed =
            seal_to(&transit.dh_public_bytes(), b"hello handshake").expect("seal");
        sealed.ciphertext[0] ^= 0xFF;
        let err = transit.open(&sealed).expect_err("must fail");
        assert!(matches!(err, AuthKitError::Decryption(_)));
    }

    #[test]
    fn test_open_rejects_short_ephemeral_key() {
        let transit = TransitKeyPair::generate();
        let mut sealed =
            seal_to(&transit.dh_public_bytes(), b"hello").expect("seal");
        sealed.ephemeral_public.truncate(16);
        let err = transit.open(&sealed).expect_err("must fail");
        assert!(matches!(err, AuthKitError::Decryption(_)));
    }

    #[test]
    fn test_did_is_deterministic_and_bound_to_key() {
        let a = TransitKeyPair::generate();
        let b = TransitKeyPair::generate();
        let did_a = did_for_verifying_key(&a.verifying_key_bytes());
        let did_b = did_for_verifying_key(&b.verifying_key_bytes());
        assert!(did_a.starts_with("did:ak:"));
        assert_eq!(did_a.len(), "did:ak:".len() + 40);
        assert_ne!(did_a, did_b);
        assert_eq!(did_a, did_for_verifying_key(&a.verifying_key_bytes()));
    }

    #[test]
    fn test_file_key_is_deterministic_per_app_key() {
        let key = AppPrivateKey::from_bytes([7u8; 32]);
        let other = AppPrivateKey::from_bytes([8u8; 32]);
        assert_eq!(key.file_key().expect("derive"), key.file_key().expect("derive"));
        assert_ne!(key.file_key().expect("derive"), other.file_key().expect("derive"));
    }
}
