//! Self-describing encrypted container stored in place of plaintext files.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use super::FileContent;
use crate::{error::AuthKitError, keys::AppPrivateKey};

const FILE_ENVELOPE_VERSION: u32 = 1;

/// Content type advertised for envelope objects.
pub(crate) const ENVELOPE_CONTENT_TYPE: &str = "application/vnd.authkit.envelope";

/// Whether the plaintext is UTF-8 text or opaque bytes. Recorded inside the
/// envelope so decryption can restore the caller-visible distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum ContentKind {
    Text,
    Binary,
}

#[derive(Serialize, Deserialize)]
struct FileEnvelope {
    version: u32,
    kind: ContentKind,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

/// Encrypts `content` for storage at `path`.
///
/// The path is bound as associated data: an envelope copied to a different
/// path fails authentication when opened.
pub(crate) fn seal(
    key: &AppPrivateKey,
    path: &str,
    content: &FileContent,
) -> Result<Vec<u8>, AuthKitError> {
    let (kind, plaintext): (ContentKind, &[u8]) = match content {
        FileContent::Text(text) => (ContentKind::Text, text.as_bytes()),
        FileContent::Binary(bytes) => (ContentKind::Binary, bytes.as_slice()),
    };

    let file_key = key.file_key()?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&file_key));
    let mut nonce = [0u8; 24];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: path.as_bytes(),
            },
        )
        .map_err(|_| {
            AuthKitError::Decryption("sealing file content failed".to_string())
        })?;

    let envelope = FileEnvelope {
        version: FILE_ENVELOPE_VERSION,
        kind,
        nonce: nonce.to_vec(),
        ciphertext,
    };
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&envelope, &mut bytes)
        .map_err(|err| AuthKitError::Serialization(err.to_string()))?;
    Ok(bytes)
}

/// Decrypts an envelope fetched from `path`.
pub(crate) fn open(
    key: &AppPrivateKey,
    path: &str,
    bytes: &[u8],
) -> Result<FileContent, AuthKitError> {
    let envelope: FileEnvelope =
        ciborium::de::from_reader(bytes).map_err(|_| {
            AuthKitError::Decryption("stored object is not an envelope".to_string())
        })?;
    if envelope.version != FILE_ENVELOPE_VERSION {
        return Err(AuthKitError::Decryption(format!(
            "unsupported envelope version {}",
            envelope.version
        )));
    }
    if envelope.nonce.len() != 24 {
        return Err(AuthKitError::Decryption(
            "envelope nonce must be 24 bytes".to_string(),
        ));
    }

    let file_key = key.file_key()?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&file_key));
    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(&envelope.nonce),
            Payload {
                msg: &envelope.ciphertext,
                aad: path.as_bytes(),
            },
        )
        .map_err(|_| {
            AuthKitError::Decryption(
                "envelope failed integrity verification".to_string(),
            )
        })?;

    match envelope.kind {
        ContentKind::Text => String::from_utf8(plaintext)
            .map(FileContent::Text)
            .map_err(|_| {
                AuthKitError::Decryption(
                    "text envelope holds invalid UTF-8".to_string(),
                )
            }),
        ContentKind::Binary => Ok(FileContent::Binary(plaintext)),
    }
}
