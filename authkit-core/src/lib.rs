#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Session lifecycle, sign-in handshake and encrypted file storage for
//! decentralized identity applications.
//!
//! The crate is organized around four pieces:
//!
//! - [`SessionStore`] owns the single live session of a process and its
//!   credential lifecycle.
//! - [`HandshakeManager`] drives the redirect sign-in handshake against an
//!   identity provider.
//! - [`storage::StorageClient`] reads and writes (optionally encrypted)
//!   files under the signed-in user's storage root.
//! - [`keys`] primitives back both: ephemeral transit keys for the handshake
//!   and the app private key for file envelopes.

mod config;
pub use config::*;

mod error;
pub use error::*;

mod handshake;
pub use handshake::*;

pub mod keys;

mod session;
pub use session::*;

pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod provider;

// private modules
mod defaults;
