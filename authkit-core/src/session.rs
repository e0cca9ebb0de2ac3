//! Session lifecycle and credential storage.
//!
//! One session is live per [`SessionStore`]. Creating a new session replaces
//! the previous handle and invalidates it: in-flight operations holding the
//! old handle observe the invalidation and fail instead of silently touching
//! a stale record.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AuthKitError,
    keys::{AppPrivateKey, TransitKeyPair},
    storage::StorageRoot,
};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no handshake started.
    Uninitialized,
    /// A sign-in handshake is waiting for the redirect callback.
    AwaitingRedirect,
    /// The user is signed in; `UserData` is present.
    SignedIn,
    /// The user signed out; credentials are cleared.
    SignedOut,
}

/// Credentials and endpoints for the signed-in user.
///
/// Present on a session iff its state is [`SessionState::SignedIn`].
#[derive(Debug, Clone)]
pub struct UserData {
    /// Decentralized identifier of the user.
    pub decentralized_id: String,
    /// Base URL of the user's storage hub.
    pub hub_url: String,
    /// Address component of the user's storage root under the hub.
    pub storage_address: String,
    /// App-scoped private key used for file encryption.
    pub app_private_key: AppPrivateKey,
}

impl UserData {
    /// Storage root all of this user's file paths resolve under.
    #[must_use]
    pub fn storage_root(&self) -> StorageRoot {
        StorageRoot::new(&self.hub_url, &self.storage_address)
    }
}

pub(crate) struct SessionRecord {
    pub(crate) config: AppConfig,
    pub(crate) state: SessionState,
    pub(crate) transit: Option<TransitKeyPair>,
    pub(crate) user_data: Option<UserData>,
    pub(crate) epoch: u64,
    pub(crate) invalidated: bool,
}

/// A cloneable reference to one session record.
///
/// State reads take a shared lock and may run concurrently; mutations
/// (handshake transitions, sign-out) take the exclusive lock.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    record: Arc<RwLock<SessionRecord>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

impl SessionHandle {
    fn new(config: AppConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            record: Arc::new(RwLock::new(SessionRecord {
                config,
                state: SessionState::Uninitialized,
                transit: None,
                user_data: None,
                epoch: 0,
                invalidated: false,
            })),
        }
    }

    /// Unique id of this session instance.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Non-blocking read of the current lifecycle state.
    #[must_use]
    pub fn current_state(&self) -> SessionState {
        self.read().state
    }

    /// True iff the session holds signed-in credentials.
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.current_state() == SessionState::SignedIn
    }

    /// Returns a copy of the signed-in user's data.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::SessionInvalidated`] if the session was replaced,
    /// [`AuthKitError::SessionNotLoaded`] unless the state is `SignedIn`.
    pub fn load_user_data(&self) -> Result<UserData, AuthKitError> {
        let record = self.read();
        if record.invalidated {
            return Err(AuthKitError::SessionInvalidated);
        }
        record
            .user_data
            .clone()
            .ok_or(AuthKitError::SessionNotLoaded)
    }

    /// Signs the user out, clearing credentials and any pending transit key.
    ///
    /// Idempotent: signing out an already signed-out session is a no-op.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::SessionInvalidated`] if the session was replaced.
    pub fn sign_out(&self) -> Result<(), AuthKitError> {
        let mut record = self.write();
        if record.invalidated {
            return Err(AuthKitError::SessionInvalidated);
        }
        if record.state == SessionState::SignedOut {
            return Ok(());
        }
        record.state = SessionState::SignedOut;
        record.user_data = None;
        record.transit = None;
        record.epoch += 1;
        log::info!("session {} signed out", self.id);
        Ok(())
    }

    /// Snapshots the signed-in credentials together with the epoch they were
    /// read at. Storage operations pair this with [`Self::verify_epoch`].
    pub(crate) fn credentials(&self) -> Result<(UserData, u64), AuthKitError> {
        let record = self.read();
        if record.invalidated {
            return Err(AuthKitError::SessionInvalidated);
        }
        let user_data = record
            .user_data
            .clone()
            .ok_or(AuthKitError::SessionNotLoaded)?;
        Ok((user_data, record.epoch))
    }

    /// Fails if the session was invalidated or its credentials changed since
    /// the snapshot at `epoch` was taken.
    pub(crate) fn verify_epoch(&self, epoch: u64) -> Result<(), AuthKitError> {
        let record = self.read();
        if record.invalidated || record.epoch != epoch {
            return Err(AuthKitError::SessionInvalidated);
        }
        Ok(())
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SessionRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SessionRecord> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate(&self) {
        let mut record = self.write();
        record.invalidated = true;
        record.user_data = None;
        record.transit = None;
        log::debug!("session {} invalidated", self.id);
    }
}

/// Owns the single live session of a process.
pub struct SessionStore {
    current: Mutex<Option<SessionHandle>>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Installs a new session for `config`, replacing (and invalidating) any
    /// previously created session.
    pub fn create(&self, config: AppConfig) -> SessionHandle {
        let handle = SessionHandle::new(config);
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = current.take() {
            old.invalidate();
        }
        *current = Some(handle.clone());
        log::info!("session {} created", handle.id);
        handle
    }

    /// Returns the live session, if one was created.
    #[must_use]
    pub fn current(&self) -> Option<SessionHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scope;

    fn test_config() -> AppConfig {
        AppConfig::new(
            "https://app.example.com",
            None,
            None,
            vec![Scope::StoreWrite],
        )
        .expect("config")
    }

    fn signed_in_user() -> UserData {
        UserData {
            decentralized_id: "did:ak:00".to_string(),
            hub_url: "https://hub.example.com".to_string(),
            storage_address: "abc".to_string(),
            app_private_key: AppPrivateKey::from_bytes([9u8; 32]),
        }
    }

    fn sign_in(handle: &SessionHandle) {
        let mut record = handle.write();
        record.state = SessionState::SignedIn;
        record.user_data = Some(signed_in_user());
        record.epoch += 1;
    }

    #[test]
    fn test_new_session_is_uninitialized() {
        let store = SessionStore::new();
        let handle = store.create(test_config());
        assert_eq!(handle.current_state(), SessionState::Uninitialized);
        assert!(!handle.is_signed_in());
    }

    #[test]
    fn test_load_user_data_requires_sign_in() {
        let store = SessionStore::new();
        let handle = store.create(test_config());
        let err = handle.load_user_data().expect_err("must fail");
        assert!(matches!(err, AuthKitError::SessionNotLoaded));

        sign_in(&handle);
        let user = handle.load_user_data().expect("user data");
        assert_eq!(user.decentralized_id, "did:ak:00");
    }

    #[test]
    fn test_sign_out_clears_credentials_and_is_idempotent() {
        let store = SessionStore::new();
        let handle = store.create(test_config());
        sign_in(&handle);
        assert!(handle.is_signed_in());

        handle.sign_out().expect("sign out");
        assert_eq!(handle.current_state(), SessionState::SignedOut);
        assert!(handle.read().user_data.is_none());
        assert!(handle.read().transit.is_none());

        handle.sign_out().expect("idempotent sign out");
        assert_eq!(handle.current_state(), SessionState::SignedOut);

        let err = handle.load_user_data().expect_err("must fail");
        assert!(matches!(err, AuthKitError::SessionNotLoaded));
    }

    #[test]
    fn test_create_replaces_and_invalidates_previous_session() {
        let store = SessionStore::new();
        let old = store.create(test_config());
        sign_in(&old);
        let (_, epoch) = old.credentials().expect("snapshot");

        let new = store.create(test_config());
        assert_ne!(old.id(), new.id());
        assert_eq!(
            store.current().expect("current").id(),
            new.id()
        );

        let err = old.credentials().expect_err("must fail");
        assert!(matches!(err, AuthKitError::SessionInvalidated));
        let err = old.verify_epoch(epoch).expect_err("must fail");
        assert!(matches!(err, AuthKitError::SessionInvalidated));
        let err = old.sign_out().expect_err("must fail");
        assert!(matches!(err, AuthKitError::SessionInvalidated));
    }

    #[test]
    fn test_epoch_detects_racing_sign_out() {
        let store = SessionStore::new();
        let handle = store.create(test_config());
        sign_in(&handle);

        let (_, epoch) = handle.credentials().expect("snapshot");
        handle.verify_epoch(epoch).expect("unchanged");

        handle.sign_out().expect("sign out");
        let err = handle.verify_epoch(epoch).expect_err("must fail");
        assert!(matches!(err, AuthKitError::SessionInvalidated));
    }
}
