//! Credential storage for the backend session.
//!
//! Production builds keep the bearer token and backend URL in the OS
//! credential store (Keychain, Windows Credential Manager, Linux keyutils)
//! through the `keyring` crate. [`MemoryStore`] backs tests and headless
//! runs.

use keyring::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use crate::error::{PosError, PosResult};

pub const SERVICE_NAME: &str = "tpv-pos-client";

// Credential keys
pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_API_URL: &str = "api_url";
pub const KEY_USER_ROLE: &str = "user_role";
pub const KEY_TENANT_ID: &str = "tenant_id";

/// Keys that belong to a logged-in session and go away on logout or expiry.
const SESSION_KEYS: &[&str] = &[KEY_ACCESS_TOKEN, KEY_USER_ROLE, KEY_TENANT_ID];

pub trait CredentialStore: Send + Sync {
    /// `None` when the entry does not exist or cannot be read.
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> PosResult<()>;
    /// Succeeds when the entry does not exist.
    fn delete(&self, key: &str) -> PosResult<()>;
}

/// Forget the logged-in session, keeping the backend URL.
pub fn clear_session(store: &dyn CredentialStore) -> PosResult<()> {
    info!("clearing stored session credentials");
    for key in SESSION_KEYS {
        store.delete(key)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// OS keyring
// ---------------------------------------------------------------------------

pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> Option<String> {
        let entry = match Entry::new(&self.service, key) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(pw) => Some(pw),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to read credential");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> PosResult<()> {
        let entry =
            Entry::new(&self.service, key).map_err(|e| PosError::Storage(e.to_string()))?;
        entry
            .set_password(value)
            .map_err(|e| PosError::Storage(e.to_string()))
    }

    fn delete(&self, key: &str) -> PosResult<()> {
        let entry =
            Entry::new(&self.service, key).map_err(|e| PosError::Storage(e.to_string()))?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(PosError::Storage(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> PosResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> PosResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
