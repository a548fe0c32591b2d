//! Credential persistence.
//!
//! A small key/value store with per-entry expiry. The session controller
//! writes the renewed token after every successful renewal; the login flow
//! writes both the host id and the token.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CredentialError;
use crate::types::{AccessToken, HostId};

/// Key under which the session token is stored.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Key under which the host identifier is stored.
pub const AUTH_HOST_KEY: &str = "auth_uuid";

/// Options for [`CredentialStore::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Entry lifetime; `None` keeps it until overwritten.
    pub expiry_days: Option<u32>,
}

impl SetOptions {
    pub fn expiring_in(days: u32) -> Self {
        Self {
            expiry_days: Some(days),
        }
    }

    fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expiry_days
            .map(|days| now + Duration::days(i64::from(days)))
    }
}

/// Key/value credential storage.
pub trait CredentialStore: Send + Sync {
    /// Value under `key`, or `None` when absent or expired.
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError>;

    fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), CredentialError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(value: &str, options: SetOptions) -> Self {
        Self {
            value: value.to_string(),
            expires_at: options.expires_at(Utc::now()),
        }
    }

    fn live_value(&self) -> Option<String> {
        match self.expires_at {
            Some(expires_at) if expires_at <= Utc::now() => None,
            _ => Some(self.value.clone()),
        }
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiry recorded for `key`, if any.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).and_then(|entry| entry.expires_at)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).and_then(Entry::live_value))
    }

    fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), CredentialError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), Entry::new(value, options));
        Ok(())
    }
}

/// Store backed by a JSON file, rewritten on every `set`.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<HashMap<String, Entry>, CredentialError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_entries()?.get(key).and_then(Entry::live_value))
    }

    fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), CredentialError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), Entry::new(value, options));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

/// Host id and token a session is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub host_id: HostId,
    pub token: AccessToken,
}

/// What a previous run left in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub host_id: HostId,
    /// `None` when only the host id survived, e.g. after the token expired.
    pub token: Option<AccessToken>,
}

impl StoredSession {
    /// Read the stored host id and token.
    ///
    /// Returns `None` when no usable host id is stored. A stored id that is
    /// not a UUID is treated as absent.
    pub fn load(store: &dyn CredentialStore) -> Result<Option<Self>, CredentialError> {
        let Some(raw) = store.get(AUTH_HOST_KEY)? else {
            return Ok(None);
        };
        let host_id = match raw.parse::<HostId>() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Ignoring stored host id that is not a UUID");
                return Ok(None);
            }
        };

        let token = store.get(AUTH_TOKEN_KEY)?.map(AccessToken::new);
        Ok(Some(Self { host_id, token }))
    }

    /// Credentials to start a session with, if a token is present.
    pub fn into_credentials(self) -> Option<SessionCredentials> {
        let host_id = self.host_id;
        self.token.map(|token| SessionCredentials { host_id, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "01234567-89AB-CDEF-0123-456789ABCDEF";

    #[test]
    fn test_memory_store_records_expiry() {
        let store = MemoryCredentialStore::new();
        store
            .set(AUTH_TOKEN_KEY, "t1", SetOptions::expiring_in(7))
            .unwrap();
        store.set(AUTH_HOST_KEY, HOST, SetOptions::default()).unwrap();

        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap().as_deref(), Some("t1"));
        let expires_at = store.expires_at(AUTH_TOKEN_KEY).unwrap();
        let days = (expires_at - Utc::now()).num_hours() / 24;
        assert!((6..=7).contains(&days));
        assert!(store.expires_at(AUTH_HOST_KEY).is_none());
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let entry = Entry {
            value: "old".to_string(),
            expires_at: Some(Utc::now() - Duration::minutes(1)),
        };
        assert!(entry.live_value().is_none());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let store = FileCredentialStore::new(&path);
        assert!(store.get(AUTH_TOKEN_KEY).unwrap().is_none());
        store.set(AUTH_HOST_KEY, HOST, SetOptions::default()).unwrap();
        store
            .set(AUTH_TOKEN_KEY, "t2", SetOptions::expiring_in(7))
            .unwrap();

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(reopened.get(AUTH_HOST_KEY).unwrap().as_deref(), Some(HOST));
        assert_eq!(reopened.get(AUTH_TOKEN_KEY).unwrap().as_deref(), Some("t2"));
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(matches!(store.get(AUTH_TOKEN_KEY), Err(CredentialError::Json(_))));
    }

    #[test]
    fn test_stored_session_without_token() {
        let store = MemoryCredentialStore::new();
        assert!(StoredSession::load(&store).unwrap().is_none());

        store
            .set(AUTH_HOST_KEY, &HOST.to_lowercase(), SetOptions::default())
            .unwrap();
        let stored = StoredSession::load(&store).unwrap().unwrap();
        assert_eq!(stored.host_id.to_string(), HOST);
        assert!(stored.token.is_none());
        assert!(stored.into_credentials().is_none());
    }

    #[test]
    fn test_stored_session_ignores_invalid_host() {
        let store = MemoryCredentialStore::new();
        store.set(AUTH_HOST_KEY, "nope", SetOptions::default()).unwrap();
        store.set(AUTH_TOKEN_KEY, "t1", SetOptions::default()).unwrap();
        assert!(StoredSession::load(&store).unwrap().is_none());
    }

    #[test]
    fn test_stored_session_into_credentials() {
        let store = MemoryCredentialStore::new();
        store.set(AUTH_HOST_KEY, HOST, SetOptions::default()).unwrap();
        store.set(AUTH_TOKEN_KEY, "t1", SetOptions::default()).unwrap();

        let credentials = StoredSession::load(&store)
            .unwrap()
            .and_then(StoredSession::into_credentials)
            .unwrap();
        assert_eq!(credentials.token, AccessToken::new("t1"));
    }
}
