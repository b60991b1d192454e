//! Secure secret storage backends

use crate::error::{EnvSafeError, ErrorCategory, ErrorKind, Result};
use std::collections::HashMap;
use tracing::debug;
use zeroize::Zeroizing;

/// Default keyring service name
pub const DEFAULT_KEYRING_SERVICE: &str = "envsafe";

/// Durable key-value store for passphrases
pub trait SecretStore {
    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>>;

    fn store(&mut self, key: &str, secret: &str) -> Result<()>;

    /// Remove `key`. Removing a key that does not exist succeeds.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Whether stored secrets outlive the process.
    fn is_durable(&self) -> bool {
        true
    }
}

impl<S: SecretStore + ?Sized> SecretStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
        (**self).get(key)
    }

    fn store(&mut self, key: &str, secret: &str) -> Result<()> {
        (**self).store(key, secret)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn is_durable(&self) -> bool {
        (**self).is_durable()
    }
}

/// Stores secrets in the operating system keyring
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| keyring_error(format!("failed to open keyring entry {:?}", key), e))
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_SERVICE)
    }
}

fn keyring_error(msg: String, e: keyring::Error) -> EnvSafeError {
    EnvSafeError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::SecretStore, msg, e)
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(keyring::Error::NoEntry) => {
                debug!("entry {key:?} not found in keyring");
                Ok(None)
            }
            Err(e) => Err(keyring_error(format!("failed to read keyring entry {:?}", key), e)),
        }
    }

    fn store(&mut self, key: &str, secret: &str) -> Result<()> {
        self.entry(key)?
            .set_password(secret)
            .map_err(|e| keyring_error(format!("failed to write keyring entry {:?}", key), e))?;
        debug!("entry {key:?} saved to keyring");
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(keyring_error(format!("failed to delete keyring entry {:?}", key), e)),
        }
    }
}

/// Keeps secrets in process memory only
///
/// A store from `new` reports itself durable so it can stand in for the
/// keyring; one from `ephemeral` does not, and the resolver then never
/// offers to remember a passphrase.
pub struct MemorySecretStore {
    entries: HashMap<String, Zeroizing<String>>,
    durable: bool,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            durable: true,
        }
    }

    pub fn ephemeral() -> Self {
        Self {
            durable: false,
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn store(&mut self, key: &str, secret: &str) -> Result<()> {
        self.entries
            .insert(key.to_string(), Zeroizing::new(secret.to_string()));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn is_durable(&self) -> bool {
        self.durable
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(store: &impl SecretStore, key: &str) -> Option<String> {
        store.get(key).unwrap().map(|s| s.as_str().to_owned())
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemorySecretStore::new();
        assert!(store.is_empty());
        assert!(store.get("a").unwrap().is_none());

        store.store("a", "pw1").unwrap();
        assert_eq!(lookup(&store, "a").as_deref(), Some("pw1"));
        assert!(store.contains("a"));

        store.store("a", "pw2").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(lookup(&store, "a").as_deref(), Some("pw2"));

        store.delete("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
        store.delete("a").unwrap();
    }

    #[test]
    fn test_boxed_store() {
        let mut store: Box<dyn SecretStore> = Box::new(MemorySecretStore::new());
        store.store("k", "v").unwrap();
        assert!(store.get("k").unwrap().is_some());
        assert!(store.is_durable());

        let store: Box<dyn SecretStore> = Box::new(MemorySecretStore::ephemeral());
        assert!(!store.is_durable());
    }

    /// Talks to the real OS keyring. Ignored by default since CI machines
    /// usually have no keyring daemon:
    ///
    /// cargo test test_keyring_store_roundtrip -- --ignored
    #[test]
    #[ignore]
    fn test_keyring_store_roundtrip() {
        let mut store = KeyringSecretStore::new("envsafe-test");
        let key = "envsafe-secret-/tmp/keyring-test.env";
        store.store(key, "pw1").unwrap();
        assert_eq!(lookup(&store, key).as_deref(), Some("pw1"));
        store.delete(key).unwrap();
        assert!(store.get(key).unwrap().is_none());
    }
}
