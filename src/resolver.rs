//! Passphrase resolution: stored secret first, interactive prompt second

use crate::error::{EnvSafeError, ErrorCategory, ErrorKind, Result};
use crate::identity::Naming;
use crate::passphrase::{self, Passphrase, Prompt};
use crate::secret_store::SecretStore;
use std::path::Path;
use tracing::{debug, warn};

const ASK_PASSPHRASE: &str = "Provide your passphrase";
const ASK_PERSIST: &str = "Save this passphrase for the file?";
const PERSIST_OPTIONS: [&str; 2] = ["Yes, save passphrase for this file", "No, thanks"];

/// Produces the passphrase for a file, prompting only when no usable one is stored
pub struct SecretResolver<S> {
    store: S,
    naming: Naming,
}

impl<S: SecretStore> SecretResolver<S> {
    pub fn new(store: S, naming: Naming) -> Self {
        Self { store, naming }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    fn stored(&self, key: &str) -> Result<Option<Passphrase>> {
        let secret = self.store.get(key)?;
        // An empty stored value is as good as none.
        Ok(secret.and_then(|s| Passphrase::new(s.as_str()).ok()))
    }

    /// Resolve the passphrase for `identity`, a plaintext or sidecar path.
    ///
    /// Fails with `AcquisitionAborted` when the prompt is cancelled and with
    /// `EmptyPassphrase` when empty input is submitted. Neither is retried.
    pub fn resolve(&mut self, identity: &Path, prompt: &mut dyn Prompt) -> Result<Passphrase> {
        let key = self.naming.cache_key(identity);
        if let Some(passphrase) = self.stored(&key)? {
            debug!("using stored passphrase for {}", identity.display());
            return Ok(passphrase);
        }

        let Some(input) = prompt.ask_secret(ASK_PASSPHRASE, &passphrase::validate)? else {
            return Err(EnvSafeError::with_kind(
                ErrorCategory::User,
                ErrorKind::AcquisitionAborted,
                "passphrase entry cancelled",
            ));
        };
        let passphrase = Passphrase::new(input.as_str())?;

        if !self.store.is_durable() {
            debug!("store is not durable, using passphrase once");
            return Ok(passphrase);
        }
        match prompt.ask_choice(ASK_PERSIST, &PERSIST_OPTIONS)? {
            Some(0) => {
                self.store.store(&key, passphrase.expose())?;
                // Hand back what later lookups will find, not the local copy.
                let Some(stored) = self.stored(&key)? else {
                    warn!("passphrase for {} vanished after store", identity.display());
                    return Err(EnvSafeError::with_kind(
                        ErrorCategory::Internal,
                        ErrorKind::SecretStore,
                        "stored passphrase could not be read back",
                    ));
                };
                prompt.notify_info("Passphrase stored");
                Ok(stored)
            }
            _ => {
                debug!("using passphrase once for {}", identity.display());
                Ok(passphrase)
            }
        }
    }

    /// Delete the stored passphrase for `identity`, a plaintext or sidecar path.
    pub fn forget(&mut self, identity: &Path) -> Result<()> {
        let key = self.naming.cache_key(identity);
        self.store.delete(&key)?;
        debug!("deleted stored passphrase for {}", identity.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passphrase::ScriptedPrompt;
    use crate::secret_store::MemorySecretStore;
    use zeroize::Zeroizing;

    fn resolver() -> SecretResolver<MemorySecretStore> {
        SecretResolver::new(MemorySecretStore::new(), Naming::default())
    }

    fn env() -> &'static Path {
        Path::new("/app/.env")
    }

    #[test]
    fn test_persisted_passphrase_reused() {
        let mut resolver = resolver();
        let mut prompt = ScriptedPrompt::new().secret("pw1").choice(0);

        let first = resolver.resolve(env(), &mut prompt).unwrap();
        assert_eq!(first.expose(), "pw1");
        assert_eq!(prompt.infos(), ["Passphrase stored"]);

        let second = resolver.resolve(env(), &mut prompt).unwrap();
        assert_eq!(second.expose(), "pw1");
        assert_eq!(prompt.secret_requests(), 1);
        assert_eq!(prompt.choice_requests(), 1);
    }

    #[test]
    fn test_sidecar_shares_plaintext_secret() {
        let mut resolver = resolver();
        let mut prompt = ScriptedPrompt::new().secret("pw1").choice(0);

        resolver.resolve(env(), &mut prompt).unwrap();
        let from_sidecar = resolver
            .resolve(Path::new("/app/.env.hash"), &mut prompt)
            .unwrap();
        assert_eq!(from_sidecar.expose(), "pw1");
        assert_eq!(prompt.secret_requests(), 1);
    }

    #[test]
    fn test_use_once_not_persisted() {
        let mut resolver = resolver();
        let mut prompt = ScriptedPrompt::new()
            .secret("pw1")
            .choice(1)
            .secret("pw2")
            .cancel_choice();

        let first = resolver.resolve(env(), &mut prompt).unwrap();
        assert_eq!(first.expose(), "pw1");
        assert!(resolver.store().is_empty());

        // A cancelled choice also means "this time only".
        let second = resolver.resolve(env(), &mut prompt).unwrap();
        assert_eq!(second.expose(), "pw2");
        assert!(resolver.store().is_empty());
        assert_eq!(prompt.secret_requests(), 2);
        assert!(prompt.infos().is_empty());
    }

    #[test]
    fn test_ephemeral_store_never_offers_persist() {
        let mut resolver = SecretResolver::new(MemorySecretStore::ephemeral(), Naming::default());
        let mut prompt = ScriptedPrompt::new().secret("pw1").secret("pw1");

        let first = resolver.resolve(env(), &mut prompt).unwrap();
        assert_eq!(first.expose(), "pw1");
        resolver.resolve(env(), &mut prompt).unwrap();

        assert_eq!(prompt.choice_requests(), 0);
        assert_eq!(prompt.secret_requests(), 2);
        assert!(prompt.infos().is_empty());
        assert!(resolver.store().is_empty());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let mut resolver = resolver();
        let mut prompt = ScriptedPrompt::new().secret("").secret("pw1");

        let err = resolver
            .resolve(Path::new("/app/.env"), &mut prompt)
            .expect_err("expected empty passphrase error");
        assert_eq!(err.kind, Some(ErrorKind::EmptyPassphrase));
        // No retry and nothing stored.
        assert_eq!(prompt.secret_requests(), 1);
        assert_eq!(prompt.choice_requests(), 0);
        assert!(resolver.store().is_empty());
    }

    #[test]
    fn test_cancelled_acquisition() {
        let mut resolver = resolver();
        let mut prompt = ScriptedPrompt::new().cancel_secret();

        let err = resolver
            .resolve(Path::new("/app/.env"), &mut prompt)
            .expect_err("expected aborted acquisition");
        assert_eq!(err.kind, Some(ErrorKind::AcquisitionAborted));
        assert!(err.is_abort());
        assert_eq!(prompt.choice_requests(), 0);
    }

    #[test]
    fn test_empty_stored_value_prompts() {
        let mut store = MemorySecretStore::new();
        store.store("envsafe-secret-/app/.env", "").unwrap();
        let mut resolver = SecretResolver::new(store, Naming::default());
        let mut prompt = ScriptedPrompt::new().secret("pw1").choice(1);

        let passphrase = resolver.resolve(env(), &mut prompt).unwrap();
        assert_eq!(passphrase.expose(), "pw1");
        assert_eq!(prompt.secret_requests(), 1);
    }

    #[test]
    fn test_read_back_skew_detected() {
        /// Accepts writes and forgets them immediately.
        struct ForgetfulStore;

        impl SecretStore for ForgetfulStore {
            fn get(&self, _key: &str) -> Result<Option<Zeroizing<String>>> {
                Ok(None)
            }
            fn store(&mut self, _key: &str, _secret: &str) -> Result<()> {
                Ok(())
            }
            fn delete(&mut self, _key: &str) -> Result<()> {
                Ok(())
            }
        }

        let mut resolver = SecretResolver::new(ForgetfulStore, Naming::default());
        let mut prompt = ScriptedPrompt::new().secret("pw1").choice(0);
        let err = resolver
            .resolve(Path::new("/app/.env"), &mut prompt)
            .expect_err("expected read-back failure");
        assert_eq!(err.kind, Some(ErrorKind::SecretStore));
    }

    #[test]
    fn test_read_back_value_returned() {
        /// Normalizes stored secrets, as some backends do.
        #[derive(Default)]
        struct TrimmingStore(MemorySecretStore);

        impl SecretStore for TrimmingStore {
            fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
                self.0.get(key)
            }
            fn store(&mut self, key: &str, secret: &str) -> Result<()> {
                self.0.store(key, secret.trim())
            }
            fn delete(&mut self, key: &str) -> Result<()> {
                self.0.delete(key)
            }
        }

        let mut resolver = SecretResolver::new(TrimmingStore::default(), Naming::default());
        let mut prompt = ScriptedPrompt::new().secret(" pw1 ").choice(0);
        let passphrase = resolver.resolve(env(), &mut prompt).unwrap();
        assert_eq!(passphrase.expose(), "pw1");
    }

    #[test]
    fn test_forget() {
        let mut resolver = resolver();
        let mut prompt = ScriptedPrompt::new()
            .secret("pw1")
            .choice(0)
            .secret("pw2")
            .choice(1);

        resolver.resolve(env(), &mut prompt).unwrap();
        resolver.forget(Path::new("/app/.env.hash")).unwrap();
        assert!(resolver.store().is_empty());

        let again = resolver.resolve(env(), &mut prompt).unwrap();
        assert_eq!(again.expose(), "pw2");
        assert_eq!(prompt.secret_requests(), 2);
    }
}
