//! Encrypt/decrypt operations over a plaintext file and its sidecar
//!
//! Each operation runs `Idle -> AwaitingSecret -> Transforming -> Done`, or
//! ends in `Aborted` when no passphrase could be acquired or a step failed.
//! Every outcome is reported through the prompt's notifications exactly
//! once, and no file is written unless the whole transform succeeded.

use crate::content::ContentStore;
use crate::error::{EnvSafeError, ErrorCategory, ErrorKind, Result};
use crate::identity::{self, FileKind, Naming};
use crate::passphrase::Prompt;
use crate::resolver::SecretResolver;
use crate::secret_store::SecretStore;
use crate::secretcrypt::{self, Algorithm};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    AwaitingSecret,
    Transforming,
    Aborted,
    Done,
}

/// How an operation ended
#[derive(Debug)]
pub enum Completion {
    /// The operation finished; carries the file that was written or affected.
    Done(PathBuf),
    /// The file needed no action (a saved sidecar, or an unrelated file).
    Unchanged,
    /// No passphrase was acquired; nothing was written.
    Aborted(EnvSafeError),
    /// A step failed; nothing was written.
    Failed(EnvSafeError),
}

impl Completion {
    pub fn is_done(&self) -> bool {
        matches!(self, Completion::Done(_))
    }
}

/// Cipher settings applied to every transform
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformOptions {
    pub algorithm: Algorithm,
    /// Fold sidecar content at this column; `None` keeps a single line.
    pub wrap_column: Option<usize>,
}

pub struct Workflow<S, P, C> {
    resolver: SecretResolver<S>,
    prompt: P,
    content: C,
    options: TransformOptions,
    state: State,
}

impl<S, P, C> Workflow<S, P, C>
where
    S: SecretStore,
    P: Prompt,
    C: ContentStore,
{
    pub fn new(
        resolver: SecretResolver<S>,
        prompt: P,
        content: C,
        options: TransformOptions,
    ) -> Self {
        Self {
            resolver,
            prompt,
            content,
            options,
            state: State::Idle,
        }
    }

    /// State reached by the most recent operation
    pub fn state(&self) -> State {
        self.state
    }

    pub fn resolver(&self) -> &SecretResolver<S> {
        &self.resolver
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    fn naming(&self) -> &Naming {
        self.resolver.naming()
    }

    /// Encrypt a plaintext file into its sidecar, overwriting any existing sidecar.
    pub fn encrypt_file(&mut self, plaintext: &Path) -> Completion {
        self.state = State::Idle;
        let result = self.try_encrypt(plaintext);
        self.finish(result, |sidecar| {
            format!("Encrypted file {} created", sidecar.display())
        })
    }

    /// Decrypt a sidecar, replacing the whole content of its plaintext file.
    pub fn decrypt_file(&mut self, sidecar: &Path) -> Completion {
        self.state = State::Idle;
        let result = self.try_decrypt(sidecar);
        self.finish(result, |plaintext| {
            format!("Encrypted file decrypted into {}", plaintext.display())
        })
    }

    /// React to a save of `path`: plaintext files are encrypted, sidecars
    /// and unrelated files are left alone.
    pub fn on_save(&mut self, path: &Path) -> Completion {
        match self.naming().classify(path) {
            FileKind::Plaintext => self.encrypt_file(path),
            FileKind::Sidecar => {
                self.state = State::Done;
                self.prompt
                    .notify_info(&format!("{} is already encrypted", path.display()));
                Completion::Unchanged
            }
            FileKind::Other => {
                self.state = State::Done;
                debug!("ignoring save of {}", path.display());
                Completion::Unchanged
            }
        }
    }

    /// Delete the stored passphrase for a plaintext or sidecar file.
    ///
    /// File content is never touched.
    pub fn delete_secret(&mut self, path: &Path) -> Completion {
        self.state = State::Idle;
        let result = identity::canonical_parent(path).and_then(|named| {
            let plaintext = self.naming().plaintext_for(&named).unwrap_or(named);
            let target = identity::canonical_target(&plaintext)?;
            self.resolver.forget(&target)?;
            Ok(target)
        });
        self.finish(result, |target| {
            format!("Stored passphrase for {} deleted", target.display())
        })
    }

    fn try_encrypt(&mut self, plaintext: &Path) -> Result<PathBuf> {
        // Name the sidecar after the path as given; read through any symlink.
        let named = identity::canonical_parent(plaintext)?;
        if self.naming().is_sidecar(&named) {
            return Err(EnvSafeError::with_kind(
                ErrorCategory::User,
                ErrorKind::AlreadySidecar,
                format!("{} is already an encrypted file", named.display()),
            ));
        }
        let sidecar = self.naming().sidecar_for(&named);
        let plaintext = identity::canonical(&named)?;
        let text = self.content.read_content(&plaintext)?;

        self.state = State::AwaitingSecret;
        let passphrase = self.resolver.resolve(&plaintext, &mut self.prompt)?;

        self.state = State::Transforming;
        let ciphertext = secretcrypt::encrypt(passphrase.expose(), &text, self.options.algorithm)
            .map_err(|e| e.with_context("encryption failed"))?;
        let armored = match self.options.wrap_column {
            Some(column) => ciphertext.folded(column),
            None => ciphertext.into_string(),
        };
        self.content
            .replace_all_content(&sidecar, &armored)
            .map_err(|e| e.with_context(format!("failed to write to {}", sidecar.display())))?;

        info!(
            "encrypted {} into {} with {}",
            plaintext.display(),
            sidecar.display(),
            self.options.algorithm
        );
        Ok(sidecar)
    }

    fn try_decrypt(&mut self, sidecar: &Path) -> Result<PathBuf> {
        let sidecar = identity::canonical_parent(sidecar)?;
        let named = self.naming().plaintext_for(&sidecar).ok_or_else(|| {
            EnvSafeError::with_kind(
                ErrorCategory::User,
                ErrorKind::NotASidecar,
                format!(
                    "{} is not an encrypted file (expected a name ending in {})",
                    sidecar.display(),
                    self.naming().suffix()
                ),
            )
        })?;
        let armored = self.content.read_content(&sidecar)?;
        // Write through a symlinked plaintext instead of replacing the link.
        let plaintext = identity::canonical_target(&named)?;

        self.state = State::AwaitingSecret;
        let passphrase = self.resolver.resolve(&plaintext, &mut self.prompt)?;

        self.state = State::Transforming;
        let text = secretcrypt::decrypt(passphrase.expose(), &armored, self.options.algorithm)
            .map_err(|e| e.with_context("failed to decrypt"))?;
        self.content
            .replace_all_content(&plaintext, &text)
            .map_err(|e| e.with_context(format!("failed to write to {}", plaintext.display())))?;

        info!(
            "decrypted {} into {} with {}",
            sidecar.display(),
            plaintext.display(),
            self.options.algorithm
        );
        Ok(plaintext)
    }

    fn finish(
        &mut self,
        result: Result<PathBuf>,
        describe: impl FnOnce(&Path) -> String,
    ) -> Completion {
        match result {
            Ok(path) => {
                self.state = State::Done;
                self.prompt.notify_info(&describe(&path));
                Completion::Done(path)
            }
            Err(err) => {
                self.state = State::Aborted;
                self.prompt.notify_error(&err.chain());
                if err.is_abort() {
                    Completion::Aborted(err)
                } else {
                    Completion::Failed(err)
                }
            }
        }
    }
}
