//! JSON5 configuration file

use crate::error::{EnvSafeError, ErrorCategory, ErrorKind, Result};
use crate::identity::{DEFAULT_PLAINTEXT_NAMES, DEFAULT_SIDECAR_SUFFIX, Naming};
use crate::secret_store::DEFAULT_KEYRING_SERVICE;
use crate::secretcrypt::Algorithm;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the config file inside the user's config directory
pub const CONFIG_FILE_NAME: &str = "envsafe.json5";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub algorithm: Algorithm,
    pub sidecar_suffix: String,
    /// Fold sidecar content at this many characters per line
    pub wrap_column: Option<usize>,
    pub plaintext_names: Vec<String>,
    pub use_keyring: bool,
    pub keyring_service: String,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            sidecar_suffix: DEFAULT_SIDECAR_SUFFIX.to_string(),
            wrap_column: None,
            plaintext_names: DEFAULT_PLAINTEXT_NAMES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            use_keyring: true,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// `<config dir>/envsafe.json5`, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// Load the config from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(EnvSafeError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Config,
                    format!("failed to read config {}", path.display()),
                    e,
                ));
            }
        };
        Self::parse(&text).map_err(|e| e.with_context(format!("in config {}", path.display())))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = json5::from_str(text).map_err(|e| {
            EnvSafeError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Config,
                format!("invalid config: {}", e),
                e,
            )
        })?;
        config.naming()?;
        Ok(config)
    }

    pub fn naming(&self) -> Result<Naming> {
        Naming::new(self.sidecar_suffix.clone(), self.plaintext_names.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.algorithm, Algorithm::Aes);
        assert_eq!(config.sidecar_suffix, ".hash");
        assert!(config.use_keyring);
        assert_eq!(config.wrap_column, None);
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"{
                // comments are allowed
                algorithm: "RC4Drop",
                sidecar_suffix: ".enc",
                wrap_column: 80,
                plaintext_names: [".env", "secrets.txt"],
                use_keyring: false,
                keyring_service: "envsafe-work",
                log_filter: "envsafe=debug",
            }"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::Rc4Drop);
        assert_eq!(config.sidecar_suffix, ".enc");
        assert_eq!(config.wrap_column, Some(80));
        assert_eq!(config.plaintext_names, [".env", "secrets.txt"]);
        assert!(!config.use_keyring);
        assert_eq!(config.keyring_service, "envsafe-work");
        assert_eq!(config.log_filter, "envsafe=debug");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Config::parse("{ algorithim: 'AES' }").expect_err("expected config error");
        assert_eq!(err.kind, Some(ErrorKind::Config));
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let err = Config::parse("{ algorithm: 'Blowfish' }").expect_err("expected config error");
        assert_eq!(err.kind, Some(ErrorKind::Config));
    }

    #[test]
    fn test_invalid_suffix_rejected() {
        let err = Config::parse("{ sidecar_suffix: '' }").expect_err("expected config error");
        assert_eq!(err.kind, Some(ErrorKind::Config));
    }

    #[test]
    fn test_empty_plaintext_name_rejected() {
        let err = Config::parse("{ plaintext_names: ['.env', ''] }")
            .expect_err("expected config error");
        assert_eq!(err.kind, Some(ErrorKind::Config));
    }

    #[test]
    fn test_load_explicit_missing() {
        let temp_dir = TempDir::new().unwrap();
        let err = Config::load(Some(&temp_dir.path().join("missing.json5")))
            .expect_err("expected missing config error");
        assert_eq!(err.kind, Some(ErrorKind::Config));
    }

    #[test]
    fn test_load_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("envsafe.json5");
        fs::write(&path, "{ use_keyring: false, algorithm: 'DES' }").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert!(!config.use_keyring);
        assert_eq!(config.algorithm, Algorithm::Des);
    }
}
