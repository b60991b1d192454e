//! File identities and the plaintext/sidecar naming convention

use crate::error::{EnvSafeError, ErrorCategory, ErrorKind, Result};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix appended to a plaintext file name to name its encrypted sidecar
pub const DEFAULT_SIDECAR_SUFFIX: &str = ".hash";

/// File names treated as plaintext by the save trigger
pub const DEFAULT_PLAINTEXT_NAMES: &[&str] = &[".env"];

/// Prefix of every secret store key
const CACHE_KEY_PREFIX: &str = "envsafe-secret-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Plaintext,
    Sidecar,
    Other,
}

/// Maps plaintext files to sidecars and both to a shared cache key
#[derive(Debug, Clone)]
pub struct Naming {
    suffix: String,
    plaintext_names: Vec<String>,
}

impl Naming {
    pub fn new(suffix: impl Into<String>, plaintext_names: Vec<String>) -> Result<Self> {
        let suffix = suffix.into();
        if suffix.is_empty() || suffix.contains(['/', '\\']) {
            return Err(EnvSafeError::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                format!(
                    "invalid sidecar suffix {:?}: must be non-empty and contain no path separator",
                    suffix
                ),
            ));
        }
        if plaintext_names.iter().any(|name| name.is_empty()) {
            return Err(EnvSafeError::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                "invalid plaintext name \"\": names must be non-empty",
            ));
        }
        Ok(Self {
            suffix,
            plaintext_names,
        })
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    fn file_name(path: &Path) -> Option<&str> {
        path.file_name().and_then(|name| name.to_str())
    }

    /// Whether the file name ends with the sidecar suffix (ASCII case-insensitive)
    pub fn is_sidecar(&self, path: &Path) -> bool {
        self.strip_suffix(path).is_some()
    }

    /// The file name with the sidecar suffix removed, if it has one and
    /// something remains.
    fn strip_suffix<'a>(&self, path: &'a Path) -> Option<&'a str> {
        let name = Self::file_name(path)?;
        let cut = name.len().checked_sub(self.suffix.len())?;
        if cut == 0 || !name.is_char_boundary(cut) {
            return None;
        }
        let (stem, tail) = name.split_at(cut);
        tail.eq_ignore_ascii_case(&self.suffix).then_some(stem)
    }

    /// Sidecar path for a plaintext path: the same path with the suffix appended
    pub fn sidecar_for(&self, plaintext: &Path) -> PathBuf {
        let mut name = OsString::from(plaintext.as_os_str());
        name.push(&self.suffix);
        PathBuf::from(name)
    }

    /// Plaintext path for a sidecar path, or `None` if `sidecar` lacks the suffix
    pub fn plaintext_for(&self, sidecar: &Path) -> Option<PathBuf> {
        let stem = self.strip_suffix(sidecar)?;
        Some(sidecar.with_file_name(stem))
    }

    /// Secret store key for a file; a sidecar maps to the key of its plaintext
    pub fn cache_key(&self, path: &Path) -> String {
        let plaintext = self.plaintext_for(path);
        let path = plaintext.as_deref().unwrap_or(path);
        format!("{}{}", CACHE_KEY_PREFIX, path.display())
    }

    pub fn classify(&self, path: &Path) -> FileKind {
        if self.is_sidecar(path) {
            return FileKind::Sidecar;
        }
        let Some(name) = Self::file_name(path) else {
            return FileKind::Other;
        };
        let plaintext = self.plaintext_names.iter().any(|candidate| {
            name == candidate
                || name.starts_with(&format!("{}.", candidate))
                || name.ends_with(candidate.as_str())
        });
        if plaintext {
            FileKind::Plaintext
        } else {
            FileKind::Other
        }
    }
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SIDECAR_SUFFIX.to_string(),
            plaintext_names: DEFAULT_PLAINTEXT_NAMES
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

fn canonicalize_error(path: &Path, err: io::Error) -> EnvSafeError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    EnvSafeError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to resolve {}", path.display()),
        err,
    )
}

/// Canonical path of an existing file
pub fn canonical(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path).map_err(|e| canonicalize_error(path, e))
}

/// Canonical path of a file that may not exist yet; its parent directory must exist
///
/// An existing symlink resolves to the file it points to.
pub fn canonical_target(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return canonical(path);
    }
    canonical_parent(path)
}

/// `path` with its parent directory canonicalized and its file name kept
/// as given, so a symlinked file keeps the name the user chose.
pub fn canonical_parent(path: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        EnvSafeError::with_kind(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("{} does not name a file", path.display()),
        )
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(canonical(parent)?.join(name))
}
