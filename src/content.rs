//! File content access with atomic whole-file replacement

use crate::error::{EnvSafeError, ErrorCategory, ErrorKind, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Reads and replaces the textual content of files
pub trait ContentStore {
    fn read_content(&self, path: &Path) -> Result<String>;

    /// Replace the whole content of `path`, all or nothing.
    fn replace_all_content(&mut self, path: &Path, text: &str) -> Result<()>;

    /// Create an empty file at `path` unless one already exists.
    fn create_if_absent(&mut self, path: &Path) -> Result<()>;
}

/// Content store over the local filesystem
///
/// Replacement goes through a temp file in the target directory that is
/// fsync'ed and renamed over the target, so readers see either the old or
/// the new content.
#[derive(Debug, Default)]
pub struct FsContentStore;

impl FsContentStore {
    pub fn new() -> Self {
        Self
    }
}

fn io_error(category: ErrorCategory, msg: String, err: io::Error) -> EnvSafeError {
    EnvSafeError::with_kind_and_source(category, ErrorKind::Io, msg, err)
}

fn read_error(path: &Path, err: io::Error) -> EnvSafeError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    io_error(
        category,
        format!("failed to read from {}", path.display()),
        err,
    )
}

impl ContentStore for FsContentStore {
    fn read_content(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
        String::from_utf8(bytes).map_err(|e| {
            EnvSafeError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("{} is not valid UTF-8", path.display()),
                e,
            )
        })
    }

    fn replace_all_content(&mut self, path: &Path, text: &str) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let existing_permissions = fs::metadata(path).ok().map(|m| m.permissions());

        let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                "failed to create tempfile".to_string(),
                e,
            )
        })?;
        temp_file.write_all(text.as_bytes()).map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                "failed to write to tempfile".to_string(),
                e,
            )
        })?;
        // Flush and fsync() such that the rename later, if it succeeds, will
        // always point to a valid file.
        temp_file.flush().map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                "failed to flush tempfile".to_string(),
                e,
            )
        })?;
        temp_file.as_file().sync_all().map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                "failed to sync file prior to rename".to_string(),
                e,
            )
        })?;

        // Keep the target's permissions; new files are owner-only on Unix.
        let permissions = match existing_permissions {
            Some(permissions) => Some(permissions),
            None => owner_only(&temp_file)?,
        };
        if let Some(permissions) = permissions {
            temp_file
                .as_file()
                .set_permissions(permissions)
                .map_err(|e| {
                    io_error(
                        ErrorCategory::Internal,
                        "failed to set tempfile permissions".to_string(),
                        e,
                    )
                })?;
        }

        temp_file.persist(path).map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                format!("failed to rename to target file {}", path.display()),
                e.error,
            )
        })?;
        Ok(())
    }

    fn create_if_absent(&mut self, path: &Path) -> Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        match options.open(path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(io_error(
                ErrorCategory::User,
                format!("failed to create {}", path.display()),
                e,
            )),
        }
    }
}

#[cfg(unix)]
fn owner_only(temp_file: &tempfile::NamedTempFile) -> Result<Option<fs::Permissions>> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = temp_file
        .as_file()
        .metadata()
        .map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                "failed to get tempfile metadata".to_string(),
                e,
            )
        })?
        .permissions();
    permissions.set_mode(0o600);
    Ok(Some(permissions))
}

#[cfg(not(unix))]
fn owner_only(_temp_file: &tempfile::NamedTempFile) -> Result<Option<fs::Permissions>> {
    Ok(None)
}
