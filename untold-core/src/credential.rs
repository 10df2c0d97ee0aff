//! Durable storage for the single user-supplied API key.
//!
//! The store never validates what it holds and
//! reports a missing or empty slot as `None` rather than an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the slot the key is kept under.
pub const CREDENTIAL_KEY: &str = "user-api-key";

/// Errors from writing the credential slot.
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not determine a configuration directory")]
    NoConfigDir,
}

/// Read/write access to one opaque credential string.
pub trait CredentialStore: Send + Sync {
    /// The stored credential, or `None` when the slot is missing or empty.
    fn get(&self) -> Option<String>;

    /// Replace the stored credential.
    fn set(&self, value: &str) -> Result<(), CredentialStoreError>;
}

/// Credential slot backed by a single plain-text file.
///
/// Defaults to `<config dir>/untold/user-api-key`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store at the default location under the user's config directory.
    pub fn new() -> Result<Self, CredentialStoreError> {
        Ok(Self {
            path: Self::default_path()?,
        })
    }

    /// Store at a custom path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/untold/user-api-key`.
    pub fn default_path() -> Result<PathBuf, CredentialStoreError> {
        dirs::config_dir()
            .map(|dir| dir.join("untold").join(CREDENTIAL_KEY))
            .ok_or(CredentialStoreError::NoConfigDir)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> CredentialStoreError {
        CredentialStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let value = content.trim_end_matches(['\r', '\n']);
                (!value.is_empty()).then(|| value.to_string())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "credential slot unreadable, treating as empty");
                None
            }
        }
    }

    fn set(&self, value: &str) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        fs::write(&self.path, value).map_err(|e| self.io_error(e))?;
        restrict_permissions(&self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
