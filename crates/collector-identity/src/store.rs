//! Durable storage of collector credentials, keyed by [`IdentityKey`].
//!
//! A missing key is the normal "not registered yet" state, not an error
//! condition for callers that ask with [`CredentialsStore::check`] first.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::credentials::CollectorCredentials;
use crate::error::StoreError;
use crate::identity::IdentityKey;

/// Keyed persistence for [`CollectorCredentials`].
///
/// Keys are opaque: a store never relates one key to another.
pub trait CredentialsStore: Send + Sync {
    /// Whether a record exists for `key`.
    fn check(&self, key: &IdentityKey) -> bool;

    /// Load the record for `key`.
    fn get(&self, key: &IdentityKey) -> Result<CollectorCredentials, StoreError>;

    /// Create or overwrite the record for `key`.
    fn store(&self, key: &IdentityKey, credentials: &CollectorCredentials) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

/// One JSON file per key under a single directory.
#[derive(Debug, Clone)]
pub struct LocalFsCredentialsStore {
    directory: PathBuf,
}

impl LocalFsCredentialsStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &IdentityKey) -> PathBuf {
        self.directory.join(format!("{key}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CredentialsStore for LocalFsCredentialsStore {
    /// Only a definite "not found" counts as absent. Any other failure to
    /// stat the record reports it present so that [`get`](Self::get)
    /// surfaces the underlying error instead of a silent re-registration.
    fn check(&self, key: &IdentityKey) -> bool {
        let path = self.path_for(key);
        match fs::metadata(&path) {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot inspect stored collector credentials");
                true
            }
        }
    }

    fn get(&self, key: &IdentityKey) -> Result<CollectorCredentials, StoreError> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.clone()));
            }
            Err(e) => return Err(io_error(&path)(e)),
        };

        let credentials = serde_json::from_str(&content)
            .map_err(|source| StoreError::Serialization {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "loaded collector credentials");
        Ok(credentials)
    }

    fn store(&self, key: &IdentityKey, credentials: &CollectorCredentials) -> Result<(), StoreError> {
        fs::create_dir_all(&self.directory).map_err(io_error(&self.directory))?;

        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(credentials).map_err(|source| {
            StoreError::Serialization {
                path: path.clone(),
                source,
            }
        })?;

        // Write a sibling and rename over the target so readers never see a
        // partially written record.
        let tmp_path = path.with_extension("json.tmp");
        let mut file = open_private(&tmp_path).map_err(io_error(&tmp_path))?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(io_error(&tmp_path))?;
        drop(file);
        fs::rename(&tmp_path, &path).map_err(io_error(&path))?;

        debug!(path = %path.display(), "stored collector credentials");
        Ok(())
    }
}

/// Open `path` for writing, readable by the owner only where the platform
/// supports it.
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Non-durable store for tests and for embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCredentialsStore {
    records: Mutex<HashMap<IdentityKey, CollectorCredentials>>,
}

impl MemoryCredentialsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialsStore for MemoryCredentialsStore {
    fn check(&self, key: &IdentityKey) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn get(&self, key: &IdentityKey) -> Result<CollectorCredentials, StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn store(&self, key: &IdentityKey, credentials: &CollectorCredentials) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), credentials.clone());
        Ok(())
    }
}
