//! Durable storage for the session between runs.

use std::{
    collections::HashMap,
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

/// The key the bearer token is stored under.
pub const TOKEN_KEY: &str = "token";
/// The key the JSON-serialized [`crate::User`] is stored under.
pub const USER_KEY: &str = "user";

/// A simple string key/value store which survives restarts.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Remove a key. Removing a key that isn't there is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: SessionStorage + ?Sized> SessionStorage for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Storage which only lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage { MemoryStorage::default() }

    /// Create a store pre-populated with some values.
    pub fn with_values<I, K, V>(values: I) -> MemoryStorage
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        MemoryStorage {
            values: Mutex::new(values),
        }
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values().remove(key);
        Ok(())
    }
}

/// Storage backed by a directory, where each key is a file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(directory: P) -> FileStorage {
        FileStorage {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path { &self.directory }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid {
            Ok(self.directory.join(key))
        } else {
            Err(StorageError::InvalidKey(key.to_string()))
        }
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;

        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        fs::create_dir_all(&self.directory).map_err(|e| StorageError::Io {
            path: self.directory.clone(),
            source: e,
        })?;
        log::trace!("Writing \"{}\" to {}", key, path.display());

        write_private(&path, value)
            .map_err(|e| StorageError::Io { path, source: e })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        match fs::remove_file(&path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }
}

/// Write a file only the current user can read, since it holds a bearer
/// token.
#[cfg(unix)]
fn write_private(path: &Path, value: &str) -> io::Result<()> {
    use std::{
        io::Write,
        os::unix::fs::{OpenOptionsExt, PermissionsExt},
    };

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // the mode only applies to new files
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(value.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, value: &str) -> io::Result<()> {
    fs::write(path, value)
}

/// Errors that may occur while reading or writing a [`SessionStorage`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Unable to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unable to serialize the session")]
    Serialize(#[from] serde_json::Error),
    #[error("\"{0}\" is not a valid storage key")]
    InvalidKey(String),
}
