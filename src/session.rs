//! Durable session state.
//!
//! A [`Session`] is the platform client's settings blob (cookies, tokens, device
//! identifiers) tagged with the identity that produced it. [`SessionStore`] keeps
//! one session per file as JSON and replaces it atomically: the new blob is written
//! to a temp file in the same directory, synced, then renamed over the target, so a
//! crash mid-write leaves the previous session intact.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no session stored at {0}")]
    NotFound(PathBuf),
    #[error("session file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("session file {path} belongs to {found}, expected {expected}")]
    IdentityMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("failed to read session file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write session file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    identity: String,
    settings: Map<String, Value>,
}

impl Session {
    #[must_use]
    pub fn new(identity: impl Into<String>, settings: Map<String, Value>) -> Self {
        Self {
            identity: identity.into(),
            settings,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    #[must_use]
    pub fn into_settings(self) -> Map<String, Value> {
        self.settings
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the session stored for `identity`.
    ///
    /// Blocking file I/O; async callers use [`Self::load`].
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if there is no file (or it is empty),
    /// `StorageError::Corrupt` if the bytes do not parse, `StorageError::IdentityMismatch`
    /// if the blob was produced by another identity, and `StorageError::Read` on I/O failure.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn restore(&self, identity: &str) -> Result<Session, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(self.path.clone()));
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(StorageError::NotFound(self.path.clone()));
        }

        let session: Session =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        if session.identity != identity {
            return Err(StorageError::IdentityMismatch {
                path: self.path.clone(),
                expected: identity.to_string(),
                found: session.identity,
            });
        }

        debug!(keys = session.settings.len(), "session restored");

        Ok(session)
    }

    /// Replace the stored session.
    ///
    /// Blocking file I/O and `fsync`; async callers use [`Self::save`].
    ///
    /// # Errors
    /// Returns `StorageError::WriteFailed` if the temp file cannot be written, synced
    /// or renamed into place. The previous file is left untouched in that case.
    #[instrument(skip(self, session), fields(path = %self.path.display(), identity = %session.identity))]
    pub fn persist(&self, session: &Session) -> Result<(), StorageError> {
        self.write_atomic(session)
            .map_err(|source| StorageError::WriteFailed {
                path: self.path.clone(),
                source,
            })?;

        debug!(keys = session.settings.len(), "session persisted");

        Ok(())
    }

    /// Remove the stored session. A missing file is not an error.
    ///
    /// # Errors
    /// Returns `StorageError::WriteFailed` if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::WriteFailed {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// [`Self::restore`] on the blocking pool, for callers on the async runtime.
    ///
    /// # Errors
    /// Same as [`Self::restore`]; a failed blocking task surfaces as `StorageError::Read`.
    pub async fn load(&self, identity: &str) -> Result<Session, StorageError> {
        let store = self.clone();
        let identity = identity.to_string();
        // Offload blocking file I/O to a dedicated thread
        tokio::task::spawn_blocking(move || store.restore(&identity))
            .await
            .unwrap_or_else(|err| {
                Err(StorageError::Read {
                    path: self.path.clone(),
                    source: io::Error::other(err),
                })
            })
    }

    /// [`Self::persist`] on the blocking pool, for callers on the async runtime.
    ///
    /// # Errors
    /// Same as [`Self::persist`]; a failed blocking task surfaces as `StorageError::WriteFailed`.
    pub async fn save(&self, session: Session) -> Result<(), StorageError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.persist(&session))
            .await
            .unwrap_or_else(|err| {
                Err(StorageError::WriteFailed {
                    path: self.path.clone(),
                    source: io::Error::other(err),
                })
            })
    }

    fn write_atomic(&self, session: &Session) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, session)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;

        Ok(())
    }
}
