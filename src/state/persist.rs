//! File-backed key/value blobs for state that must survive a restart.
//!
//! SYSTEM CONTEXT
//! ==============
//! Each key is one `<dir>/<key>.json` file. Only the session identity is
//! stored here; room state is always rebuilt from the backend.

#[cfg(test)]
#[path = "persist_test.rs"]
mod persist_test;

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ClientError;

#[derive(Clone, Debug)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Load the blob for `key`. Missing and unreadable blobs both yield `None`;
    /// a corrupt blob is logged so the user can find it.
    pub fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "blob unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "blob corrupt; ignoring");
                None
            }
        }
    }

    /// Write the blob for `key` through a temp file so a crash never leaves a
    /// half-written blob behind.
    ///
    /// # Errors
    ///
    /// Returns storage or serialization errors.
    pub fn save_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ClientError> {
        std::fs::create_dir_all(&self.dir)?;
        let raw = serde_json::to_string_pretty(value)?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Delete the blob for `key`; deleting a missing blob succeeds.
    ///
    /// # Errors
    ///
    /// Returns storage errors other than "not found".
    pub fn remove(&self, key: &str) -> Result<(), ClientError> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
