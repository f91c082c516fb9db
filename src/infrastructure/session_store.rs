//! Access token persistence
//!
//! Tokens are stored trimmed; an empty or whitespace-only value reads as no
//! token at all.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::application::ports::SessionStore;

fn normalize(token: &str) -> Option<String> {
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Token kept in a single file, e.g. `~/.config/catalog-reconciler/token`
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => normalize(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("⚠️ Could not read token file {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn store(&self, token: &str) -> Result<()> {
        let Some(token) = normalize(token) else {
            self.clear();
            return Ok(());
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&self.path, token)
            .with_context(|| format!("Failed to write token file: {}", self.path.display()))?;
        debug!("Session token stored at {:?}", self.path);
        Ok(())
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Session token removed from {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("⚠️ Could not remove token file {:?}: {}", self.path, e),
        }
    }
}

/// Process-local token, used by tests and one-shot runs
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(normalize(token)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn token(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn store(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = normalize(token);
        Ok(())
    }

    fn clear(&self) {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn file_store_round_trips_trimmed_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("token"));
        assert!(!store.is_authenticated());

        store.store("  abc.def  \n").unwrap();

        assert_eq!(store.token().as_deref(), Some("abc.def"));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "abc.def");
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("token"));
        store.store("abc").unwrap();

        store.clear();
        store.clear();

        assert_eq!(store.token(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn blank_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "   \n").unwrap();

        assert_eq!(FileSessionStore::new(path).token(), None);
    }

    #[rstest]
    #[case("token", Some("token"))]
    #[case("  padded\t", Some("padded"))]
    #[case("", None)]
    #[case("   ", None)]
    fn memory_store_normalizes(#[case] raw: &str, #[case] expected: Option<&str>) {
        let store = MemorySessionStore::default();
        store.store(raw).unwrap();
        assert_eq!(store.token().as_deref(), expected);
    }

    #[test]
    fn storing_blank_token_clears_previous_one() {
        let store = MemorySessionStore::with_token("abc");
        store.store(" ").unwrap();
        assert!(!store.is_authenticated());
    }
}
