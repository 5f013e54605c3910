//! Durable session storage backends.
//!
//! The store persists one opaque JSON payload under the `auth-storage`
//! key. Backends are dependency-injected so tests run against isolated
//! instances with no cross-test leakage.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key under which the session payload is persisted.
pub const AUTH_STORAGE_KEY: &str = "auth-storage";

/// Backend failure (IO-level). Corrupt *contents* are not a storage
/// error — the session layer treats them as an absent session.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key-value slot for the serialized session payload.
pub trait SessionStorage: Send {
    fn load(&self) -> Result<Option<String>, StorageError>;
    fn save(&self, payload: &str) -> Result<(), StorageError>;
    fn erase(&self) -> Result<(), StorageError>;
}

// ─── File Backend ─────────────────────────────────────────────────

/// File-backed storage: `<dir>/auth-storage.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(format!("{AUTH_STORAGE_KEY}.json"))
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn save(&self, payload: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(), payload)?;
        Ok(())
    }

    fn erase(&self) -> Result<(), StorageError> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ─── In-Memory Backend ────────────────────────────────────────────

/// In-memory storage for tests.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    cell: Mutex<Option<String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot directly (e.g. with a corrupt payload).
    pub fn seed(payload: impl Into<String>) -> Self {
        Self {
            cell: Mutex::new(Some(payload.into())),
        }
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.cell.lock().map_or(None, |slot| slot.clone()))
    }

    fn save(&self, payload: &str) -> Result<(), StorageError> {
        if let Ok(mut slot) = self.cell.lock() {
            *slot = Some(payload.to_owned());
        }
        Ok(())
    }

    fn erase(&self) -> Result<(), StorageError> {
        if let Ok(mut slot) = self.cell.lock() {
            *slot = None;
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────
