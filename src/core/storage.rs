//! Durable storage for [`PersistedState`].
//!
//! The group store loads once at startup and saves after every mutation.

use crate::core::error::TabGroupsError;
use crate::core::schemas::PersistedState;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub trait StateBackend: Send {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<PersistedState>, TabGroupsError>;

    fn save(&self, state: &PersistedState) -> Result<(), TabGroupsError>;
}

/// JSON file backend; writes go to a `.tmp` sibling that is renamed over the
/// target so a crash never leaves a truncated file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "state".to_string());
        self.path.with_file_name(format!(".{}.tmp", file_name))
    }
}

impl StateBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<PersistedState>, TabGroupsError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(TabGroupsError::IoError)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        PersistedState::from_json(&content).map(Some)
    }

    fn save(&self, state: &PersistedState) -> Result<(), TabGroupsError> {
        let parent = self.path.parent().ok_or_else(|| {
            TabGroupsError::PathError(format!(
                "state file has no parent directory: {}",
                self.path.display()
            ))
        })?;
        fs::create_dir_all(parent).map_err(TabGroupsError::IoError)?;

        let body = state.to_json()?;
        let tmp = self.tmp_path();
        fs::write(&tmp, body).map_err(TabGroupsError::IoError)?;
        fs::rename(&tmp, &self.path).map_err(TabGroupsError::IoError)?;
        Ok(())
    }
}

/// In-process backend. Clones share the same snapshot, so a test can keep one
/// handle to inspect what the store saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    snapshot: Arc<Mutex<Option<PersistedState>>>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<PersistedState> {
        self.snapshot.lock().ok().and_then(|s| s.clone())
    }

    /// Makes every following `save` fail with an I/O error until reset.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self) -> Result<Option<PersistedState>, TabGroupsError> {
        let slot = self.snapshot.lock().map_err(|_| {
            TabGroupsError::ValidationError("memory backend lock poisoned".to_string())
        })?;
        Ok(slot.clone())
    }

    fn save(&self, state: &PersistedState) -> Result<(), TabGroupsError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(TabGroupsError::IoError(std::io::Error::other(
                "memory backend configured to fail",
            )));
        }
        let mut slot = self.snapshot.lock().map_err(|_| {
            TabGroupsError::ValidationError("memory backend lock poisoned".to_string())
        })?;
        *slot = Some(state.clone());
        Ok(())
    }
}
