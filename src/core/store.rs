//! Project context handle.
//!
//! A `Store` names one project-like context: the directory whose files are
//! grouped, and under it the `.tabgroups/` directory holding that context's
//! persisted groups and optional config.

use crate::core::schemas;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    /// Absolute path to the project root
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(schemas::STATE_DIR_NAME)
    }

    pub fn state_path(&self, file_name: &str) -> PathBuf {
        self.state_dir().join(file_name)
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join(schemas::CONFIG_FILE_NAME)
    }
}
