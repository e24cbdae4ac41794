use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabGroupsError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Path error: {0}")]
    PathError(String),
    #[error("Watcher error: {0}")]
    WatchError(#[from] notify::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}
