//! Subsystems built on `core`: the group store, the move/rename reconciler,
//! the branch poller and the filesystem watcher.

pub mod branch_poller;
pub mod fs_watch;
pub mod groups;
pub mod reconcile;
