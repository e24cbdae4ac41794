//! Active branch detection.
//!
//! The group store asks for the branch name on every call, so the provider
//! never fails outward: strategies are tried in a fixed order and the first
//! non-blank answer wins, otherwise a sentinel name is returned.

use crate::core::config::DEFAULT_FALLBACK_BRANCH;
use crate::core::error::TabGroupsError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, RwLock};
use tracing::debug;

pub trait BranchNameProvider: Send + Sync {
    fn current_branch_name(&self) -> String;
}

impl<P: BranchNameProvider + ?Sized> BranchNameProvider for Arc<P> {
    fn current_branch_name(&self) -> String {
        (**self).current_branch_name()
    }
}

/// One way of asking the repository for its branch.
pub trait BranchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means this strategy has no answer for `root`.
    fn detect(&self, root: &Path) -> Result<Option<String>, TabGroupsError>;
}

/// Asks the `git` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCliStrategy;

impl BranchStrategy for GitCliStrategy {
    fn name(&self) -> &'static str {
        "git-cli"
    }

    fn detect(&self, root: &Path) -> Result<Option<String>, TabGroupsError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(root)
            .args(["branch", "--show-current"])
            .output()
            .map_err(TabGroupsError::IoError)?;
        if !output.status.success() {
            return Ok(None);
        }
        let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(non_blank(branch))
    }
}

/// Reads `.git/HEAD` directly, following `gitdir:` indirection for worktrees
/// and submodules.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitHeadStrategy;

impl GitHeadStrategy {
    fn head_file(root: &Path) -> Result<Option<PathBuf>, TabGroupsError> {
        let dot_git = root.join(".git");
        if dot_git.is_dir() {
            let head = dot_git.join("HEAD");
            return Ok(head.exists().then_some(head));
        }
        if dot_git.is_file() {
            let pointer = fs::read_to_string(&dot_git).map_err(TabGroupsError::IoError)?;
            let Some(git_dir) = pointer.trim().strip_prefix("gitdir:") else {
                return Ok(None);
            };
            let git_dir = PathBuf::from(git_dir.trim());
            let git_dir = if git_dir.is_absolute() {
                git_dir
            } else {
                root.join(git_dir)
            };
            let head = git_dir.join("HEAD");
            return Ok(head.exists().then_some(head));
        }
        Ok(None)
    }
}

impl BranchStrategy for GitHeadStrategy {
    fn name(&self) -> &'static str {
        "git-head"
    }

    fn detect(&self, root: &Path) -> Result<Option<String>, TabGroupsError> {
        match Self::head_file(root)? {
            Some(head) => {
                let content = fs::read_to_string(head).map_err(TabGroupsError::IoError)?;
                Ok(parse_head(&content))
            }
            None => Ok(None),
        }
    }
}

/// `ref: refs/heads/<name>` yields `<name>`; a detached HEAD yields the
/// short (7 char) commit id.
pub fn parse_head(content: &str) -> Option<String> {
    let content = content.trim();
    if let Some(branch) = content.strip_prefix("ref: refs/heads/") {
        return non_blank(branch.to_string());
    }
    if content.starts_with("ref:") {
        return None;
    }
    content.get(..7).map(str::to_string)
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Ordered strategies with a sentinel fallback.
pub struct BranchResolver {
    root: PathBuf,
    strategies: Vec<Box<dyn BranchStrategy>>,
    fallback: String,
}

impl BranchResolver {
    pub fn new(
        root: impl Into<PathBuf>,
        strategies: Vec<Box<dyn BranchStrategy>>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            strategies,
            fallback: fallback.into(),
        }
    }

    /// `git` first, then `.git/HEAD`.
    pub fn for_git(root: impl Into<PathBuf>, fallback: impl Into<String>) -> Self {
        Self::new(
            root,
            vec![Box::new(GitCliStrategy), Box::new(GitHeadStrategy)],
            fallback,
        )
    }
}

impl BranchNameProvider for BranchResolver {
    fn current_branch_name(&self) -> String {
        for strategy in &self.strategies {
            match strategy.detect(&self.root) {
                Ok(Some(branch)) => return branch,
                Ok(None) => {}
                Err(err) => {
                    debug!(strategy = strategy.name(), error = %err, "branch strategy failed");
                }
            }
        }
        debug!(fallback = %self.fallback, "no branch detected, using fallback");
        self.fallback.clone()
    }
}

/// Branch name set by the host, e.g. an editor that already knows it.
#[derive(Debug, Clone)]
pub struct FixedBranch {
    name: Arc<RwLock<String>>,
}

impl FixedBranch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::new(RwLock::new(name.into())),
        }
    }

    pub fn set(&self, name: impl Into<String>) {
        if let Ok(mut current) = self.name.write() {
            *current = name.into();
        }
    }
}

impl Default for FixedBranch {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_BRANCH)
    }
}

impl BranchNameProvider for FixedBranch {
    fn current_branch_name(&self) -> String {
        self.name
            .read()
            .map(|n| n.clone())
            .unwrap_or_else(|_| DEFAULT_FALLBACK_BRANCH.to_string())
    }
}
