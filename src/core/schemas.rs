//! Persisted shape of a project's groups.
//!
//! Pinned groups are shared by every branch; all other groups live under the
//! branch that was active when they were created.

use crate::core::error::TabGroupsError;
use crate::core::group::Group;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STATE_SCHEMA_VERSION: u32 = 1;
pub const STATE_DIR_NAME: &str = ".tabgroups";
pub const DEFAULT_STATE_FILE: &str = "groups.json";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub pinned_groups: Vec<Group>,
    #[serde(default)]
    pub branch_groups: BTreeMap<String, Vec<Group>>,
}

fn default_version() -> u32 {
    STATE_SCHEMA_VERSION
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_SCHEMA_VERSION,
            pinned_groups: Vec::new(),
            branch_groups: BTreeMap::new(),
        }
    }
}

impl PersistedState {
    pub fn from_json(raw: &str) -> Result<Self, TabGroupsError> {
        let mut state: PersistedState = serde_json::from_str(raw)?;
        if state.version > STATE_SCHEMA_VERSION {
            return Err(TabGroupsError::ValidationError(format!(
                "state schema version {} is newer than supported version {}",
                state.version, STATE_SCHEMA_VERSION
            )));
        }
        state.normalize();
        Ok(state)
    }

    pub fn to_json(&self) -> Result<String, TabGroupsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Groups of `branch`, or an empty slice if that branch has none yet.
    pub fn branch(&self, branch: &str) -> &[Group] {
        self.branch_groups
            .get(branch)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn branch_mut(&mut self, branch: &str) -> &mut Vec<Group> {
        self.branch_groups.entry(branch.to_string()).or_default()
    }

    /// Repairs what a hand-edited or older file may contain: pin flags that
    /// disagree with the partition and repeated paths inside a group.
    fn normalize(&mut self) {
        self.version = STATE_SCHEMA_VERSION;
        for group in &mut self.pinned_groups {
            group.is_pinned = true;
            group.dedupe_files();
        }
        for group in self.branch_groups.values_mut().flatten() {
            group.is_pinned = false;
            group.dedupe_files();
        }
    }
}
