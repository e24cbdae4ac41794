//! Branch-scoped group store.
//!
//! Owns the [`PersistedState`] of one project. Reads resolve the active branch
//! through the injected provider on every call, so the active view
//! (pinned groups followed by the current branch's groups) is never cached.
//! Every mutation that changes something is written through to the backend
//! and then announced to change listeners.
//!
//! Unknown ids and absent paths are silent no-ops. A failed save leaves the
//! mutation in memory; the error is logged and kept in [`GroupService::persist_error`]
//! until the next successful save.

use crate::core::branch::{BranchNameProvider, BranchResolver};
use crate::core::color::{ColorPreset, ColorRotation, TabTint, tab_tint};
use crate::core::config::TabGroupsConfig;
use crate::core::error::TabGroupsError;
use crate::core::group::{Group, shift_in_list};
use crate::core::schemas::PersistedState;
use crate::core::storage::{JsonFileBackend, StateBackend};
use crate::core::store::Store;
use crate::plugins::reconcile::LocationChange;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle returned by [`GroupService::add_change_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ChangeListener = Box<dyn Fn() + Send>;

/// Where a group sat before its last pin toggle, so toggling straight back
/// restores the exact slot even when the clamp moved it.
#[derive(Debug, Clone)]
struct ToggleOrigin {
    group_id: String,
    branch: String,
    index: usize,
}

pub struct GroupService {
    state: PersistedState,
    backend: Box<dyn StateBackend>,
    branches: Arc<dyn BranchNameProvider>,
    colors: ColorRotation,
    listeners: Vec<(ListenerId, ChangeListener)>,
    next_listener_id: u64,
    expanded: HashSet<String>,
    last_known_branch: Option<String>,
    last_toggle: Option<ToggleOrigin>,
    persist_error: Option<TabGroupsError>,
}

impl GroupService {
    /// Loads the persisted state, starting empty when nothing was saved yet.
    /// A backend that cannot be read is an error: starting empty would
    /// overwrite the unreadable file on the next save.
    pub fn open(
        backend: Box<dyn StateBackend>,
        branches: Arc<dyn BranchNameProvider>,
    ) -> Result<Self, TabGroupsError> {
        let state = backend.load()?.unwrap_or_default();
        debug!(
            pinned = state.pinned_groups.len(),
            branches = state.branch_groups.len(),
            "loaded tab group state"
        );
        Ok(Self {
            state,
            backend,
            branches,
            colors: ColorRotation::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            expanded: HashSet::new(),
            last_known_branch: None,
            last_toggle: None,
            persist_error: None,
        })
    }

    /// Store for a project directory: JSON file under `.tabgroups/` and git
    /// branch detection rooted at the project.
    pub fn for_project(store: &Store, config: &TabGroupsConfig) -> Result<Self, TabGroupsError> {
        let backend = JsonFileBackend::new(store.state_path(&config.state_file));
        let branches = BranchResolver::for_git(store.root.clone(), config.fallback_branch.clone());
        Self::open(Box::new(backend), Arc::new(branches))
    }

    pub fn with_color_rotation(mut self, colors: ColorRotation) -> Self {
        self.colors = colors;
        self
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn current_branch(&self) -> String {
        self.branches.current_branch_name()
    }

    pub fn persist_error(&self) -> Option<&TabGroupsError> {
        self.persist_error.as_ref()
    }

    /// Retries the save, e.g. after a persistence failure.
    pub fn flush(&mut self) -> Result<(), TabGroupsError> {
        let result = self.backend.save(&self.state);
        if result.is_ok() {
            self.persist_error = None;
        }
        result
    }

    // ===== Reads =====

    /// Pinned groups followed by the current branch's groups.
    pub fn get_all_groups(&self) -> Vec<Group> {
        let branch = self.current_branch();
        self.state
            .pinned_groups
            .iter()
            .chain(self.state.branch(&branch))
            .cloned()
            .collect()
    }

    pub fn find_group_by_id(&self, id: &str) -> Option<Group> {
        let branch = self.current_branch();
        self.state
            .pinned_groups
            .iter()
            .chain(self.state.branch(&branch))
            .find(|g| g.id == id)
            .cloned()
    }

    /// First group in active-view order holding exactly `path`.
    pub fn find_group_for_file(&self, path: &str) -> Option<Group> {
        let branch = self.current_branch();
        self.state
            .pinned_groups
            .iter()
            .chain(self.state.branch(&branch))
            .find(|g| g.contains_file(path))
            .cloned()
    }

    /// Background tint for the tab showing `path`.
    pub fn tab_color_for(&self, path: &str) -> Option<TabTint> {
        self.find_group_for_file(path).map(|g| tab_tint(g.color))
    }

    /// Only one grouped file may be open at a time: opening a grouped file
    /// closes every other open file that belongs to any visible group.
    /// Returns the files to close; empty when `opened` is not grouped.
    pub fn grouped_files_to_close(&self, opened: &str, open_files: &[String]) -> Vec<String> {
        if self.find_group_for_file(opened).is_none() {
            return Vec::new();
        }
        let grouped: HashSet<String> = self
            .get_all_groups()
            .into_iter()
            .flat_map(|g| g.file_paths)
            .collect();
        open_files
            .iter()
            .filter(|f| f.as_str() != opened && grouped.contains(f.as_str()))
            .cloned()
            .collect()
    }

    // ===== Group lifecycle =====

    /// Appends a new unpinned group to the current branch.
    pub fn create_group(&mut self, name: &str) -> Group {
        let branch = self.current_branch();
        let group = Group::new(name, self.colors.next_preset());
        self.state.branch_mut(&branch).push(group.clone());
        info!(group = %group.id, name = %group.name, branch = %branch, "created group");
        self.commit(true);
        group
    }

    pub fn rename_group(&mut self, id: &str, new_name: &str) -> bool {
        let changed = match self.locate_mut(id) {
            Some(group) => {
                group.name = new_name.to_string();
                true
            }
            None => false,
        };
        self.commit(changed)
    }

    pub fn change_group_color(&mut self, id: &str, preset: ColorPreset) -> bool {
        let changed = match self.locate_mut(id) {
            Some(group) => {
                group.color = preset.main_color();
                true
            }
            None => false,
        };
        self.commit(changed)
    }

    /// Removes a pinned group everywhere, or a branch group from the current
    /// branch only.
    pub fn delete_group(&mut self, id: &str) -> bool {
        let branch = self.current_branch();
        let changed = if let Some(index) = self.state.pinned_groups.iter().position(|g| g.id == id) {
            self.state.pinned_groups.remove(index);
            true
        } else if let Some(list) = self.state.branch_groups.get_mut(&branch) {
            let before = list.len();
            list.retain(|g| g.id != id);
            list.len() != before
        } else {
            false
        };
        if changed {
            self.expanded.remove(id);
        }
        self.commit(changed)
    }

    /// Moves the group between the pinned list and the current branch's list,
    /// keeping its index where the destination allows.
    pub fn toggle_group_pinned(&mut self, id: &str) -> bool {
        let branch = self.current_branch();
        let restore = self
            .last_toggle
            .take()
            .filter(|t| t.group_id == id && t.branch == branch)
            .map(|t| t.index);

        let origin = if let Some(index) = self.state.pinned_groups.iter().position(|g| g.id == id) {
            let mut group = self.state.pinned_groups.remove(index);
            group.is_pinned = false;
            let list = self.state.branch_mut(&branch);
            let at = restore.unwrap_or(index).min(list.len());
            list.insert(at, group);
            info!(group = %id, branch = %branch, "unpinned group");
            Some(index)
        } else {
            let found = self
                .state
                .branch_groups
                .get(&branch)
                .and_then(|list| list.iter().position(|g| g.id == id));
            match found {
                Some(index) => {
                    let mut group = self.state.branch_mut(&branch).remove(index);
                    group.is_pinned = true;
                    let at = restore.unwrap_or(index).min(self.state.pinned_groups.len());
                    self.state.pinned_groups.insert(at, group);
                    info!(group = %id, branch = %branch, "pinned group");
                    Some(index)
                }
                None => None,
            }
        };

        let changed = self.commit(origin.is_some());
        if let Some(index) = origin {
            self.last_toggle = Some(ToggleOrigin {
                group_id: id.to_string(),
                branch,
                index,
            });
        }
        changed
    }

    pub fn move_group_up(&mut self, id: &str) -> bool {
        self.move_group(id, -1)
    }

    pub fn move_group_down(&mut self, id: &str) -> bool {
        self.move_group(id, 1)
    }

    fn move_group(&mut self, id: &str, direction: isize) -> bool {
        let changed = match self.state.pinned_groups.iter().position(|g| g.id == id) {
            Some(index) => shift_in_list(&mut self.state.pinned_groups, index, direction),
            None => {
                let branch = self.current_branch();
                match self.state.branch_groups.get_mut(&branch) {
                    Some(list) => match list.iter().position(|g| g.id == id) {
                        Some(index) => shift_in_list(list, index, direction),
                        None => false,
                    },
                    None => false,
                }
            }
        };
        self.commit(changed)
    }

    // ===== Files =====

    /// Appends `path` to the group. Does not remove it from other groups;
    /// callers wanting exclusive membership call
    /// [`remove_file_from_group`](Self::remove_file_from_group) first.
    pub fn add_file_to_group(&mut self, path: &str, group_id: &str) -> bool {
        let changed = match self.locate_mut(group_id) {
            Some(group) => group.add_file(path),
            None => false,
        };
        self.commit(changed)
    }

    /// Removes `path` from every group in the active view.
    pub fn remove_file_from_group(&mut self, path: &str) -> bool {
        let changed = self.for_each_active(|g| g.remove_file(path));
        self.commit(changed)
    }

    pub fn move_file_up(&mut self, group_id: &str, path: &str) -> bool {
        self.move_file(group_id, path, -1)
    }

    pub fn move_file_down(&mut self, group_id: &str, path: &str) -> bool {
        self.move_file(group_id, path, 1)
    }

    fn move_file(&mut self, group_id: &str, path: &str, direction: isize) -> bool {
        let changed = match self.locate_mut(group_id) {
            Some(group) => group.shift_file(path, direction),
            None => false,
        };
        self.commit(changed)
    }

    pub fn sort_group_files(&mut self, group_id: &str) -> bool {
        let changed = match self.locate_mut(group_id) {
            Some(group) => {
                let before = group.file_paths.clone();
                group.sort_files();
                group.file_paths != before
            }
            None => false,
        };
        self.commit(changed)
    }

    /// Every visible group holding `old_path` drops it and gets `new_path`
    /// appended at the end.
    pub fn handle_file_moved(&mut self, old_path: &str, new_path: &str) -> bool {
        let changed = self.for_each_active(|g| {
            if g.remove_file(old_path) {
                g.add_file(new_path);
                true
            } else {
                false
            }
        });
        if changed {
            info!(from = %old_path, to = %new_path, "grouped file moved");
        }
        self.commit(changed)
    }

    pub fn handle_file_deleted(&mut self, path: &str) -> bool {
        let changed = self.for_each_active(|g| g.remove_file(path));
        if changed {
            info!(path = %path, "grouped file deleted");
        }
        self.commit(changed)
    }

    pub fn apply(&mut self, change: &LocationChange) -> bool {
        match change {
            LocationChange::Moved { from, to } => self.handle_file_moved(from, to),
            LocationChange::Deleted { path } => self.handle_file_deleted(path),
        }
    }

    // ===== Expansion (not persisted) =====

    pub fn is_group_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn toggle_group_expanded(&mut self, id: &str) {
        if !self.expanded.remove(id) {
            self.expanded.insert(id.to_string());
        }
        self.notify_changed();
    }

    pub fn set_group_expanded(&mut self, id: &str, expanded: bool) {
        if expanded {
            self.expanded.insert(id.to_string());
        } else {
            self.expanded.remove(id);
        }
        self.notify_changed();
    }

    // ===== Change notification =====

    pub fn add_change_listener(&mut self, listener: impl Fn() + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_change_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn notify_changed(&self) {
        for (_, listener) in &self.listeners {
            listener();
        }
    }

    /// Entry point for the branch poller: re-resolves the branch and signals
    /// listeners so they re-read the new active view.
    pub fn on_branch_changed(&mut self) {
        let branch = self.current_branch();
        if self.last_known_branch.as_deref() != Some(branch.as_str()) {
            info!(branch = %branch, "active branch changed");
        }
        self.last_known_branch = Some(branch);
        self.notify_changed();
    }

    // ===== Internals =====

    /// Pinned partition first, then the current branch.
    fn locate_mut(&mut self, id: &str) -> Option<&mut Group> {
        let branch = self.current_branch();
        let PersistedState {
            pinned_groups,
            branch_groups,
            ..
        } = &mut self.state;
        pinned_groups
            .iter_mut()
            .chain(branch_groups.get_mut(&branch).into_iter().flatten())
            .find(|g| g.id == id)
    }

    /// Runs `f` on every group in the active view; true if any call was.
    fn for_each_active(&mut self, mut f: impl FnMut(&mut Group) -> bool) -> bool {
        let branch = self.current_branch();
        let PersistedState {
            pinned_groups,
            branch_groups,
            ..
        } = &mut self.state;
        let mut changed = false;
        for group in pinned_groups
            .iter_mut()
            .chain(branch_groups.get_mut(&branch).into_iter().flatten())
        {
            changed |= f(group);
        }
        changed
    }

    fn commit(&mut self, changed: bool) -> bool {
        if !changed {
            return false;
        }
        self.last_toggle = None;
        self.persist();
        self.notify_changed();
        true
    }

    fn persist(&mut self) {
        match self.backend.save(&self.state) {
            Ok(()) => self.persist_error = None,
            Err(err) => {
                warn!(error = %err, "failed to save tab groups; keeping in-memory state");
                self.persist_error = Some(err);
            }
        }
    }
}
