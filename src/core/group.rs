//! The group: a named, colored, ordered collection of file paths.

use crate::core::color::{ColorPreset, Rgb};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(rename = "color_rgb")]
    pub color: Rgb,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub file_paths: Vec<String>,
}

impl Group {
    /// New unpinned, empty group with a fresh id.
    pub fn new(name: impl Into<String>, color: ColorPreset) -> Self {
        Self {
            id: Ulid::new().to_string(),
            name: name.into(),
            color: color.main_color(),
            is_pinned: false,
            file_paths: Vec::new(),
        }
    }

    pub fn close_button_color(&self) -> Rgb {
        ColorPreset::close_button_color_for(self.color)
    }

    pub fn preset(&self) -> Option<ColorPreset> {
        ColorPreset::find_by_rgb(self.color)
    }

    /// Appends `path` unless it is already present. Returns whether it was added.
    pub fn add_file(&mut self, path: &str) -> bool {
        if self.contains_file(path) {
            return false;
        }
        self.file_paths.push(path.to_string());
        true
    }

    pub fn remove_file(&mut self, path: &str) -> bool {
        let before = self.file_paths.len();
        self.file_paths.retain(|p| p != path);
        self.file_paths.len() != before
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.file_paths.iter().any(|p| p == path)
    }

    pub fn file_count(&self) -> usize {
        self.file_paths.len()
    }

    /// Moves `path` one slot towards the front (`-1`) or back (`+1`).
    /// Returns false when the path is absent or already at the boundary.
    pub fn shift_file(&mut self, path: &str, direction: isize) -> bool {
        match self.file_paths.iter().position(|p| p == path) {
            Some(index) => shift_in_list(&mut self.file_paths, index, direction),
            None => false,
        }
    }

    /// Orders files by lowercase extension, then lowercase base name.
    pub fn sort_files(&mut self) {
        self.file_paths
            .sort_by_cached_key(|p| (extension_of(p).to_lowercase(), base_name(p).to_lowercase()));
    }

    /// Drops repeated paths, keeping the first occurrence.
    pub(crate) fn dedupe_files(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.file_paths.retain(|p| seen.insert(p.clone()));
    }
}

/// Substring after the last `/`; the whole path when there is none.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Substring after the last `.` of the base name; empty without a dot.
pub fn extension_of(path: &str) -> &str {
    let name = base_name(path);
    match name.rfind('.') {
        Some(dot) => &name[dot + 1..],
        None => "",
    }
}

/// Substring before the last `/`; empty when there is none.
pub fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(slash) => &path[..slash],
        None => "",
    }
}

pub(crate) fn shift_in_list<T>(list: &mut Vec<T>, index: usize, direction: isize) -> bool {
    let Some(target) = index.checked_add_signed(direction) else {
        return false;
    };
    if index >= list.len() || target >= list.len() {
        return false;
    }
    let item = list.remove(index);
    list.insert(target, item);
    true
}
