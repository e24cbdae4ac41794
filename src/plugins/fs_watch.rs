//! Filesystem event source backed by `notify`.
//!
//! Translates native watcher events into [`FsEvent`]s for the reconciler and
//! hands them to a callback, one batch per native event. The callback runs on
//! the watcher's thread; forward into a channel to apply on the store's
//! thread.

use crate::core::error::TabGroupsError;
use crate::core::group::{base_name, parent_of};
use crate::plugins::reconcile::FsEvent;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long the source half of a rename waits for its destination before it
/// is reported as a delete (the file left the watched tree).
pub const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(500);

pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    translator: Arc<Mutex<EventTranslator>>,
}

impl FsWatcher {
    /// Watches `root` recursively until dropped.
    pub fn start<F>(root: &Path, ignore: Vec<String>, on_batch: F) -> Result<Self, TabGroupsError>
    where
        F: Fn(Vec<FsEvent>) + Send + 'static,
    {
        let translator = Arc::new(Mutex::new(EventTranslator::new(ignore)));
        let shared = translator.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let batch = lock(&shared).translate(&event, Instant::now());
                    if !batch.is_empty() {
                        on_batch(batch);
                    }
                }
                Err(err) => warn!(error = %err, "filesystem watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), "filesystem watcher started");
        Ok(Self {
            _watcher: watcher,
            translator,
        })
    }

    /// Rename sources whose destination never showed up, as deletes.
    /// Call on an idle tick.
    pub fn flush_unpaired(&self) -> Vec<FsEvent> {
        lock(&self.translator).expire(Instant::now())
    }
}

fn lock(translator: &Mutex<EventTranslator>) -> MutexGuard<'_, EventTranslator> {
    translator
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
struct PendingSource {
    path: String,
    tracker: Option<usize>,
    seen_at: Instant,
}

/// Maps native events to [`FsEvent`]s, pairing the halves of a rename.
///
/// notify reports renames differently per platform:
/// - inotify: `From(old)`, then `To(new)` and `Both(old, new)` sharing a tracker
/// - `RenameMode::Both` alone: `paths = [from, to]` in one event
/// - `RenameMode::From` / `To` without a tracker: consecutive halves
/// - `RenameMode::Any`: direction unknown, decided by whether the path exists
///
/// A source half is held back until its destination arrives. When none
/// arrives within `window` it is reported as a delete; a destination with no
/// source is a create.
#[derive(Debug)]
pub struct EventTranslator {
    ignore: Vec<String>,
    window: Duration,
    pending: Option<PendingSource>,
    last_pair: Option<(String, String)>,
}

impl EventTranslator {
    pub fn new(ignore: Vec<String>) -> Self {
        Self {
            ignore,
            window: RENAME_PAIR_WINDOW,
            pending: None,
            last_pair: None,
        }
    }

    pub fn translate(&mut self, event: &Event, now: Instant) -> Vec<FsEvent> {
        let mut out = self.expire(now);
        let paths: Vec<String> = event.paths.iter().map(|p| path_string(p)).collect();
        if paths.iter().any(|p| is_ignored(p, &self.ignore)) {
            return out;
        }
        let tracker = event.attrs.tracker();

        match &event.kind {
            EventKind::Create(_) => out.extend(paths.into_iter().map(|path| FsEvent::Created { path })),
            EventKind::Remove(_) => out.extend(paths.into_iter().map(|path| FsEvent::Deleted { path })),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in paths {
                    out.extend(self.take_pending());
                    self.pending = Some(PendingSource {
                        path,
                        tracker,
                        seen_at: now,
                    });
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for to in paths {
                    match self.take_matching(tracker) {
                        Some(from) => {
                            out.extend(relocation(&from, &to));
                            self.last_pair = Some((from, to));
                        }
                        None => {
                            out.extend(self.take_pending());
                            out.push(FsEvent::Created { path: to });
                        }
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to, ..] = paths.as_slice() {
                    let pair = (from.clone(), to.clone());
                    if self.last_pair.take().as_ref() != Some(&pair) {
                        if self.pending.as_ref().is_some_and(|p| p.path == *from) {
                            self.pending = None;
                        }
                        out.extend(relocation(from, to));
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                out.extend(self.take_pending());
                out.extend(event.paths.iter().zip(paths).map(|(native, path)| {
                    if native.exists() {
                        FsEvent::Created { path }
                    } else {
                        FsEvent::Deleted { path }
                    }
                }));
            }
            _ => {}
        }
        out
    }

    /// Reports a held source half as a delete once `window` has elapsed.
    pub fn expire(&mut self, now: Instant) -> Vec<FsEvent> {
        let stale = self
            .pending
            .as_ref()
            .is_some_and(|p| now.saturating_duration_since(p.seen_at) >= self.window);
        if stale {
            self.take_pending().into_iter().collect()
        } else {
            Vec::new()
        }
    }

    fn take_pending(&mut self) -> Option<FsEvent> {
        self.pending.take().map(|p| {
            debug!(path = %p.path, "rename source never paired, reading as delete");
            FsEvent::Deleted { path: p.path }
        })
    }

    fn take_matching(&mut self, tracker: Option<usize>) -> Option<String> {
        match &self.pending {
            Some(p) if p.tracker == tracker => self.pending.take().map(|p| p.path),
            _ => None,
        }
    }
}

/// A rename within one directory, a move keeping the name, or both at once.
/// The combined case is split into a rename in the old directory followed by
/// a move, which lands on the same final path.
fn relocation(from: &str, to: &str) -> Vec<FsEvent> {
    let (old_parent, old_name) = (parent_of(from), base_name(from));
    let (new_parent, new_name) = (parent_of(to), base_name(to));
    if old_parent == new_parent {
        return vec![FsEvent::renamed(to, old_name)];
    }
    if old_name == new_name {
        return vec![FsEvent::Moved {
            path: to.to_string(),
            old_parent: old_parent.to_string(),
        }];
    }
    vec![
        FsEvent::renamed(format!("{}/{}", old_parent, new_name), old_name),
        FsEvent::Moved {
            path: to.to_string(),
            old_parent: old_parent.to_string(),
        },
    ]
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn is_ignored(path: &str, ignore: &[String]) -> bool {
    path.split('/')
        .any(|component| ignore.iter().any(|i| i == component))
}
