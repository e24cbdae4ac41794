use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabgroups::core::branch::FixedBranch;
use tabgroups::core::storage::MemoryBackend;
use tabgroups::core::time::ManualClock;
use tabgroups::plugins::fs_watch::{EventTranslator, RENAME_PAIR_WINDOW};
use tabgroups::plugins::groups::GroupService;
use tabgroups::plugins::reconcile::{FsEvent, LocationChange, Reconciler};

struct Harness {
    clock: Arc<ManualClock>,
    reconciler: Reconciler,
    service: GroupService,
    group_id: String,
}

impl Harness {
    fn with_files(paths: &[&str]) -> Self {
        let clock = Arc::new(ManualClock::new());
        let reconciler = Reconciler::new(Duration::from_secs(5), clock.clone());
        let mut service = GroupService::open(
            Box::new(MemoryBackend::new()),
            Arc::new(FixedBranch::new("main")),
        )
        .unwrap();
        let group = service.create_group("Tracked");
        for path in paths {
            service.add_file_to_group(path, &group.id);
        }
        Self {
            clock,
            reconciler,
            service,
            group_id: group.id,
        }
    }

    fn feed(&mut self, events: &[FsEvent]) -> Vec<LocationChange> {
        let changes = self.reconciler.reconcile(events);
        for change in &changes {
            self.service.apply(change);
        }
        changes
    }

    fn files(&self) -> Vec<String> {
        self.service
            .find_group_by_id(&self.group_id)
            .map(|g| g.file_paths)
            .unwrap_or_default()
    }
}

fn created(path: &str) -> FsEvent {
    FsEvent::Created { path: path.into() }
}

fn deleted(path: &str) -> FsEvent {
    FsEvent::Deleted { path: path.into() }
}

#[test]
fn rename_keeps_file_in_group() {
    let mut h = Harness::with_files(&["/p/src/a.rs", "/p/src/old.rs"]);
    h.feed(&[FsEvent::renamed("/p/src/new.rs", "old.rs")]);
    assert_eq!(h.files(), vec!["/p/src/a.rs", "/p/src/new.rs"]);
}

#[test]
fn non_name_property_change_is_ignored() {
    let mut h = Harness::with_files(&["/p/a.rs"]);
    let changes = h.feed(&[FsEvent::PropertyChanged {
        path: "/p/a.rs".into(),
        property: "writable".into(),
        old_value: "true".into(),
    }]);
    assert!(changes.is_empty());
    assert_eq!(h.files(), vec!["/p/a.rs"]);
}

#[test]
fn native_move_follows_file() {
    let mut h = Harness::with_files(&["/p/a/x.rs"]);
    h.feed(&[FsEvent::Moved {
        path: "/p/b/x.rs".into(),
        old_parent: "/p/a".into(),
    }]);
    assert_eq!(h.files(), vec!["/p/b/x.rs"]);
}

#[test]
fn create_then_delete_within_window_is_a_move() {
    let mut h = Harness::with_files(&["/p/a/x.rs"]);
    assert!(h.feed(&[created("/p/b/x.rs")]).is_empty());
    h.clock.advance(Duration::from_secs(3));
    let changes = h.feed(&[deleted("/p/a/x.rs")]);
    assert_eq!(
        changes,
        vec![LocationChange::Moved {
            from: "/p/a/x.rs".into(),
            to: "/p/b/x.rs".into()
        }]
    );
    assert_eq!(h.files(), vec!["/p/b/x.rs"]);
}

#[test]
fn create_then_delete_after_window_is_a_delete() {
    let mut h = Harness::with_files(&["/p/a/x.rs"]);
    h.feed(&[created("/p/b/x.rs")]);
    h.clock.advance(Duration::from_secs(6));
    let changes = h.feed(&[deleted("/p/a/x.rs")]);
    assert_eq!(changes, vec![LocationChange::Deleted { path: "/p/a/x.rs".into() }]);
    assert!(h.files().is_empty());
}

#[test]
fn delete_of_the_created_path_itself_is_a_delete() {
    let mut h = Harness::with_files(&["/p/a/x.rs"]);
    h.feed(&[created("/p/a/x.rs")]);
    let changes = h.feed(&[deleted("/p/a/x.rs")]);
    assert_eq!(changes, vec![LocationChange::Deleted { path: "/p/a/x.rs".into() }]);
    assert!(h.files().is_empty());
}

#[test]
fn a_create_pairs_with_one_delete_only() {
    let mut h = Harness::with_files(&["/p/a/x.rs", "/p/c/x.rs"]);
    h.feed(&[created("/p/b/x.rs")]);
    let changes = h.feed(&[deleted("/p/a/x.rs"), deleted("/p/c/x.rs")]);
    assert_eq!(
        changes,
        vec![
            LocationChange::Moved {
                from: "/p/a/x.rs".into(),
                to: "/p/b/x.rs".into()
            },
            LocationChange::Deleted { path: "/p/c/x.rs".into() },
        ]
    );
    assert_eq!(h.files(), vec!["/p/b/x.rs"]);
}

#[test]
fn later_create_with_same_name_wins() {
    let mut h = Harness::with_files(&["/p/a/x.rs"]);
    h.feed(&[created("/p/b/x.rs"), created("/p/c/x.rs")]);
    h.feed(&[deleted("/p/a/x.rs")]);
    assert_eq!(h.files(), vec!["/p/c/x.rs"]);
}

#[test]
fn events_in_one_batch_apply_in_order() {
    let mut h = Harness::with_files(&["/p/a/x.rs"]);
    h.feed(&[
        created("/p/b/x.rs"),
        deleted("/p/a/x.rs"),
        FsEvent::renamed("/p/b/y.rs", "x.rs"),
    ]);
    assert_eq!(h.files(), vec!["/p/b/y.rs"]);
}

#[test]
fn ungrouped_paths_leave_store_untouched() {
    let mut h = Harness::with_files(&["/p/a.rs"]);
    let changes = h.feed(&[deleted("/p/other.rs")]);
    assert_eq!(changes.len(), 1);
    assert_eq!(h.files(), vec!["/p/a.rs"]);
}

#[test]
fn purge_and_dispose_forget_pending_creates() {
    let h = Harness::with_files(&[]);
    h.reconciler.reconcile(&[created("/p/a.rs"), created("/p/b.rs")]);
    assert_eq!(h.reconciler.pending(), 2);

    h.clock.advance(Duration::from_secs(10));
    assert_eq!(h.reconciler.pending(), 0);
    assert_eq!(h.reconciler.purge_expired(), 2);

    h.reconciler.reconcile(&[created("/p/c.rs")]);
    h.reconciler.dispose();
    h.reconciler.dispose();
    assert_eq!(h.reconciler.pending(), 0);
}

fn native(kind: EventKind, paths: &[&str], tracker: Option<usize>) -> Event {
    let mut event = Event::new(kind);
    for p in paths {
        event = event.add_path(PathBuf::from(p));
    }
    match tracker {
        Some(t) => event.set_tracker(t),
        None => event,
    }
}

fn name_event(mode: RenameMode, paths: &[&str], tracker: usize) -> Event {
    native(EventKind::Modify(ModifyKind::Name(mode)), paths, Some(tracker))
}

impl Harness {
    fn feed_native(&mut self, translator: &mut EventTranslator, events: &[Event], now: Instant) {
        for event in events {
            let batch = translator.translate(event, now);
            self.feed(&batch);
        }
    }
}

#[test]
fn inotify_rename_sequence_keeps_file_in_group() {
    let mut h = Harness::with_files(&["/p/src/a.rs", "/p/src/old.rs"]);
    let mut translator = EventTranslator::new(vec![".git".to_string()]);
    let now = Instant::now();
    h.feed_native(
        &mut translator,
        &[
            name_event(RenameMode::From, &["/p/src/old.rs"], 42),
            name_event(RenameMode::To, &["/p/src/new.rs"], 42),
            name_event(RenameMode::Both, &["/p/src/old.rs", "/p/src/new.rs"], 42),
        ],
        now,
    );
    assert_eq!(h.files(), vec!["/p/src/a.rs", "/p/src/new.rs"]);

    // Nothing is left waiting to be read as a delete.
    let leftover = translator.expire(now + RENAME_PAIR_WINDOW * 4);
    assert!(leftover.is_empty());
    assert_eq!(h.files(), vec!["/p/src/a.rs", "/p/src/new.rs"]);
}

#[test]
fn inotify_move_across_directories_keeps_file_in_group() {
    let mut h = Harness::with_files(&["/p/a/x.rs"]);
    let mut translator = EventTranslator::new(Vec::new());
    h.feed_native(
        &mut translator,
        &[
            name_event(RenameMode::From, &["/p/a/x.rs"], 9),
            name_event(RenameMode::To, &["/p/b/y.rs"], 9),
            name_event(RenameMode::Both, &["/p/a/x.rs", "/p/b/y.rs"], 9),
        ],
        Instant::now(),
    );
    assert_eq!(h.files(), vec!["/p/b/y.rs"]);
}

#[test]
fn move_out_of_watched_tree_drops_file_after_window() {
    let mut h = Harness::with_files(&["/p/a.rs", "/p/b.rs"]);
    let mut translator = EventTranslator::new(Vec::new());
    let now = Instant::now();
    h.feed_native(
        &mut translator,
        &[name_event(RenameMode::From, &["/p/a.rs"], 5)],
        now,
    );
    assert_eq!(h.files(), vec!["/p/a.rs", "/p/b.rs"]);

    let unpaired = translator.expire(now + RENAME_PAIR_WINDOW);
    h.feed(&unpaired);
    assert_eq!(h.files(), vec!["/p/b.rs"]);
}

#[test]
fn unrelated_create_does_not_disturb_held_rename() {
    let mut h = Harness::with_files(&["/p/old.rs"]);
    let mut translator = EventTranslator::new(Vec::new());
    h.feed_native(
        &mut translator,
        &[
            name_event(RenameMode::From, &["/p/old.rs"], 1),
            native(EventKind::Create(CreateKind::File), &["/p/other.rs"], None),
            name_event(RenameMode::To, &["/p/new.rs"], 1),
            name_event(RenameMode::Both, &["/p/old.rs", "/p/new.rs"], 1),
        ],
        Instant::now(),
    );
    assert_eq!(h.files(), vec!["/p/new.rs"]);
}
