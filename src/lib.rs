//! Tabgroups: branch-scoped file groups for editor tabs.
//!
//! Files are clustered into named, colored, orderable groups. A host editor
//! uses them to tint tabs, to keep only one grouped file open at a time, and
//! to follow files as they are renamed, moved or deleted.
//!
//! # Architecture
//!
//! ## Branch-scoped store
//!
//! - **Pinned groups** are visible on every branch.
//! - **Branch groups** are visible only while their branch is checked out.
//! - The **active view** is pinned groups followed by the current branch's
//!   groups, recomputed on every read.
//!
//! State lives in `<project>/.tabgroups/groups.json` and is written through
//! on every mutation.
//!
//! ## Subsystems (Plugins)
//!
//! - `groups`: the group store and its change signal
//! - `reconcile`: turns raw create/delete/move/rename events into moves and deletes
//! - `branch_poller`: detects branch switches on a timer
//! - `fs_watch`: native filesystem events via `notify`
//!
//! # Examples
//!
//! ```bash
//! tabgroups create "Checkout flow"
//! tabgroups add 01J 'src/cart.rs'
//! tabgroups list --format json
//! tabgroups watch --for-secs 600
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: data model, schema, storage, config, branch detection
//! - [`plugins`]: subsystems built on top of `core`

pub mod core;
pub mod plugins;

use crate::core::branch::BranchResolver;
use crate::core::color::ColorPreset;
use crate::core::config::{self, TabGroupsConfig};
use crate::core::error::TabGroupsError;
use crate::core::group::Group;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::branch_poller::{BranchChange, BranchPoller};
use crate::plugins::fs_watch::FsWatcher;
use crate::plugins::groups::GroupService;
use crate::plugins::reconcile::{FsEvent, Reconciler};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[clap(
    name = "tabgroups",
    version = env!("CARGO_PKG_VERSION"),
    about = "Branch-scoped file groups for editor tabs"
)]
struct Cli {
    /// Project directory (defaults to current working directory).
    #[clap(short, long, global = true)]
    dir: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text", global = true)]
    format: String,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show pinned groups and the current branch's groups
    List,
    /// Create a group on the current branch
    Create { name: String },
    /// Rename a group
    Rename { id: String, name: String },
    /// Set a group's color preset (blue, green, orange, purple, red, cyan)
    Color { id: String, preset: String },
    /// Delete a group
    Delete { id: String },
    /// Pin or unpin a group
    Pin { id: String },
    /// Move a group one slot up
    Up { id: String },
    /// Move a group one slot down
    Down { id: String },
    /// Add a file to a group
    Add { id: String, path: PathBuf },
    /// Remove a file from every visible group
    Remove { path: PathBuf },
    /// Move a file one slot up inside its group
    FileUp { id: String, path: PathBuf },
    /// Move a file one slot down inside its group
    FileDown { id: String, path: PathBuf },
    /// Sort a group's files by extension, then name
    Sort { id: String },
    /// Show which group holds a file
    Which { path: PathBuf },
    /// Show the detected branch
    Branch,
    /// Follow renames, moves, deletes and branch switches
    Watch {
        /// Stop after this many seconds (runs until killed otherwise).
        #[clap(long)]
        for_secs: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(raw: &str) -> Result<Self, TabGroupsError> {
        match raw {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(TabGroupsError::ValidationError(format!(
                "unknown format '{}', expected 'text' or 'json'",
                other
            ))),
        }
    }
}

pub fn run() -> Result<(), TabGroupsError> {
    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format)?;
    let project_dir = match cli.dir {
        Some(d) => d,
        None => std::env::current_dir()?,
    };
    let project_dir = std::fs::canonicalize(&project_dir)?;
    let store = Store::new(project_dir);
    let config = config::load_config(&store)?;
    let mut service = GroupService::for_project(&store, &config)?;

    match cli.command {
        Command::List => {
            print_groups(&service, format, "list");
            return Ok(());
        }
        Command::Branch => {
            let branch = service.current_branch();
            match format {
                OutputFormat::Text => println!("{}", branch),
                OutputFormat::Json => emit("branch", serde_json::json!({ "branch": branch })),
            }
            return Ok(());
        }
        Command::Which { path } => {
            let path = file_key(&store, &path);
            let group = service.find_group_for_file(&path);
            match format {
                OutputFormat::Text => match &group {
                    Some(g) => println!("{}", render_group_name(g)),
                    None => println!("(ungrouped)"),
                },
                OutputFormat::Json => emit(
                    "which",
                    serde_json::json!({ "path": path, "group": group }),
                ),
            }
            return Ok(());
        }
        Command::Watch { for_secs } => {
            return run_watch(&store, &config, service, for_secs.map(Duration::from_secs), format);
        }
        Command::Create { name } => {
            if name.trim().is_empty() {
                return Err(TabGroupsError::ValidationError(
                    "group name must not be empty".to_string(),
                ));
            }
            let group = service.create_group(name.trim());
            service_flush(&mut service)?;
            match format {
                OutputFormat::Text => println!("Created {} ({})", render_group_name(&group), group.id),
                OutputFormat::Json => emit("create", serde_json::json!({ "group": group })),
            }
            return Ok(());
        }
        Command::Rename { id, name } => {
            let id = resolve_group_id(&service, &id)?;
            service.rename_group(&id, &name);
        }
        Command::Color { id, preset } => {
            let id = resolve_group_id(&service, &id)?;
            let preset = ColorPreset::from_name(&preset).ok_or_else(|| {
                TabGroupsError::ValidationError(format!("unknown color preset '{}'", preset))
            })?;
            service.change_group_color(&id, preset);
        }
        Command::Delete { id } => {
            let id = resolve_group_id(&service, &id)?;
            service.delete_group(&id);
        }
        Command::Pin { id } => {
            let id = resolve_group_id(&service, &id)?;
            service.toggle_group_pinned(&id);
        }
        Command::Up { id } => {
            let id = resolve_group_id(&service, &id)?;
            service.move_group_up(&id);
        }
        Command::Down { id } => {
            let id = resolve_group_id(&service, &id)?;
            service.move_group_down(&id);
        }
        Command::Add { id, path } => {
            let id = resolve_group_id(&service, &id)?;
            service.add_file_to_group(&file_key(&store, &path), &id);
        }
        Command::Remove { path } => {
            service.remove_file_from_group(&file_key(&store, &path));
        }
        Command::FileUp { id, path } => {
            let id = resolve_group_id(&service, &id)?;
            service.move_file_up(&id, &file_key(&store, &path));
        }
        Command::FileDown { id, path } => {
            let id = resolve_group_id(&service, &id)?;
            service.move_file_down(&id, &file_key(&store, &path));
        }
        Command::Sort { id } => {
            let id = resolve_group_id(&service, &id)?;
            service.sort_group_files(&id);
        }
    }

    service_flush(&mut service)?;
    print_groups(&service, format, "update");
    Ok(())
}

/// Surfaces a save failure the store recovered from, so the process exit
/// status reflects it.
fn service_flush(service: &mut GroupService) -> Result<(), TabGroupsError> {
    if service.persist_error().is_some() {
        service.flush()?;
    }
    Ok(())
}

/// Accepts a full id or a unique prefix among the visible groups.
fn resolve_group_id(service: &GroupService, raw: &str) -> Result<String, TabGroupsError> {
    let groups = service.get_all_groups();
    if let Some(exact) = groups.iter().find(|g| g.id == raw) {
        return Ok(exact.id.clone());
    }
    let wanted = raw.to_ascii_uppercase();
    let matches: Vec<&Group> = groups
        .iter()
        .filter(|g| !wanted.is_empty() && g.id.starts_with(&wanted))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => Err(TabGroupsError::NotFound(format!("no visible group with id '{}'", raw))),
        _ => Err(TabGroupsError::ValidationError(format!(
            "id prefix '{}' matches {} groups",
            raw,
            matches.len()
        ))),
    }
}

/// Group entries are absolute `/`-separated paths; relative arguments are
/// taken relative to the project root.
fn file_key(store: &Store, path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        store.root.join(path)
    };
    absolute.to_string_lossy().replace('\\', "/")
}

fn emit(cmd: &str, extra: serde_json::Value) {
    let envelope = time::command_envelope(cmd, "ok", extra);
    match serde_json::to_string_pretty(&envelope) {
        Ok(body) => println!("{}", body),
        Err(err) => warn!(error = %err, "failed to encode output envelope"),
    }
}

/// The name as it would look on a tab: group color behind, close-button
/// color in front.
fn render_group_name(group: &Group) -> String {
    let (bg, fg) = (group.color, group.close_button_color());
    format!(" {} ", group.name)
        .truecolor(fg.red(), fg.green(), fg.blue())
        .on_truecolor(bg.red(), bg.green(), bg.blue())
        .bold()
        .to_string()
}

fn print_groups(service: &GroupService, format: OutputFormat, cmd: &str) {
    let branch = service.current_branch();
    let groups = service.get_all_groups();
    match format {
        OutputFormat::Json => emit(
            cmd,
            serde_json::json!({ "branch": branch, "groups": groups }),
        ),
        OutputFormat::Text => {
            println!("{} {}", "branch:".dimmed(), branch);
            if groups.is_empty() {
                println!("  (no groups)");
            }
            for group in &groups {
                let pin = if group.is_pinned { "*" } else { " " };
                println!(
                    "{} {} {} {} ({} files)",
                    pin,
                    render_group_name(group),
                    group.id.dimmed(),
                    group.color.to_string().dimmed(),
                    group.file_count()
                );
                for path in &group.file_paths {
                    println!("      {}", path);
                }
            }
        }
    }
}

enum WatchSignal {
    Fs(Vec<FsEvent>),
    BranchChanged(BranchChange),
}

/// Runs the watcher, reconciler and branch poller, applying everything to
/// the store on this thread.
fn run_watch(
    store: &Store,
    config: &TabGroupsConfig,
    mut service: GroupService,
    duration: Option<Duration>,
    format: OutputFormat,
) -> Result<(), TabGroupsError> {
    let (tx, rx) = mpsc::channel::<WatchSignal>();
    let reconciler = Reconciler::new(config.correlation_window(), Arc::new(time::SystemClock));

    let dirty = Arc::new(AtomicBool::new(false));
    let flag = dirty.clone();
    service.add_change_listener(move || flag.store(true, Ordering::SeqCst));

    let fs_tx = tx.clone();
    let watcher = FsWatcher::start(&store.root, config.watch_ignore.clone(), move |batch| {
        let _ = fs_tx.send(WatchSignal::Fs(batch));
    })?;

    let branch_tx = tx;
    let branches = Arc::new(BranchResolver::for_git(
        store.root.clone(),
        config.fallback_branch.clone(),
    ));
    let mut poller = BranchPoller::start(
        branches,
        config.poll_initial_delay(),
        config.poll_interval(),
        move |change| {
            let _ = branch_tx.send(WatchSignal::BranchChanged(change));
        },
    )?;

    info!(root = %store.root.display(), branch = %service.current_branch(), "watching");
    if format == OutputFormat::Text {
        println!("Watching {} (branch {})", store.root.display(), service.current_branch());
    }

    let deadline = duration.map(|d| Instant::now() + d);
    let tick = Duration::from_secs(1);
    loop {
        let wait = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                tick.min(deadline - now)
            }
            None => tick,
        };
        match rx.recv_timeout(wait) {
            Ok(WatchSignal::Fs(batch)) => {
                for change in reconciler.reconcile(&batch) {
                    service.apply(&change);
                }
            }
            Ok(WatchSignal::BranchChanged(change)) => {
                if format == OutputFormat::Text {
                    println!("Branch changed: {} -> {}", change.from, change.to);
                }
                service.on_branch_changed();
            }
            Err(RecvTimeoutError::Timeout) => {
                let unpaired = watcher.flush_unpaired();
                for change in reconciler.reconcile(&unpaired) {
                    service.apply(&change);
                }
                reconciler.purge_expired();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if dirty.swap(false, Ordering::SeqCst) {
            print_groups(&service, format, "watch");
        }
    }

    poller.stop();
    reconciler.dispose();
    service_flush(&mut service)
}
