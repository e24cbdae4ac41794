use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tabgroups::core::branch::{BranchNameProvider, BranchResolver, BranchStrategy, GitHeadStrategy};
use tabgroups::core::config::{TabGroupsConfig, load_config};
use tabgroups::core::error::TabGroupsError;
use tabgroups::core::schemas::PersistedState;
use tabgroups::core::storage::{JsonFileBackend, StateBackend};
use tabgroups::core::store::Store;
use tempfile::tempdir;

#[test]
fn config_defaults_when_file_is_absent() {
    let tmp = tempdir().unwrap();
    let config = load_config(&Store::new(tmp.path())).unwrap();
    assert_eq!(config, TabGroupsConfig::default());
    assert_eq!(config.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.poll_initial_delay(), Duration::from_secs(1));
    assert_eq!(config.correlation_window(), Duration::from_secs(5));
    assert_eq!(config.fallback_branch, "default");
}

#[test]
fn config_file_overrides_selected_keys() {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    fs::create_dir_all(store.state_dir()).unwrap();
    fs::write(
        store.config_path(),
        "poll_interval_ms = 500\nfallback_branch = \"trunk\"\n",
    )
    .unwrap();

    let config = load_config(&store).unwrap();
    assert_eq!(config.poll_interval(), Duration::from_millis(500));
    assert_eq!(config.fallback_branch, "trunk");
    assert_eq!(config.state_file, "groups.json");
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    fs::create_dir_all(store.state_dir()).unwrap();
    fs::write(store.config_path(), "correlation_window_ms = 0\n").unwrap();
    assert!(matches!(load_config(&store), Err(TabGroupsError::ConfigError(_))));
}

fn write_head(dir: &Path, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("HEAD"), content).unwrap();
}

#[test]
fn git_head_reads_branch_and_detached_commit() {
    let tmp = tempdir().unwrap();
    write_head(&tmp.path().join(".git"), "ref: refs/heads/feature/tabs\n");
    assert_eq!(
        GitHeadStrategy.detect(tmp.path()).unwrap(),
        Some("feature/tabs".to_string())
    );

    write_head(&tmp.path().join(".git"), "3f2a9c1d0e5b7a8c\n");
    assert_eq!(
        GitHeadStrategy.detect(tmp.path()).unwrap(),
        Some("3f2a9c1".to_string())
    );
}

#[test]
fn git_head_follows_gitdir_pointer() {
    let tmp = tempdir().unwrap();
    let worktree = tmp.path().join("wt");
    fs::create_dir_all(&worktree).unwrap();
    write_head(&tmp.path().join("main-repo/.git/worktrees/wt"), "ref: refs/heads/wt-branch\n");
    fs::write(worktree.join(".git"), "gitdir: ../main-repo/.git/worktrees/wt\n").unwrap();

    assert_eq!(
        GitHeadStrategy.detect(&worktree).unwrap(),
        Some("wt-branch".to_string())
    );
}

#[test]
fn resolver_falls_back_outside_a_repository() {
    let tmp = tempdir().unwrap();
    let resolver = BranchResolver::new(tmp.path(), vec![Box::new(GitHeadStrategy)], "default");
    assert_eq!(resolver.current_branch_name(), "default");
}

#[test]
fn json_backend_writes_atomically_and_round_trips() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("nested").join("groups.json");
    let backend = JsonFileBackend::new(&path);
    assert!(backend.load().unwrap().is_none());

    let mut state = PersistedState::default();
    state.branch_mut("main");
    backend.save(&state).unwrap();
    assert!(path.exists());
    assert!(!tmp.path().join("nested").join(".groups.json.tmp").exists());

    let loaded = backend.load().unwrap().unwrap();
    assert_eq!(loaded, state);
    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw.get("pinned_groups").is_some());
    assert!(raw.get("branch_groups").is_some());
}

fn run_tabgroups(dir: &Path, args: &[&str]) -> Value {
    let output = Command::new(env!("CARGO_BIN_EXE_tabgroups"))
        .arg("--dir")
        .arg(dir)
        .arg("--format")
        .arg("json")
        .args(args)
        .output()
        .expect("failed to execute tabgroups");
    assert!(
        output.status.success(),
        "tabgroups {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be a JSON envelope")
}

#[test]
fn cli_create_add_list_round_trip() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();

    let created = run_tabgroups(dir, &["create", "Checkout"]);
    assert_eq!(created["cmd"], "create");
    assert_eq!(created["status"], "ok");
    let id = created["group"]["id"].as_str().unwrap().to_string();

    let prefix = &id[..id.len() - 4];
    run_tabgroups(dir, &["add", prefix, "src/cart.rs"]);
    run_tabgroups(dir, &["pin", &id]);

    let listed = run_tabgroups(dir, &["list"]);
    let groups = listed["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["name"], "Checkout");
    assert_eq!(groups[0]["is_pinned"], true);
    let files = groups[0]["file_paths"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].as_str().unwrap().ends_with("/src/cart.rs"));

    let which = run_tabgroups(dir, &["which", "src/cart.rs"]);
    assert_eq!(which["group"]["id"], id.as_str());

    assert!(dir.join(".tabgroups").join("groups.json").exists());
}

#[test]
fn cli_rejects_unknown_group() {
    let tmp = tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_tabgroups"))
        .arg("--dir")
        .arg(tmp.path())
        .args(["rename", "NOPE", "x"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!tmp.path().join(".tabgroups").join("groups.json").exists());
}
