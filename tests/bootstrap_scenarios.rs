//! Repository Bootstrap Tests
//!
//! Clone/checkout sequencing, idempotent reuse of existing workspaces and
//! failure classification, driven through a scripted launcher.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use delegate_protocol::BootstrapCode;
use delegate_worker::mock::{Script, ScriptedLauncher};
use delegate_worker::{RepositoryBootstrapper, WorkerConfig, WorkspaceLock};
use tempfile::TempDir;

const URL: &str = "https://example.com/foo.git";

fn config(root: &Path) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.workspace_root = root.to_path_buf();
    config.lock_timeout = Duration::from_secs(2);
    config.bootstrap.clone_timeout = Duration::from_secs(5);
    config.bootstrap.checkout_timeout = Duration::from_secs(5);
    config.terminate_grace = Duration::from_millis(100);
    config
}

/// git whose clone creates the target directory and whose other subcommands succeed.
fn working_git() -> ScriptedLauncher {
    ScriptedLauncher::new()
        .on("git", None, Script::Exit(0))
        .on("git", Some("clone"), Script::CreateTarget)
}

// =============================================================================
// End-to-end scenarios
// =============================================================================

#[test]
fn test_fresh_workspace_clones_and_checks_out() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git());
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    let outcome = bootstrapper.prepare(URL, "abc123");

    assert_eq!(outcome.code, BootstrapCode::Ok);
    assert!(outcome.cloned);
    let workspace = outcome.workspace.unwrap();
    assert_eq!(workspace.relative(), Path::new("foo/abc123"));
    assert!(workspace.path().is_dir());

    assert_eq!(launcher.count("git", Some("clone")), 1);
    assert_eq!(launcher.count("git", Some("checkout")), 1);
    assert_eq!(launcher.spawn_count(), 2);

    let calls = launcher.calls();
    let target = workspace.path().to_string_lossy().into_owned();
    assert_eq!(calls[0].args, vec!["clone", "--", URL, target.as_str()]);
    assert_eq!(calls[1].args, vec!["checkout", "abc123"]);
    assert_eq!(calls[1].cwd.as_deref(), Some(workspace.path()));
}

#[test]
fn test_existing_workspace_spawns_nothing() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git());
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::Ok);
    launcher.reset_calls();

    let outcome = bootstrapper.prepare(URL, "abc123");
    assert_eq!(outcome.code, BootstrapCode::Ok);
    assert!(!outcome.cloned);
    assert_eq!(launcher.spawn_count(), 0);
}

#[test]
fn test_bootstrapping_twice_clones_once() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git());
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::Ok);
    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::Ok);
    assert_eq!(launcher.count("git", Some("clone")), 1);
}

#[test]
fn test_url_without_slash_is_bad_url_without_spawning() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git());
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    let outcome = bootstrapper.prepare("noslasheshere", "abc123");
    assert_eq!(outcome.code, BootstrapCode::BadUrl);
    assert!(outcome.workspace.is_none());
    assert_eq!(launcher.spawn_count(), 0);
}

// =============================================================================
// Failure classification
// =============================================================================

#[test]
fn test_clone_failure_is_bad_url_and_skips_checkout() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git().on(
        "git",
        Some("clone"),
        Script::output("", "fatal: repository not found", 128),
    ));
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::BadUrl);
    assert_eq!(launcher.count("git", Some("clone")), 1);
    assert_eq!(launcher.count("git", Some("checkout")), 0);
}

#[test]
fn test_missing_git_is_bad_url() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new().on("git", None, Script::SpawnFailure));
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::BadUrl);
    assert_eq!(launcher.spawn_count(), 1);
}

#[test]
fn test_checkout_failure_is_bad_revision() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git().on("git", Some("checkout"), Script::Exit(1)));
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    let outcome = bootstrapper.prepare(URL, "abc123");
    assert_eq!(outcome.code, BootstrapCode::BadRevision);
    assert!(outcome.cloned);
    assert_eq!(launcher.count("git", Some("clone")), 1);
}

#[test]
fn test_failed_checkout_leaves_workspace_counted_as_ready() {
    // Readiness is directory existence only; a failed checkout is not undone.
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git().on("git", Some("checkout"), Script::Exit(1)));
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::BadRevision);
    launcher.reset_calls();
    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::Ok);
    assert_eq!(launcher.spawn_count(), 0);
}

#[test]
fn test_empty_revision_skips_checkout() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git());
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    let outcome = bootstrapper.prepare(URL, "");
    assert_eq!(outcome.code, BootstrapCode::Ok);
    assert_eq!(
        outcome.workspace.unwrap().relative(),
        Path::new("foo/HEAD")
    );
    assert_eq!(launcher.count("git", Some("checkout")), 0);
}

#[test]
fn test_option_like_revision_is_rejected_before_spawning() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git());
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    assert_eq!(
        bootstrapper.bootstrap(URL, "--upload-pack=touch"),
        BootstrapCode::BadRevision
    );
    assert_eq!(bootstrapper.bootstrap(URL, "../../etc"), BootstrapCode::BadRevision);
    assert_eq!(launcher.spawn_count(), 0);
}

#[test]
fn test_existing_directories_are_left_alone() {
    let temp = TempDir::new().unwrap();
    let existing = temp.path().join("foo/abc123");
    fs::create_dir_all(&existing).unwrap();
    fs::write(existing.join("marker"), b"keep").unwrap();

    let launcher = Arc::new(working_git());
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config(temp.path()));

    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::Ok);
    assert_eq!(fs::read(existing.join("marker")).unwrap(), b"keep");
    assert_eq!(launcher.spawn_count(), 0);
}

// =============================================================================
// Timeouts and locking
// =============================================================================

#[test]
fn test_hung_clone_times_out() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git().on("git", Some("clone"), Script::Hang));
    let mut config = config(temp.path());
    config.bootstrap.clone_timeout = Duration::from_millis(200);
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config);

    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::TimedOut);
    assert_eq!(launcher.count("git", Some("checkout")), 0);
}

#[test]
fn test_clone_hung_in_helper_process_times_out() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(working_git().on("git", Some("clone"), Script::HangInChild));
    let mut config = config(temp.path());
    config.bootstrap.clone_timeout = Duration::from_millis(200);
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config);

    let start = Instant::now();
    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());
    assert_eq!(launcher.count("git", Some("checkout")), 0);
}

#[test]
fn test_held_workspace_lock_times_out() {
    let temp = TempDir::new().unwrap();
    let _held =
        WorkspaceLock::acquire(temp.path(), "foo@abc123", Duration::from_secs(1)).unwrap();

    let launcher = Arc::new(working_git());
    let mut config = config(temp.path());
    config.lock_timeout = Duration::from_millis(150);
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config);

    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::TimedOut);
    assert_eq!(launcher.spawn_count(), 0);
}

// =============================================================================
// HEAD reporting
// =============================================================================

#[test]
fn test_report_head_reads_full_commit_id() {
    let temp = TempDir::new().unwrap();
    let hash = "0123456789abcdef0123456789abcdef01234567";
    let launcher = Arc::new(
        working_git().on("git", Some("rev-parse"), Script::output(&format!("{}\n", hash), "", 0)),
    );
    let mut config = config(temp.path());
    config.bootstrap.report_head = true;
    let bootstrapper = RepositoryBootstrapper::new(launcher.clone(), &config);

    let outcome = bootstrapper.prepare(URL, "abc123");
    assert_eq!(outcome.code, BootstrapCode::Ok);
    assert_eq!(outcome.head.as_deref(), Some(hash));
    assert_eq!(launcher.count("git", Some("rev-parse")), 1);
}

#[test]
fn test_report_head_short_output_is_bad_revision() {
    let temp = TempDir::new().unwrap();
    let launcher = Arc::new(
        working_git().on("git", Some("rev-parse"), Script::output("0123abc\n", "", 0)),
    );
    let mut config = config(temp.path());
    config.bootstrap.report_head = true;
    let bootstrapper = RepositoryBootstrapper::new(launcher, &config);

    assert_eq!(bootstrapper.bootstrap(URL, "abc123"), BootstrapCode::BadRevision);
}
