//! Sync pipeline against real git repositories in temp directories
//!
//! Skipped when git is not installed.
//!
//! Run with: cargo test --test git_pipeline_tests

mod common;

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::{CountingHook, RecordingNotifier};
use loftus::git::{find_on_path, GitCli, VersionControl};
use loftus::sync::{PipelineSettings, SyncCoordinator};
use loftus::SyncOutcome;

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("running git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn configure(dir: &Path) {
    git(dir, &["config", "user.email", "sync@example.com"]);
    git(dir, &["config", "user.name", "Sync Test"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// A bare remote plus a clone tracking `origin/master`
struct Fixture {
    _tmp: TempDir,
    remote: std::path::PathBuf,
    work: std::path::PathBuf,
}

impl Fixture {
    fn new() -> Option<Self> {
        find_on_path("git")?;

        let tmp = tempfile::tempdir().unwrap();
        let remote = tmp.path().join("remote.git");
        let work = tmp.path().join("work");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        git(&remote, &["init", "--bare", "--quiet"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/master"]);

        git(&work, &["init", "--quiet"]);
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        configure(&work);
        git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
        std::fs::write(work.join("README"), "synced\n").unwrap();
        git(&work, &["add", "README"]);
        git(&work, &["commit", "--quiet", "-m", "initial"]);
        git(&work, &["push", "--quiet", "-u", "origin", "master"]);

        Some(Self {
            _tmp: tmp,
            remote,
            work,
        })
    }

    fn coordinator(&self, notifier: Arc<RecordingNotifier>) -> SyncCoordinator {
        let vcs: Arc<dyn VersionControl> = Arc::new(GitCli::new(&self.work).unwrap());
        SyncCoordinator::new(
            vcs,
            notifier,
            PipelineSettings::default(),
            Duration::from_secs(5),
        )
    }

    fn remote_subject(&self) -> String {
        git(&self.remote, &["log", "-1", "--format=%s", "master"])
    }
}

#[tokio::test]
async fn local_change_is_committed_and_pushed() {
    let Some(fixture) = Fixture::new() else {
        eprintln!("git not installed, skipping");
        return;
    };
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = fixture.coordinator(notifier.clone());
    let hook = Arc::new(CountingHook::default());
    coordinator.register_push_hook(hook.clone());

    std::fs::write(fixture.work.join("a.txt"), "hello\n").unwrap();

    let outcome = coordinator.sync().await;
    assert!(matches!(outcome, SyncOutcome::Success), "{:?}", outcome);
    assert_eq!(fixture.remote_subject(), "loftus");
    assert!(notifier.infos.lock().contains(&"New: a.txt".to_string()));
    assert!(notifier.warnings.lock().is_empty());

    // Hook runs on a spawned task
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hook.count(), 1);

    let outcome = coordinator.sync().await;
    assert!(matches!(outcome, SyncOutcome::NoOpCommit), "{:?}", outcome);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hook.count(), 1);
}

#[tokio::test]
async fn remote_change_is_merged() {
    let Some(fixture) = Fixture::new() else {
        eprintln!("git not installed, skipping");
        return;
    };

    let other = fixture._tmp.path().join("other");
    git(
        fixture._tmp.path(),
        &[
            "clone",
            "--quiet",
            fixture.remote.to_str().unwrap(),
            other.to_str().unwrap(),
        ],
    );
    configure(&other);
    std::fs::write(other.join("b.txt"), "from elsewhere\n").unwrap();
    git(&other, &["add", "b.txt"]);
    git(&other, &["commit", "--quiet", "-m", "elsewhere"]);
    git(&other, &["push", "--quiet", "origin", "master"]);

    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = fixture.coordinator(notifier);

    let outcome = coordinator.sync().await;
    assert!(matches!(outcome, SyncOutcome::NoOpCommit), "{:?}", outcome);
    assert_eq!(
        std::fs::read_to_string(fixture.work.join("b.txt")).unwrap(),
        "from elsewhere\n"
    );
}

#[tokio::test]
async fn missing_remote_is_a_failure() {
    let Some(fixture) = Fixture::new() else {
        eprintln!("git not installed, skipping");
        return;
    };
    git(
        &fixture.work,
        &["remote", "set-url", "origin", "/nonexistent/remote.git"],
    );

    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = fixture.coordinator(notifier);

    match coordinator.sync().await {
        SyncOutcome::Failure(failure) => {
            assert!(failure.command.ends_with("fetch"), "{}", failure.command);
            assert_ne!(failure.status, Some(0));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!coordinator.is_active());
}
