//! Sync pipeline: fetch, merge, stage, commit, push
//!
//! The coordinator owns the active/pending state behind a single lock.
//! Pipelines are started only by the event loop, which is the one consumer
//! of every trigger source; the lock makes overlapping `sync()` calls
//! degrade to a queued rerun instead of a second concurrent pipeline.

use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::debounce::EventDebouncer;
use crate::config::{Config, NOTHING_TO_COMMIT_STATUS};
use crate::error::Result;
use crate::git::{CommandOutput, VersionControl};
use crate::notifier::Notifier;
use crate::types::{PipelineFailure, StatusSummary, SyncOutcome, SyncTrigger};

/// Name of the version-control metadata directory
const GIT_DIR: &str = ".git";

/// Called once after every successful push
#[async_trait]
pub trait PushHook: Send + Sync {
    async fn on_push(&self) -> Result<()>;
}

/// Completion of a background task, delivered to the event loop
#[derive(Debug)]
pub enum TaskReport {
    SyncFinished {
        trigger: SyncTrigger,
        outcome: SyncOutcome,
    },
    PushHookFinished(Result<()>),
}

/// Point-in-time view of the coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    pub is_active: bool,
    pub is_pending: bool,
    pub last_event: Option<Instant>,
    pub rerun_requested: bool,
}

/// Git parameters for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// `<remote>/<branch>`, merged and diffed against after fetch
    pub upstream: String,
    pub commit_message: String,
    /// Commit exit status meaning "nothing to commit"
    pub nothing_to_commit_status: i32,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            upstream: config.upstream(),
            commit_message: config.commit_message.clone(),
            nothing_to_commit_status: NOTHING_TO_COMMIT_STATUS,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct Inner {
    active: bool,
    rerun_requested: bool,
    debouncer: EventDebouncer,
}

/// Clears the active flag on every exit path of `sync()`
struct ActiveGuard<'a> {
    state: &'a Mutex<Inner>,
}

impl<'a> ActiveGuard<'a> {
    fn acquire(state: &'a Mutex<Inner>) -> Option<Self> {
        let mut inner = state.lock();
        if inner.active {
            inner.rerun_requested = true;
            return None;
        }
        inner.active = true;
        // The run about to start stages everything the pending events touched
        inner.debouncer.cancel();
        Some(Self { state })
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().active = false;
    }
}

/// Owns the sync pipeline and its state
pub struct SyncCoordinator {
    vcs: Arc<dyn VersionControl>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineSettings,
    state: Mutex<Inner>,
    push_hook: Mutex<Option<Arc<dyn PushHook>>>,
    reports: Mutex<Option<mpsc::UnboundedSender<TaskReport>>>,
}

impl SyncCoordinator {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
        idle_window: Duration,
    ) -> Self {
        Self {
            vcs,
            notifier,
            settings,
            state: Mutex::new(Inner {
                active: false,
                rerun_requested: false,
                debouncer: EventDebouncer::new(idle_window),
            }),
            push_hook: Mutex::new(None),
            reports: Mutex::new(None),
        }
    }

    /// Register the function called after each push. Replaces any earlier hook.
    pub fn register_push_hook(&self, hook: Arc<dyn PushHook>) {
        *self.push_hook.lock() = Some(hook);
    }

    /// Where push-hook results are sent
    pub fn set_report_channel(&self, tx: mpsc::UnboundedSender<TaskReport>) {
        *self.reports.lock() = Some(tx);
    }

    /// Should the watcher cover this path
    pub fn should_watch(&self, path: &Path) -> bool {
        !is_git_metadata(path)
    }

    /// A file or directory changed. Returns false if the event was ignored.
    ///
    /// Events under `.git` and events seen while a pipeline is running are
    /// dropped so the daemon's own writes don't retrigger it.
    pub fn changed(&self, path: &Path) -> bool {
        if is_git_metadata(path) {
            return false;
        }
        let mut inner = self.state.lock();
        if inner.active {
            tracing::debug!("Sync active, ignoring {}", path.display());
            return false;
        }
        if inner.debouncer.notify(Instant::now()) {
            tracing::debug!("Sync scheduled after {}", path.display());
        }
        true
    }

    /// When the pending debounced sync is due
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.state.lock().debouncer.deadline()
    }

    /// Consume the pending sync if its idle window has elapsed
    pub fn take_due(&self, now: Instant) -> bool {
        let mut inner = self.state.lock();
        !inner.active && inner.debouncer.poll_due(now)
    }

    /// Consume a rerun requested while a pipeline was active
    pub fn take_rerun(&self) -> bool {
        let mut inner = self.state.lock();
        if inner.active {
            return false;
        }
        std::mem::take(&mut inner.rerun_requested)
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn state(&self) -> SyncState {
        let inner = self.state.lock();
        SyncState {
            is_active: inner.active,
            is_pending: inner.debouncer.is_pending(),
            last_event: inner.debouncer.last_event(),
            rerun_requested: inner.rerun_requested,
        }
    }

    /// Run fetch, merge, add, commit, push
    pub async fn sync(&self) -> SyncOutcome {
        let Some(_guard) = ActiveGuard::acquire(&self.state) else {
            tracing::info!("Sync already running, queued a rerun");
            return SyncOutcome::Deferred;
        };

        tracing::info!("* Sync start");
        let outcome = match self.run_pipeline().await {
            Ok(outcome) => outcome,
            Err(failure) => {
                tracing::error!("{}", failure);
                SyncOutcome::Failure(failure)
            }
        };
        tracing::info!("* Sync end: {}", outcome.as_str());
        outcome
    }

    async fn run_pipeline(&self) -> std::result::Result<SyncOutcome, PipelineFailure> {
        let upstream = self.settings.upstream.as_str();

        // Pull first so the push is a fast-forward
        self.checked(&["fetch"]).await?;
        self.display_status(&["diff", upstream, "--name-status"]).await;
        self.checked(&["merge", upstream]).await?;

        self.checked(&["add", "--all"]).await?;
        self.display_status(&["status", "--porcelain"]).await;

        let message = format!("--message={}", self.settings.commit_message);
        let commit = self.run_step(&["commit", "--all", &message]).await?;
        if commit.status == Some(self.settings.nothing_to_commit_status) {
            tracing::info!("Nothing to commit");
            return Ok(SyncOutcome::NoOpCommit);
        }
        if !commit.success() {
            return Err(failure_from(commit));
        }

        self.checked(&["push"]).await?;
        self.fire_push_hook();

        Ok(SyncOutcome::Success)
    }

    /// Run a step that must succeed
    async fn checked(&self, args: &[&str]) -> std::result::Result<CommandOutput, PipelineFailure> {
        let out = self.run_step(args).await?;
        if out.success() {
            Ok(out)
        } else {
            Err(failure_from(out))
        }
    }

    /// Run a step; only a launch failure is an error here
    async fn run_step(&self, args: &[&str]) -> std::result::Result<CommandOutput, PipelineFailure> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.vcs.run(&args).await.map_err(|e| PipelineFailure {
            command: format!("{} {}", self.vcs.program(), args.join(" ")),
            output: e.to_string(),
            status: None,
        })
    }

    /// Summarise a status query and pass it to the notifier if non-empty
    async fn display_status(&self, args: &[&str]) {
        let out = match self.run_step(args).await {
            Ok(out) => out,
            Err(failure) => {
                tracing::warn!("{}", failure);
                return;
            }
        };
        if !out.success() {
            tracing::warn!("Status query failed: {}", out.command);
            return;
        }

        let summary = StatusSummary::parse(&out.output);
        if !summary.is_empty() {
            self.notifier.inform(&summary.to_string());
        }
    }

    fn fire_push_hook(&self) {
        let Some(hook) = self.push_hook.lock().clone() else {
            return;
        };
        let reports = self.reports.lock().clone();

        tokio::spawn(async move {
            let result = hook.on_push().await;
            if let Err(ref e) = result {
                tracing::warn!("Push hook failed: {}", e);
            }
            if let Some(tx) = reports {
                let _ = tx.send(TaskReport::PushHookFinished(result));
            }
        });
    }
}

fn failure_from(out: CommandOutput) -> PipelineFailure {
    PipelineFailure {
        command: out.command,
        output: out.output,
        status: out.status,
    }
}

/// Is the path inside a `.git` directory (or the directory itself)
pub fn is_git_metadata(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == GIT_DIR))
}
