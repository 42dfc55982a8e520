//! The daemon event loop
//!
//! One task owns the loop and is the only place pipelines are started
//! from. Each iteration handles exactly one of: a watch event, a watch
//! error, a peer trigger, a due debounce deadline or a report from a
//! background task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::config::Config;
use crate::error::Result;
use crate::git::GitCli;
use crate::notifier::{CommandNotifier, LogNotifier, Notifier};
use crate::peer::{listen_datagrams, PeerNotifier, PeerTrigger, StreamLink, RECONNECT_DELAY};
use crate::sync::{PipelineSettings, SyncCoordinator, TaskReport};
use crate::types::{SyncOutcome, SyncTrigger, WatchEvent};
use crate::watcher::{add_watches_recursive, FsWatcher, WatchRegistry, WatchStreams};

/// Capacity of the peer trigger channel
const TRIGGER_BUFFER: usize = 16;

/// Dispatches watch events, peer triggers and task reports to the coordinator
pub struct EventLoop<W: WatchRegistry> {
    coordinator: Arc<SyncCoordinator>,
    notifier: Arc<dyn Notifier>,
    registry: W,
    events: mpsc::UnboundedReceiver<WatchEvent>,
    errors: mpsc::UnboundedReceiver<notify::Error>,
    triggers: mpsc::Receiver<PeerTrigger>,
    reports_tx: mpsc::UnboundedSender<TaskReport>,
    reports: mpsc::UnboundedReceiver<TaskReport>,
}

impl<W: WatchRegistry> EventLoop<W> {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        notifier: Arc<dyn Notifier>,
        registry: W,
        streams: WatchStreams,
        triggers: mpsc::Receiver<PeerTrigger>,
    ) -> Self {
        let (reports_tx, reports) = mpsc::unbounded_channel();
        coordinator.set_report_channel(reports_tx.clone());

        Self {
            coordinator,
            notifier,
            registry,
            events: streams.events,
            errors: streams.errors,
            triggers,
            reports_tx,
            reports,
        }
    }

    /// Watch the whole tree, then sync once to bring the checkout up to date.
    ///
    /// Watch failures are fatal. A failed sync is reported through the
    /// notifier and the daemon carries on.
    pub async fn startup(&mut self, root: &Path) -> Result<SyncOutcome> {
        let coordinator = self.coordinator.clone();
        add_watches_recursive(root, &mut self.registry, |p| coordinator.should_watch(p))?;

        // Events from the merge stay queued until `run`, so a startup that
        // changed files is followed by one debounced sync.
        let outcome = run_sync(&self.coordinator, SyncTrigger::Startup).await;
        if let SyncOutcome::Failure(failure) = &outcome {
            self.notifier.warn(&failure.to_string());
        }
        Ok(outcome)
    }

    /// Run until the watcher goes away
    pub async fn run(mut self) -> Result<()> {
        loop {
            let deadline = self.coordinator.debounce_deadline();

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_watch_event(event),
                    None => {
                        tracing::info!("Watcher closed, stopping");
                        return Ok(());
                    }
                },
                Some(err) = self.errors.recv() => {
                    tracing::warn!("error: {}", err);
                }
                Some(trigger) = self.triggers.recv() => {
                    tracing::info!("Remote update notification ({:?})", trigger);
                    self.start_sync(SyncTrigger::Peer);
                }
                Some(report) = self.reports.recv() => self.handle_report(report),
                _ = wait_until(deadline) => {
                    if self.coordinator.take_due(Instant::now()) {
                        tracing::info!("Idle window elapsed, syncing");
                        self.start_sync(SyncTrigger::Debounced);
                    }
                }
            }
        }
    }

    fn handle_watch_event(&mut self, event: WatchEvent) {
        tracing::debug!("{:?}", event);

        if event.is_dir_create() && self.coordinator.should_watch(&event.path) {
            tracing::info!("Adding watch {}", event.path.display());
            if let Err(e) = self.registry.add_watch(&event.path) {
                tracing::warn!("Could not watch {}: {}", event.path.display(), e);
            }
        }

        self.coordinator.changed(&event.path);
    }

    /// Run a pipeline in the background and report back when it finishes
    fn start_sync(&self, trigger: SyncTrigger) {
        let coordinator = self.coordinator.clone();
        let reports = self.reports_tx.clone();

        tokio::spawn(async move {
            let outcome = run_sync(&coordinator, trigger).await;
            let _ = reports.send(TaskReport::SyncFinished { trigger, outcome });
        });
    }

    fn handle_report(&mut self, report: TaskReport) {
        match report {
            TaskReport::SyncFinished { trigger, outcome } => {
                tracing::debug!("{} sync reported {}", trigger.as_str(), outcome.as_str());
                if self.coordinator.take_rerun() {
                    self.start_sync(SyncTrigger::Rerun);
                }
            }
            TaskReport::PushHookFinished(Ok(())) => tracing::debug!("Peers notified"),
            TaskReport::PushHookFinished(Err(e)) => {
                tracing::warn!("Peer notification failed: {}", e)
            }
        }
    }
}

/// Run one pipeline and log how it went
async fn run_sync(coordinator: &SyncCoordinator, trigger: SyncTrigger) -> SyncOutcome {
    let started_at = Instant::now();
    let outcome = coordinator.sync().await;
    let elapsed = started_at.elapsed().as_millis();

    match &outcome {
        SyncOutcome::Failure(failure) => {
            tracing::error!("{} sync failed after {}ms: {}", trigger.as_str(), elapsed, failure)
        }
        other => tracing::info!("{} sync: {} ({}ms)", trigger.as_str(), other.as_str(), elapsed),
    }
    outcome
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Build every component from `config` and run the daemon
pub async fn run_daemon(config: Config) -> Result<()> {
    let root: PathBuf = config.sync_root();
    tracing::info!("Synchronising: {}", root.display());

    let git = Arc::new(GitCli::new(&root)?);
    let notifier: Arc<dyn Notifier> = match (&config.info_command, &config.alert_command) {
        (None, None) => Arc::new(LogNotifier),
        (info, alert) => Arc::new(CommandNotifier::new(info.clone(), alert.clone())),
    };
    let coordinator = Arc::new(SyncCoordinator::new(
        git,
        notifier.clone(),
        PipelineSettings::from_config(&config),
        config.idle_window(),
    ));

    let link = StreamLink::new();
    coordinator.register_push_hook(Arc::new(PeerNotifier::new(
        config.broadcast_target_addr(),
        link.clone(),
    )));

    let (watcher, streams) = FsWatcher::new()?;
    let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_BUFFER);
    let mut event_loop = EventLoop::new(coordinator, notifier, watcher, streams, trigger_rx);

    event_loop.startup(&root).await?;

    match UdpSocket::bind(config.broadcast_listen_addr()).await {
        Ok(socket) => {
            let tx = trigger_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = listen_datagrams(socket, tx).await {
                    tracing::warn!("Datagram listener stopped: {}", e);
                }
            });
        }
        Err(e) => tracing::warn!(
            "Could not listen for datagrams on {}: {}",
            config.broadcast_listen_addr(),
            e
        ),
    }

    let peer_address = config.peer_address.clone();
    tokio::spawn(async move {
        if let Err(e) = link.run(peer_address, trigger_tx, RECONNECT_DELAY).await {
            tracing::warn!("Stream link stopped: {}", e);
        }
    });

    event_loop.run().await
}
