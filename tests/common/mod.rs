//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use loftus::git::{CommandOutput, VersionControl};
use loftus::notifier::Notifier;
use loftus::sync::PushHook;
use loftus::watcher::WatchRegistry;
use loftus::Result;

/// Git stand-in: records calls, exit status 0 unless scripted
#[derive(Default)]
pub struct ScriptedVcs {
    statuses: HashMap<&'static str, i32>,
    calls: Mutex<Vec<String>>,
    /// When set, `fetch` waits for a permit
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedVcs {
    pub fn with_status(mut self, sub: &'static str, status: i32) -> Self {
        self.statuses.insert(sub, status);
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, sub: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.split(' ').next() == Some(sub))
            .count()
    }
}

#[async_trait]
impl VersionControl for ScriptedVcs {
    async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        let sub = args[0].clone();
        self.calls.lock().push(args.join(" "));

        if sub == "fetch" {
            if let Some(gate) = &self.gate {
                let permit = gate.acquire().await.expect("gate closed");
                permit.forget();
            }
        }

        Ok(CommandOutput {
            command: format!("git {}", args.join(" ")),
            output: String::new(),
            status: Some(*self.statuses.get(sub.as_str()).unwrap_or(&0)),
        })
    }

    fn program(&self) -> String {
        "git".to_string()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub infos: Mutex<Vec<String>>,
    pub warnings: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn inform(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }
}

/// Watch registry that remembers what it was asked to watch
#[derive(Clone, Default)]
pub struct RecordingRegistry {
    pub watched: Arc<Mutex<Vec<PathBuf>>>,
}

impl WatchRegistry for RecordingRegistry {
    fn add_watch(&mut self, path: &Path) -> Result<()> {
        self.watched.lock().push(path.to_path_buf());
        Ok(())
    }
}

/// Push hook that counts calls and optionally delegates
#[derive(Default)]
pub struct CountingHook {
    pub calls: AtomicUsize,
    pub inner: Option<Arc<dyn PushHook>>,
}

impl CountingHook {
    pub fn wrapping(inner: Arc<dyn PushHook>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            inner: Some(inner),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushHook for CountingHook {
    async fn on_push(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.inner {
            Some(inner) => inner.on_push().await,
            None => Ok(()),
        }
    }
}
