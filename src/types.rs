//! Core types for loftus

use std::fmt;
use std::path::PathBuf;

/// Payload exchanged between daemons after a successful push
pub const PEER_MESSAGE: &str = "Updated\n";

/// Kind of filesystem mutation reported by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Modify,
    Delete,
    Move,
}

/// A single filesystem change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
    pub is_dir: bool,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: WatchEventKind, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            kind,
            is_dir,
        }
    }

    /// A new directory appeared and may need its own watch
    pub fn is_dir_create(&self) -> bool {
        self.is_dir && self.kind == WatchEventKind::Create
    }
}

/// A git invocation that did not exit cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    /// Full command line, e.g. `git merge origin/master`
    pub command: String,
    /// Combined stdout and stderr
    pub output: String,
    /// Exit status; `None` when the process could not be launched or was killed
    pub status: Option<i32>,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "git error running: {}", self.command)?;
        match self.status {
            Some(code) => write!(f, " (exit status {})", code)?,
            None => write!(f, " (no exit status)")?,
        }
        if !self.output.trim().is_empty() {
            write!(f, "\n\n{}", self.output.trim_end())?;
        }
        Ok(())
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Changes were committed and pushed
    Success,
    /// Nothing to commit; the pipeline stopped before pushing
    NoOpCommit,
    /// A git step failed and the remaining steps were skipped
    Failure(PipelineFailure),
    /// Another pipeline was active; a rerun has been queued instead
    Deferred,
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failure(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::NoOpCommit => "nothing to commit",
            SyncOutcome::Failure(_) => "failure",
            SyncOutcome::Deferred => "deferred",
        }
    }
}

/// What caused a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Startup,
    Debounced,
    Peer,
    Rerun,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Startup => "startup",
            SyncTrigger::Debounced => "debounced",
            SyncTrigger::Peer => "peer",
            SyncTrigger::Rerun => "rerun",
        }
    }
}

/// Files created, modified and deleted according to a git status query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl StatusSummary {
    /// Parse `git status --porcelain` or `git diff --name-status` output.
    ///
    /// Renames count as modifications of the destination path. Untracked
    /// and unrecognised entries are logged and skipped.
    pub fn parse(output: &str) -> Self {
        let mut summary = Self::default();

        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let Some((code, path)) = split_status_line(line) else {
                tracing::debug!("Unparseable status line: {}", line);
                continue;
            };

            match code {
                'A' => summary.created.push(path),
                'M' | 'R' => summary.modified.push(path),
                'D' => summary.deleted.push(path),
                '?' => tracing::debug!("Untracked, needs git add: {}", path),
                other => tracing::debug!("Ignoring status {} for {}", other, path),
            }
        }

        summary
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Split a status line into its status letter and path
fn split_status_line(line: &str) -> Option<(char, String)> {
    // --name-status: "M\tpath" or "R100\told\tnew"
    if let Some((code, rest)) = line.split_once('\t') {
        let letter = code.trim().chars().next()?;
        let path = rest.rsplit('\t').next()?.trim();
        if path.is_empty() {
            return None;
        }
        return Some((letter, path.to_string()));
    }

    // --porcelain: "XY path" or "R  old -> new"
    let code = line.get(..2)?;
    let letter = code.chars().find(|c| *c != ' ')?;
    let rest = line.get(3..)?.trim();
    let path = match rest.rsplit_once(" -> ") {
        Some((_, to)) => to,
        None => rest,
    };
    if path.is_empty() {
        return None;
    }
    Some((letter, path.to_string()))
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let categories = [
            ("New", &self.created),
            ("Edit", &self.modified),
            ("Del", &self.deleted),
        ];

        let mut first = true;
        for (label, files) in categories {
            let value = match files.len() {
                0 => continue,
                1 => files[0].clone(),
                n => n.to_string(),
            };
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}: {}", label, value)?;
            first = false;
        }
        Ok(())
    }
}
