//! Git command-line client
//!
//! Every invocation runs with the sync root as its working directory and
//! logs the full argument list together with the combined output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{LoftusError, Result};

/// Output of one external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Full command line as logged
    pub command: String,
    /// stdout followed by stderr
    pub output: String,
    /// Exit status; `None` if the process was killed by a signal
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs version-control subcommands against the sync root
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Run `<tool> <args...>`. `Err` only when the process could not be launched.
    async fn run(&self, args: &[String]) -> Result<CommandOutput>;

    /// Tool name used in log lines and failure reports
    fn program(&self) -> String;
}

/// `git` executed as a child process
pub struct GitCli {
    git_path: PathBuf,
    root_dir: PathBuf,
}

impl GitCli {
    /// Locate `git` on `PATH` and bind it to `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let git_path = find_on_path("git")
            .ok_or_else(|| LoftusError::Git("Error looking for 'git' on path".to_string()))?;
        Ok(Self::with_program(git_path, root_dir))
    }

    /// Use an explicit git binary
    pub fn with_program(git_path: impl Into<PathBuf>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_path: git_path.into(),
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        let command = format!("{} {}", self.git_path.display(), args.join(" "));
        tracing::info!("{}", command);

        let output = Command::new(&self.git_path)
            .args(args)
            .current_dir(&self.root_dir)
            .stdin(Stdio::null())
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if !combined.is_empty() {
            tracing::info!("{}", combined.trim_end());
        }

        Ok(CommandOutput {
            command,
            output: combined,
            status: output.status.code(),
        })
    }

    fn program(&self) -> String {
        self.git_path.display().to_string()
    }
}

/// Search `PATH` for an executable
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
