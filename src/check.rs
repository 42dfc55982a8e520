//! Setup checks for `loftus check`

use std::path::Path;

use crate::config::Config;
use crate::git::{find_on_path, GitCli, VersionControl};

/// Result of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            detail: detail.into(),
        }
    }
}

/// Run every check against `config`. Later git checks are skipped if git is missing.
pub async fn run_checks(config: &Config) -> Vec<CheckResult> {
    let mut results = Vec::new();

    results.push(match config.validate() {
        Ok(()) => CheckResult::pass("config", "valid"),
        Err(e) => CheckResult::fail("config", e.to_string()),
    });

    let root = config.sync_root();
    results.push(check_sync_dir(&root));

    let log_dir = config.log_path();
    results.push(match std::fs::create_dir_all(&log_dir) {
        Ok(()) => CheckResult::pass("log dir", log_dir.display().to_string()),
        Err(e) => CheckResult::fail("log dir", format!("{}: {}", log_dir.display(), e)),
    });

    let Some(git_path) = find_on_path("git") else {
        results.push(CheckResult::fail("git", "'git' not found on PATH"));
        return results;
    };
    results.push(CheckResult::pass("git", git_path.display().to_string()));

    if !root.is_dir() {
        return results;
    }

    let git = GitCli::with_program(git_path, &root);
    results.push(git_check(&git, "work tree", &["rev-parse", "--is-inside-work-tree"]).await);
    results.push(git_check(&git, "remote", &["remote", "show", &config.remote]).await);
    let upstream = config.upstream();
    results.push(git_check(&git, "upstream", &["rev-parse", "--verify", &upstream]).await);
    results
}

fn check_sync_dir(root: &Path) -> CheckResult {
    if root.is_dir() {
        CheckResult::pass("sync dir", root.display().to_string())
    } else {
        CheckResult::fail(
            "sync dir",
            format!("{} does not exist or is not a directory", root.display()),
        )
    }
}

async fn git_check(git: &dyn VersionControl, name: &'static str, args: &[&str]) -> CheckResult {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    match git.run(&args).await {
        Ok(out) if out.success() => CheckResult::pass(name, "ok"),
        Ok(out) => CheckResult::fail(name, format!("{}: {}", out.command, out.output.trim())),
        Err(e) => CheckResult::fail(name, e.to_string()),
    }
}
