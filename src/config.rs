//! Daemon configuration
//!
//! Values come from an optional TOML file and are then overridden by
//! command-line flags and environment variables in the binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{LoftusError, Result};

/// Exit status `git commit` uses when there is nothing to commit
pub const NOTHING_TO_COMMIT_STATUS: i32 = 1;

/// Default quiet period before a debounced sync fires
pub const DEFAULT_IDLE_WINDOW_SECS: u64 = 5;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory to synchronise. Must already be a git repo with a remote.
    pub sync_dir: String,
    /// Remote name used for merge and diff
    pub remote: String,
    /// Remote branch merged after fetch
    pub branch: String,
    /// Message for every automatic commit
    pub commit_message: String,
    /// Quiet period before a debounced sync fires
    pub idle_window_secs: u64,
    /// `host:port` of the peer or relay server
    pub peer_address: String,
    /// UDP port for broadcast notifications
    pub broadcast_port: u16,
    /// Log directory
    pub log_dir: String,
    /// Log to stdout instead of a file
    pub stdout: bool,
    /// Program run with a change summary as its only argument
    pub info_command: Option<String>,
    /// Program run with a warning as its only argument
    pub alert_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_dir: "~/bup/".to_string(),
            remote: "origin".to_string(),
            branch: "master".to_string(),
            commit_message: "loftus".to_string(),
            idle_window_secs: DEFAULT_IDLE_WINDOW_SECS,
            peer_address: "127.0.0.1:8007".to_string(),
            broadcast_port: 8007,
            log_dir: "~/.bup/".to_string(),
            stdout: false,
            info_command: Some("bup_info".to_string()),
            alert_command: Some("bup_alert".to_string()),
        }
    }
}

impl Config {
    /// Default config file location (`~/.config/loftus/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("loftus").join("config.toml"))
    }

    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoftusError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML content; missing keys take their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load the given file, or the default file if it exists, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Check values that would otherwise fail deep inside the daemon
    pub fn validate(&self) -> Result<()> {
        if self.idle_window_secs == 0 {
            return Err(LoftusError::Config(
                "idle_window_secs must be greater than zero".to_string(),
            ));
        }
        if self.remote.trim().is_empty() || self.branch.trim().is_empty() {
            return Err(LoftusError::Config(
                "remote and branch must not be empty".to_string(),
            ));
        }
        match self.peer_address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(LoftusError::Config(format!(
                    "peer_address must be host:port, got '{}'",
                    self.peer_address
                )))
            }
        }
        Ok(())
    }

    /// Sync directory with `~` expanded and trailing slashes removed
    pub fn sync_root(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.sync_dir).to_string();
        let trimmed = expanded.trim_end_matches('/');
        if trimmed.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(trimmed)
        }
    }

    /// Log directory with `~` expanded
    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.log_dir).to_string())
    }

    pub fn idle_window(&self) -> Duration {
        Duration::from_secs(self.idle_window_secs)
    }

    /// `<remote>/<branch>`, the ref merged and diffed against
    pub fn upstream(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Address the datagram listener binds to
    pub fn broadcast_listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.broadcast_port))
    }

    /// Address datagram notifications are sent to
    pub fn broadcast_target_addr(&self) -> SocketAddr {
        SocketAddr::from(([255, 255, 255, 255], self.broadcast_port))
    }
}
