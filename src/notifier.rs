//! User-facing notifications
//!
//! Summaries go through `inform`, non-fatal problems through `warn`. The
//! default implementation hands the message to an external program, which
//! decides how to show it (desktop popup, terminal bell, nothing).

use tokio::process::Command;

/// Receiver of human-readable messages
pub trait Notifier: Send + Sync {
    /// Something worth knowing happened, e.g. files changed
    fn inform(&self, message: &str);

    /// Something went wrong but the daemon keeps going
    fn warn(&self, message: &str);
}

/// Runs a configured program with the message as its only argument
pub struct CommandNotifier {
    info_command: Option<String>,
    alert_command: Option<String>,
}

impl CommandNotifier {
    pub fn new(info_command: Option<String>, alert_command: Option<String>) -> Self {
        Self {
            info_command,
            alert_command,
        }
    }

    fn launch(program: Option<&str>, message: &str) {
        let Some(program) = program else {
            return;
        };

        // Needs a tokio runtime for the child reaper
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!("No runtime, not running {}", program);
            return;
        }

        match Command::new(program).arg(message).spawn() {
            Ok(mut child) => {
                let program = program.to_string();
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if !status.success() => {
                            tracing::debug!("{} exited with {}", program, status);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!("Waiting for {} failed: {}", program, e),
                    }
                });
            }
            Err(e) => tracing::debug!("Could not run notifier {}: {}", program, e),
        }
    }
}

impl Notifier for CommandNotifier {
    fn inform(&self, message: &str) {
        tracing::info!("Info: {}", message);
        Self::launch(self.info_command.as_deref(), message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("Alert: {}", message);
        Self::launch(self.alert_command.as_deref(), message);
    }
}

/// Only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn inform(&self, message: &str) {
        tracing::info!("Info: {}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("Alert: {}", message);
    }
}
