//! Loftus daemon
//!
//! Run with: loftus [run|check|server]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use loftus::check::run_checks;
use loftus::config::Config;
use loftus::daemon::run_daemon;
use loftus::logging::init_logging;
use loftus::peer::{RelayHub, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "loftus")]
#[command(about = "Synchronise a directory through git and tell peers about it")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, env = "LOFTUS_CONFIG")]
    config: Option<PathBuf>,

    /// Synchronise this directory. Must already be a git repo with a remote.
    #[arg(long, env = "LOFTUS_DIR")]
    dir: Option<String>,

    /// host:port of the peer or relay server
    #[arg(long, env = "LOFTUS_ADDRESS")]
    address: Option<String>,

    /// Log directory
    #[arg(long, env = "LOFTUS_LOG_DIR")]
    log: Option<String>,

    /// Log to stdout
    #[arg(long)]
    stdout: bool,

    /// Seconds of quiet before syncing local changes
    #[arg(long, env = "LOFTUS_IDLE_SECS")]
    idle_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch and synchronise (default)
    Run,
    /// Check we are set up correctly
    Check,
    /// Relay update notifications between daemons
    Server,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(Config, Commands)> {
        let mut config = Config::load(self.config.as_deref()).context("Loading config")?;
        if let Some(dir) = self.dir {
            config.sync_dir = dir;
        }
        if let Some(address) = self.address {
            config.peer_address = address;
        }
        if let Some(log) = self.log {
            config.log_dir = log;
        }
        if let Some(idle) = self.idle_secs {
            config.idle_window_secs = idle;
        }
        config.stdout |= self.stdout;
        Ok((config, self.command.unwrap_or(Commands::Run)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, command) = Cli::parse().into_config()?;

    match command {
        Commands::Check => {
            let results = run_checks(&config).await;
            let mut failed = false;
            for result in &results {
                let mark = if result.ok { "ok  " } else { "FAIL" };
                println!("[{}] {}: {}", mark, result.name, result.detail);
                failed |= !result.ok;
            }
            if failed {
                std::process::exit(1);
            }
        }

        Commands::Server => {
            config.validate()?;
            let _guard = init_logging(&config, "server.log").context("Setting up logging")?;
            let server = RelayServer::bind(RelayHub::new(), &config.peer_address)
                .await
                .with_context(|| format!("Binding relay on {}", config.peer_address))?;
            server.run().await?;
        }

        Commands::Run => {
            config.validate()?;
            let _guard = init_logging(&config, "client.log").context("Setting up logging")?;
            if let Err(e) = run_daemon(config).await {
                if e.is_fatal() {
                    tracing::error!("Fatal: {}", e);
                } else {
                    tracing::error!("Daemon stopped: {}", e);
                }
                return Err(e.into());
            }
        }
    }

    Ok(())
}
