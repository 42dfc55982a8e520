//! Loftus - keep a directory in sync through git
//!
//! Watches a git work tree, commits and pushes changes once the tree has
//! been quiet for a few seconds, and tells peer daemons to pull.

pub mod check;
pub mod config;
pub mod daemon;
pub mod error;
pub mod git;
pub mod logging;
pub mod notifier;
pub mod peer;
pub mod sync;
pub mod types;
pub mod watcher;

pub use config::Config;
pub use error::{LoftusError, Result};
pub use sync::SyncCoordinator;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
