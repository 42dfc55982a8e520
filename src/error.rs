//! Error types for loftus

use thiserror::Error;

/// Result type alias for loftus operations
pub type Result<T> = std::result::Result<T, LoftusError>;

/// Main error type for loftus
#[derive(Error, Debug)]
pub enum LoftusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Initial watch coverage could not be established
    #[error("Could not watch {path}: {reason}")]
    WatchSetup { path: String, reason: String },

    #[error("Git error: {0}")]
    Git(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel closed: {0}")]
    Channel(String),
}

impl LoftusError {
    /// Whether the daemon must stop when this error reaches the top level
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LoftusError::WatchSetup { .. } | LoftusError::Config(_) | LoftusError::TomlParse(_)
        )
    }
}
