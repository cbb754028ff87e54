//! Error types for lounge-core

use thiserror::Error;

/// Result type alias for lounge-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lounge-core.
///
/// None of these are fatal to a running generator: a rejected setting keeps
/// its previous value and a transport failure drops a single note.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid setting (unknown instrument, value out of range, bad config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Segment table does not partition the backing loop
    #[error("Invalid timeline: {0}")]
    InvalidTimeline(String),

    /// Lost or malformed message between producer and note worker
    #[error("Transport error: {0}")]
    Transport(String),

    /// The runtime thread is gone
    #[error("Generator runtime has shut down")]
    Disconnected,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON wire format error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
