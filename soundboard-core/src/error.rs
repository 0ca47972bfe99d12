//! Error types for soundboard-core.

use thiserror::Error;

/// Main error type for the soundboard-core library.
#[derive(Error, Debug)]
pub enum Error {
    // Settings errors
    #[error("Failed to load settings '{0}': {1}")]
    SettingsLoad(String, String),

    #[error("Failed to parse settings '{0}': {1}")]
    SettingsParse(String, String),

    #[error("Invalid setting '{0}': {1}")]
    SettingsValidation(String, String),

    // Pool errors
    #[error("Source key cannot be empty")]
    InvalidSourceKey,

    #[error("Playback of '{0}' was rejected: {1}")]
    EngineStartRejected(String, String),

    #[error("Failed to acquire pool lock")]
    PoolLock,

    // Output errors
    #[error("No audio output available: {0}")]
    OutputUnavailable(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Failed to load sound '{0}': {1}")]
    SoundLoad(String, String),

    // Generic errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
