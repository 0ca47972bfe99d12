//! Soundboard Core - playback pool for a desktop soundboard.
//!
//! This library provides:
//! - A bounded playback pool with concurrency/repeat policy enforcement
//! - Settings types, validation, and loading (JSON or YAML)
//! - Audio outputs backed by kira, plus a mock backend for tests
//! - A decoded-sound cache with a byte budget
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use soundboard_core::config::PoolSettings;
//! use soundboard_core::engines::KiraOutputFactory;
//! use soundboard_core::pool::{PlaybackPool, PlayRequest};
//!
//! # async fn run() -> soundboard_core::Result<()> {
//! let factory = Arc::new(KiraOutputFactory::open_default()?);
//! let pool = PlaybackPool::from_settings(factory, &PoolSettings::default())?;
//!
//! pool.play(PlayRequest::new("airhorn", "sounds/airhorn.ogg", 0.8)).await?;
//! pool.stop_specific("airhorn");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod engines;
pub mod error;
pub mod pool;

pub use error::{Error, Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::config::{
        PlaybackMode, PoolLimits, PoolSettings, SettingsLoader, SettingsValidator,
    };
    pub use crate::engines::{
        AudioOutput, KiraOutputFactory, MockOutputFactory, OutputEvent, OutputFactory,
        StartBehavior,
    };
    pub use crate::error::{Error, Result};
    pub use crate::pool::{
        Completion, CompletionReason, DropReason, HandleInfo, HandleState, InstanceKey,
        PlayOutcome, PlayRequest, PlaybackPool,
    };
}
