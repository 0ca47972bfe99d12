//! Shared kira audio device.
//!
//! All outputs play through one kira `AudioManager` (one cpal stream, kira's
//! internal mixer). The device is created once by the application and handed
//! to the output factory; nothing here is global.

use std::sync::{Arc, Mutex};

use kira::sound::static_sound::{StaticSoundData, StaticSoundHandle};
use kira::{AudioManager, AudioManagerSettings, Decibels, DefaultBackend};

use crate::error::{Error, Result};

/// Volumes at or below this linear level are treated as silence.
const SILENCE_THRESHOLD: f32 = 0.001;

/// Handle to the process's audio output device.
#[derive(Clone)]
pub struct AudioDevice {
    manager: Arc<Mutex<AudioManager<DefaultBackend>>>,
}

impl AudioDevice {
    /// Opens the default output device.
    pub fn open_default() -> Result<Self> {
        let manager = AudioManager::<DefaultBackend>::new(AudioManagerSettings::default())
            .map_err(|e| Error::AudioDevice(e.to_string()))?;
        tracing::info!("Opened default audio output device");

        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
        })
    }

    /// Starts playing decoded sound data and returns its handle.
    pub fn play(&self, data: StaticSoundData) -> Result<StaticSoundHandle> {
        let mut manager = self
            .manager
            .lock()
            .map_err(|_| Error::AudioDevice("Failed to acquire audio manager lock".to_string()))?;

        manager
            .play(data)
            .map_err(|e| Error::AudioDevice(format!("{:?}", e)))
    }
}

/// Converts a linear volume (0.0-1.0) to kira decibels.
pub fn volume_to_db(volume: f32) -> Decibels {
    if !volume.is_finite() || volume <= SILENCE_THRESHOLD {
        return Decibels::SILENCE;
    }
    let db = 20.0 * volume.min(1.0).log10();
    Decibels(db.max(Decibels::SILENCE.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_volume_is_identity() {
        assert_eq!(volume_to_db(1.0).0, 0.0);
    }

    #[test]
    fn test_zero_and_nan_are_silent() {
        assert_eq!(volume_to_db(0.0).0, Decibels::SILENCE.0);
        assert_eq!(volume_to_db(f32::NAN).0, Decibels::SILENCE.0);
    }

    #[test]
    fn test_half_volume() {
        let db = volume_to_db(0.5).0;
        assert!((db - (-6.0206)).abs() < 0.01, "got {}", db);
    }

    #[test]
    fn test_volume_is_monotonic() {
        let quiet = volume_to_db(0.1).0;
        let loud = volume_to_db(0.9).0;
        assert!(quiet < loud);
    }

    /// Requires a working audio device.
    #[test]
    #[ignore] // Requires audio device — run with: cargo test -- --ignored
    fn test_open_default_device() {
        assert!(AudioDevice::open_default().is_ok());
    }
}
