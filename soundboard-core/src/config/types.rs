//! Settings types consumed by the playback pool.

use serde::{Deserialize, Serialize};

/// Default master volume (linear, 0.0-1.0).
pub const DEFAULT_VOLUME: f32 = 1.0;

/// Default maximum number of handles alive in the pool.
pub const DEFAULT_MAX_POOL_SIZE: usize = 100;

/// Default maximum number of concurrent instances of one sound.
pub const DEFAULT_MAX_INSTANCES_PER_SOUND: usize = 20;

/// Default number of idle outputs kept warm for reuse.
pub const DEFAULT_IDLE_RESERVE_SIZE: usize = 8;

/// Upper bound accepted for any pool capacity setting.
pub const MAX_POOL_SIZE_LIMIT: usize = 1024;

/// Complete soundboard playback settings.
///
/// Field names are snake_case; the camelCase names written by the desktop
/// front end are accepted as aliases. Unrelated keys in the same settings file
/// (theme, hotkeys, window flags) are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PoolSettings {
    /// Whether different sounds may play at the same time.
    #[serde(default = "default_true", alias = "multiSoundEnabled")]
    pub multi_sound_enabled: bool,
    /// Whether pressing a playing sound starts another instance instead of replacing it.
    #[serde(default, alias = "repeatSoundEnabled")]
    pub repeat_sound_enabled: bool,
    /// Master volume (0.0-1.0).
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Maximum number of handles in the pool. Read only at pool construction.
    #[serde(default = "default_max_pool_size", alias = "maxPoolSize")]
    pub max_pool_size: usize,
    /// Maximum number of live instances per sound. Read only at pool construction.
    #[serde(default = "default_max_instances_per_sound", alias = "maxInstancesPerSound")]
    pub max_instances_per_sound: usize,
    /// Number of idle outputs kept for reuse. Read only at pool construction.
    #[serde(default = "default_idle_reserve_size", alias = "idleReserveSize")]
    pub idle_reserve_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f32 {
    DEFAULT_VOLUME
}

fn default_max_pool_size() -> usize {
    DEFAULT_MAX_POOL_SIZE
}

fn default_max_instances_per_sound() -> usize {
    DEFAULT_MAX_INSTANCES_PER_SOUND
}

fn default_idle_reserve_size() -> usize {
    DEFAULT_IDLE_RESERVE_SIZE
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            multi_sound_enabled: true,
            repeat_sound_enabled: false,
            volume: DEFAULT_VOLUME,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            max_instances_per_sound: DEFAULT_MAX_INSTANCES_PER_SOUND,
            idle_reserve_size: DEFAULT_IDLE_RESERVE_SIZE,
        }
    }
}

impl PoolSettings {
    /// Returns the concurrency/repeat policy part of these settings.
    pub fn mode(&self) -> PlaybackMode {
        PlaybackMode {
            multi_sound_enabled: self.multi_sound_enabled,
            repeat_sound_enabled: self.repeat_sound_enabled,
        }
    }

    /// Returns the capacity part of these settings.
    pub fn limits(&self) -> PoolLimits {
        PoolLimits {
            max_pool_size: self.max_pool_size,
            max_instances_per_sound: self.max_instances_per_sound,
            idle_reserve_size: self.idle_reserve_size,
        }
    }

    /// Repairs out-of-range values instead of rejecting them.
    ///
    /// A non-finite volume falls back to the default, a finite one is clamped
    /// to [0, 1]. Caps are clamped to `MAX_POOL_SIZE_LIMIT` and the idle
    /// reserve never exceeds the pool size.
    pub fn sanitized(mut self) -> Self {
        self.volume = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            DEFAULT_VOLUME
        };
        self.max_pool_size = self.max_pool_size.min(MAX_POOL_SIZE_LIMIT);
        self.max_instances_per_sound = self.max_instances_per_sound.min(MAX_POOL_SIZE_LIMIT);
        self.idle_reserve_size = self.idle_reserve_size.min(self.max_pool_size);
        self
    }
}

/// Concurrency and repeat policy, adjustable while the pool is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct PlaybackMode {
    pub multi_sound_enabled: bool,
    pub repeat_sound_enabled: bool,
}

/// Capacity parameters fixed for the lifetime of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PoolLimits {
    pub max_pool_size: usize,
    pub max_instances_per_sound: usize,
    pub idle_reserve_size: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        PoolSettings::default().limits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_front_end() {
        let settings = PoolSettings::default();
        assert!(settings.multi_sound_enabled);
        assert!(!settings.repeat_sound_enabled);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.max_pool_size, 100);
        assert_eq!(settings.max_instances_per_sound, 20);
    }

    #[test]
    fn test_camel_case_aliases() {
        let json = r#"{
            "multiSoundEnabled": false,
            "repeatSoundEnabled": true,
            "alwaysOnTop": true,
            "volume": 0.4,
            "maxPoolSize": 12,
            "maxInstancesPerSound": 3,
            "theme": { "enabled": false }
        }"#;
        let settings: PoolSettings = serde_json::from_str(json).unwrap();
        assert!(!settings.multi_sound_enabled);
        assert!(settings.repeat_sound_enabled);
        assert_eq!(settings.max_pool_size, 12);
        assert_eq!(settings.max_instances_per_sound, 3);
        assert_eq!(settings.idle_reserve_size, DEFAULT_IDLE_RESERVE_SIZE);
    }

    #[test]
    fn test_sanitized_repairs_volume() {
        let settings = PoolSettings {
            volume: f32::NAN,
            ..Default::default()
        };
        assert_eq!(settings.sanitized().volume, DEFAULT_VOLUME);

        let settings = PoolSettings {
            volume: 1.7,
            ..Default::default()
        };
        assert_eq!(settings.sanitized().volume, 1.0);

        let settings = PoolSettings {
            volume: -0.2,
            ..Default::default()
        };
        assert_eq!(settings.sanitized().volume, 0.0);
    }

    #[test]
    fn test_sanitized_clamps_reserve_to_pool() {
        let settings = PoolSettings {
            max_pool_size: 4,
            idle_reserve_size: 10,
            ..Default::default()
        };
        let settings = settings.sanitized();
        assert_eq!(settings.idle_reserve_size, 4);
    }

    #[test]
    fn test_mode_and_limits_split() {
        let settings = PoolSettings {
            multi_sound_enabled: false,
            repeat_sound_enabled: true,
            max_pool_size: 5,
            max_instances_per_sound: 2,
            ..Default::default()
        };
        assert_eq!(
            settings.mode(),
            PlaybackMode {
                multi_sound_enabled: false,
                repeat_sound_enabled: true
            }
        );
        assert_eq!(settings.limits().max_pool_size, 5);
        assert_eq!(settings.limits().max_instances_per_sound, 2);
    }
}
