//! Settings validation.

use crate::config::types::{PoolSettings, MAX_POOL_SIZE_LIMIT};
use crate::error::{Error, Result};

/// Validator for pool settings arriving from the settings store.
pub struct SettingsValidator;

impl SettingsValidator {
    /// Creates a new validator.
    pub fn new() -> Self {
        Self
    }

    /// Validates a complete settings value.
    pub fn validate(&self, settings: &PoolSettings) -> Result<()> {
        self.validate_volume(settings.volume)?;
        self.validate_cap("max_pool_size", settings.max_pool_size)?;
        self.validate_cap("max_instances_per_sound", settings.max_instances_per_sound)?;

        if settings.idle_reserve_size > settings.max_pool_size {
            return Err(Error::SettingsValidation(
                "idle_reserve_size".to_string(),
                format!(
                    "Idle reserve ({}) cannot exceed max_pool_size ({})",
                    settings.idle_reserve_size, settings.max_pool_size
                ),
            ));
        }

        Ok(())
    }

    /// Validates a volume on its own (used by volume-only updates).
    pub fn validate_volume(&self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(Error::SettingsValidation(
                "volume".to_string(),
                format!("Volume must be a number, got {}", volume),
            ));
        }
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::SettingsValidation(
                "volume".to_string(),
                format!("Volume must be between 0 and 1, got {}", volume),
            ));
        }
        Ok(())
    }

    fn validate_cap(&self, field: &str, value: usize) -> Result<()> {
        if value > MAX_POOL_SIZE_LIMIT {
            return Err(Error::SettingsValidation(
                field.to_string(),
                format!("Must be at most {}, got {}", MAX_POOL_SIZE_LIMIT, value),
            ));
        }
        Ok(())
    }
}

impl Default for SettingsValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_defaults() {
        let validator = SettingsValidator::new();
        assert!(validator.validate(&PoolSettings::default()).is_ok());
    }

    #[test]
    fn test_validate_nan_volume() {
        let validator = SettingsValidator::new();
        let settings = PoolSettings {
            volume: f32::NAN,
            ..Default::default()
        };

        let result = validator.validate(&settings);
        assert!(matches!(result, Err(Error::SettingsValidation(field, _)) if field == "volume"));
    }

    #[test]
    fn test_validate_out_of_range_volume() {
        let validator = SettingsValidator::new();
        assert!(validator.validate_volume(1.01).is_err());
        assert!(validator.validate_volume(-0.5).is_err());
        assert!(validator.validate_volume(0.0).is_ok());
        assert!(validator.validate_volume(1.0).is_ok());
    }

    #[test]
    fn test_validate_zero_caps_allowed() {
        let validator = SettingsValidator::new();
        let settings = PoolSettings {
            max_pool_size: 0,
            max_instances_per_sound: 0,
            idle_reserve_size: 0,
            ..Default::default()
        };

        assert!(validator.validate(&settings).is_ok());
    }

    #[test]
    fn test_validate_cap_limit() {
        let validator = SettingsValidator::new();
        let settings = PoolSettings {
            max_pool_size: MAX_POOL_SIZE_LIMIT + 1,
            ..Default::default()
        };

        assert!(validator.validate(&settings).is_err());
    }

    #[test]
    fn test_validate_reserve_larger_than_pool() {
        let validator = SettingsValidator::new();
        let settings = PoolSettings {
            max_pool_size: 2,
            idle_reserve_size: 3,
            ..Default::default()
        };

        let result = validator.validate(&settings);
        assert!(matches!(result, Err(Error::SettingsValidation(field, _)) if field == "idle_reserve_size"));
    }
}
