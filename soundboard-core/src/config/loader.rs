//! Settings file loader (JSON or YAML).

use std::fs;
use std::path::Path;

use crate::config::types::PoolSettings;
use crate::config::validator::SettingsValidator;
use crate::error::{Error, Result};

/// Loads and validates pool settings.
///
/// This only reads settings; persisting them belongs to the settings store.
pub struct SettingsLoader {
    validator: SettingsValidator,
}

impl SettingsLoader {
    /// Creates a new settings loader.
    pub fn new() -> Self {
        Self {
            validator: SettingsValidator::new(),
        }
    }

    /// Loads settings from a `.json`, `.yaml` or `.yml` file.
    pub fn load(&self, path: &Path) -> Result<PoolSettings> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::SettingsLoad(path.display().to_string(), e.to_string()))?;

        let is_yaml = path
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml");

        let settings = if is_yaml {
            Self::parse_yaml(&path.display().to_string(), &content)?
        } else {
            Self::parse_json(&path.display().to_string(), &content)?
        };

        self.validator.validate(&settings)?;
        tracing::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parses and validates settings from a JSON string.
    pub fn from_json_str(&self, content: &str) -> Result<PoolSettings> {
        let settings = Self::parse_json("<memory>", content)?;
        self.validator.validate(&settings)?;
        Ok(settings)
    }

    /// Parses and validates settings from a YAML string.
    pub fn from_yaml_str(&self, content: &str) -> Result<PoolSettings> {
        let settings = Self::parse_yaml("<memory>", content)?;
        self.validator.validate(&settings)?;
        Ok(settings)
    }

    fn parse_json(origin: &str, content: &str) -> Result<PoolSettings> {
        serde_json::from_str(content)
            .map_err(|e| Error::SettingsParse(origin.to_string(), e.to_string()))
    }

    fn parse_yaml(origin: &str, content: &str) -> Result<PoolSettings> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::SettingsParse(origin.to_string(), e.to_string()))
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_settings_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_settings_file(
            temp_dir.path(),
            "settings.json",
            r#"{"multi_sound_enabled": false, "repeat_sound_enabled": true, "always_on_top": false, "volume": 0.5}"#,
        );

        let settings = SettingsLoader::new().load(&path).unwrap();
        assert!(!settings.multi_sound_enabled);
        assert!(settings.repeat_sound_enabled);
        assert_eq!(settings.volume, 0.5);
        assert_eq!(settings.max_pool_size, 100);
    }

    #[test]
    fn test_load_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_settings_file(
            temp_dir.path(),
            "settings.yaml",
            "volume: 0.25\nmax_pool_size: 4\nmax_instances_per_sound: 2\nidle_reserve_size: 1\n",
        );

        let settings = SettingsLoader::new().load(&path).unwrap();
        assert_eq!(settings.volume, 0.25);
        assert_eq!(settings.max_pool_size, 4);
        assert_eq!(settings.max_instances_per_sound, 2);
        assert_eq!(settings.idle_reserve_size, 1);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = SettingsLoader::new().load(&temp_dir.path().join("missing.json"));
        assert!(matches!(result, Err(Error::SettingsLoad(_, _))));
    }

    #[test]
    fn test_non_numeric_volume_is_parse_error() {
        let result = SettingsLoader::new().from_json_str(r#"{"volume": "loud"}"#);
        assert!(matches!(result, Err(Error::SettingsParse(_, _))));
    }

    #[test]
    fn test_negative_cap_is_parse_error() {
        let result = SettingsLoader::new().from_yaml_str("max_pool_size: -1\n");
        assert!(matches!(result, Err(Error::SettingsParse(_, _))));
    }

    #[test]
    fn test_out_of_range_volume_is_validation_error() {
        let result = SettingsLoader::new().from_json_str(r#"{"volume": 3.0}"#);
        assert!(matches!(result, Err(Error::SettingsValidation(_, _))));
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let settings = SettingsLoader::new().from_json_str("{}").unwrap();
        assert_eq!(settings, PoolSettings::default());
    }
}
