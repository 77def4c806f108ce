// Settings management and persistence
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::playback::PLAYBACK_POSITION_REFRESH_INTERVAL_MS;

/// Player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub version: i32, // Settings schema version for future migrations
    pub position_refresh_interval_ms: u64,
    pub volume: f32, // 0.0 - 1.0
    pub resources_dir: Option<PathBuf>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            version: 1,
            position_refresh_interval_ms: PLAYBACK_POSITION_REFRESH_INTERVAL_MS,
            volume: 1.0,
            resources_dir: None,
        }
    }
}

impl PlayerSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            info!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;

        let settings: PlayerSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings {:?}", path))?;

        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<()> {
        fs::create_dir_all(app_dir).context("Failed to create settings directory")?;

        let path = Self::get_settings_path(app_dir);
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write settings file {:?}", path))?;

        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Position refresh interval, never shorter than 1 ms
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.position_refresh_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = PlayerSettings::load(dir.path()).unwrap();
        assert_eq!(settings, PlayerSettings::default());
        assert_eq!(settings.interval(), Duration::from_millis(1000));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let app_dir = dir.path().join("nested/app");
        let settings = PlayerSettings {
            position_refresh_interval_ms: 250,
            volume: 0.5,
            resources_dir: Some(PathBuf::from("/sdcard/raw")),
            ..PlayerSettings::default()
        };

        settings.save(&app_dir).unwrap();
        assert_eq!(PlayerSettings::load(&app_dir).unwrap(), settings);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            PlayerSettings::get_settings_path(dir.path()),
            r#"{ "volume": 0.25 }"#,
        )
        .unwrap();

        let settings = PlayerSettings::load(dir.path()).unwrap();
        assert_eq!(settings.volume, 0.25);
        assert_eq!(
            settings.position_refresh_interval_ms,
            PLAYBACK_POSITION_REFRESH_INTERVAL_MS
        );
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(PlayerSettings::get_settings_path(dir.path()), "{ nope").unwrap();
        assert!(PlayerSettings::load(dir.path()).is_err());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let settings = PlayerSettings {
            position_refresh_interval_ms: 0,
            ..PlayerSettings::default()
        };
        assert_eq!(settings.interval(), Duration::from_millis(1));
    }
}
