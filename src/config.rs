use std::{
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    DashError, codec::FrameFormat, lifecycle::ControllerSettings, standings::GapPolicy,
};

const CONFIG_DIR_NAME: &str = "dashlink";
const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 240;
pub const DEFAULT_RENDER_RATE_MS: u64 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub baud_rate: u32,
    pub sample_rate_hz: u32,
    pub render_rate_ms: u64,
    pub serial_read_timeout_ms: u64,
    pub update_timeout_ms: u64,
    pub gap_policy: GapPolicy,
    pub frame_format: FrameFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            render_rate_ms: DEFAULT_RENDER_RATE_MS,
            serial_read_timeout_ms: 100,
            update_timeout_ms: 100,
            gap_policy: GapPolicy::Relative,
            frame_format: FrameFormat::Dashboard,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf, DashError> {
        Ok(dirs::config_dir()
            .ok_or(DashError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// Load the config from the user's config directory, `None` if it was never saved.
    pub fn from_local_file() -> Result<Option<Self>, DashError> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::from_path(&config_path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, DashError> {
        let file = File::open(path).map_err(|e| DashError::ConfigIOError { source: e })?;
        serde_json::from_reader(file).map_err(|e| DashError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), DashError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), DashError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DashError::ConfigIOError { source: e })?;
        }

        let file = File::create(path).map_err(|e| DashError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| DashError::ConfigSerializeError { source: e })
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_secs(1) / self.sample_rate_hz.max(1)
    }

    pub fn serial_read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_read_timeout_ms)
    }

    pub fn controller_settings(&self, render: bool) -> ControllerSettings {
        ControllerSettings {
            sample_period: self.sample_period(),
            update_timeout: Duration::from_millis(self.update_timeout_ms),
            gap_policy: self.gap_policy,
            frame_format: self.frame_format,
            render_period: render.then(|| Duration::from_millis(self.render_rate_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = AppConfig {
            baud_rate: 9600,
            gap_policy: GapPolicy::GapToAhead,
            frame_format: FrameFormat::Basic,
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::from_path(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"baud_rate": 57600, "gap_policy": "gap-to-ahead"}"#).unwrap();

        let config = AppConfig::from_path(&path).unwrap();
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.gap_policy, GapPolicy::GapToAhead);
        assert_eq!(config.sample_rate_hz, DEFAULT_SAMPLE_RATE_HZ);
        assert_eq!(config.frame_format, FrameFormat::Dashboard);
    }

    #[test]
    fn test_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            AppConfig::from_path(&path),
            Err(DashError::ConfigSerializeError { .. })
        ));
        assert!(matches!(
            AppConfig::from_path(&temp_dir.path().join("missing.json")),
            Err(DashError::ConfigIOError { .. })
        ));
    }

    #[test]
    fn test_controller_settings() {
        let config = AppConfig::default();
        let settings = config.controller_settings(true);

        assert_eq!(settings.sample_period, Duration::from_secs(1) / 240);
        assert_eq!(settings.render_period, Some(Duration::from_millis(100)));
        assert_eq!(config.controller_settings(false).render_period, None);
    }
}
