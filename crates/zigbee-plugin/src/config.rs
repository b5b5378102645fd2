//! Plugin configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use zigbee_core::network::DEFAULT_BAUD_RATE;
use zigbee_core::{Backend, NetworkSettings};

use crate::error::SetupError;
use crate::platform::{Thing, ThingId};

/// Plugin wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginConfig {
    /// Directory holding the per-network settings files
    pub data_dir: PathBuf,
    /// How long a Lumi button must be held to count as a long press
    pub long_press_threshold_ms: u64,
    /// Motion sensor re-arm delay when the thing has no own setting
    pub motion_timeout_secs: u64,
    /// Seconds a light blinks on Identify
    pub identify_time_secs: u16,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            long_press_threshold_ms: 300,
            motion_timeout_secs: 60,
            identify_time_secs: 2,
        }
    }
}

impl PluginConfig {
    /// Defaults with environment overrides
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("ZIGBEE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_number("ZIGBEE_MOTION_TIMEOUT") {
            config.motion_timeout_secs = secs;
        }
        if let Some(ms) = env_number("ZIGBEE_LONG_PRESS_MS") {
            config.long_press_threshold_ms = ms;
        }
        config
    }

    /// Load from a JSON file, falling back to defaults when it is absent or broken
    pub async fn load(path: &Path) -> Self {
        match fs::read_to_string(path).await {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded plugin config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse plugin config {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No plugin config at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read plugin config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn long_press_threshold(&self) -> Duration {
        Duration::from_millis(self.long_press_threshold_ms)
    }

    #[must_use]
    pub fn motion_timeout(&self) -> Duration {
        Duration::from_secs(self.motion_timeout_secs)
    }

    /// Settings file the network library keeps for one controller
    #[must_use]
    pub fn network_settings_path(&self, controller: ThingId) -> PathBuf {
        self.data_dir.join(format!("zigbee-{controller}.json"))
    }

    /// Network settings for a controller thing
    pub fn network_settings(&self, thing: &Thing) -> Result<NetworkSettings, SetupError> {
        let params = thing.params();
        let serial_port = params
            .serial_port
            .clone()
            .ok_or(SetupError::MissingParameter("serialPort"))?;
        Ok(NetworkSettings {
            serial_port,
            baud_rate: params.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
            backend: params.backend.unwrap_or(Backend::Deconz),
            settings_path: self.network_settings_path(thing.id()),
        })
    }
}

fn env_number(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}, not a number", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ThingClass, ThingParams};

    #[test]
    fn defaults() {
        let config = PluginConfig::default();
        assert_eq!(config.long_press_threshold(), Duration::from_millis(300));
        assert_eq!(config.motion_timeout(), Duration::from_secs(60));
        assert_eq!(config.identify_time_secs, 2);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PluginConfig = serde_json::from_str(r#"{"motionTimeoutSecs": 90}"#).unwrap();
        assert_eq!(config.motion_timeout_secs, 90);
        assert_eq!(config.long_press_threshold_ms, 300);
    }

    #[test]
    fn controller_settings_need_a_port() {
        let config = PluginConfig::default();
        let bare = Thing::new(
            ThingId::new(),
            ThingClass::ZigbeeController,
            "Controller",
            None,
            ThingParams::default(),
        );
        assert!(matches!(
            config.network_settings(&bare),
            Err(SetupError::MissingParameter("serialPort"))
        ));

        let thing = Thing::new(
            ThingId::new(),
            ThingClass::ZigbeeController,
            "Controller",
            None,
            ThingParams {
                serial_port: Some("/dev/ttyACM0".to_string()),
                ..Default::default()
            },
        );
        let settings = config.network_settings(&thing).unwrap();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.backend, Backend::Deconz);
        assert_eq!(
            settings.settings_path,
            PathBuf::from("./data").join(format!("zigbee-{}.json", thing.id()))
        );
    }

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let config = PluginConfig::load(Path::new("/nonexistent/zigbee-plugin.json")).await;
        assert_eq!(config, PluginConfig::default());
    }
}
