use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::classifier::CropAndScale;
use crate::common::Vec3;
use crate::error::AppError;

pub const CONFIG_PATH_ENV: &str = "CAR_RECOGNIZER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "car-recognizer.toml";
const ENV_PREFIX: &str = "CAR_RECOGNIZER";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub model: ModelSettings,
    pub capture: CaptureSettings,
    pub classification: ClassificationSettings,
    pub overlay: OverlaySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub artifact_path: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("models/car_recognition.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Still image fed to the frame source by the binary.
    pub image_path: Option<PathBuf>,
    /// How long the loop sleeps when no frame is available.
    pub idle_backoff_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            image_path: None,
            idle_backoff_ms: 16,
        }
    }
}

impl CaptureSettings {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassificationSettings {
    pub max_in_flight: usize,
    pub crop_and_scale: CropAndScale,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 1,
            crop_and_scale: CropAndScale::CenterCrop,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub delay_ms: u64,
    /// Camera-relative position of the label node.
    pub offset: [f32; 3],
    pub sentinel: String,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            delay_ms: 5000,
            offset: [0.0, 0.0, -0.2],
            sentinel: "none".to_string(),
        }
    }
}

impl OverlaySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn offset(&self) -> Vec3 {
        Vec3::from(self.offset)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Configuration {
    /// Loads the configuration file (if any) and layers `CAR_RECOGNIZER__*`
    /// environment variables on top of it.
    pub fn load() -> Result<Self, AppError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let configuration: Configuration = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.classification.max_in_flight == 0 {
            return Err(AppError::InvalidConfig(
                "classification.max_in_flight must be greater than 0".to_string(),
            ));
        }

        if self.overlay.sentinel.is_empty() {
            return Err(AppError::InvalidConfig(
                "overlay.sentinel must not be empty".to_string(),
            ));
        }

        if self.overlay.offset.iter().any(|c| !c.is_finite()) {
            return Err(AppError::InvalidConfig(
                "overlay.offset must be finite".to_string(),
            ));
        }

        Ok(())
    }
}
