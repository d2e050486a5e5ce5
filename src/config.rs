//! Configuration file handling for glasscam.
//!
//! Loads configuration from `<config dir>/glasscam/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::{DEFAULT_BASE_URL, DEFAULT_INSTRUCTION, DEFAULT_MODEL};
use crate::capture::DEFAULT_JPEG_QUALITY;
use crate::coordinator::CoordinatorSettings;
use crate::platform::{Resolution, SourceId};

/// Configuration file structure for glasscam.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Preferred capture width (a hint; the camera may deliver less)
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Mirror stills horizontally (selfie mode)
    #[serde(default)]
    pub mirror: bool,
    /// Source id to select whenever it is attached
    #[serde(default)]
    pub source: Option<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            mirror: false,
            source: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_instruction")]
    pub instruction: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            instruction: default_instruction(),
            timeout_secs: default_timeout_secs(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Passive re-enumeration period; 0 disables it
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

fn default_width() -> u32 {
    Resolution::MEDIUM.width
}

fn default_height() -> u32 {
    Resolution::MEDIUM.height
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_instruction() -> String {
    DEFAULT_INSTRUCTION.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            config.validate(&path)?;
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(invalid("camera width and height must be greater than 0"));
        }
        if !(1..=100).contains(&self.analysis.jpeg_quality) {
            return Err(invalid("analysis.jpeg_quality must be between 1 and 100"));
        }
        if self.analysis.timeout_secs == 0 {
            return Err(invalid("analysis.timeout_secs must be greater than 0"));
        }
        Ok(())
    }

    pub fn preferred_resolution(&self) -> Resolution {
        Resolution::new(self.camera.width, self.camera.height)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.registry.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Settings for the coordinator derived from this config.
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            preferred_resolution: self.preferred_resolution(),
            instruction: self.analysis.instruction.clone(),
            source: self
                .camera
                .source
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(SourceId::from),
            mirror: self.camera.mirror,
            refresh_interval: self.refresh_interval(),
            analysis_timeout: Duration::from_secs(self.analysis.timeout_secs),
            jpeg_quality: self.analysis.jpeg_quality,
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        path: PathBuf,
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Invalid { path, message } => {
                write!(f, "Invalid config file '{}': {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("glasscam").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/glasscam/config.toml")
        })
}

/// Commented template written by `config init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# glasscam configuration

[camera]
# Preferred capture resolution (the camera may fall back to less)
width = 640
height = 480
# Mirror captured stills horizontally (selfie mode)
mirror = false
# Always select this source id when attached (see `glasscam list-sources`)
# source = "usb-glasses-1"

[analysis]
base_url = "https://fal.run"
model = "fal-ai/moondream2/visual-query"
instruction = "Describe what is in front of the camera in one or two short sentences."
timeout_secs = 30
# JPEG quality for uploaded stills (1-100)
jpeg_quality = 85

[registry]
# Re-enumerate sources every N seconds without re-selecting (0 = off)
refresh_interval_secs = 0
"#;
