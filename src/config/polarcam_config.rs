//! Polarization camera configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/polarcam.toml` (base configuration)
//! 2. Environment variables (prefixed with `POLARCAM_`)
//!
//! # Environment Variable Overrides
//!
//! Keys are separated by a double underscore so that snake_case field names
//! survive:
//!
//! ```text
//! POLARCAM_APPLICATION__LOG_LEVEL=debug
//! POLARCAM_CAMERA__TIMEOUT_MARGIN_MS=2000
//! POLARCAM_SEQUENCER__CLAMP_POLICY=min_max
//! ```
//!
//! # Example
//!
//! ```no_run
//! use polarcam::config::PolarCamConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PolarCamConfig::load()?;
//!     println!("Application: {}", config.application.name);
//!     println!("Sequence file: {}", config.sequencer.sequence_file.display());
//!     Ok(())
//! }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::acquisition::{SessionSettings, StartPolicy};
use crate::camera::PolarCamSettings;
use crate::config::ConfigError;
use crate::hardware::nodes::entries;
use crate::polarization::CompositeKind;
use crate::sequencer::ClampPolicy;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PolarCamConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Camera defaults and live controls
    #[serde(default)]
    pub camera: CameraConfig,
    /// Sequencer programming
    #[serde(default)]
    pub sequencer: SequencerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Root folder for saved images
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Slack added to the exposure time when waiting for a frame
    #[serde(default = "default_timeout_margin")]
    pub timeout_margin_ms: u64,
    /// Upper end of the exposure slider in microseconds
    #[serde(default = "default_exposure_ceiling")]
    pub exposure_slider_ceiling_us: f64,
    /// AutoExposureLightingMode entry applied at startup; empty to leave as is
    #[serde(default = "default_lighting_mode")]
    pub lighting_mode: String,
    /// Composite shown next to the orientations
    #[serde(default)]
    pub normalized_composite: CompositeKind,
}

/// Sequencer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Line-oriented `width,height,exposure_us,gain_db` file
    #[serde(default = "default_sequence_file")]
    pub sequence_file: PathBuf,
    /// How exposure and gain are fitted to the node limits
    #[serde(default)]
    pub clamp_policy: ClampPolicy,
    /// Behavior of a second start while streaming
    #[serde(default)]
    pub start_policy: StartPolicy,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "polarcam".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_timeout_margin() -> u64 {
    1000
}

fn default_exposure_ceiling() -> f64 {
    500_000.0
}

fn default_lighting_mode() -> String {
    entries::FRONTLIGHT.to_string()
}

fn default_sequence_file() -> PathBuf {
    PathBuf::from("config/sequence_config.txt")
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            timeout_margin_ms: default_timeout_margin(),
            exposure_slider_ceiling_us: default_exposure_ceiling(),
            lighting_mode: default_lighting_mode(),
            normalized_composite: CompositeKind::default(),
        }
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            sequence_file: default_sequence_file(),
            clamp_policy: ClampPolicy::default(),
            start_policy: StartPolicy::default(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl PolarCamConfig {
    /// Load configuration from `config/polarcam.toml` and environment variables
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables (`POLARCAM_` prefix)
    /// 2. `config/polarcam.toml`
    /// 3. Built-in defaults
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file is malformed or validation fails.
    /// A missing file is not an error; defaults apply.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/polarcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("POLARCAM_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Exposure slider ceiling is positive
    /// - Sequence file path is not empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if !(self.camera.exposure_slider_ceiling_us > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid exposure_slider_ceiling_us {}. Must be positive",
                self.camera.exposure_slider_ceiling_us
            )));
        }

        if self.sequencer.sequence_file.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "sequence_file cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Runtime settings for [`crate::camera::PolarCam`].
    pub fn camera_settings(&self) -> PolarCamSettings {
        let lighting_mode = Some(self.camera.lighting_mode.trim())
            .filter(|mode| !mode.is_empty())
            .map(str::to_string);
        PolarCamSettings {
            session: SessionSettings {
                timeout_margin: Duration::from_millis(self.camera.timeout_margin_ms),
                start_policy: self.sequencer.start_policy,
                lighting_mode,
            },
            clamp_policy: self.sequencer.clamp_policy,
            composite: self.camera.normalized_composite,
            exposure_ceiling_us: self.camera.exposure_slider_ceiling_us,
        }
    }
}
