//! PolarCam Configuration System
//!
//! Two kinds of configuration live here:
//!
//! - [`PolarCamConfig`]: application, camera and sequencer settings loaded with
//!   Figment from `config/polarcam.toml`, overridable through `POLARCAM_`
//!   environment variables.
//! - The sequence file: one `width,height,exposure_us,gain_db` line per
//!   sequencer state, read by [`load_sequence`] and written by
//!   [`save_sequence`].
//!
//! # Example
//!
//! ```no_run
//! use polarcam::config::{load_sequence, PolarCamConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PolarCamConfig::load()?;
//!     let steps = load_sequence(&config.sequencer.sequence_file)?;
//!     println!("{} sequencer states", steps.len());
//!     Ok(())
//! }
//! ```

pub mod polarcam_config;
pub mod sequence_file;

use std::path::PathBuf;

use thiserror::Error;

pub use polarcam_config::{ApplicationConfig, CameraConfig, PolarCamConfig, SequencerConfig};
pub use sequence_file::{
    load_sequence, parse_sequence, read_sequence, save_sequence, write_sequence,
};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
    /// Sequence file could not be opened or created
    #[error("Sequence file {}: {source}", path.display())]
    SequenceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Sequence file {}: {source}", path.display())]
    SequenceWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    /// Malformed sequence line, 1-based
    #[error("Sequence file line {line}: {message}")]
    SequenceParse { line: usize, message: String },
}
