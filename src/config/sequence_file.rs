//! Sequence file format.
//!
//! One sequencer state per line, in programming order:
//!
//! ```text
//! # width,height,exposure_us,gain_db
//! 640,480,5000,0
//! 640,480,10000,0
//! 640,480,20000,0
//! ```
//!
//! Blank lines and `#` comments are skipped. Any other malformed line is an
//! error carrying its 1-based line number.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use tracing::{debug, info};

use crate::config::ConfigError;
use crate::sequencer::SequenceStep;

const HEADER: &[u8] = b"# width,height,exposure_us,gain_db\n";

/// Read the sequence at `path`.
pub fn load_sequence(path: impl AsRef<Path>) -> Result<Vec<SequenceStep>, ConfigError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ConfigError::SequenceIo {
        path: path.to_path_buf(),
        source,
    })?;
    let steps = read_sequence(file)?;
    info!(path = %path.display(), states = steps.len(), "Sequence loaded");
    Ok(steps)
}

/// Write `steps` to `path`, replacing any previous file.
pub fn save_sequence(path: impl AsRef<Path>, steps: &[SequenceStep]) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| ConfigError::SequenceIo {
        path: path.to_path_buf(),
        source,
    })?;
    write_sequence(file, steps).map_err(|source| ConfigError::SequenceWrite {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), states = steps.len(), "Sequence saved");
    Ok(())
}

/// Parse sequence text already in memory.
pub fn parse_sequence(text: &str) -> Result<Vec<SequenceStep>, ConfigError> {
    read_sequence(text.as_bytes())
}

/// Parse a sequence from any reader, validating each state.
pub fn read_sequence<R: Read>(reader: R) -> Result<Vec<SequenceStep>, ConfigError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut steps = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|err| parse_error(&err))?;
        // whitespace-only line
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record_line(&record);
        let step = record
            .deserialize::<SequenceStep>(None)
            .map_err(|err| ConfigError::SequenceParse {
                line,
                message: match err.kind() {
                    csv::ErrorKind::Deserialize { err, .. } => err.to_string(),
                    _ => err.to_string(),
                },
            })?;
        validate(&step).map_err(|message| ConfigError::SequenceParse { line, message })?;
        debug!(line, ?step, "Parsed sequence line");
        steps.push(step);
    }
    Ok(steps)
}

/// Header comment followed by one record per step.
pub fn write_sequence<W: Write>(mut writer: W, steps: &[SequenceStep]) -> Result<(), csv::Error> {
    writer.write_all(HEADER)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    for step in steps {
        writer.serialize(step)?;
    }
    writer.flush()?;
    Ok(())
}

fn record_line(record: &StringRecord) -> usize {
    record.position().map_or(0, |pos| pos.line() as usize)
}

fn parse_error(err: &csv::Error) -> ConfigError {
    ConfigError::SequenceParse {
        line: err.position().map_or(0, |pos| pos.line() as usize),
        message: err.to_string(),
    }
}

fn validate(step: &SequenceStep) -> Result<(), String> {
    if step.width <= 0 || step.height <= 0 {
        return Err(format!(
            "dimensions must be positive, got {}x{}",
            step.width, step.height
        ));
    }
    if !step.exposure_us.is_finite() || !step.gain_db.is_finite() {
        return Err("exposure and gain must be finite".to_string());
    }
    Ok(())
}
