//! Image persistence.
//!
//! Captures are written as 8-bit PNG into one folder per day below the output
//! root (`<root>/<YYYY-MM-DD>/`), named after what they hold and when they
//! were taken.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::GrayImage;
use tracing::info;

use crate::hardware::camera_adapter::RawFrame;
use crate::polarization::raw_to_gray;

/// Writes captured frames and panels as PNG under a root directory.
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder for captures taken at `now`, created on demand.
    pub fn dated_dir(&self, now: DateTime<Local>) -> Result<PathBuf> {
        let dir = self.root.join(now.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output folder {}", dir.display()))?;
        Ok(dir)
    }

    /// Save a tiled panel as `panel_<time>.png`.
    pub fn save_panel(&self, panel: &GrayImage) -> Result<PathBuf> {
        let now = Local::now();
        let path = self.dated_dir(now)?.join(format!("panel_{}.png", stamp(now)));
        save(panel, &path)?;
        Ok(path)
    }

    /// Save every frame of a sequence as `sequence_<time>_<index>.png`, plus
    /// the side-by-side strip when given.
    pub fn save_sequence(&self, frames: &[RawFrame], strip: Option<&GrayImage>) -> Result<Vec<PathBuf>> {
        let now = Local::now();
        let dir = self.dated_dir(now)?;
        let stamp = stamp(now);

        let mut paths = Vec::with_capacity(frames.len() + 1);
        for (index, frame) in frames.iter().enumerate() {
            let path = dir.join(format!("sequence_{stamp}_{index}.png"));
            save(&raw_to_gray(frame)?, &path)?;
            paths.push(path);
        }
        if let Some(strip) = strip {
            let path = dir.join(format!("sequence_{stamp}_strip.png"));
            save(strip, &path)?;
            paths.push(path);
        }
        Ok(paths)
    }
}

fn stamp(now: DateTime<Local>) -> String {
    now.format("%H%M%S_%3f").to_string()
}

fn save(image: &GrayImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Image saved");
    Ok(())
}
