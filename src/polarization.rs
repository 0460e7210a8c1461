//! Polarized frame decomposition.
//!
//! A Polarized8 frame interleaves four polarizer orientations in a repeating
//! 2x2 cell:
//!
//! ```text
//!   col 0   col 1
//!   90°     45°     row 0
//!   135°    0°      row 1
//! ```
//!
//! Every cell yields one pixel in each derived image, so all derived images
//! are half the raw width and height. Derived composites come from the
//! per-cell Stokes parameters:
//!
//! - `S0 = (I0 + I45 + I90 + I135) / 2` (total intensity, 0..=510)
//! - `S1 = I0 - I90`
//! - `S2 = I45 - I135`
//!
//! The normalized composite rescales S0 over its absolute range rather than
//! the range observed in the frame, so brightness stays comparable between
//! frames. The glare-reduced composite keeps only the unpolarized minimum
//! `(S0 - sqrt(S1² + S2²)) / 2`, which removes most specular reflection.

use image::{imageops, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::error::{CameraError, CameraResult};
use crate::hardware::camera_adapter::{PixelFormat, RawFrame};

/// Maximum S0 for 8-bit samples.
const S0_MAX: f64 = 510.0;

/// Polarizer orientation of a mosaic sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolarQuadrant {
    /// 0°, bottom-right of each 2x2 cell
    I0,
    /// 45°, top-right
    I45,
    /// 90°, top-left
    I90,
    /// 135°, bottom-left
    I135,
}

impl PolarQuadrant {
    /// Extraction order used throughout the crate.
    pub const ALL: [PolarQuadrant; 4] = [
        PolarQuadrant::I0,
        PolarQuadrant::I45,
        PolarQuadrant::I90,
        PolarQuadrant::I135,
    ];

    /// (column, row) of this orientation inside a 2x2 cell.
    pub fn offset(self) -> (u32, u32) {
        match self {
            PolarQuadrant::I90 => (0, 0),
            PolarQuadrant::I45 => (1, 0),
            PolarQuadrant::I135 => (0, 1),
            PolarQuadrant::I0 => (1, 1),
        }
    }

    /// Orientation of the raw sample at column `x`, row `y`.
    pub fn at(x: u32, y: u32) -> Self {
        match (x % 2, y % 2) {
            (0, 0) => PolarQuadrant::I90,
            (1, 0) => PolarQuadrant::I45,
            (0, _) => PolarQuadrant::I135,
            _ => PolarQuadrant::I0,
        }
    }

    /// Polarizer angle in degrees.
    pub fn angle_degrees(self) -> f64 {
        match self {
            PolarQuadrant::I0 => 0.0,
            PolarQuadrant::I45 => 45.0,
            PolarQuadrant::I90 => 90.0,
            PolarQuadrant::I135 => 135.0,
        }
    }

    pub fn angle_radians(self) -> f64 {
        self.angle_degrees().to_radians()
    }
}

/// Which composite fills the normalized slot of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeKind {
    /// S0 rescaled to 8 bits
    #[default]
    Intensity,
    /// Degree of linear polarization, 0..=1 mapped to 0..=255
    Dolp,
}

/// The six images derived from one Polarized8 frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedFrame {
    pub i0: GrayImage,
    pub i45: GrayImage,
    pub i90: GrayImage,
    pub i135: GrayImage,
    /// Intensity or DoLP, per [`CompositeKind`]
    pub normalized: GrayImage,
    /// Unpolarized minimum intensity
    pub glare_reduced: GrayImage,
}

impl DecomposedFrame {
    /// Orientation image for `quadrant`.
    pub fn orientation(&self, quadrant: PolarQuadrant) -> &GrayImage {
        match quadrant {
            PolarQuadrant::I0 => &self.i0,
            PolarQuadrant::I45 => &self.i45,
            PolarQuadrant::I90 => &self.i90,
            PolarQuadrant::I135 => &self.i135,
        }
    }

    /// Tile into the 2x3 display panel, see [`tile_panel`].
    pub fn to_panel(&self) -> CameraResult<GrayImage> {
        tile_panel(
            &self.i0,
            &self.i45,
            &self.i90,
            &self.i135,
            &self.normalized,
            &self.glare_reduced,
        )
    }
}

/// Per-cell samples in [`PolarQuadrant::ALL`] order.
fn cell(frame: &RawFrame, x: u32, y: u32) -> [f64; 4] {
    PolarQuadrant::ALL.map(|q| {
        let (dx, dy) = q.offset();
        f64::from(frame.sample(2 * x + dx, 2 * y + dy))
    })
}

/// S0, S1, S2 of one cell.
fn stokes([i0, i45, i90, i135]: [f64; 4]) -> (f64, f64, f64) {
    ((i0 + i45 + i90 + i135) / 2.0, i0 - i90, i45 - i135)
}

fn to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn check_polarized(frame: &RawFrame) -> CameraResult<()> {
    if frame.pixel_format != PixelFormat::Polarized8 {
        return Err(CameraError::UnsupportedPixelFormat(
            frame.pixel_format.as_str().to_string(),
        ));
    }
    if frame.width < 2 || frame.height < 2 {
        return Err(CameraError::InvalidState(format!(
            "polarized frame {}x{} is smaller than one mosaic cell",
            frame.width, frame.height
        )));
    }
    let expected = frame.width as usize * frame.height as usize;
    if frame.data.len() != expected {
        return Err(CameraError::InvalidState(format!(
            "frame buffer holds {} bytes, expected {expected}",
            frame.data.len()
        )));
    }
    Ok(())
}

/// Derived image built cell by cell.
fn per_cell(frame: &RawFrame, f: impl Fn([f64; 4]) -> u8) -> CameraResult<GrayImage> {
    check_polarized(frame)?;
    Ok(GrayImage::from_fn(frame.width / 2, frame.height / 2, |x, y| {
        Luma([f(cell(frame, x, y))])
    }))
}

/// Sub-image of a single polarizer orientation.
pub fn extract_quadrant(frame: &RawFrame, quadrant: PolarQuadrant) -> CameraResult<GrayImage> {
    check_polarized(frame)?;
    let (dx, dy) = quadrant.offset();
    Ok(GrayImage::from_fn(frame.width / 2, frame.height / 2, |x, y| {
        Luma([frame.sample(2 * x + dx, 2 * y + dy)])
    }))
}

/// S0 scaled from its absolute range 0..=510 to 0..=255.
pub fn normalized_intensity(frame: &RawFrame) -> CameraResult<GrayImage> {
    per_cell(frame, |samples| {
        let (s0, _, _) = stokes(samples);
        to_u8(s0 * 255.0 / S0_MAX)
    })
}

/// Degree of linear polarization scaled to 0..=255. Black cells read 0.
pub fn dolp(frame: &RawFrame) -> CameraResult<GrayImage> {
    per_cell(frame, |samples| {
        let (s0, s1, s2) = stokes(samples);
        if s0 <= 0.0 {
            return 0;
        }
        to_u8((s1.hypot(s2) / s0).min(1.0) * 255.0)
    })
}

/// Unpolarized minimum intensity `(S0 - sqrt(S1² + S2²)) / 2`.
pub fn glare_reduced(frame: &RawFrame) -> CameraResult<GrayImage> {
    per_cell(frame, |samples| {
        let (s0, s1, s2) = stokes(samples);
        to_u8((s0 - s1.hypot(s2)) / 2.0)
    })
}

/// Composite selected by `kind`.
pub fn normalized_composite(frame: &RawFrame, kind: CompositeKind) -> CameraResult<GrayImage> {
    match kind {
        CompositeKind::Intensity => normalized_intensity(frame),
        CompositeKind::Dolp => dolp(frame),
    }
}

/// Split one Polarized8 frame into its four orientations and two composites.
pub fn decompose(frame: &RawFrame, kind: CompositeKind) -> CameraResult<DecomposedFrame> {
    Ok(DecomposedFrame {
        i0: extract_quadrant(frame, PolarQuadrant::I0)?,
        i45: extract_quadrant(frame, PolarQuadrant::I45)?,
        i90: extract_quadrant(frame, PolarQuadrant::I90)?,
        i135: extract_quadrant(frame, PolarQuadrant::I135)?,
        normalized: normalized_composite(frame, kind)?,
        glare_reduced: glare_reduced(frame)?,
    })
}

/// Tile six equally sized images:
///
/// ```text
/// I0  | I45  | normalized
/// I90 | I135 | glare reduced
/// ```
pub fn tile_panel(
    i0: &GrayImage,
    i45: &GrayImage,
    i90: &GrayImage,
    i135: &GrayImage,
    normalized: &GrayImage,
    glare_reduced: &GrayImage,
) -> CameraResult<GrayImage> {
    let (w, h) = i0.dimensions();
    let layout = [
        (i0, 0, 0),
        (i45, 1, 0),
        (normalized, 2, 0),
        (i90, 0, 1),
        (i135, 1, 1),
        (glare_reduced, 2, 1),
    ];
    for (tile, _, _) in &layout {
        if tile.dimensions() != (w, h) {
            return Err(CameraError::DimensionMismatch {
                expected: (w, h),
                actual: tile.dimensions(),
            });
        }
    }

    let mut panel = GrayImage::new(3 * w, 2 * h);
    for (tile, col, row) in layout {
        imageops::replace(
            &mut panel,
            tile,
            i64::from(col * w),
            i64::from(row * h),
        );
    }
    Ok(panel)
}

/// Owned grayscale view of a raw frame, mosaic included.
pub fn raw_to_gray(frame: &RawFrame) -> CameraResult<GrayImage> {
    GrayImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(|| {
        CameraError::InvalidState(format!(
            "frame buffer holds {} bytes, too few for {}x{}",
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })
}

/// Place the frames of a sequence side by side, in capture order.
pub fn sequence_strip(frames: &[RawFrame]) -> CameraResult<GrayImage> {
    let first = frames
        .first()
        .ok_or_else(|| CameraError::InvalidState("empty image sequence".to_string()))?;
    let (w, h) = (first.width, first.height);

    let mut strip = GrayImage::new(w * frames.len() as u32, h);
    for (i, frame) in frames.iter().enumerate() {
        if (frame.width, frame.height) != (w, h) {
            return Err(CameraError::DimensionMismatch {
                expected: (w, h),
                actual: (frame.width, frame.height),
            });
        }
        imageops::replace(&mut strip, &raw_to_gray(frame)?, i as i64 * i64::from(w), 0);
    }
    Ok(strip)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Polarized8 frame with a constant value per orientation.
    fn pattern(width: u32, height: u32, values: [u8; 4]) -> RawFrame {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let index = PolarQuadrant::ALL
                    .iter()
                    .position(|q| *q == PolarQuadrant::at(x, y))
                    .unwrap();
                data.push(values[index]);
            }
        }
        RawFrame {
            width,
            height,
            pixel_format: PixelFormat::Polarized8,
            frame_id: 1,
            timestamp_ns: 0,
            data,
        }
    }

    #[test]
    fn test_mosaic_layout() {
        assert_eq!(PolarQuadrant::at(0, 0), PolarQuadrant::I90);
        assert_eq!(PolarQuadrant::at(1, 0), PolarQuadrant::I45);
        assert_eq!(PolarQuadrant::at(0, 1), PolarQuadrant::I135);
        assert_eq!(PolarQuadrant::at(3, 5), PolarQuadrant::I0);
        for q in PolarQuadrant::ALL {
            let (x, y) = q.offset();
            assert_eq!(PolarQuadrant::at(x, y), q);
        }
    }

    #[test]
    fn test_quadrants_recover_constants() {
        let frame = pattern(8, 6, [10, 20, 30, 40]);
        let decomposed = decompose(&frame, CompositeKind::Intensity).unwrap();
        for (q, expected) in PolarQuadrant::ALL.into_iter().zip([10u8, 20, 30, 40]) {
            let image = decomposed.orientation(q);
            assert_eq!(image.dimensions(), (4, 3));
            assert!(image.pixels().all(|p| p.0[0] == expected), "{q:?}");
        }
    }

    #[test]
    fn test_composites() {
        let frame = pattern(4, 4, [10, 20, 30, 40]);
        // S0 = 50 -> 50 * 255 / 510
        let normalized = normalized_intensity(&frame).unwrap();
        assert!(normalized.pixels().all(|p| p.0[0] == 25));
        // S1 = S2 = -20, |S| = 28.28 -> (50 - 28.28) / 2
        let glare = glare_reduced(&frame).unwrap();
        assert!(glare.pixels().all(|p| p.0[0] == 11));
        // 28.28 / 50 * 255
        let dolp = dolp(&frame).unwrap();
        assert!(dolp.pixels().all(|p| p.0[0] == 144));
    }

    #[test]
    fn test_unpolarized_light_passes_glare_filter() {
        let frame = pattern(4, 4, [100, 100, 100, 100]);
        let glare = glare_reduced(&frame).unwrap();
        assert!(glare.pixels().all(|p| p.0[0] == 100));
        assert!(dolp(&frame).unwrap().pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_panel_layout() {
        let frame = pattern(8, 8, [10, 20, 30, 40]);
        let panel = decompose(&frame, CompositeKind::Intensity)
            .unwrap()
            .to_panel()
            .unwrap();
        assert_eq!(panel.dimensions(), (12, 8));
        assert_eq!(panel.get_pixel(0, 0).0[0], 10);
        assert_eq!(panel.get_pixel(4, 0).0[0], 20);
        assert_eq!(panel.get_pixel(8, 0).0[0], 25);
        assert_eq!(panel.get_pixel(0, 4).0[0], 30);
        assert_eq!(panel.get_pixel(4, 4).0[0], 40);
        assert_eq!(panel.get_pixel(11, 7).0[0], 11);
    }

    #[test]
    fn test_panel_rejects_mismatched_tiles() {
        let a = GrayImage::new(4, 4);
        let b = GrayImage::new(4, 2);
        let err = tile_panel(&a, &a, &a, &a, &b, &a).unwrap_err();
        assert_eq!(
            err,
            CameraError::DimensionMismatch {
                expected: (4, 4),
                actual: (4, 2)
            }
        );
    }

    #[test]
    fn test_mono_frame_rejected() {
        let mut frame = pattern(4, 4, [1, 2, 3, 4]);
        frame.pixel_format = PixelFormat::Mono8;
        assert!(matches!(
            extract_quadrant(&frame, PolarQuadrant::I0),
            Err(CameraError::UnsupportedPixelFormat(_))
        ));
    }

    #[test]
    fn test_sequence_strip() {
        let frames = [
            pattern(4, 2, [1, 1, 1, 1]),
            pattern(4, 2, [2, 2, 2, 2]),
            pattern(4, 2, [3, 3, 3, 3]),
        ];
        let strip = sequence_strip(&frames).unwrap();
        assert_eq!(strip.dimensions(), (12, 2));
        assert_eq!(strip.get_pixel(0, 0).0[0], 1);
        assert_eq!(strip.get_pixel(5, 1).0[0], 2);
        assert_eq!(strip.get_pixel(11, 0).0[0], 3);
        assert!(sequence_strip(&[]).is_err());
    }
}
