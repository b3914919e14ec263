//! Line integral convolution of a noise texture along a vector field.
//!
//! Every field vector is quantized to one of eight neighbor offsets by
//! the angle of the vector shifted by 180°, using 45° sectors centred on
//! the compass directions (upper bound inclusive):
//!
//! | shifted angle    | offset `(drow, dcol)` |
//! |------------------|-----------------------|
//! | `(0, 22.5]`      | `( 1,  0)` |
//! | `(22.5, 67.5]`   | `( 1, -1)` |
//! | `(67.5, 112.5]`  | `( 0, -1)` |
//! | `(112.5, 157.5]` | `(-1, -1)` |
//! | `(157.5, 202.5]` | `(-1,  0)` |
//! | `(202.5, 247.5]` | `(-1,  1)` |
//! | `(247.5, 292.5]` | `( 0,  1)` |
//! | `(292.5, 337.5]` | `( 1,  1)` |
//! | `(337.5, 360]`   | `( 1,  0)` |
//!
//! Anything else (exactly 0, NaN) falls back to `(1, 0)`.
//!
//! For a pixel `p` the walk at step `s` samples `p + s·d` (forward) or
//! `p − s·d` (backward), where `d` starts as the offset at `p` and is
//! re-resolved at every sampled cell. Both walks stop at the first
//! candidate outside the image. Samples are weighted by
//! `steps − 1 − s`. The raw value is `⌊Σ weight·noise / count⌋` where
//! `count` is one (for `p` itself, whose noise is not accumulated)
//! plus the number of samples taken.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::field::VectorField;
use crate::noise::NoiseField;
use crate::types::{Dimensions, PipelineError, Vector};

/// Neighbor offsets `(drow, dcol)` indexed by direction bucket.
pub const DIRECTIONS: [(isize, isize); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Width of a direction sector in degrees.
const SECTOR: f64 = 45.0;

/// Direction bucket (index into [`DIRECTIONS`]) for an angle in degrees.
#[must_use]
pub fn direction_bucket(angle_degrees: f64) -> usize {
    let shifted = angle_degrees + 180.0;
    if shifted.is_nan() || shifted <= 0.0 || shifted > 360.0 {
        return 0;
    }
    let sector = ((shifted - SECTOR / 2.0) / SECTOR).ceil().max(0.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let sector = sector as usize;
    sector % DIRECTIONS.len()
}

/// Direction bucket of a field vector.
#[must_use]
pub fn quantize(vector: Vector) -> u8 {
    u8::try_from(direction_bucket(vector.angle_degrees())).unwrap_or(0)
}

/// Per-pixel direction buckets of a field, resolved once up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionMap {
    dimensions: Dimensions,
    buckets: Vec<u8>,
}

impl DirectionMap {
    /// Quantize every vector of `field`.
    #[must_use]
    pub fn from_field(field: &VectorField) -> Self {
        let buckets = field.as_slice().iter().copied().map(quantize).collect();
        Self {
            dimensions: field.dimensions(),
            buckets,
        }
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Offset `(drow, dcol)` resolved at `(row, col)`.
    #[must_use]
    pub fn offset(&self, row: usize, col: usize) -> (isize, isize) {
        DIRECTIONS[usize::from(self.buckets[self.dimensions.index(row, col)])]
    }

    /// Number of pixels in each direction bucket.
    #[must_use]
    pub fn histogram(&self) -> [usize; 8] {
        let mut counts = [0; 8];
        for &b in &self.buckets {
            counts[usize::from(b)] += 1;
        }
        counts
    }
}

/// Accumulated streamline samples for one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelSample {
    /// Weighted noise sum over both walks.
    pub smear: u64,
    /// Cells sampled by the forward walk.
    pub forward: u32,
    /// Cells sampled by the backward walk.
    pub backward: u32,
}

impl PixelSample {
    /// Total sample count, including the origin pixel.
    #[must_use]
    pub fn count(&self) -> u64 {
        1 + u64::from(self.forward) + u64::from(self.backward)
    }

    /// Raw (unnormalized) sketch value: `⌊smear / count⌋`.
    #[must_use]
    pub fn raw_value(&self) -> u64 {
        self.smear / self.count()
    }
}

/// Normalized sketch intensities in `[0, 1]`, row-major.
///
/// `1.0` is the brightest (least inked) value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchMap {
    dimensions: Dimensions,
    values: Vec<f64>,
    raw_max: u64,
}

impl SketchMap {
    /// Normalize raw values by their maximum.
    ///
    /// A zero maximum yields an all-zero (blank) map.
    #[must_use]
    pub fn from_raw_values(dimensions: Dimensions, raw: &[u64]) -> Self {
        let raw_max = raw.iter().copied().max().unwrap_or(0);
        let values = if raw_max == 0 {
            if !raw.is_empty() {
                log::warn!("lic: raw sketch maximum is zero, emitting a blank map");
            }
            vec![0.0; raw.len()]
        } else {
            #[allow(clippy::cast_precision_loss)]
            let max = raw_max as f64;
            raw.iter()
                .map(|&r| {
                    #[allow(clippy::cast_precision_loss)]
                    let r = r as f64;
                    r / max
                })
                .collect()
        };
        Self {
            dimensions,
            values,
            raw_max,
        }
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Value at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[self.dimensions.index(row, col)]
    }

    /// All values, row-major.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Largest raw value before normalization.
    #[must_use]
    pub const fn raw_max(&self) -> u64 {
        self.raw_max
    }

    /// Map `[0, 1]` to `0..=255`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_gray_image(&self) -> GrayImage {
        let bytes = self
            .values
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        GrayImage::from_raw(self.dimensions.width, self.dimensions.height, bytes)
            .unwrap_or_else(|| GrayImage::new(self.dimensions.width, self.dimensions.height))
    }
}

/// LIC renderer with a fixed step count.
///
/// The kernel `steps − 1, …, 1, 0` is built once and shared by every
/// walk; entry `s` weights the cell sampled at step `s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicRenderer {
    steps: u32,
    kernel: Vec<u32>,
}

impl LicRenderer {
    /// Create a renderer walking up to `steps − 1` cells each way.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when `steps` is zero.
    pub fn new(steps: u32) -> Result<Self, PipelineError> {
        if steps == 0 {
            return Err(PipelineError::InvalidConfig(
                "lic_steps must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            steps,
            kernel: (0..steps).rev().collect(),
        })
    }

    /// Configured step count.
    #[must_use]
    pub const fn steps(&self) -> u32 {
        self.steps
    }

    /// Kernel weights `steps − 1, …, 1, 0`, indexed by step.
    #[must_use]
    pub fn kernel(&self) -> &[u32] {
        &self.kernel
    }

    /// Walk one direction from `(row, col)`. `sign` is `1` or `-1`.
    #[allow(clippy::cast_possible_wrap)]
    fn walk(
        &self,
        directions: &DirectionMap,
        noise: &NoiseField,
        row: usize,
        col: usize,
        sign: isize,
    ) -> (u64, u32) {
        let dims = directions.dimensions();
        let (mut drow, mut dcol) = directions.offset(row, col);
        let mut smear = 0_u64;
        let mut taken = 0_u32;

        for (step, &weight) in self.kernel.iter().enumerate().skip(1) {
            let s = step as isize;
            let r = row as isize + sign * drow * s;
            let c = col as isize + sign * dcol * s;
            let (Ok(r), Ok(c)) = (usize::try_from(r), usize::try_from(c)) else {
                break;
            };
            if r >= dims.rows() || c >= dims.cols() {
                break;
            }
            smear += u64::from(noise.get(r, c)) * u64::from(weight);
            taken += 1;
            (drow, dcol) = directions.offset(r, c);
        }
        (smear, taken)
    }

    /// Both walks from `(row, col)`.
    #[must_use]
    pub fn sample(
        &self,
        directions: &DirectionMap,
        noise: &NoiseField,
        row: usize,
        col: usize,
    ) -> PixelSample {
        let (fwd_smear, forward) = self.walk(directions, noise, row, col, 1);
        let (back_smear, backward) = self.walk(directions, noise, row, col, -1);
        PixelSample {
            smear: fwd_smear + back_smear,
            forward,
            backward,
        }
    }

    /// Render the normalized sketch map.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] when `noise` and
    /// `field` differ in size.
    pub fn render(
        &self,
        noise: &NoiseField,
        field: &VectorField,
    ) -> Result<SketchMap, PipelineError> {
        self.render_until(noise, field, || false)
    }

    /// Render, polling `abort` before each pixel.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Aborted`] as soon as `abort` returns
    /// `true`, and [`PipelineError::DimensionMismatch`] when `noise` and
    /// `field` differ in size.
    pub fn render_until(
        &self,
        noise: &NoiseField,
        field: &VectorField,
        mut abort: impl FnMut() -> bool,
    ) -> Result<SketchMap, PipelineError> {
        let dims = field.dimensions();
        PipelineError::check_dimensions(dims, noise.dimensions())?;

        let directions = DirectionMap::from_field(field);
        let mut raw = Vec::with_capacity(dims.pixel_count());
        for row in 0..dims.rows() {
            for col in 0..dims.cols() {
                if abort() {
                    return Err(PipelineError::Aborted {
                        completed_pixels: raw.len(),
                    });
                }
                raw.push(self.sample(&directions, noise, row, col).raw_value());
            }
        }

        let sketch = SketchMap::from_raw_values(dims, &raw);
        log::debug!(
            "lic: {}x{} px, {} steps, raw max {}",
            dims.width,
            dims.height,
            self.steps,
            sketch.raw_max(),
        );
        Ok(sketch)
    }
}
