//! Shared types for the sketchflow pipeline.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::color::LabImage;
use crate::field::VectorField;
use crate::lic::SketchMap;
use crate::noise::NoiseField;
use crate::region_color::RegionPalette;
use crate::segment::Segmentation;
use crate::stats::RegionStats;

/// Re-export `GrayImage` so downstream crates can reference
/// luminance rasters without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage`, the pipeline's input raster type.
pub use image::RgbImage;

/// Image dimensions in pixels.
///
/// All per-pixel buffers in this crate are stored row-major, so the flat
/// index of `(row, col)` is `row * width + col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions value.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an RGB image.
    #[must_use]
    pub fn of_rgb(image: &RgbImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Dimensions of a grayscale image.
    #[must_use]
    pub fn of_gray(image: &GrayImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Total number of pixels (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of rows as `usize`.
    #[must_use]
    pub const fn rows(self) -> usize {
        self.height as usize
    }

    /// Number of columns as `usize`.
    #[must_use]
    pub const fn cols(self) -> usize {
        self.width as usize
    }

    /// Flat row-major index of `(row, col)`.
    #[must_use]
    pub const fn index(self, row: usize, col: usize) -> usize {
        row * self.width as usize + col
    }

    /// Returns `true` if the image has no pixels.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A two-component orientation vector.
///
/// `x` follows image columns (left to right) and `y` points up, i.e.
/// against the row direction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    /// Horizontal component.
    pub x: f64,
    /// Vertical component (positive = up).
    pub y: f64,
}

impl Vector {
    /// The zero vector.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean norm.
    #[must_use]
    pub fn norm_squared(self) -> f64 {
        self.x.mul_add(self.x, self.y * self.y)
    }

    /// Multiply both components by `factor`.
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Flip both components.
    #[must_use]
    pub fn negated(self) -> Self {
        Self::new(-self.x, -self.y)
    }

    /// Angle of the vector in degrees, in `(-180, 180]`.
    #[must_use]
    pub fn angle_degrees(self) -> f64 {
        self.y.atan2(self.x).to_degrees()
    }
}

impl Add for Vector {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Configuration for the sketch pipeline.
///
/// Every parameter has a `DEFAULT_*` constant; call
/// [`validate`](Self::validate) (done automatically by
/// [`Pipeline::new`](crate::Pipeline::new) and [`process`](crate::process))
/// to reject invalid values before any pixel is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gaussian blur sigma applied to luminance before gradient
    /// estimation.
    pub blur_sigma: f32,

    /// The smoothing partition targets `pixel_count / region_divisor`
    /// regions (at least one). Must be at least 1.
    pub region_divisor: u32,

    /// Regions whose pooled dispersion exceeds this value have every
    /// pixel overwritten with the region's mean vector.
    pub dispersion_threshold: f64,

    /// Epsilon in the magnitude-inverting normalization
    /// `v / (|v|² + epsilon)`. Must be positive.
    pub magnitude_epsilon: f64,

    /// Noise tone strength in `[0, 1]`. Higher values thin out noise in
    /// dark areas.
    pub tone_strength: f64,

    /// Number of LIC steps per walk direction. Must be at least 1.
    pub lic_steps: u32,

    /// Seed for the noise texture used by [`process`](crate::process).
    pub seed: u64,
}

impl PipelineConfig {
    /// Default Gaussian blur sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 2.0;
    /// Default smoothing-partition divisor.
    pub const DEFAULT_REGION_DIVISOR: u32 = 8;
    /// Default dispersion threshold.
    pub const DEFAULT_DISPERSION_THRESHOLD: f64 = 0.5;
    /// Default normalization epsilon.
    pub const DEFAULT_MAGNITUDE_EPSILON: f64 = 1e-2;
    /// Default noise tone strength.
    pub const DEFAULT_TONE_STRENGTH: f64 = 0.7;
    /// Default LIC step count.
    pub const DEFAULT_LIC_STEPS: u32 = 15;
    /// Default noise seed.
    pub const DEFAULT_SEED: u64 = 0;

    /// Check every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.blur_sigma.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "blur_sigma must be finite, got {}",
                self.blur_sigma
            )));
        }
        if self.region_divisor == 0 {
            return Err(PipelineError::InvalidConfig(
                "region_divisor must be at least 1".to_string(),
            ));
        }
        if !self.dispersion_threshold.is_finite() || self.dispersion_threshold < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "dispersion_threshold must be finite and non-negative, got {}",
                self.dispersion_threshold
            )));
        }
        if !self.magnitude_epsilon.is_finite() || self.magnitude_epsilon <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "magnitude_epsilon must be finite and positive, got {}",
                self.magnitude_epsilon
            )));
        }
        if !(0.0..=1.0).contains(&self.tone_strength) {
            return Err(PipelineError::InvalidConfig(format!(
                "tone_strength must be within [0, 1], got {}",
                self.tone_strength
            )));
        }
        if self.lic_steps == 0 {
            return Err(PipelineError::InvalidConfig(
                "lic_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Target region count of the smoothing partition for an image with
    /// `pixel_count` pixels: `max(1, pixel_count / region_divisor)`.
    #[must_use]
    pub fn smoothing_region_count(&self, pixel_count: usize) -> usize {
        let divisor = usize::try_from(self.region_divisor.max(1)).unwrap_or(usize::MAX);
        (pixel_count / divisor).max(1)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            region_divisor: Self::DEFAULT_REGION_DIVISOR,
            dispersion_threshold: Self::DEFAULT_DISPERSION_THRESHOLD,
            magnitude_epsilon: Self::DEFAULT_MAGNITUDE_EPSILON,
            tone_strength: Self::DEFAULT_TONE_STRENGTH,
            lic_steps: Self::DEFAULT_LIC_STEPS,
            seed: Self::DEFAULT_SEED,
        }
    }
}

/// Result of running the full sketch pipeline.
///
/// Holds exactly what the external compositor consumes: the normalized
/// sketch map, the final vector field, the smoothing partition and its
/// region colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchResult {
    /// Normalized sketch intensities in `[0, 1]` (1.0 = least inked).
    pub sketch: SketchMap,
    /// Final, magnitude-inverted orientation field.
    pub field: VectorField,
    /// Region partition used to smooth the field.
    pub regions: Segmentation,
    /// Mean Lab color of every region.
    pub palette: RegionPalette,
    /// Dimensions of the source image in pixels.
    pub dimensions: Dimensions,
}

/// Result of running the pipeline with the intermediate stage outputs
/// preserved.
///
/// The raw and snapped field passes are not retained: the field buffer
/// is moved from stage to stage and only its final form survives. Use
/// the incremental [`Pipeline`](crate::Pipeline) to inspect those.
///
/// Uses custom `Serialize`/`Deserialize` implementations because
/// `RgbImage` and `GrayImage` do not implement serde traits. Raster
/// images are serialized as `(width, height, raw_pixels)` tuples.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Stage 0: the input image.
    pub original: RgbImage,
    /// Stage 1: luminance.
    pub luminance: GrayImage,
    /// Stage 1: perceptual Lab conversion.
    pub lab: LabImage,
    /// Stage 3: smoothing partition.
    pub segmentation: Segmentation,
    /// Stage 4: per-region mean and dispersion of the raw field.
    pub stats: RegionStats,
    /// Stage 5: final vector field.
    pub field: VectorField,
    /// Stage 6: binary noise texture.
    pub noise: NoiseField,
    /// Stage 7: normalized sketch map.
    pub sketch: SketchMap,
    /// Mean Lab color of every region.
    pub palette: RegionPalette,
    /// Source image dimensions in pixels.
    pub dimensions: Dimensions,
}

impl StagedResult {
    /// Drop the intermediates and keep what the compositor consumes.
    #[must_use]
    pub fn into_sketch_result(self) -> SketchResult {
        SketchResult {
            sketch: self.sketch,
            field: self.field,
            regions: self.segmentation,
            palette: self.palette,
            dimensions: self.dimensions,
        }
    }
}

/// Serde-compatible proxy for `StagedResult`.
#[derive(Serialize, Deserialize)]
struct StagedResultProxy {
    original: (u32, u32, Vec<u8>),
    luminance: (u32, u32, Vec<u8>),
    lab: LabImage,
    segmentation: Segmentation,
    stats: RegionStats,
    field: VectorField,
    noise: NoiseField,
    sketch: SketchMap,
    palette: RegionPalette,
    dimensions: Dimensions,
}

impl Serialize for StagedResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = StagedResultProxy {
            original: (
                self.original.width(),
                self.original.height(),
                self.original.as_raw().clone(),
            ),
            luminance: (
                self.luminance.width(),
                self.luminance.height(),
                self.luminance.as_raw().clone(),
            ),
            lab: self.lab.clone(),
            segmentation: self.segmentation.clone(),
            stats: self.stats.clone(),
            field: self.field.clone(),
            noise: self.noise.clone(),
            sketch: self.sketch.clone(),
            palette: self.palette.clone(),
            dimensions: self.dimensions,
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StagedResult {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = StagedResultProxy::deserialize(deserializer)?;

        let original = RgbImage::from_raw(proxy.original.0, proxy.original.1, proxy.original.2)
            .ok_or_else(|| serde::de::Error::custom("invalid RGB image dimensions"))?;
        let luminance =
            GrayImage::from_raw(proxy.luminance.0, proxy.luminance.1, proxy.luminance.2)
                .ok_or_else(|| serde::de::Error::custom("invalid luminance image dimensions"))?;

        Ok(Self {
            original,
            luminance,
            lab: proxy.lab,
            segmentation: proxy.segmentation,
            stats: proxy.stats,
            field: proxy.field,
            noise: proxy.noise,
            sketch: proxy.sketch,
            palette: proxy.palette,
            dimensions: proxy.dimensions,
        })
    }
}

/// Errors that can occur during pipeline processing.
///
/// Configuration errors are reported before any computation starts.
/// Numeric degeneracies never surface here; they fall back to
/// well-defined values inside the stage that meets them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The input image has no pixels.
    #[error("input image is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A target region count outside `1..=pixel_count` was requested.
    #[error("target region count {requested} is outside 1..={pixel_count}")]
    InvalidRegionCount {
        /// The requested number of regions.
        requested: usize,
        /// Pixels available to partition.
        pixel_count: usize,
    },

    /// Two rasters handed to one operation disagree in size.
    #[error(
        "dimension mismatch: expected {}x{}, got {}x{}",
        expected.width,
        expected.height,
        actual.width,
        actual.height
    )]
    DimensionMismatch {
        /// Dimensions the operation was set up for.
        expected: Dimensions,
        /// Dimensions that were supplied.
        actual: Dimensions,
    },

    /// A per-region table does not match the partition it is applied to.
    #[error("region count mismatch: expected {expected}, got {actual}")]
    RegionCountMismatch {
        /// Regions the table covers.
        expected: usize,
        /// Regions in the supplied partition.
        actual: usize,
    },

    /// A partition's labels and region sizes disagree.
    #[error("invalid segmentation: {0}")]
    InvalidSegmentation(String),

    /// Rendering was aborted between pixels by the caller.
    #[error("rendering aborted after {completed_pixels} pixels")]
    Aborted {
        /// Number of pixels fully rendered before the abort.
        completed_pixels: usize,
    },
}

impl PipelineError {
    /// Return `Ok` when `actual` equals `expected`, otherwise a
    /// [`PipelineError::DimensionMismatch`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] on disagreement.
    pub fn check_dimensions(expected: Dimensions, actual: Dimensions) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch { expected, actual })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Dimensions tests ---

    #[test]
    fn dimensions_index_is_row_major() {
        let d = Dimensions::new(4, 3);
        assert_eq!(d.pixel_count(), 12);
        assert_eq!(d.index(0, 0), 0);
        assert_eq!(d.index(1, 0), 4);
        assert_eq!(d.index(2, 3), 11);
    }

    #[test]
    fn dimensions_empty() {
        assert!(Dimensions::new(0, 5).is_empty());
        assert!(Dimensions::new(5, 0).is_empty());
        assert!(!Dimensions::new(1, 1).is_empty());
    }

    // --- Vector tests ---

    #[test]
    fn vector_arithmetic() {
        let a = Vector::new(1.0, 2.0);
        let b = Vector::new(0.5, -1.0);
        assert_eq!(a + b, Vector::new(1.5, 1.0));
        assert_eq!(a - b, Vector::new(0.5, 3.0));
        assert_eq!(a.scaled(2.0), Vector::new(2.0, 4.0));
        assert_eq!(a.negated(), Vector::new(-1.0, -2.0));
        assert!((Vector::new(3.0, 4.0).norm_squared() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn vector_angle_degrees() {
        assert!((Vector::new(1.0, 0.0).angle_degrees()).abs() < 1e-12);
        assert!((Vector::new(0.0, 1.0).angle_degrees() - 90.0).abs() < 1e-12);
        assert!((Vector::new(-1.0, 0.0).angle_degrees() - 180.0).abs() < 1e-12);
    }

    // --- PipelineConfig tests ---

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert!((config.blur_sigma - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.region_divisor, 8);
        assert!((config.dispersion_threshold - 0.5).abs() < f64::EPSILON);
        assert!((config.magnitude_epsilon - 1e-2).abs() < f64::EPSILON);
        assert!((config.tone_strength - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.lic_steps, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_steps_rejected() {
        let config = PipelineConfig {
            lic_steps: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(ref s)) if s.contains("lic_steps")
        ));
    }

    #[test]
    fn zero_region_divisor_rejected() {
        let config = PipelineConfig {
            region_divisor: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(ref s)) if s.contains("region_divisor")
        ));
    }

    #[test]
    fn out_of_range_tone_rejected() {
        for tone in [-0.1, 1.5, f64::NAN] {
            let config = PipelineConfig {
                tone_strength: tone,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "tone {tone} should be rejected");
        }
    }

    #[test]
    fn non_positive_epsilon_rejected() {
        let config = PipelineConfig {
            magnitude_epsilon: 0.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn smoothing_region_count_is_at_least_one() {
        let config = PipelineConfig::default();
        assert_eq!(config.smoothing_region_count(4), 1);
        assert_eq!(config.smoothing_region_count(64), 8);
        assert_eq!(config.smoothing_region_count(100), 12);
    }

    // --- PipelineError tests ---

    #[test]
    fn error_display() {
        assert_eq!(PipelineError::EmptyInput.to_string(), "input image is empty");
        assert_eq!(
            PipelineError::InvalidRegionCount {
                requested: 0,
                pixel_count: 4
            }
            .to_string(),
            "target region count 0 is outside 1..=4",
        );
        assert_eq!(
            PipelineError::DimensionMismatch {
                expected: Dimensions::new(2, 2),
                actual: Dimensions::new(3, 2),
            }
            .to_string(),
            "dimension mismatch: expected 2x2, got 3x2",
        );
    }

    #[test]
    fn check_dimensions() {
        let d = Dimensions::new(3, 3);
        assert!(PipelineError::check_dimensions(d, d).is_ok());
        assert!(matches!(
            PipelineError::check_dimensions(d, Dimensions::new(3, 4)),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    // --- Serde round-trip tests ---

    #[test]
    fn pipeline_config_serde_round_trip() {
        let config = PipelineConfig {
            blur_sigma: 1.5,
            region_divisor: 4,
            dispersion_threshold: 0.25,
            magnitude_epsilon: 0.05,
            tone_strength: 0.6,
            lic_steps: 9,
            seed: 42,
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"lic_steps": 7}"#).unwrap();
        assert_eq!(config.lic_steps, 7);
        assert_eq!(config.region_divisor, PipelineConfig::DEFAULT_REGION_DIVISOR);
    }

    #[test]
    fn pipeline_error_serde_round_trip() {
        let err = PipelineError::Aborted {
            completed_pixels: 17,
        };
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }
}
