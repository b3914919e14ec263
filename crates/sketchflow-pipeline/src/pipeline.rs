//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use sketchflow_pipeline::{Pipeline, PipelineConfig, PipelineError, RgbImage};
//! # use rand::SeedableRng;
//! # fn run(image: RgbImage) -> Result<(), PipelineError> {
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
//! let staged = Pipeline::new(image, PipelineConfig::default())?
//!     .convert()
//!     .orient()
//!     .segment()?
//!     .smooth()?
//!     .normalize()
//!     .noise(&mut rng)
//!     .render()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying the intermediates forward. The vector field buffer moves
//! from stage to stage: [`Oriented`] holds the raw field,
//! [`Smoothed`] the snapped one, and [`Normalized`] onward the final
//! field. Clone it from the accessor before advancing to keep an
//! earlier pass.

use rand::Rng;

use crate::color::{LabImage, luminance, max_luminance};
use crate::diagnostics::StageMetrics;
use crate::field::{VectorField, invert_magnitude, raw_orientation, snap_to_region_means};
use crate::gradient::blurred_gradients;
use crate::lic::{DirectionMap, LicRenderer, SketchMap};
use crate::noise::NoiseField;
use crate::region_color::RegionPalette;
use crate::segment::{Segmentation, segment};
use crate::stats::RegionStats;
use crate::types::{Dimensions, GrayImage, PipelineConfig, PipelineError, RgbImage, StagedResult};

/// Number of processing stages after [`Pending`].
pub const STAGE_COUNT: usize = 7;

/// Trait implemented by every processed stage.
pub trait PipelineStage {
    /// Human-readable stage name.
    const NAME: &str;
    /// One-based position of the stage.
    const INDEX: usize;

    /// Metrics describing the work done to reach this state.
    fn metrics(&self) -> StageMetrics;
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Validated input, nothing computed yet.
#[must_use = "pipeline stages are consumed by advancing: call .convert() to continue"]
pub struct Pending {
    config: PipelineConfig,
    original: RgbImage,
}

impl Pending {
    /// The input image.
    #[must_use]
    pub const fn original(&self) -> &RgbImage {
        &self.original
    }

    /// The configuration this run uses.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Convert to luminance and Lab.
    pub fn convert(self) -> Converted {
        let dimensions = Dimensions::of_rgb(&self.original);
        let luminance = luminance(&self.original);
        let lab = LabImage::from_rgb(&self.original);
        log::debug!(
            "convert: {}x{} px, max luminance {}",
            dimensions.width,
            dimensions.height,
            max_luminance(&luminance),
        );
        Converted {
            config: self.config,
            original: self.original,
            luminance,
            lab,
            dimensions,
        }
    }
}

// ───────────────────────── Stage 1: Converted ────────────────────────

/// Luminance and Lab images are available.
#[must_use = "pipeline stages are consumed by advancing: call .orient() to continue"]
pub struct Converted {
    config: PipelineConfig,
    original: RgbImage,
    luminance: GrayImage,
    lab: LabImage,
    dimensions: Dimensions,
}

impl Converted {
    /// Luminance image.
    #[must_use]
    pub const fn luminance(&self) -> &GrayImage {
        &self.luminance
    }

    /// Lab image.
    #[must_use]
    pub const fn lab(&self) -> &LabImage {
        &self.lab
    }

    /// Blur luminance, take gradients, and form the raw orientation field.
    pub fn orient(self) -> Oriented {
        let gradients = blurred_gradients(&self.luminance, self.config.blur_sigma);
        let field = raw_orientation(&gradients);
        Oriented {
            config: self.config,
            original: self.original,
            luminance: self.luminance,
            lab: self.lab,
            field,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 2: Oriented ─────────────────────────

/// The raw orientation field is available.
#[must_use = "pipeline stages are consumed by advancing: call .segment() to continue"]
pub struct Oriented {
    config: PipelineConfig,
    original: RgbImage,
    luminance: GrayImage,
    lab: LabImage,
    field: VectorField,
    dimensions: Dimensions,
}

impl Oriented {
    /// Raw orientation field.
    #[must_use]
    pub const fn field(&self) -> &VectorField {
        &self.field
    }

    /// Partition the image into `max(1, pixels / region_divisor)`
    /// regions and compute each region's mean color.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineError`] from segmentation.
    pub fn segment(self) -> Result<Segmented, PipelineError> {
        let target = self
            .config
            .smoothing_region_count(self.dimensions.pixel_count());
        let segmentation = segment(&self.lab, target)?;
        let palette = RegionPalette::from_regions(&self.lab, &segmentation)?;
        Ok(Segmented {
            config: self.config,
            original: self.original,
            luminance: self.luminance,
            lab: self.lab,
            field: self.field,
            segmentation,
            palette,
            target,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 3: Segmented ────────────────────────

/// The smoothing partition is available.
#[must_use = "pipeline stages are consumed by advancing: call .smooth() to continue"]
pub struct Segmented {
    config: PipelineConfig,
    original: RgbImage,
    luminance: GrayImage,
    lab: LabImage,
    field: VectorField,
    segmentation: Segmentation,
    palette: RegionPalette,
    target: usize,
    dimensions: Dimensions,
}

impl Segmented {
    /// The smoothing partition.
    #[must_use]
    pub const fn segmentation(&self) -> &Segmentation {
        &self.segmentation
    }

    /// Mean Lab color of each region.
    #[must_use]
    pub const fn palette(&self) -> &RegionPalette {
        &self.palette
    }

    /// Aggregate the raw field per region and snap incoherent regions.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if the field and the
    /// partition disagree in size.
    pub fn smooth(self) -> Result<Smoothed, PipelineError> {
        let stats = RegionStats::compute(&self.field, &self.segmentation)?;
        let (field, pixels_snapped) = snap_to_region_means(
            self.field,
            &self.segmentation,
            &stats,
            self.config.dispersion_threshold,
        )?;
        log::debug!(
            "smooth: {} of {} regions above {}, {pixels_snapped} px snapped",
            stats.regions_above(self.config.dispersion_threshold),
            stats.region_count(),
            self.config.dispersion_threshold,
        );
        Ok(Smoothed {
            config: self.config,
            original: self.original,
            luminance: self.luminance,
            lab: self.lab,
            field,
            segmentation: self.segmentation,
            palette: self.palette,
            stats,
            pixels_snapped,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 4: Smoothed ─────────────────────────

/// Region statistics are known and the field has been snapped.
#[must_use = "pipeline stages are consumed by advancing: call .normalize() to continue"]
pub struct Smoothed {
    config: PipelineConfig,
    original: RgbImage,
    luminance: GrayImage,
    lab: LabImage,
    field: VectorField,
    segmentation: Segmentation,
    palette: RegionPalette,
    stats: RegionStats,
    pixels_snapped: usize,
    dimensions: Dimensions,
}

impl Smoothed {
    /// Snapped field, before normalization.
    #[must_use]
    pub const fn field(&self) -> &VectorField {
        &self.field
    }

    /// Per-region mean and dispersion of the raw field.
    #[must_use]
    pub const fn stats(&self) -> &RegionStats {
        &self.stats
    }

    /// Number of pixels overwritten with their region mean.
    #[must_use]
    pub const fn pixels_snapped(&self) -> usize {
        self.pixels_snapped
    }

    /// Apply `v / (|v|² + epsilon)` and freeze the field.
    pub fn normalize(self) -> Normalized {
        let field = invert_magnitude(self.field, self.config.magnitude_epsilon);
        Normalized {
            config: self.config,
            original: self.original,
            luminance: self.luminance,
            lab: self.lab,
            field,
            segmentation: self.segmentation,
            palette: self.palette,
            stats: self.stats,
            pixels_snapped: self.pixels_snapped,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 5: Normalized ───────────────────────

/// The final vector field is available.
#[must_use = "pipeline stages are consumed by advancing: call .noise() to continue"]
pub struct Normalized {
    config: PipelineConfig,
    original: RgbImage,
    luminance: GrayImage,
    lab: LabImage,
    field: VectorField,
    segmentation: Segmentation,
    palette: RegionPalette,
    stats: RegionStats,
    pixels_snapped: usize,
    dimensions: Dimensions,
}

impl Normalized {
    /// Final vector field.
    #[must_use]
    pub const fn field(&self) -> &VectorField {
        &self.field
    }

    /// Draw the tone-biased noise texture from `rng`.
    pub fn noise<R: Rng + ?Sized>(self, rng: &mut R) -> Noised {
        let noise = crate::noise::generate(&self.luminance, self.config.tone_strength, rng);
        Noised {
            config: self.config,
            original: self.original,
            luminance: self.luminance,
            lab: self.lab,
            field: self.field,
            segmentation: self.segmentation,
            palette: self.palette,
            stats: self.stats,
            pixels_snapped: self.pixels_snapped,
            noise,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 6: Noised ───────────────────────────

/// The noise texture is available.
#[must_use = "pipeline stages are consumed by advancing: call .render() to continue"]
pub struct Noised {
    config: PipelineConfig,
    original: RgbImage,
    luminance: GrayImage,
    lab: LabImage,
    field: VectorField,
    segmentation: Segmentation,
    palette: RegionPalette,
    stats: RegionStats,
    pixels_snapped: usize,
    noise: NoiseField,
    dimensions: Dimensions,
}

impl Noised {
    /// Binary noise texture.
    #[must_use]
    pub const fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Render the sketch map.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineError`] from the renderer.
    pub fn render(self) -> Result<Rendered, PipelineError> {
        self.render_until(|| false)
    }

    /// Render the sketch map, polling `abort` before each pixel.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Aborted`] when `abort` returns `true`.
    pub fn render_until(self, abort: impl FnMut() -> bool) -> Result<Rendered, PipelineError> {
        let renderer = LicRenderer::new(self.config.lic_steps)?;
        let sketch = renderer.render_until(&self.noise, &self.field, abort)?;
        Ok(Rendered {
            config: self.config,
            original: self.original,
            luminance: self.luminance,
            lab: self.lab,
            field: self.field,
            segmentation: self.segmentation,
            palette: self.palette,
            stats: self.stats,
            pixels_snapped: self.pixels_snapped,
            noise: self.noise,
            sketch,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 7: Rendered ─────────────────────────

/// The sketch map is available.
pub struct Rendered {
    config: PipelineConfig,
    original: RgbImage,
    luminance: GrayImage,
    lab: LabImage,
    field: VectorField,
    segmentation: Segmentation,
    palette: RegionPalette,
    stats: RegionStats,
    pixels_snapped: usize,
    noise: NoiseField,
    sketch: SketchMap,
    dimensions: Dimensions,
}

impl Rendered {
    /// Normalized sketch map.
    #[must_use]
    pub const fn sketch(&self) -> &SketchMap {
        &self.sketch
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Number of pixels overwritten during smoothing.
    #[must_use]
    pub const fn pixels_snapped(&self) -> usize {
        self.pixels_snapped
    }

    /// Consume the pipeline and return the full [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            original: self.original,
            luminance: self.luminance,
            lab: self.lab,
            segmentation: self.segmentation,
            stats: self.stats,
            field: self.field,
            noise: self.noise,
            sketch: self.sketch,
            palette: self.palette,
            dimensions: self.dimensions,
        }
    }
}

// ─────────────────────────── Stage metrics ───────────────────────────

impl PipelineStage for Converted {
    const NAME: &str = "convert";
    const INDEX: usize = 1;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Convert {
            width: self.dimensions.width,
            height: self.dimensions.height,
            pixel_count: u64::from(self.dimensions.width) * u64::from(self.dimensions.height),
            max_luminance: max_luminance(&self.luminance),
        }
    }
}

impl PipelineStage for Oriented {
    const NAME: &str = "orient";
    const INDEX: usize = 2;

    fn metrics(&self) -> StageMetrics {
        let vectors = self.field.as_slice();
        let total: f64 = vectors.iter().map(|v| v.norm_squared().sqrt()).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean_magnitude = if vectors.is_empty() {
            0.0
        } else {
            total / vectors.len() as f64
        };
        StageMetrics::Orient {
            sigma: self.config.blur_sigma,
            mean_magnitude,
            zero_vectors: vectors.iter().filter(|v| v.norm_squared() == 0.0).count(),
        }
    }
}

impl PipelineStage for Segmented {
    const NAME: &str = "segment";
    const INDEX: usize = 3;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Segment {
            target_regions: self.target,
            region_count: self.segmentation.region_count(),
            largest_region: self
                .segmentation
                .region_sizes()
                .iter()
                .copied()
                .max()
                .unwrap_or(0),
        }
    }
}

impl PipelineStage for Smoothed {
    const NAME: &str = "smooth";
    const INDEX: usize = 4;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Smooth {
            threshold: self.config.dispersion_threshold,
            regions_snapped: self.stats.regions_above(self.config.dispersion_threshold),
            pixels_snapped: self.pixels_snapped,
        }
    }
}

impl PipelineStage for Normalized {
    const NAME: &str = "normalize";
    const INDEX: usize = 5;

    fn metrics(&self) -> StageMetrics {
        let max_magnitude = self
            .field
            .as_slice()
            .iter()
            .map(|v| v.norm_squared().sqrt())
            .fold(0.0, f64::max);
        StageMetrics::Normalize {
            epsilon: self.config.magnitude_epsilon,
            max_magnitude,
        }
    }
}

impl PipelineStage for Noised {
    const NAME: &str = "noise";
    const INDEX: usize = 6;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Noise {
            tone_strength: self.config.tone_strength,
            on_pixels: self.noise.on_count(),
            total_pixels: self.dimensions.pixel_count(),
        }
    }
}

impl PipelineStage for Rendered {
    const NAME: &str = "render";
    const INDEX: usize = 7;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Render {
            steps: self.config.lic_steps,
            raw_max: self.sketch.raw_max(),
            directions: DirectionMap::from_field(&self.field).histogram(),
        }
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental sketch pipeline.
///
/// Each stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or call them out of
/// order.
pub struct Pipeline;

impl Pipeline {
    /// Validate `config` and `image` and store them.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad configuration
    /// and [`PipelineError::EmptyInput`] for an image without pixels.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(image: RgbImage, config: PipelineConfig) -> Result<Pending, PipelineError> {
        config.validate()?;
        if Dimensions::of_rgb(&image).is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        Ok(Pending {
            config,
            original: image,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::types::Vector;

    /// Left half dark blue, right half light orange, with a soft ramp.
    fn two_tone(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if x < width / 2 {
                #[allow(clippy::cast_possible_truncation)]
                image::Rgb([20, 30, (120 + (y * 3) % 40) as u8])
            } else {
                image::Rgb([240, 180, 90])
            }
        })
    }

    fn normalized(image: RgbImage, config: PipelineConfig) -> Normalized {
        Pipeline::new(image, config)
            .unwrap()
            .convert()
            .orient()
            .segment()
            .unwrap()
            .smooth()
            .unwrap()
            .normalize()
    }

    // --- entry validation tests ---

    #[test]
    fn new_rejects_invalid_config() {
        let config = PipelineConfig {
            lic_steps: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::new(two_tone(8, 8), config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn new_rejects_empty_image() {
        assert!(matches!(
            Pipeline::new(RgbImage::new(0, 4), PipelineConfig::default()),
            Err(PipelineError::EmptyInput)
        ));
    }

    // --- stage accessor tests ---

    #[test]
    fn converted_exposes_luminance_and_lab() {
        let converted = Pipeline::new(two_tone(10, 6), PipelineConfig::default())
            .unwrap()
            .convert();
        assert_eq!(converted.luminance().dimensions(), (10, 6));
        assert_eq!(converted.lab().dimensions(), Dimensions::new(10, 6));
        assert!(matches!(
            converted.metrics(),
            StageMetrics::Convert {
                width: 10,
                height: 6,
                pixel_count: 60,
                ..
            }
        ));
    }

    #[test]
    fn oriented_field_points_upward_or_flat() {
        let oriented = Pipeline::new(two_tone(12, 12), PipelineConfig::default())
            .unwrap()
            .convert()
            .orient();
        assert!(oriented.field().as_slice().iter().all(|v| v.y >= 0.0));
        assert!(oriented.field().as_slice().iter().any(|v| v.x != 0.0));
    }

    #[test]
    fn segmented_targets_pixel_count_over_divisor() {
        let segmented = Pipeline::new(two_tone(16, 8), PipelineConfig::default())
            .unwrap()
            .convert()
            .orient()
            .segment()
            .unwrap();
        assert_eq!(segmented.segmentation().region_count(), 16);
        assert_eq!(segmented.palette().len(), 16);
        assert!(matches!(
            segmented.metrics(),
            StageMetrics::Segment {
                target_regions: 16,
                region_count: 16,
                ..
            }
        ));
    }

    #[test]
    fn smoothing_snaps_exactly_high_dispersion_regions() {
        let config = PipelineConfig {
            dispersion_threshold: 0.0,
            ..PipelineConfig::default()
        };
        let oriented = Pipeline::new(two_tone(12, 12), config)
            .unwrap()
            .convert()
            .orient();
        let raw = oriented.field().clone();
        let smoothed = oriented.segment().unwrap().smooth().unwrap();

        let stats = smoothed.stats();
        let mut snapped = 0;
        for (i, &label) in smoothed_labels(&smoothed).iter().enumerate() {
            let id = label as usize;
            let got = smoothed.field().as_slice()[i];
            if stats.dispersions()[id] > 0.0 {
                assert_eq!(got, stats.means()[id]);
                snapped += 1;
            } else {
                assert_eq!(got, raw.as_slice()[i]);
            }
        }
        assert_eq!(snapped, smoothed.pixels_snapped());
    }

    fn smoothed_labels(smoothed: &Smoothed) -> Vec<u32> {
        smoothed.segmentation.labels().to_vec()
    }

    #[test]
    fn normalize_inverts_magnitude() {
        let oriented_then = normalized(two_tone(12, 12), PipelineConfig::default());
        let field = oriented_then.field();
        // |v / (|v|² + eps)| never exceeds 1 / (2 sqrt(eps)) = 5.
        assert!(
            field
                .as_slice()
                .iter()
                .all(|v| v.norm_squared().sqrt() <= 5.0 + 1e-9)
        );
        assert!(matches!(
            oriented_then.metrics(),
            StageMetrics::Normalize { .. }
        ));
    }

    #[test]
    fn noise_and_render_complete_the_pipeline() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let rendered = normalized(two_tone(12, 10), PipelineConfig::default())
            .noise(&mut rng)
            .render()
            .unwrap();
        assert_eq!(rendered.dimensions(), Dimensions::new(12, 10));
        let sketch = rendered.sketch();
        assert!(sketch.as_slice().iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(matches!(
            rendered.metrics(),
            StageMetrics::Render { steps: 15, .. }
        ));
        if let StageMetrics::Render { directions, .. } = rendered.metrics() {
            assert_eq!(directions.iter().sum::<usize>(), 120);
        }

        let staged = rendered.into_result();
        assert_eq!(staged.noise.dimensions(), Dimensions::new(12, 10));
        assert_eq!(staged.original.dimensions(), (12, 10));
    }

    #[test]
    fn render_until_propagates_abort() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = normalized(two_tone(8, 8), PipelineConfig::default())
            .noise(&mut rng)
            .render_until(|| true);
        assert!(matches!(
            result,
            Err(PipelineError::Aborted {
                completed_pixels: 0
            })
        ));
    }

    #[test]
    fn uniform_image_keeps_zero_field() {
        let image = RgbImage::from_pixel(6, 6, image::Rgb([90, 90, 90]));
        let normalized = normalized(image, PipelineConfig::default());
        assert!(
            normalized
                .field()
                .as_slice()
                .iter()
                .all(|&v| v == Vector::ZERO)
        );
    }

    #[test]
    fn stage_constants_are_ordered() {
        assert_eq!(Converted::INDEX, 1);
        assert_eq!(Rendered::INDEX, STAGE_COUNT);
        assert_eq!(Segmented::NAME, "segment");
    }
}
