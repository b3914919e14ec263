//! sketchflow-pipeline: Pure sketch synthesis pipeline (sans-IO).
//!
//! Turns an RGB photograph into a pencil-sketch intensity map through:
//! luminance/Lab conversion -> blurred Sobel orientation field ->
//! color-distance region merging -> per-region snap-to-mean ->
//! magnitude inversion -> tone-biased noise -> line integral
//! convolution.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! rasters and returns structured data. Decoding files and compositing
//! the final picture live elsewhere.

pub mod color;
pub mod diagnostics;
pub mod field;
pub mod forest;
pub mod gradient;
pub mod graph;
pub mod lic;
pub mod noise;
pub mod pipeline;
pub mod region_color;
pub mod segment;
pub mod stats;
pub mod types;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use web_time::Instant;

pub use diagnostics::{PipelineDiagnostics, PipelineSummary, StageDiagnostics, StageMetrics};
pub use field::VectorField;
pub use lic::{LicRenderer, SketchMap};
pub use noise::NoiseField;
pub use pipeline::{Pipeline, PipelineStage};
pub use region_color::RegionPalette;
pub use segment::Segmentation;
pub use stats::RegionStats;
pub use types::{
    Dimensions, GrayImage, PipelineConfig, PipelineError, RgbImage, SketchResult, StagedResult,
    Vector,
};

/// Run the full sketch pipeline.
///
/// The noise texture is drawn from a `ChaCha8` generator seeded with
/// `config.seed`, so identical inputs always give identical sketches.
///
/// # Pipeline steps
///
/// 1. Luminance and Lab conversion
/// 2. Gaussian blur, 5×5 Sobel gradients, raw orientation field
/// 3. Region merging down to `max(1, pixels / region_divisor)` regions
/// 4. Region statistics and snap-to-mean of incoherent regions
/// 5. Magnitude-inverting normalization
/// 6. Tone-biased binary noise
/// 7. Line integral convolution and normalization to `[0, 1]`
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` is invalid.
/// Returns [`PipelineError::EmptyInput`] if `image` has no pixels.
pub fn process(image: &RgbImage, config: &PipelineConfig) -> Result<SketchResult, PipelineError> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let staged = Pipeline::new(image.clone(), config.clone())?
        .convert()
        .orient()
        .segment()?
        .smooth()?
        .normalize()
        .noise(&mut rng)
        .render()?
        .into_result();
    Ok(staged.into_sketch_result())
}

/// Run the full pipeline, keeping every intermediate and timing each
/// stage.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_staged(
    image: &RgbImage,
    config: &PipelineConfig,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let pipeline_start = Instant::now();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let pending = Pipeline::new(image.clone(), config.clone())?;

    let t = Instant::now();
    let converted = pending.convert();
    let convert = StageDiagnostics::measure(t, &converted);

    let t = Instant::now();
    let oriented = converted.orient();
    let orient = StageDiagnostics::measure(t, &oriented);

    let t = Instant::now();
    let segmented = oriented.segment()?;
    let segment = StageDiagnostics::measure(t, &segmented);

    let t = Instant::now();
    let smoothed = segmented.smooth()?;
    let smooth = StageDiagnostics::measure(t, &smoothed);

    let t = Instant::now();
    let normalized = smoothed.normalize();
    let normalize = StageDiagnostics::measure(t, &normalized);

    let t = Instant::now();
    let noised = normalized.noise(&mut rng);
    let noise = StageDiagnostics::measure(t, &noised);

    let t = Instant::now();
    let rendered = noised.render()?;
    let render = StageDiagnostics::measure(t, &rendered);

    let pixels_snapped = rendered.pixels_snapped();
    let staged = rendered.into_result();
    let total_duration = pipeline_start.elapsed();

    let summary = PipelineSummary {
        image_width: staged.dimensions.width,
        image_height: staged.dimensions.height,
        pixel_count: u64::from(staged.dimensions.width) * u64::from(staged.dimensions.height),
        region_count: staged.segmentation.region_count(),
        pixels_snapped,
    };
    log::info!(
        "sketch {}x{}: {} regions, {} px snapped, {:.1}ms",
        summary.image_width,
        summary.image_height,
        summary.region_count,
        summary.pixels_snapped,
        total_duration.as_secs_f64() * 1000.0,
    );

    let diagnostics = PipelineDiagnostics {
        convert,
        orient,
        segment,
        smooth,
        normalize,
        noise,
        render,
        total_duration,
        summary,
    };
    Ok((staged, diagnostics))
}
