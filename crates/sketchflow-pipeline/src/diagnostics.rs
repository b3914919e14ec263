//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! Every call to [`process_staged`](crate::process_staged) collects
//! diagnostics alongside the pipeline results. Timestamps are captured
//! via the `web-time` crate (`performance.now()` on WASM,
//! `std::time::Instant` on native); durations are stored as
//! [`std::time::Duration`] and serialized as fractional seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::pipeline::PipelineStage;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom("duration seconds must be finite and non-negative"))
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Luminance and Lab conversion.
    pub convert: StageDiagnostics,
    /// Blur, gradients and raw orientation.
    pub orient: StageDiagnostics,
    /// Smoothing partition.
    pub segment: StageDiagnostics,
    /// Region statistics and snap-to-mean.
    pub smooth: StageDiagnostics,
    /// Magnitude-inverting normalization.
    pub normalize: StageDiagnostics,
    /// Noise texture generation.
    pub noise: StageDiagnostics,
    /// Line integral convolution.
    pub render: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

impl StageDiagnostics {
    /// Close a stage that started at `started`, reading its metrics.
    #[must_use]
    pub fn measure<S: PipelineStage>(started: Instant, stage: &S) -> Self {
        let duration = started.elapsed();
        let metrics = stage.metrics();
        log::debug!("{} finished in {:.3}ms", S::NAME, duration_ms(duration));
        Self { duration, metrics }
    }
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Color conversion.
    Convert {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Total pixel count.
        pixel_count: u64,
        /// Brightest luminance value.
        max_luminance: u8,
    },
    /// Raw orientation field.
    Orient {
        /// Blur sigma applied before gradients.
        sigma: f32,
        /// Mean vector length.
        mean_magnitude: f64,
        /// Pixels whose vector is exactly zero.
        zero_vectors: usize,
    },
    /// Smoothing partition.
    Segment {
        /// Requested region count.
        target_regions: usize,
        /// Regions actually produced.
        region_count: usize,
        /// Largest region in pixels.
        largest_region: usize,
    },
    /// Region snapping.
    Smooth {
        /// Dispersion threshold.
        threshold: f64,
        /// Regions above the threshold.
        regions_snapped: usize,
        /// Pixels overwritten with their region mean.
        pixels_snapped: usize,
    },
    /// Magnitude inversion.
    Normalize {
        /// Epsilon added to `|v|²`.
        epsilon: f64,
        /// Longest vector after inversion.
        max_magnitude: f64,
    },
    /// Noise generation.
    Noise {
        /// Tone strength.
        tone_strength: f64,
        /// Pixels switched on.
        on_pixels: usize,
        /// Total pixel count.
        total_pixels: usize,
    },
    /// LIC rendering.
    Render {
        /// Steps per walk direction.
        steps: u32,
        /// Largest raw value before normalization.
        raw_max: u64,
        /// Pixels per direction bucket, indexed like `lic::DIRECTIONS`.
        directions: [usize; 8],
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Regions in the smoothing partition.
    pub region_count: usize,
    /// Pixels overwritten by snapping.
    pub pixels_snapped: usize,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Convert", &self.convert),
            ("Orient", &self.orient),
            ("Segment", &self.segment),
            ("Smooth", &self.smooth),
            ("Normalize", &self.normalize),
            ("Noise", &self.noise),
            ("Render", &self.render),
        ];

        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Regions: {}  |  Snapped pixels: {}",
            self.summary.region_count, self.summary.pixels_snapped,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Convert {
            width,
            height,
            max_luminance,
            ..
        } => format!("{width}x{height} max_luma={max_luminance}"),
        StageMetrics::Orient {
            sigma,
            mean_magnitude,
            zero_vectors,
        } => format!("sigma={sigma:.2} mean|v|={mean_magnitude:.4} zero={zero_vectors}"),
        StageMetrics::Segment {
            target_regions,
            region_count,
            largest_region,
        } => format!("{region_count}/{target_regions} regions, largest={largest_region}px"),
        StageMetrics::Smooth {
            threshold,
            regions_snapped,
            pixels_snapped,
        } => format!("thr={threshold:.2} {regions_snapped} regions, {pixels_snapped}px snapped"),
        StageMetrics::Normalize {
            epsilon,
            max_magnitude,
        } => format!("eps={epsilon:.0e} max|v|={max_magnitude:.3}"),
        StageMetrics::Noise {
            tone_strength,
            on_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixels > 0 {
                *on_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            format!("tone={tone_strength:.2} on={on_pixels} ({density:.1}%)")
        }
        StageMetrics::Render {
            steps,
            raw_max,
            directions,
        } => {
            let dominant = directions
                .iter()
                .enumerate()
                .max_by_key(|&(_, n)| *n)
                .map_or(0, |(bucket, _)| bucket);
            format!("steps={steps} raw_max={raw_max} dominant_dir={dominant}")
        }
    }
}
