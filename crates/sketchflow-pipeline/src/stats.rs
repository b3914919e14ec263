//! Per-region aggregation of a vector field: mean vector and pooled
//! scalar dispersion.

use serde::{Deserialize, Serialize};

use crate::field::VectorField;
use crate::segment::Segmentation;
use crate::types::{PipelineError, Vector};

/// Mean and dispersion of the field over every region of a partition.
///
/// Dispersion is `Σ |v − mean|² / count`, a single isotropic measure
/// rather than a per-component variance. Empty regions report a zero
/// mean and zero dispersion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStats {
    means: Vec<Vector>,
    dispersions: Vec<f64>,
    counts: Vec<usize>,
}

impl RegionStats {
    /// Aggregate `field` over the regions of `segmentation`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] when the field and
    /// the segmentation cover different image sizes.
    pub fn compute(
        field: &VectorField,
        segmentation: &Segmentation,
    ) -> Result<Self, PipelineError> {
        PipelineError::check_dimensions(segmentation.dimensions(), field.dimensions())?;

        let counts = segmentation.region_sizes().to_vec();
        let regions = counts.len();
        let labels = segmentation.labels();
        let vectors = field.as_slice();

        let mut sums = vec![Vector::ZERO; regions];
        for (&label, &v) in labels.iter().zip(vectors) {
            let slot = &mut sums[label as usize];
            *slot = *slot + v;
        }

        let means: Vec<Vector> = sums
            .iter()
            .zip(&counts)
            .map(|(&sum, &count)| {
                if count == 0 {
                    Vector::ZERO
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    sum.scaled(1.0 / count as f64)
                }
            })
            .collect();

        let mut spread = vec![0.0_f64; regions];
        for (&label, &v) in labels.iter().zip(vectors) {
            let id = label as usize;
            spread[id] += (v - means[id]).norm_squared();
        }

        let dispersions = spread
            .iter()
            .zip(&counts)
            .map(|(&s, &count)| {
                if count == 0 {
                    0.0
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    let n = count as f64;
                    s / n
                }
            })
            .collect();

        Ok(Self {
            means,
            dispersions,
            counts,
        })
    }

    /// Number of regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.counts.len()
    }

    /// Mean vector per region id.
    #[must_use]
    pub fn means(&self) -> &[Vector] {
        &self.means
    }

    /// Dispersion per region id.
    #[must_use]
    pub fn dispersions(&self) -> &[f64] {
        &self.dispersions
    }

    /// Pixel count per region id.
    #[must_use]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Number of regions whose dispersion is strictly above `threshold`.
    #[must_use]
    pub fn regions_above(&self, threshold: f64) -> usize {
        self.dispersions.iter().filter(|&&d| d > threshold).count()
    }
}
