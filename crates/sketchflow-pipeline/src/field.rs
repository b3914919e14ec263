//! Vector field estimation.
//!
//! The field is produced in three passes over a single buffer:
//!
//! 1. [`raw_orientation`]: `(gx, −gy) / 255` from blurred-luminance
//!    gradients, flipped so `y ≥ 0` (undirected orientation).
//! 2. [`snap_to_region_means`]: pixels of regions whose dispersion
//!    exceeds a threshold take their region's mean vector.
//! 3. [`invert_magnitude`]: `v / (|v|² + ε)`, so strong gradients end up
//!    shorter than weak ones.
//!
//! Passes 2 and 3 take the field by value and hand it back, so the
//! buffer is never shared while it is being rewritten.

use serde::{Deserialize, Serialize};

use crate::gradient::Gradients;
use crate::segment::Segmentation;
use crate::stats::RegionStats;
use crate::types::{Dimensions, PipelineError, Vector};

/// Gradient values are scaled by this before forming vectors.
const GRADIENT_SCALE: f64 = 255.0;

/// One orientation vector per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorField {
    dimensions: Dimensions,
    vectors: Vec<Vector>,
}

impl VectorField {
    /// Wrap row-major vectors. Returns `None` on a length mismatch.
    #[must_use]
    pub fn from_raw(dimensions: Dimensions, vectors: Vec<Vector>) -> Option<Self> {
        (vectors.len() == dimensions.pixel_count()).then_some(Self {
            dimensions,
            vectors,
        })
    }

    /// A field with the same vector at every pixel.
    #[must_use]
    pub fn filled(dimensions: Dimensions, vector: Vector) -> Self {
        Self {
            dimensions,
            vectors: vec![vector; dimensions.pixel_count()],
        }
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Vector at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Vector {
        self.vectors[self.dimensions.index(row, col)]
    }

    /// All vectors, row-major.
    #[must_use]
    pub fn as_slice(&self) -> &[Vector] {
        &self.vectors
    }

    /// Angle of every vector in degrees, in `(-180, 180]`.
    #[must_use]
    pub fn angles_degrees(&self) -> Vec<f64> {
        self.vectors.iter().map(|v| v.angle_degrees()).collect()
    }
}

/// Pass 1: raw orientation from gradients.
#[must_use]
pub fn raw_orientation(gradients: &Gradients) -> VectorField {
    let vectors = gradients
        .gx()
        .iter()
        .zip(gradients.gy())
        .map(|(&gx, &gy)| {
            let v = Vector::new(f64::from(gx) / GRADIENT_SCALE, -f64::from(gy) / GRADIENT_SCALE);
            if v.y < 0.0 { v.negated() } else { v }
        })
        .collect();
    VectorField {
        dimensions: gradients.dimensions(),
        vectors,
    }
}

/// Pass 2: overwrite every pixel of a high-dispersion region with that
/// region's mean.
///
/// Returns the field and the number of pixels overwritten.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] when `segmentation`
/// does not match the field's size.
pub fn snap_to_region_means(
    mut field: VectorField,
    segmentation: &Segmentation,
    stats: &RegionStats,
    threshold: f64,
) -> Result<(VectorField, usize), PipelineError> {
    PipelineError::check_dimensions(field.dimensions, segmentation.dimensions())?;

    let means = stats.means();
    let dispersions = stats.dispersions();
    let mut snapped = 0;
    for (v, &label) in field.vectors.iter_mut().zip(segmentation.labels()) {
        let id = label as usize;
        if let (Some(&mean), Some(&dispersion)) = (means.get(id), dispersions.get(id))
            && dispersion > threshold
        {
            *v = mean;
            snapped += 1;
        }
    }
    Ok((field, snapped))
}

/// Pass 3: `v / (|v|² + epsilon)` at every pixel.
#[must_use]
pub fn invert_magnitude(mut field: VectorField, epsilon: f64) -> VectorField {
    for v in &mut field.vectors {
        let d = v.norm_squared() + epsilon;
        *v = Vector::new(v.x / d, v.y / d);
    }
    field
}
