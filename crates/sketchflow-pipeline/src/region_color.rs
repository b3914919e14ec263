//! Flat region colors: the mean Lab color of every region.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::color::LabImage;
use crate::segment::Segmentation;
use crate::types::{Dimensions, PipelineError};

/// Mean Lab color per region id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPalette {
    colors: Vec<[f32; 3]>,
}

impl RegionPalette {
    /// Average `lab` over each region of `segmentation`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] when the two cover
    /// different image sizes.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn from_regions(
        lab: &LabImage,
        segmentation: &Segmentation,
    ) -> Result<Self, PipelineError> {
        PipelineError::check_dimensions(segmentation.dimensions(), lab.dimensions())?;

        let mut sums = vec![[0.0_f64; 3]; segmentation.region_count()];
        for (&label, lab) in segmentation.labels().iter().zip(lab.pixels()) {
            let sum = &mut sums[label as usize];
            for (acc, &channel) in sum.iter_mut().zip(lab) {
                *acc += f64::from(channel);
            }
        }

        let colors = sums
            .iter()
            .zip(segmentation.region_sizes())
            .map(|(sum, &count)| {
                if count == 0 {
                    return [0.0; 3];
                }
                let n = count as f64;
                sum.map(|s| (s / n) as f32)
            })
            .collect();

        Ok(Self { colors })
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Returns `true` if there are no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Mean Lab color of every region.
    #[must_use]
    pub fn lab_colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    /// Mean color of every region as 8-bit sRGB.
    #[must_use]
    pub fn rgb_colors(&self) -> Vec<[u8; 3]> {
        self.colors.iter().map(|&c| LabImage::to_rgb(c)).collect()
    }

    /// Paint every pixel with its region's color.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RegionCountMismatch`] when the palette
    /// was built for a different number of regions.
    pub fn to_rgb_image(&self, segmentation: &Segmentation) -> Result<RgbImage, PipelineError> {
        if segmentation.region_count() != self.colors.len() {
            return Err(PipelineError::RegionCountMismatch {
                expected: self.colors.len(),
                actual: segmentation.region_count(),
            });
        }
        let rgb = self.rgb_colors();
        let Dimensions { width, height } = segmentation.dimensions();
        let cols = segmentation.dimensions().cols();
        let labels = segmentation.labels();
        Ok(RgbImage::from_fn(width, height, |x, y| {
            let label = labels[y as usize * cols + x as usize];
            image::Rgb(rgb[label as usize])
        }))
    }
}
