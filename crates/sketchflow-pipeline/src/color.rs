//! Color-space conversion primitives.
//!
//! The input RGB image is converted once into the two representations
//! the rest of the pipeline consumes:
//!
//! - a single-channel luminance image (`GrayImage`) driving gradients
//!   and noise tone, and
//! - a perceptual CIE L\*a\*b\* image ([`LabImage`]) whose Euclidean
//!   distances weight the segmentation graph.

use image::{GrayImage, RgbImage};
use palette::white_point::D65;
use palette::{FromColor, Lab, Srgb};
use serde::{Deserialize, Serialize};

use crate::types::Dimensions;

/// Luminance weights for R, G, B (ITU-R BT.601).
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Convert an RGB image to luminance: `0.299 R + 0.587 G + 0.114 B`,
/// rounded to the nearest integer.
#[must_use = "returns the luminance image"]
pub fn luminance(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let value = LUMA_WEIGHTS[2].mul_add(
            f32::from(b),
            LUMA_WEIGHTS[1].mul_add(f32::from(g), LUMA_WEIGHTS[0] * f32::from(r)),
        );
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = value.round().clamp(0.0, 255.0) as u8;
        image::Luma([rounded])
    })
}

/// A row-major image of CIE L\*a\*b\* colors (D65 white point).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabImage {
    dimensions: Dimensions,
    pixels: Vec<[f32; 3]>,
}

impl LabImage {
    /// Convert an sRGB image to Lab.
    #[must_use]
    pub fn from_rgb(image: &RgbImage) -> Self {
        let pixels = image
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                let lab: Lab<D65, f32> = Lab::from_color(Srgb::new(
                    f32::from(r) / 255.0,
                    f32::from(g) / 255.0,
                    f32::from(b) / 255.0,
                ));
                [lab.l, lab.a, lab.b]
            })
            .collect();
        Self {
            dimensions: Dimensions::of_rgb(image),
            pixels,
        }
    }

    /// Build a Lab image from raw row-major values.
    ///
    /// Returns `None` when `pixels.len()` does not equal the pixel count
    /// of `dimensions`.
    #[must_use]
    pub fn from_raw(dimensions: Dimensions, pixels: Vec<[f32; 3]>) -> Option<Self> {
        (pixels.len() == dimensions.pixel_count()).then_some(Self { dimensions, pixels })
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// All pixels in row-major order.
    #[must_use]
    pub fn pixels(&self) -> &[[f32; 3]] {
        &self.pixels
    }

    /// Euclidean distance between the colors at two flat indices.
    #[must_use]
    pub fn distance(&self, a: usize, b: usize) -> f32 {
        let (p, q) = (self.pixels[a], self.pixels[b]);
        let d0 = p[0] - q[0];
        let d1 = p[1] - q[1];
        let d2 = p[2] - q[2];
        d2.mul_add(d2, d1.mul_add(d1, d0 * d0)).sqrt()
    }

    /// Convert a Lab triple back to 8-bit sRGB, clamping out-of-gamut
    /// channels.
    #[must_use]
    pub fn to_rgb(lab: [f32; 3]) -> [u8; 3] {
        let srgb = Srgb::from_color(Lab::<D65, f32>::new(lab[0], lab[1], lab[2]));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [
            channel(srgb.red),
            channel(srgb.green),
            channel(srgb.blue),
        ]
    }
}

/// Maximum luminance value in the image (0 for an empty image).
#[must_use]
pub fn max_luminance(image: &GrayImage) -> u8 {
    image.pixels().map(|p| p.0[0]).max().unwrap_or(0)
}
