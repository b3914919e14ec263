//! Tone-biased binary noise.

use image::GrayImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::color::max_luminance;
use crate::types::Dimensions;

/// Value of an "on" noise pixel.
pub const ON: u8 = u8::MAX;
/// Value of an "off" noise pixel.
pub const OFF: u8 = 0;

/// Binary noise texture, one byte per pixel (`ON` or `OFF`), row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseField {
    dimensions: Dimensions,
    values: Vec<u8>,
}

impl NoiseField {
    /// Wrap row-major values. Returns `None` on a length mismatch.
    #[must_use]
    pub fn from_raw(dimensions: Dimensions, values: Vec<u8>) -> Option<Self> {
        (values.len() == dimensions.pixel_count()).then_some(Self { dimensions, values })
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Value at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.values[self.dimensions.index(row, col)]
    }

    /// All values, row-major.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.values
    }

    /// Number of `ON` pixels.
    #[must_use]
    pub fn on_count(&self) -> usize {
        self.values.iter().filter(|&&v| v == ON).count()
    }

    /// The texture as a grayscale image.
    #[must_use]
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_raw(self.dimensions.width, self.dimensions.height, self.values.clone())
            .unwrap_or_else(|| GrayImage::new(self.dimensions.width, self.dimensions.height))
    }
}

/// Generate noise biased by the tone of `luminance`.
///
/// For each pixel, `tone = tone_strength · (1 − L / L_max)` and one
/// uniform `[0, 1)` draw is taken in row-major order; the pixel is `ON`
/// when the draw is at least `tone`. An all-black image (`L_max = 0`)
/// uses `tone = tone_strength` everywhere.
pub fn generate<R: Rng + ?Sized>(
    luminance: &GrayImage,
    tone_strength: f64,
    rng: &mut R,
) -> NoiseField {
    let dimensions = Dimensions::of_gray(luminance);
    let max = f64::from(max_luminance(luminance));

    let values = luminance
        .pixels()
        .map(|p| {
            let relative = if max > 0.0 { f64::from(p.0[0]) / max } else { 0.0 };
            let tone = tone_strength * (1.0 - relative);
            if rng.r#gen::<f64>() >= tone { ON } else { OFF }
        })
        .collect::<Vec<_>>();

    let field = NoiseField { dimensions, values };
    log::debug!(
        "noise: {} of {} pixels on (tone strength {tone_strength})",
        field.on_count(),
        dimensions.pixel_count(),
    );
    field
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn same_seed_same_noise() {
        let img = GrayImage::from_fn(16, 16, |x, y| image::Luma([((x * 16 + y) % 256) as u8]));
        let a = generate(&img, 0.7, &mut ChaCha8Rng::seed_from_u64(3));
        let b = generate(&img, 0.7, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn values_are_binary() {
        let img = GrayImage::from_fn(8, 8, |x, _| image::Luma([(x * 30) as u8]));
        let noise = generate(&img, 0.7, &mut ChaCha8Rng::seed_from_u64(9));
        assert!(noise.as_slice().iter().all(|&v| v == ON || v == OFF));
        assert_eq!(noise.dimensions(), Dimensions::new(8, 8));
    }

    #[test]
    fn zero_tone_strength_is_all_on() {
        let img = GrayImage::new(5, 5);
        let noise = generate(&img, 0.0, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(noise.on_count(), 25);
    }

    #[test]
    fn brightest_pixel_is_always_on() {
        let mut img = GrayImage::new(3, 3);
        img.put_pixel(1, 1, image::Luma([200]));
        for seed in 0..50 {
            let noise = generate(&img, 1.0, &mut ChaCha8Rng::seed_from_u64(seed));
            assert_eq!(noise.get(1, 1), ON);
        }
    }

    #[test]
    fn dark_pixels_follow_tone_rate() {
        let mut img = GrayImage::new(100, 100);
        img.put_pixel(0, 0, image::Luma([255]));
        let noise = generate(&img, 0.7, &mut ChaCha8Rng::seed_from_u64(42));
        #[allow(clippy::cast_precision_loss)]
        let rate = (noise.on_count() - 1) as f64 / 9999.0;
        assert!((rate - 0.3).abs() < 0.03, "on rate {rate}");
    }

    #[test]
    fn gray_image_export() {
        let noise = NoiseField::from_raw(Dimensions::new(2, 1), vec![ON, OFF]).unwrap();
        let img = noise.to_gray_image();
        assert_eq!(img.get_pixel(0, 0).0[0], 255);
        assert_eq!(img.get_pixel(1, 0).0[0], 0);
    }
}
