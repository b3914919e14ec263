//! Gaussian blur and 5×5 Sobel gradients of a luminance image.
//!
//! Blur wraps [`imageproc::filter::gaussian_blur_f32`]. The Sobel
//! operator is applied separably: the derivative kernel
//! `[-1, -2, 0, 2, 1]` along one axis and the smoothing kernel
//! `[1, 4, 6, 4, 1]` along the other. Borders are reflected without
//! repeating the edge pixel (`gfedcb|abcdefgh|gfedcba`), so a uniform
//! image yields exactly zero gradient everywhere.
//!
//! `imageproc::filter::filter_clamped` is not used here: it replicates
//! the border pixel (`aaa|abc`), which changes every gradient within two
//! pixels of the edge, and it saturates output to the pixel type, which
//! cuts off negative derivatives.
//!
//! `gx` grows when intensity increases to the right, `gy` when it
//! increases downward.

use image::GrayImage;

use crate::types::Dimensions;

const SMOOTH_5: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
const DERIV_5: [f32; 5] = [-1.0, -2.0, 0.0, 2.0, 1.0];

/// Per-pixel horizontal and vertical derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    dimensions: Dimensions,
    gx: Vec<f32>,
    gy: Vec<f32>,
}

impl Gradients {
    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Horizontal derivative, row-major.
    #[must_use]
    pub fn gx(&self) -> &[f32] {
        &self.gx
    }

    /// Vertical derivative (positive = brighter downward), row-major.
    #[must_use]
    pub fn gy(&self) -> &[f32] {
        &self.gy
    }
}

/// Apply Gaussian blur to a luminance image.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Blur `image` with `sigma`, then take its 5×5 Sobel gradients.
#[must_use]
pub fn blurred_gradients(image: &GrayImage, sigma: f32) -> Gradients {
    sobel5(&gaussian_blur(image, sigma))
}

/// Reflect an out-of-range coordinate back into `0..len` without
/// repeating the border sample.
fn reflect_101(i: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    #[allow(clippy::cast_possible_wrap)]
    let n = len as isize;
    let period = 2 * (n - 1);
    let mut m = i.rem_euclid(period);
    if m >= n {
        m = period - m;
    }
    usize::try_from(m).unwrap_or(0)
}

/// Correlate every row of `src` with `kernel` (5 taps, centered).
fn correlate_rows(src: &[f32], dims: Dimensions, kernel: &[f32; 5]) -> Vec<f32> {
    let (rows, cols) = (dims.rows(), dims.cols());
    let mut out = vec![0.0; src.len()];
    for row in 0..rows {
        let line = &src[row * cols..(row + 1) * cols];
        for col in 0..cols {
            #[allow(clippy::cast_possible_wrap)]
            let center = col as isize;
            out[row * cols + col] = kernel
                .iter()
                .zip(-2_isize..=2)
                .map(|(&k, offset)| k * line[reflect_101(center + offset, cols)])
                .sum();
        }
    }
    out
}

/// Correlate every column of `src` with `kernel` (5 taps, centered).
fn correlate_cols(src: &[f32], dims: Dimensions, kernel: &[f32; 5]) -> Vec<f32> {
    let (rows, cols) = (dims.rows(), dims.cols());
    let mut out = vec![0.0; src.len()];
    for row in 0..rows {
        #[allow(clippy::cast_possible_wrap)]
        let center = row as isize;
        for col in 0..cols {
            out[row * cols + col] = kernel
                .iter()
                .zip(-2_isize..=2)
                .map(|(&k, offset)| k * src[reflect_101(center + offset, rows) * cols + col])
                .sum();
        }
    }
    out
}

/// 5×5 Sobel gradients of a luminance image.
#[must_use]
pub fn sobel5(image: &GrayImage) -> Gradients {
    let dimensions = Dimensions::of_gray(image);
    let plane: Vec<f32> = image.as_raw().iter().map(|&v| f32::from(v)).collect();

    let gx = correlate_cols(&correlate_rows(&plane, dimensions, &DERIV_5), dimensions, &SMOOTH_5);
    let gy = correlate_rows(&correlate_cols(&plane, dimensions, &DERIV_5), dimensions, &SMOOTH_5);

    Gradients { dimensions, gx, gy }
}
