// THEORY:
// Neighbourhood filters over gray images: the layer between single-pixel colour
// transforms and region analysis. Smoothing, edge detection and gradients come from
// `imageproc`; the 3x3 Laplacian is computed here because every texture heuristic
// consumes its raw signed response as `f64`, not a clamped 8-bit image.
//
// Kernel sizes are quoted the way the heuristics were tuned (odd pixel widths); the
// Gaussian sigma for a width `k` follows the usual `0.3 * ((k - 1) / 2 - 1) + 0.8`.

use image::{GrayImage, Luma, RgbImage};
use imageproc::definitions::Image;

use crate::core_modules::mask::Mask;
use crate::core_modules::pixel::pixel::Pixel;

/// Rec. 601 gray copy of an RGB image.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([Pixel::from(image.get_pixel(x, y)).gray()])
    })
}

/// Gray image with every pixel outside the mask set to 0.
pub fn apply_mask(gray: &GrayImage, mask: &Mask) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if mask.get(x, y) { *gray.get_pixel(x, y) } else { Luma([0]) }
    })
}

/// Sigma equivalent to a square Gaussian kernel of odd width `kernel_size`.
pub fn gaussian_sigma_for_kernel(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian blur with the sigma of a `kernel_size` x `kernel_size` kernel.
pub fn gaussian_blur(gray: &GrayImage, kernel_size: u32) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(gray, gaussian_sigma_for_kernel(kernel_size))
}

/// Median blur over a `kernel_size` x `kernel_size` window.
pub fn median_blur(gray: &GrayImage, kernel_size: u32) -> GrayImage {
    let radius = kernel_size / 2;
    imageproc::filter::median_filter(gray, radius, radius)
}

/// Canny edge map as a mask.
pub fn canny_edges(gray: &GrayImage, low_threshold: f32, high_threshold: f32) -> Mask {
    Mask::from_gray(&imageproc::edges::canny(gray, low_threshold, high_threshold))
}

/// Horizontal and vertical Sobel responses.
pub fn sobel(gray: &GrayImage) -> (Image<Luma<i16>>, Image<Luma<i16>>) {
    (
        imageproc::gradients::horizontal_sobel(gray),
        imageproc::gradients::vertical_sobel(gray),
    )
}

#[inline]
fn reflect_101(i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        }
        if i >= len {
            i = 2 * (len - 1) - i;
        }
    }
    i
}

/// Signed response of the 4-neighbour Laplacian `[0 1 0; 1 -4 1; 0 1 0]`, row-major,
/// with mirrored (101) borders.
pub fn laplacian(gray: &GrayImage) -> Vec<f64> {
    let (width, height) = (gray.width() as i64, gray.height() as i64);
    let at = |x: i64, y: i64| -> f64 {
        gray.get_pixel(reflect_101(x, width) as u32, reflect_101(y, height) as u32)[0] as f64
    };
    let mut out = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            out.push(at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y));
        }
    }
    out
}

/// Variance of the Laplacian over the whole frame: the sharpness measure.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    variance(laplacian(gray).iter().copied())
}

/// Population variance of a sample.
pub fn variance(values: impl Iterator<Item = f64>) -> f64 {
    let (mut count, mut sum, mut sum_sq) = (0usize, 0.0, 0.0);
    for v in values {
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    (sum_sq / count as f64 - mean * mean).max(0.0)
}

/// Summary statistics of 8-bit intensity samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: u8,
    pub max: u8,
}

impl SampleStats {
    pub fn from_samples(samples: impl Iterator<Item = u8>) -> Self {
        let (mut count, mut sum, mut sum_sq) = (0usize, 0.0f64, 0.0f64);
        let (mut min, mut max) = (u8::MAX, u8::MIN);
        for v in samples {
            count += 1;
            sum += v as f64;
            sum_sq += (v as f64) * (v as f64);
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return Self::default();
        }
        let mean = sum / count as f64;
        let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
        Self { count, mean, std_dev: variance.sqrt(), min, max }
    }

    /// Gray samples at every set pixel of the mask.
    pub fn of_masked(gray: &GrayImage, mask: &Mask) -> Self {
        Self::from_samples(mask.iter_set().map(|(x, y)| gray.get_pixel(x, y)[0]))
    }

    /// `max - min`, 0 for an empty sample.
    pub fn range(&self) -> u8 {
        if self.count == 0 { 0 } else { self.max - self.min }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
