//! Image variants fed to the text recognizer

use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};
use serde::Serialize;

/// Bilateral window diameter (pixels)
const BILATERAL_DIAMETER: u32 = 11;

/// Bilateral intensity sigma; smaller keeps more edges
const BILATERAL_SIGMA_COLOR: f32 = 17.0;

/// Bilateral spatial sigma
const BILATERAL_SIGMA_SPACE: f32 = 17.0;

/// Gaussian sigma matching an 11 pixel adaptive threshold block
const THRESHOLD_BLOCK_SIGMA: f32 = 2.0;

/// Subtracted from the local mean before comparing
const THRESHOLD_OFFSET: f32 = 2.0;

/// Which preprocessing produced a variant. Order here is recognition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Thresholded,
    Denoised,
    Grayscale,
    Original,
}

impl VariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thresholded => "thresholded",
            Self::Denoised => "denoised",
            Self::Grayscale => "grayscale",
            Self::Original => "original",
        }
    }
}

/// Build the four recognition inputs for a crop:
/// thresholded, denoised, grayscale, then the untouched crop.
pub fn plate_variants(crop: &DynamicImage) -> Vec<(VariantKind, DynamicImage)> {
    let gray = crop.to_luma8();
    let denoised = denoise(
        &gray,
        BILATERAL_DIAMETER,
        BILATERAL_SIGMA_COLOR,
        BILATERAL_SIGMA_SPACE,
    );
    let thresholded = adaptive_gaussian_threshold(&denoised, THRESHOLD_BLOCK_SIGMA, THRESHOLD_OFFSET);

    vec![
        (VariantKind::Thresholded, DynamicImage::ImageLuma8(thresholded)),
        (VariantKind::Denoised, DynamicImage::ImageLuma8(denoised)),
        (VariantKind::Grayscale, DynamicImage::ImageLuma8(gray)),
        (VariantKind::Original, crop.clone()),
    ]
}

/// Edge-preserving smoothing of a grayscale image
pub fn denoise(img: &GrayImage, diameter: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    // imageproc panics on empty input
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    bilateral_filter(img, diameter, sigma_color, sigma_space)
}

/// Binarize against a Gaussian-weighted local mean: a pixel becomes white
/// when it is brighter than `mean - offset`.
pub fn adaptive_gaussian_threshold(img: &GrayImage, sigma: f32, offset: f32) -> GrayImage {
    let local_mean = gaussian_blur_f32(img, sigma);
    let mut output = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let threshold = local_mean.get_pixel(x, y)[0] as f32 - offset;
        let value = if pixel[0] as f32 > threshold { 255 } else { 0 };
        output.put_pixel(x, y, Luma([value]));
    }
    output
}
