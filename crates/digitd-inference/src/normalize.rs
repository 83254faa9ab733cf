//! Image normalization
//!
//! Drawing canvases usually produce dark strokes on a light background while
//! digit models expect light strokes on black, so polarity is inferred from
//! mean brightness and corrected before resizing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use digitd_core::{ServeError, ServeResult};
use digitd_runtime::{FEATURE_COUNT, IMAGE_SIDE};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use ndarray::{Array2, Array4};

/// Mean intensity above which an image is treated as light-background
const INVERT_THRESHOLD: f64 = 127.0;

/// Canonical 28x28 single-channel image with values in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pixels: Array2<f32>,
}

impl NormalizedImage {
    fn from_gray(img: &GrayImage) -> Self {
        let pixels = Array2::from_shape_fn((IMAGE_SIDE, IMAGE_SIDE), |(y, x)| {
            img.get_pixel(x as u32, y as u32).0[0] as f32 / 255.0
        });
        Self { pixels }
    }

    /// Pixel grid, row-major
    pub fn pixels(&self) -> &Array2<f32> {
        &self.pixels
    }

    /// Mean value over all pixels
    pub fn mean(&self) -> f32 {
        self.pixels.mean().unwrap_or(0.0)
    }

    /// Single flat feature row, shape (1, 784)
    pub fn to_flat(&self) -> Array2<f32> {
        Array2::from_shape_fn((1, FEATURE_COUNT), |(_, i)| {
            self.pixels[[i / IMAGE_SIDE, i % IMAGE_SIDE]]
        })
    }

    /// NHWC batch of one, shape (1, 28, 28, 1)
    pub fn to_tensor(&self) -> Array4<f32> {
        Array4::from_shape_fn((1, IMAGE_SIDE, IMAGE_SIDE, 1), |(_, y, x, _)| {
            self.pixels[[y, x]]
        })
    }
}

/// Decode a `data:image/...;base64,<data>` payload into a normalized image
pub fn normalize(payload: &str) -> ServeResult<NormalizedImage> {
    let img = decode_data_url(payload)?;
    Ok(normalize_image(&img))
}

/// Normalize an already decoded image
pub fn normalize_image(img: &DynamicImage) -> NormalizedImage {
    let mut gray = img.to_luma8();

    if mean_intensity(&gray) > INVERT_THRESHOLD {
        imageops::invert(&mut gray);
    }

    let resized = imageops::resize(
        &gray,
        IMAGE_SIDE as u32,
        IMAGE_SIDE as u32,
        FilterType::Lanczos3,
    );
    NormalizedImage::from_gray(&resized)
}

fn decode_data_url(payload: &str) -> ServeResult<DynamicImage> {
    if !payload.starts_with("data:") {
        return Err(ServeError::ImageDecode(
            "payload is not a data URL".to_string(),
        ));
    }
    let (_, encoded) = payload
        .split_once(',')
        .ok_or_else(|| ServeError::ImageDecode("data URL has no payload".to_string()))?;

    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(image::load_from_memory(&bytes)?)
}

fn mean_intensity(img: &GrayImage) -> f64 {
    let count = img.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let total: u64 = img.as_raw().iter().map(|&p| p as u64).sum();
    total as f64 / count as f64
}
