//! Deterministic image preprocessing
//!
//! The exact transform applied to every image at serving time and to
//! validation/test images during training: RGB conversion, square resize,
//! scaling to [0, 1] and ImageNet normalization, laid out as CHW.

use std::path::Path;

use burn::prelude::*;
use image::{imageops::FilterType, DynamicImage};

use crate::utils::error::{PlantDiseaseError, Result};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Input resolution of the network
pub const DEFAULT_IMAGE_SIZE: usize = 224;

/// Decode encoded image bytes (JPEG, PNG, ...) into pixels
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| PlantDiseaseError::ImageDecode(e.to_string()))
}

/// Open an image file
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| PlantDiseaseError::ImageLoadError(path.to_path_buf(), e.to_string()))
}

/// Convert to RGB (dropping alpha, expanding grayscale) and resize to `size` x `size`
pub fn to_rgb_resized(image: &DynamicImage, size: usize) -> DynamicImage {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    rgb.resize_exact(size as u32, size as u32, FilterType::Triangle)
}

/// Scale an RGB image to [0, 1] in CHW layout, without normalization
pub fn to_unit_chw(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let num_pixels = (width * height) as usize;

    let mut data = vec![0.0f32; 3 * num_pixels];
    for (i, pixel) in rgb.pixels().enumerate() {
        data[i] = pixel[0] as f32 / 255.0;
        data[num_pixels + i] = pixel[1] as f32 / 255.0;
        data[2 * num_pixels + i] = pixel[2] as f32 / 255.0;
    }

    data
}

/// Apply ImageNet normalization in place to CHW data
pub fn normalize_chw(data: &mut [f32]) {
    let plane = data.len() / 3;
    for (channel, values) in data.chunks_mut(plane.max(1)).take(3).enumerate() {
        for value in values {
            *value = (*value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
        }
    }
}

/// Full deterministic preprocessing of a decoded image to normalized CHW values
pub fn preprocess_image(image: &DynamicImage, size: usize) -> Vec<f32> {
    let resized = to_rgb_resized(image, size);
    let mut data = to_unit_chw(&resized);
    normalize_chw(&mut data);
    data
}

/// Decode and preprocess encoded image bytes
pub fn preprocess_bytes(bytes: &[u8], size: usize) -> Result<Vec<f32>> {
    let image = decode_image(bytes)?;
    Ok(preprocess_image(&image, size))
}

/// Wrap preprocessed CHW values as a `[1, 3, size, size]` tensor
pub fn to_batch_tensor<B: Backend>(data: Vec<f32>, size: usize, device: &B::Device) -> Result<Tensor<B, 4>> {
    let expected = 3 * size * size;
    if data.len() != expected {
        return Err(PlantDiseaseError::InvalidInput(format!(
            "Expected {} values for a {}x{} RGB image, got {}",
            expected,
            size,
            size,
            data.len()
        )));
    }

    Ok(Tensor::<B, 4>::from_floats(
        TensorData::new(data, [1, 3, size, size]),
        device,
    ))
}
