//! Data Augmentation Module for Plant Disease Classification
//!
//! Random training-time transforms: random resized crop, horizontal flip,
//! rotation and color jitter (brightness, contrast, saturation, hue). The
//! output of [`Augmenter::augment`] is always `image_size` x `image_size`.
//!
//! Validation and test images never pass through here; they use the fixed
//! resize in `inference::preprocess`.

use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Range of the crop area as a fraction of the source area
    pub crop_scale: (f32, f32),
    /// Range of the crop aspect ratio (width / height)
    pub crop_ratio: (f32, f32),
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Brightness factor drawn from [1 - b, 1 + b]
    pub brightness: f32,
    /// Contrast factor drawn from [1 - c, 1 + c]
    pub contrast: f32,
    /// Saturation factor drawn from [1 - s, 1 + s]
    pub saturation: f32,
    /// Hue shift drawn from [-h, h], as a fraction of the color wheel (max 0.5)
    pub hue: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            crop_scale: (0.08, 1.0),
            crop_ratio: (3.0 / 4.0, 4.0 / 3.0),
            horizontal_flip_prob: 0.5,
            rotation_degrees: 25.0,
            brightness: 0.3,
            contrast: 0.3,
            saturation: 0.3,
            hue: 0.2,
        }
    }
}

impl AugmentationConfig {
    /// Full-image crop and no random transforms: only the resize remains
    pub fn none() -> Self {
        Self {
            crop_scale: (1.0, 1.0),
            crop_ratio: (1.0, 1.0),
            horizontal_flip_prob: 0.0,
            rotation_degrees: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            hue: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum ColorOp {
    Brightness,
    Contrast,
    Saturation,
    Hue,
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    image_size: u32,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig, image_size: u32) -> Self {
        Self { config, image_size }
    }

    /// Apply the full random pipeline: crop+resize, flip, rotate, color jitter
    pub fn augment(&self, img: &DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let mut result = self.random_resized_crop(img, rng);

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = result.fliph();
        }

        if self.config.rotation_degrees > 0.0 {
            let angle =
                rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees);
            result = self.rotate(&result, angle);
        }

        self.color_jitter(result, rng)
    }

    /// Crop a random region (area and aspect ratio drawn from the config) and
    /// resize it to the output size. Falls back to a center crop when no
    /// valid region is found in 10 attempts.
    pub fn random_resized_crop(&self, img: &DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let (width, height) = img.dimensions();
        let area = (width * height) as f32;
        let (min_scale, max_scale) = self.config.crop_scale;
        let (min_ratio, max_ratio) = self.config.crop_ratio;
        let (log_min, log_max) = (min_ratio.ln(), max_ratio.ln());

        for _ in 0..10 {
            let target_area = area * rng.gen_range(min_scale..=max_scale);
            let aspect = rng.gen_range(log_min..=log_max).exp();

            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;

            if w > 0 && h > 0 && w <= width && h <= height {
                let x = rng.gen_range(0..=width - w);
                let y = rng.gen_range(0..=height - h);
                return self.resize(&img.crop_imm(x, y, w, h));
            }
        }

        // Center crop clamped to the allowed aspect range
        let in_ratio = width as f32 / height as f32;
        let (w, h) = if in_ratio < min_ratio {
            (width, ((width as f32 / min_ratio).round() as u32).max(1))
        } else if in_ratio > max_ratio {
            (((height as f32 * max_ratio).round() as u32).max(1), height)
        } else {
            (width, height)
        };
        let x = (width - w.min(width)) / 2;
        let y = (height - h.min(height)) / 2;
        self.resize(&img.crop_imm(x, y, w.min(width), h.min(height)))
    }

    /// Resize to the output size (bilinear)
    pub fn resize(&self, img: &DynamicImage) -> DynamicImage {
        img.resize_exact(self.image_size, self.image_size, FilterType::Triangle)
    }

    /// Rotate image by the given angle in degrees around its center,
    /// keeping the size and filling uncovered corners with black
    fn rotate(&self, img: &DynamicImage, angle_degrees: f32) -> DynamicImage {
        if angle_degrees.abs() < 0.1 {
            return img.clone();
        }

        let rotated = rotate_about_center(
            &img.to_rgb8(),
            angle_degrees.to_radians(),
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
        );
        DynamicImage::ImageRgb8(rotated)
    }

    /// Brightness, contrast, saturation and hue jitter, applied in random order
    fn color_jitter(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let mut ops = [
            ColorOp::Brightness,
            ColorOp::Contrast,
            ColorOp::Saturation,
            ColorOp::Hue,
        ];
        ops.shuffle(rng);

        let mut rgb = img.to_rgb8();
        for op in ops {
            match op {
                ColorOp::Brightness if self.config.brightness > 0.0 => {
                    let factor = jitter_factor(self.config.brightness, rng);
                    adjust_brightness(&mut rgb, factor);
                }
                ColorOp::Contrast if self.config.contrast > 0.0 => {
                    let factor = jitter_factor(self.config.contrast, rng);
                    adjust_contrast(&mut rgb, factor);
                }
                ColorOp::Saturation if self.config.saturation > 0.0 => {
                    let factor = jitter_factor(self.config.saturation, rng);
                    adjust_saturation(&mut rgb, factor);
                }
                ColorOp::Hue if self.config.hue > 0.0 => {
                    let hue = self.config.hue.min(0.5);
                    let shift = rng.gen_range(-hue..=hue);
                    adjust_hue(&mut rgb, shift);
                }
                _ => {}
            }
        }

        DynamicImage::ImageRgb8(rgb)
    }
}

fn jitter_factor(amount: f32, rng: &mut ChaCha8Rng) -> f32 {
    rng.gen_range((1.0 - amount).max(0.0)..=1.0 + amount)
}

fn grayscale(pixel: &Rgb<u8>) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

/// Scale all channels by `factor`
fn adjust_brightness(img: &mut RgbImage, factor: f32) {
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            pixel[c] = (pixel[c] as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Blend with the mean gray level of the image
fn adjust_contrast(img: &mut RgbImage, factor: f32) {
    let count = (img.width() * img.height()).max(1) as f32;
    let mean = img.pixels().map(grayscale).sum::<f32>() / count;

    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let v = mean + factor * (pixel[c] as f32 - mean);
            pixel[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Blend each pixel with its own gray level
fn adjust_saturation(img: &mut RgbImage, factor: f32) {
    for pixel in img.pixels_mut() {
        let gray = grayscale(pixel);
        for c in 0..3 {
            let v = gray + factor * (pixel[c] as f32 - gray);
            pixel[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Rotate hue by `shift` turns of the color wheel
fn adjust_hue(img: &mut RgbImage, shift: f32) {
    for pixel in img.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        let h = (h + shift).rem_euclid(1.0);
        let [r, g, b] = hsv_to_rgb(h, s, v);
        *pixel = Rgb([r, g, b]);
    }
}

/// RGB to HSV, all components in [0, 1]
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };

    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match (sector as i32).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    [
        (r * 255.0).round().clamp(0.0, 255.0) as u8,
        (g * 255.0).round().clamp(0.0, 255.0) as u8,
        (b * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;
    use rand::SeedableRng;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        let mut img = ImageBuffer::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 3) as u8, (y * 3) as u8, 128]);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_augment_output_size() {
        let aug = Augmenter::new(AugmentationConfig::default(), 32);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for (w, h) in [(64, 64), (80, 40), (20, 70)] {
            let result = aug.augment(&create_test_image(w, h), &mut rng);
            assert_eq!(result.dimensions(), (32, 32));
        }
    }

    #[test]
    fn test_augment_is_reproducible_with_seed() {
        let aug = Augmenter::new(AugmentationConfig::default(), 24);
        let img = create_test_image(50, 50);

        let a = aug.augment(&img, &mut ChaCha8Rng::seed_from_u64(7));
        let b = aug.augment(&img, &mut ChaCha8Rng::seed_from_u64(7));

        assert_eq!(a.to_rgb8().into_raw(), b.to_rgb8().into_raw());
    }

    #[test]
    fn test_no_augmentation_is_plain_resize() {
        let aug = Augmenter::new(AugmentationConfig::none(), 16);
        let img = create_test_image(40, 40);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let augmented = aug.augment(&img, &mut rng);
        let resized = aug.resize(&img);

        assert_eq!(augmented.to_rgb8().into_raw(), resized.to_rgb8().into_raw());
    }

    #[test]
    fn test_brightness_scales_channels() {
        let mut img = ImageBuffer::from_pixel(2, 2, Rgb([100u8, 50, 200]));
        adjust_brightness(&mut img, 1.2);
        assert_eq!(img.get_pixel(0, 0), &Rgb([120, 60, 240]));

        adjust_brightness(&mut img, 2.0);
        assert_eq!(img.get_pixel(0, 0)[2], 255);
    }

    #[test]
    fn test_zero_saturation_is_gray() {
        let mut img = ImageBuffer::from_pixel(1, 1, Rgb([200u8, 40, 90]));
        adjust_saturation(&mut img, 0.0);
        let p = img.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn test_hsv_round_trip_primaries() {
        for rgb in [[255u8, 0, 0], [0, 255, 0], [0, 0, 255], [128, 128, 128]] {
            let (h, s, v) = rgb_to_hsv(rgb[0], rgb[1], rgb[2]);
            assert_eq!(hsv_to_rgb(h, s, v), rgb);
        }
    }

    #[test]
    fn test_hue_shift_rotates_red_to_green() {
        let mut img = ImageBuffer::from_pixel(1, 1, Rgb([255u8, 0, 0]));
        adjust_hue(&mut img, 1.0 / 3.0);
        assert_eq!(img.get_pixel(0, 0), &Rgb([0, 255, 0]));
    }

    #[test]
    fn test_rotation_keeps_size() {
        let aug = Augmenter::new(AugmentationConfig::default(), 32);
        let img = create_test_image(30, 20);
        let rotated = aug.rotate(&img, 25.0);
        assert_eq!(rotated.dimensions(), (30, 20));
    }

    #[test]
    fn test_rotation_fills_corners_black() {
        let aug = Augmenter::new(AugmentationConfig::default(), 20);
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(20, 20, Rgb([255u8, 255, 255])));

        let rotated = aug.rotate(&img, 45.0).to_rgb8();
        assert_eq!(rotated.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rotated.get_pixel(19, 19), &Rgb([0, 0, 0]));
        assert_eq!(rotated.get_pixel(10, 10), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_tiny_rotation_is_identity() {
        let aug = Augmenter::new(AugmentationConfig::default(), 16);
        let img = create_test_image(16, 16);
        let rotated = aug.rotate(&img, 0.05);
        assert_eq!(rotated.to_rgb8().into_raw(), img.to_rgb8().into_raw());
    }
}
