//! Inference Predictor Module
//!
//! Runs a single image through a loaded MobileNetV2 and turns the softmax
//! output into a labelled prediction.

use std::path::Path;
use std::time::{Duration, Instant};

use burn::prelude::*;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::inference::preprocess::{
    decode_image, open_image, preprocess_image, to_batch_tensor, DEFAULT_IMAGE_SIZE,
};
use crate::model::loader::LoadedModel;
use crate::model::mobilenet::MobileNetV2;
use crate::utils::error::{PlantDiseaseError, Result};

/// Probability assigned to one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbability {
    pub class_index: usize,
    pub class_name: String,
    pub probability: f32,
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Arg-max class index
    pub class_index: usize,

    /// Arg-max class name
    pub class_name: String,

    /// Probability of the arg-max class
    pub confidence: f32,

    /// Full distribution in class-index order
    pub probabilities: Vec<ClassProbability>,

    pub inference_time_ms: f64,
}

impl Prediction {
    /// Build a prediction from a probability vector.
    ///
    /// Ties resolve to the lowest index. `class_names` must have one entry per
    /// probability.
    pub fn from_probabilities(
        probabilities: &[f32],
        class_names: &[String],
        inference_time: Duration,
    ) -> Result<Self> {
        if probabilities.is_empty() {
            return Err(PlantDiseaseError::Inference(
                "Model produced no class probabilities".to_string(),
            ));
        }
        if probabilities.len() != class_names.len() {
            return Err(PlantDiseaseError::Inference(format!(
                "Model produced {} probabilities for {} class names",
                probabilities.len(),
                class_names.len()
            )));
        }

        let mut class_index = 0;
        for (i, &p) in probabilities.iter().enumerate() {
            if p > probabilities[class_index] {
                class_index = i;
            }
        }

        let probabilities: Vec<ClassProbability> = probabilities
            .iter()
            .zip(class_names)
            .enumerate()
            .map(|(i, (&probability, name))| ClassProbability {
                class_index: i,
                class_name: name.clone(),
                probability,
            })
            .collect();

        Ok(Self {
            class_index,
            class_name: class_names[class_index].clone(),
            confidence: probabilities[class_index].probability,
            probabilities,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        })
    }

    /// The `k` most probable classes, highest first
    pub fn top_k(&self, k: usize) -> Vec<ClassProbability> {
        let mut sorted = self.probabilities.clone();
        sorted.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted.truncate(k);
        sorted
    }
}

/// Model plus labels, ready to classify single images
#[derive(Debug, Clone)]
pub struct Predictor<B: Backend> {
    model: MobileNetV2<B>,
    class_names: Vec<String>,
    image_size: usize,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: MobileNetV2<B>, class_names: Vec<String>, device: B::Device) -> Self {
        Self {
            model,
            class_names,
            image_size: DEFAULT_IMAGE_SIZE,
            device,
        }
    }

    pub fn from_loaded(loaded: LoadedModel<B>, device: B::Device) -> Self {
        Self::new(loaded.model, loaded.class_names, device)
    }

    /// Configure the square input resolution
    pub fn with_image_size(mut self, size: usize) -> Self {
        self.image_size = size;
        self
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.model.num_classes()
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Softmax probabilities for a `[1, 3, H, W]` batch
    pub fn probabilities(&self, input: Tensor<B, 4>) -> Result<Vec<f32>> {
        self.model
            .forward_softmax(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PlantDiseaseError::Inference(format!("{:?}", e)))
    }

    /// Classify a decoded image
    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction> {
        let start = Instant::now();

        let data = preprocess_image(image, self.image_size);
        let input = to_batch_tensor::<B>(data, self.image_size, &self.device)?;
        let probabilities = self.probabilities(input)?;

        Prediction::from_probabilities(&probabilities, &self.class_names, start.elapsed())
    }

    /// Classify encoded image bytes
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let image = decode_image(bytes)?;
        self.predict_image(&image)
    }

    /// Classify an image file
    pub fn predict_file(&self, path: &Path) -> Result<Prediction> {
        let image = open_image(path)?;
        self.predict_image(&image)
    }
}
