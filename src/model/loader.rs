//! Model loading for inference
//!
//! Builds a fresh MobileNetV2, loads a saved record into it and resolves the
//! class names that go with the classifier outputs. The class count is read
//! from the classifier weight in the record, so the weight file is the only
//! required artifact.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::Backend;
use tracing::{info, warn};

use crate::dataset::class_names::{
    class_names_from_dataset, placeholder_class_names, read_class_names_file,
    reconcile_class_names, write_class_names_file,
};
use crate::model::mobilenet::{MobileNetV2, MobileNetV2Config, MobileNetV2Record};
use crate::utils::error::{PlantDiseaseError, Result};

/// Extension used by the compact recorder
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Default weight file name
pub const DEFAULT_WEIGHTS_FILE: &str = "best_mobilenetv2.mpk";

/// Path the recorder actually reads or writes for `path`
///
/// The recorder always applies its own extension, so `best_mobilenetv2.pth`
/// resolves to `best_mobilenetv2.mpk`.
pub fn weights_file(path: &Path) -> PathBuf {
    path.with_extension(WEIGHTS_EXTENSION)
}

/// Where the class names in use came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassNameSource {
    /// A persisted class-name file
    File(PathBuf),
    /// The `train/` split of a dataset directory
    Dataset(PathBuf),
    /// Generated `Class_<i>` names
    Placeholder,
}

impl std::fmt::Display for ClassNameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassNameSource::File(path) => write!(f, "file {}", path.display()),
            ClassNameSource::Dataset(path) => write!(f, "dataset {}", path.display()),
            ClassNameSource::Placeholder => write!(f, "generated placeholders"),
        }
    }
}

/// A model ready for inference together with its output labels
#[derive(Debug)]
pub struct LoadedModel<B: Backend> {
    pub model: MobileNetV2<B>,
    /// Exactly `num_classes` entries
    pub class_names: Vec<String>,
    pub num_classes: usize,
    pub class_name_source: ClassNameSource,
    pub weights_path: PathBuf,
}

/// Read a MobileNetV2 record from disk
pub fn load_record<B: Backend>(path: &Path, device: &B::Device) -> Result<MobileNetV2Record<B>> {
    let path = weights_file(path);
    if !path.is_file() {
        return Err(PlantDiseaseError::Model(format!(
            "Model file not found: {}",
            path.display()
        )));
    }

    let recorder = CompactRecorder::new();
    Recorder::<B>::load(&recorder, path.clone(), device)
        .map_err(|e| {
            PlantDiseaseError::Model(format!("Failed to read weights {}: {:?}", path.display(), e))
        })
}

/// Output width of the classifier stored in a record
pub fn detect_num_classes<B: Backend>(record: &MobileNetV2Record<B>) -> usize {
    record.classifier.weight.val().dims()[1]
}

/// Load a record into a model sized for it, verifying every layer shape
pub fn model_from_record<B: Backend>(
    record: MobileNetV2Record<B>,
    device: &B::Device,
) -> Result<MobileNetV2<B>> {
    let num_classes = detect_num_classes(&record);
    let model = MobileNetV2Config::new(num_classes).init::<B>(device);
    verify_layer_shapes(&model.layer_shapes(), &record.layer_shapes())?;

    Ok(model.load_record(record))
}

/// Load a saved model from disk
pub fn load_model<B: Backend>(path: &Path, device: &B::Device) -> Result<MobileNetV2<B>> {
    let record = load_record::<B>(path, device)?;
    model_from_record(record, device)
}

/// Load ImageNet (or any other) MobileNetV2 weights and swap the classifier
/// for a fresh one with `num_classes` outputs, ready for fine-tuning.
pub fn load_pretrained<B: Backend>(
    path: &Path,
    num_classes: usize,
    device: &B::Device,
) -> Result<MobileNetV2<B>> {
    let model = load_model::<B>(path, device)?;
    info!(
        "Loaded pretrained backbone from {} ({} output classes), replacing classifier with {} outputs",
        weights_file(path).display(),
        model.num_classes(),
        num_classes
    );
    Ok(model.replace_classifier(num_classes, device))
}

/// Save a model with the compact recorder, returning the written path
pub fn save_model<B: Backend>(model: &MobileNetV2<B>, path: &Path) -> Result<PathBuf> {
    let path = weights_file(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    model
        .clone()
        .save_file(path.clone(), &CompactRecorder::new())
        .map_err(|e| PlantDiseaseError::Model(format!("Failed to save model: {:?}", e)))?;

    Ok(path)
}

fn verify_layer_shapes(
    expected: &[(String, Vec<usize>)],
    found: &[(String, Vec<usize>)],
) -> Result<()> {
    if expected.len() != found.len() {
        return Err(PlantDiseaseError::Model(format!(
            "Architecture mismatch: expected {} weight tensors, found {}",
            expected.len(),
            found.len()
        )));
    }

    for ((name, expected_shape), (_, found_shape)) in expected.iter().zip(found) {
        if expected_shape != found_shape {
            return Err(PlantDiseaseError::ShapeMismatch {
                layer: name.clone(),
                expected: expected_shape.clone(),
                found: found_shape.clone(),
            });
        }
    }

    Ok(())
}

/// Pick class names by priority: class-name file, dataset `train/` listing,
/// then placeholders. Names read from a dataset are written back to the
/// class-name file; a failed write is only a warning.
///
/// The result is not yet reconciled with the model's output width.
pub fn resolve_class_names(
    class_names_file: &Path,
    data_dir: Option<&Path>,
    num_classes: usize,
) -> (Vec<String>, ClassNameSource) {
    if class_names_file.exists() {
        match read_class_names_file(class_names_file) {
            Ok(names) => {
                info!(
                    "Loaded {} class names from {}",
                    names.len(),
                    class_names_file.display()
                );
                return (names, ClassNameSource::File(class_names_file.to_path_buf()));
            }
            Err(e) => warn!(
                "Could not load class names from {}: {}",
                class_names_file.display(),
                e
            ),
        }
    }

    if let Some(data_dir) = data_dir {
        match class_names_from_dataset(data_dir) {
            Ok(names) => {
                info!("Loaded {} class names from dataset {}", names.len(), data_dir.display());

                match write_class_names_file(class_names_file, &names) {
                    Ok(()) => info!("Saved class names to {}", class_names_file.display()),
                    Err(e) => warn!("Could not save class names: {}", e),
                }

                return (names, ClassNameSource::Dataset(data_dir.to_path_buf()));
            }
            Err(e) => warn!("Could not load class names from dataset: {}", e),
        }
    }

    warn!("Using fallback class names");
    (
        placeholder_class_names(0, num_classes),
        ClassNameSource::Placeholder,
    )
}

/// Builder that loads weights and class names for serving
#[derive(Debug, Clone)]
pub struct ModelLoader {
    weights_path: PathBuf,
    class_names_file: PathBuf,
    data_dir: Option<PathBuf>,
}

impl ModelLoader {
    pub fn new(weights_path: impl Into<PathBuf>) -> Self {
        Self {
            weights_path: weights_path.into(),
            class_names_file: PathBuf::from(crate::dataset::class_names::CLASS_NAMES_FILE),
            data_dir: None,
        }
    }

    pub fn with_class_names_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.class_names_file = path.into();
        self
    }

    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        self.data_dir = data_dir;
        self
    }

    /// Load everything. Fails if the weights are missing, unreadable or do
    /// not fit the architecture; class-name problems only produce warnings.
    pub fn load<B: Backend>(&self, device: &B::Device) -> Result<LoadedModel<B>> {
        info!("Loading MobileNetV2 model from {}", self.weights_path.display());

        let record = load_record::<B>(&self.weights_path, device)?;
        let num_classes = detect_num_classes(&record);
        info!("Detected {} classes from model", num_classes);

        let model = model_from_record(record, device)?;

        let (class_names, class_name_source) =
            resolve_class_names(&self.class_names_file, self.data_dir.as_deref(), num_classes);
        let class_names = reconcile_class_names(class_names, num_classes);

        info!("Model loaded successfully ({} classes)", num_classes);

        Ok(LoadedModel {
            model,
            class_names,
            num_classes,
            class_name_source,
            weights_path: weights_file(&self.weights_path),
        })
    }
}
