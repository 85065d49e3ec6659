//! Real/fake frame classification via ONNX Runtime
//!
//! This crate wraps a binary deepfake image classifier (a ViT fine-tuned on
//! real vs. synthetic faces, exported to ONNX) behind the [`ImageClassifier`]
//! capability trait, and provides [`FrameClassifierAdapter`] which turns the
//! capability's raw `{label, score}` output into a normalized
//! [`ClassificationResult`](deepfake_common::ClassificationResult).
//!
//! # Example
//! ```no_run
//! use deepfake_frame_classifier::{ClassifierConfig, FrameClassifierAdapter, OnnxDeepfakeClassifier};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let classifier = OnnxDeepfakeClassifier::new(
//!     "models/deepfake-detection/model.onnx",
//!     ClassifierConfig::default(),
//! )?;
//! let adapter = FrameClassifierAdapter::new(Arc::new(classifier));
//!
//! let img = image::open("frame.jpg")?.to_rgb8();
//! let result = adapter.classify_frame(0, &img)?;
//! println!("real={:.2} fake={:.2}", result.real_score, result.fake_score);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod onnx;

pub use adapter::{normalize_scores, FrameClassifierAdapter, FAKE_LABEL, REAL_LABEL};
pub use onnx::OnnxError;

use deepfake_common::LabelScore;
use image::RgbImage;
use ndarray::Array4;
use ort::{session::Session, value::TensorRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Image classification capability
///
/// Given one RGB image, returns an unordered set of `{label, score}` pairs.
/// Implementations must tolerate concurrent calls.
pub trait ImageClassifier: Send + Sync {
    /// Classify a single image
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, ClassifierError>;
}

/// Configuration for the ONNX deepfake classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Square input size expected by the model
    pub input_size: u32,
    /// Per-channel normalization mean (RGB)
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub std: [f32; 3],
    /// Class labels indexed by model output position
    pub labels: Vec<String>,
    /// Apply softmax to raw logits
    pub apply_softmax: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            // ViTImageProcessor defaults
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
            labels: vec![FAKE_LABEL.to_string(), REAL_LABEL.to_string()],
            apply_softmax: true,
        }
    }
}

impl ClassifierConfig {
    /// Replace the label list with the `id2label` table of a HuggingFace `config.json`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or its
    /// `id2label` keys are not a dense `0..n` range.
    pub fn with_labels_from_file(mut self, path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ClassifierError::InvalidConfig(format!(
                "Failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        self.labels = parse_id2label(&contents)?;
        Ok(self)
    }
}

#[derive(Deserialize)]
struct HfModelConfig {
    id2label: HashMap<String, String>,
}

/// Parse the `id2label` table of a HuggingFace model config into an ordered label list
fn parse_id2label(json: &str) -> Result<Vec<String>, ClassifierError> {
    let config: HfModelConfig = serde_json::from_str(json)
        .map_err(|e| ClassifierError::InvalidConfig(format!("Invalid model config: {e}")))?;

    let mut entries = config
        .id2label
        .into_iter()
        .map(|(id, label)| {
            id.parse::<usize>()
                .map(|id| (id, label))
                .map_err(|_| ClassifierError::InvalidConfig(format!("Non-numeric label id: {id}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|(id, _)| *id);

    if entries.iter().enumerate().any(|(pos, (id, _))| pos != *id) {
        return Err(ClassifierError::InvalidConfig(
            "id2label ids must be contiguous from 0".to_string(),
        ));
    }

    Ok(entries.into_iter().map(|(_, label)| label).collect())
}

/// Errors that can occur during classification
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("ONNX Runtime error: {0}")]
    OrtError(#[from] ort::Error),

    #[error("Model loading failed: {0}")]
    ModelLoad(#[from] OnnxError),

    #[error("Invalid model output shape: expected [1, {expected}], got {shape:?}")]
    InvalidOutputShape { expected: usize, shape: Vec<i64> },

    #[error("Model output not found")]
    MissingOutput,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Deepfake classifier backed by an ONNX Runtime session
///
/// The session is loaded once and shared by every caller; inference is
/// serialized through a mutex because `Session::run` needs exclusive access.
pub struct OnnxDeepfakeClassifier {
    session: Mutex<Session>,
    config: ClassifierConfig,
}

impl OnnxDeepfakeClassifier {
    /// Load the classifier model
    ///
    /// # Errors
    /// Returns error if the label list is empty or model loading fails
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        config: ClassifierConfig,
    ) -> Result<Self, ClassifierError> {
        if config.labels.is_empty() {
            return Err(ClassifierError::InvalidConfig(
                "at least one label is required".to_string(),
            ));
        }

        let model_path = model_path.as_ref();
        info!("Loading deepfake detection model from {}", model_path.display());

        let session = onnx::create_optimized_session(model_path)?;

        info!(
            "Deepfake model loaded (input size: {}, labels: {:?})",
            config.input_size, config.labels
        );

        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    /// Release the model session
    pub fn shutdown(self) {
        info!("Releasing deepfake detection model");
        drop(self.session);
    }
}

impl ImageClassifier for OnnxDeepfakeClassifier {
    fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, ClassifierError> {
        let input = preprocess_image(image, &self.config);
        let input_tensor = TensorRef::from_array_view(input.view())?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ClassifierError::Inference(format!("Failed to lock session mutex: {e}")))?;
        let outputs = session.run(ort::inputs![input_tensor])?;

        // Extract output tensor (try common output names)
        let output_tensor = outputs
            .get("logits")
            .or_else(|| outputs.get("output"))
            .or_else(|| outputs.get("output0"))
            .or_else(|| outputs.get("predictions"))
            .ok_or(ClassifierError::MissingOutput)?;

        let (shape, data) = output_tensor.try_extract_tensor::<f32>()?;

        let num_labels = self.config.labels.len();
        if shape.len() != 2 || shape[1] != num_labels as i64 {
            return Err(ClassifierError::InvalidOutputShape {
                expected: num_labels,
                shape: shape.to_vec(),
            });
        }

        let probabilities = if self.config.apply_softmax {
            softmax(&data[..num_labels])
        } else {
            data[..num_labels].to_vec()
        };

        debug!("Classifier probabilities: {:?}", probabilities);

        Ok(self
            .config
            .labels
            .iter()
            .zip(probabilities)
            .map(|(label, score)| LabelScore::new(label.clone(), score))
            .collect())
    }
}

/// Resize to the model input size and convert to normalized NCHW
fn preprocess_image(image: &RgbImage, config: &ClassifierConfig) -> Array4<f32> {
    let size = config.input_size;
    let (width, height) = image.dimensions();

    let resized = if width != size || height != size {
        image::imageops::resize(image, size, size, image::imageops::FilterType::Triangle)
    } else {
        image.clone()
    };

    let mut array = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / 255.0;
            array[[0, channel, y as usize, x as usize]] =
                (value - config.mean[channel]) / config.std[channel];
        }
    }
    array
}

/// Numerically stable softmax
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_config_default() {
        let config = ClassifierConfig::default();
        assert_eq!(config.input_size, 224);
        assert_eq!(config.labels, vec!["Fake", "Real"]);
        assert!(config.apply_softmax);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[2.0, -1.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[0] > probs[1]);

        let probs = softmax(&[0.0, 0.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_large_logits_are_stable() {
        let probs = softmax(&[1000.0, 999.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_parse_id2label_orders_by_id() {
        let json = r#"{"architectures": ["ViTForImageClassification"],
                       "id2label": {"1": "Real", "0": "Fake"}}"#;
        assert_eq!(parse_id2label(json).unwrap(), vec!["Fake", "Real"]);
    }

    #[test]
    fn test_parse_id2label_rejects_gaps() {
        let json = r#"{"id2label": {"0": "Fake", "2": "Real"}}"#;
        assert!(matches!(
            parse_id2label(json),
            Err(ClassifierError::InvalidConfig(_))
        ));

        let json = r#"{"id2label": {"zero": "Fake"}}"#;
        assert!(parse_id2label(json).is_err());
    }

    #[test]
    fn test_labels_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"id2label": {"0": "Real", "1": "Fake"}}"#).unwrap();

        let config = ClassifierConfig::default()
            .with_labels_from_file(&path)
            .unwrap();
        assert_eq!(config.labels, vec!["Real", "Fake"]);
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let config = ClassifierConfig {
            input_size: 4,
            ..ClassifierConfig::default()
        };
        let image = RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 127]));

        let array = preprocess_image(&image, &config);
        assert_eq!(array.shape(), &[1, 3, 4, 4]);
        assert!((array[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((array[[0, 1, 3, 3]] + 1.0).abs() < 1e-6);
        assert!(array[[0, 2, 2, 1]].abs() < 0.01);
    }

    #[test]
    fn test_preprocess_resizes_input() {
        let config = ClassifierConfig {
            input_size: 8,
            ..ClassifierConfig::default()
        };
        let image = RgbImage::new(32, 16);
        assert_eq!(preprocess_image(&image, &config).shape(), &[1, 3, 8, 8]);
    }

    #[test]
    fn test_missing_model_is_reported() {
        let result =
            OnnxDeepfakeClassifier::new("nonexistent/model.onnx", ClassifierConfig::default());
        assert!(matches!(
            result,
            Err(ClassifierError::ModelLoad(OnnxError::ModelNotFound(_)))
        ));
    }

    #[test]
    fn test_empty_labels_rejected() {
        let config = ClassifierConfig {
            labels: vec![],
            ..ClassifierConfig::default()
        };
        let result = OnnxDeepfakeClassifier::new("nonexistent/model.onnx", config);
        assert!(matches!(result, Err(ClassifierError::InvalidConfig(_))));
    }
}
