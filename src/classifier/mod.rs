//! Classifier module - turn uploaded images into waste-category predictions
//!
//! Provides trait-based abstraction over the inference backend with an ONNX
//! implementation. `ModelService` owns the loaded classifier for the whole
//! process and loads it lazily when startup loading failed.

mod onnx;
mod preprocess;

pub use onnx::OnnxClassifier;
pub use preprocess::{prepare_batch, InputLayout};

use ndarray::Array4;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Classification failures
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Artifact missing or failed to load
    #[error("Model not loaded: {0}")]
    ModelUnavailable(String),

    /// Upload is not a decodable image
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The model invocation failed or produced unusable output
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Trait for inference backends
///
/// Requires Send so the loaded model can live behind the service lock and be
/// used from any connection thread.
pub trait Classifier: Send {
    /// Run one batch and return the per-class scores of its single item
    fn predict(&mut self, batch: Array4<f32>) -> Result<Vec<f32>, ClassifyError>;
}

/// Loads a classifier; called at startup and again lazily while unloaded
pub type Loader = Box<dyn Fn() -> anyhow::Result<Box<dyn Classifier>> + Send + Sync>;

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
}

impl PredictionResult {
    /// Map a raw score vector onto the label set.
    ///
    /// The first maximum wins on ties. Scores are reported as produced by the
    /// model, without renormalization.
    pub fn from_scores(labels: &[String], scores: &[f32]) -> Result<Self, ClassifyError> {
        if scores.len() != labels.len() {
            return Err(ClassifyError::Inference(format!(
                "model produced {} scores for {} labels",
                scores.len(),
                labels.len()
            )));
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(ClassifyError::Inference(format!(
                "model produced non-finite score {}",
                bad
            )));
        }

        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }

        let probabilities = labels
            .iter()
            .zip(scores)
            .map(|(label, &score)| (label.clone(), f64::from(score)))
            .collect::<BTreeMap<_, _>>();
        if probabilities.len() != labels.len() {
            return Err(ClassifyError::Inference(
                "label set contains duplicates".to_string(),
            ));
        }

        Ok(Self {
            label: labels[best].clone(),
            confidence: f64::from(scores[best]),
            probabilities,
        })
    }
}

/// Loaded/unloaded state of the process-wide model
enum ModelState {
    Unloaded,
    Loaded(Box<dyn Classifier>),
}

/// Owns the classifier lifecycle and exposes `classify`
pub struct ModelService {
    labels: Vec<String>,
    image_size: u32,
    layout: InputLayout,
    loader: Loader,
    state: Mutex<ModelState>,
}

impl ModelService {
    /// Create an unloaded service; nothing is read until `load` or `classify`
    pub fn new(labels: Vec<String>, image_size: u32, layout: InputLayout, loader: Loader) -> Self {
        Self {
            labels,
            image_size,
            layout,
            loader,
            state: Mutex::new(ModelState::Unloaded),
        }
    }

    /// Service backed by an ONNX artifact on disk
    pub fn onnx(
        model_path: PathBuf,
        labels: Vec<String>,
        image_size: u32,
        layout: InputLayout,
    ) -> Self {
        let loader: Loader = Box::new(move || -> anyhow::Result<Box<dyn Classifier>> {
            let classifier = OnnxClassifier::open(&model_path)?;
            Ok(Box::new(classifier))
        });
        Self::new(labels, image_size, layout, loader)
    }

    /// Try to load the artifact.
    ///
    /// Failures are logged, never returned: the service stays unloaded and the
    /// next `classify` retries. Returns whether a model is loaded afterwards.
    pub fn load(&self) -> bool {
        let mut state = self.state.lock();
        Self::load_locked(&self.loader, &mut state)
    }

    fn load_locked(loader: &Loader, state: &mut ModelState) -> bool {
        if matches!(state, ModelState::Loaded(_)) {
            return true;
        }
        match loader() {
            Ok(classifier) => {
                *state = ModelState::Loaded(classifier);
                tracing::info!("Model loaded successfully");
                true
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "Error loading model");
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), ModelState::Loaded(_))
    }

    /// Class names in model output order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Classify one encoded image
    pub fn classify(&self, image_bytes: &[u8]) -> Result<PredictionResult, ClassifyError> {
        if !self.load() {
            return Err(ClassifyError::ModelUnavailable(
                "artifact missing or failed to load".to_string(),
            ));
        }

        // Decoding and resizing do not need the model, keep them outside the lock
        let batch = prepare_batch(image_bytes, self.image_size, self.layout)?;

        let scores = {
            let mut state = self.state.lock();
            match &mut *state {
                ModelState::Loaded(classifier) => classifier.predict(batch)?,
                ModelState::Unloaded => {
                    return Err(ClassifyError::ModelUnavailable(
                        "model was unloaded".to_string(),
                    ))
                }
            }
        };

        PredictionResult::from_scores(&self.labels, &scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedScores(Vec<f32>);

    impl Classifier for FixedScores {
        fn predict(&mut self, batch: Array4<f32>) -> Result<Vec<f32>, ClassifyError> {
            assert_eq!(batch.shape(), &[1, 224, 224, 3]);
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl Classifier for Failing {
        fn predict(&mut self, _batch: Array4<f32>) -> Result<Vec<f32>, ClassifyError> {
            Err(ClassifyError::Inference("runtime exploded".to_string()))
        }
    }

    fn labels() -> Vec<String> {
        vec!["anorganik".into(), "campuran".into(), "organik".into()]
    }

    fn png() -> Vec<u8> {
        let img = RgbImage::from_pixel(10, 10, Rgb([120, 200, 30]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn service_with(scores: Vec<f32>) -> ModelService {
        ModelService::new(
            labels(),
            224,
            InputLayout::Nhwc,
            Box::new(move || -> anyhow::Result<Box<dyn Classifier>> {
                Ok(Box::new(FixedScores(scores.clone())))
            }),
        )
    }

    #[test]
    fn test_from_scores_picks_argmax() {
        let result = PredictionResult::from_scores(&labels(), &[0.1, 0.2, 0.7]).unwrap();
        assert_eq!(result.label, "organik");
        assert_eq!(result.confidence, f64::from(0.7f32));
        assert_eq!(result.probabilities.len(), 3);
        assert_eq!(result.probabilities["organik"], result.confidence);
    }

    #[test]
    fn test_from_scores_first_max_wins() {
        let result = PredictionResult::from_scores(&labels(), &[0.4, 0.4, 0.2]).unwrap();
        assert_eq!(result.label, "anorganik");
    }

    #[test]
    fn test_from_scores_does_not_renormalize() {
        let result = PredictionResult::from_scores(&labels(), &[2.0, 5.0, 1.0]).unwrap();
        assert_eq!(result.label, "campuran");
        assert_eq!(result.confidence, 5.0);
    }

    #[test]
    fn test_from_scores_length_mismatch() {
        let result = PredictionResult::from_scores(&labels(), &[0.5, 0.5]);
        assert!(matches!(result, Err(ClassifyError::Inference(_))));
    }

    #[test]
    fn test_from_scores_rejects_duplicate_labels() {
        let labels = vec!["organik".to_string(), "campuran".to_string(), "organik".to_string()];
        let result = PredictionResult::from_scores(&labels, &[0.7, 0.2, 0.1]);
        assert!(matches!(result, Err(ClassifyError::Inference(_))));
    }

    #[test]
    fn test_from_scores_rejects_nan() {
        let result = PredictionResult::from_scores(&labels(), &[0.1, f32::NAN, 0.3]);
        assert!(matches!(result, Err(ClassifyError::Inference(_))));
    }

    #[test]
    fn test_serializes_label_as_class() {
        let result = PredictionResult::from_scores(&labels(), &[0.9, 0.05, 0.05]).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["class"], "anorganik");
        assert!(json.get("label").is_none());
        assert!(json["probabilities"]["organik"].is_number());
    }

    #[test]
    fn test_classify_loaded_model() {
        let service = service_with(vec![0.05, 0.15, 0.8]);
        assert!(service.load());

        let result = service.classify(&png()).unwrap();
        assert_eq!(result.label, "organik");
        assert_eq!(result.confidence, result.probabilities["organik"]);
    }

    #[test]
    fn test_classify_loads_lazily() {
        let service = service_with(vec![0.6, 0.3, 0.1]);
        assert!(!service.is_loaded());

        let result = service.classify(&png()).unwrap();
        assert_eq!(result.label, "anorganik");
        assert!(service.is_loaded());
    }

    #[test]
    fn test_unloadable_model_is_unavailable() {
        let service = ModelService::new(
            labels(),
            224,
            InputLayout::Nhwc,
            Box::new(|| -> anyhow::Result<Box<dyn Classifier>> {
                anyhow::bail!("artifact not found")
            }),
        );

        assert!(!service.load());
        let result = service.classify(&png());
        assert!(matches!(result, Err(ClassifyError::ModelUnavailable(_))));
    }

    #[test]
    fn test_failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let service = ModelService::new(
            labels(),
            224,
            InputLayout::Nhwc,
            Box::new(move || -> anyhow::Result<Box<dyn Classifier>> {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("not there yet");
                }
                Ok(Box::new(FixedScores(vec![0.2, 0.7, 0.1])))
            }),
        );

        assert!(!service.load());
        let result = service.classify(&png()).unwrap();
        assert_eq!(result.label, "campuran");

        // Loaded now; further calls do not hit the loader
        service.classify(&png()).unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_decode_error_is_distinct() {
        let service = service_with(vec![0.3, 0.3, 0.4]);
        let result = service.classify(b"GIF89a but not really");
        assert!(matches!(result, Err(ClassifyError::Decode(_))));
    }

    #[test]
    fn test_inference_error_is_distinct() {
        let service = ModelService::new(
            labels(),
            224,
            InputLayout::Nhwc,
            Box::new(|| -> anyhow::Result<Box<dyn Classifier>> { Ok(Box::new(Failing)) }),
        );
        let result = service.classify(&png());
        assert!(matches!(result, Err(ClassifyError::Inference(_))));
    }
}
