//! Normalization of raw classifier output into real/fake scores

use crate::ImageClassifier;
use deepfake_common::{ClassificationResult, LabelScore, ProcessingError, Result};
use image::RgbImage;
use std::sync::Arc;
use tracing::debug;

/// Label the classifier emits for authentic frames
pub const REAL_LABEL: &str = "Real";
/// Label the classifier emits for manipulated frames
pub const FAKE_LABEL: &str = "Fake";

/// Pick the `Real` and `Fake` scores out of a label set
///
/// Labels are matched exactly (case-sensitive). A missing label scores 0.0;
/// unrecognized labels are ignored. If a label appears more than once the
/// first occurrence wins.
#[must_use]
pub fn normalize_scores(scores: &[LabelScore]) -> ClassificationResult {
    let find = |label: &str| {
        scores
            .iter()
            .find(|s| s.label == label)
            .map_or(0.0, |s| s.score)
    };
    ClassificationResult::new(find(REAL_LABEL), find(FAKE_LABEL))
}

/// Classifies frames through a shared [`ImageClassifier`]
///
/// Cloning is cheap; every clone uses the same underlying classifier, so a
/// model is loaded once per process and shared by all workers.
#[derive(Clone)]
pub struct FrameClassifierAdapter {
    classifier: Arc<dyn ImageClassifier>,
}

impl FrameClassifierAdapter {
    pub fn new(classifier: Arc<dyn ImageClassifier>) -> Self {
        Self { classifier }
    }

    /// Classify one frame and normalize the result
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::ClassificationFailed`] if the classifier fails.
    pub fn classify_frame(&self, frame_index: u64, image: &RgbImage) -> Result<ClassificationResult> {
        let scores = self.classifier.classify(image).map_err(|e| {
            ProcessingError::ClassificationFailed {
                frame_index,
                message: e.to_string(),
            }
        })?;

        let result = normalize_scores(&scores);
        debug!(
            "Frame {}: real={:.4} fake={:.4}",
            frame_index, result.real_score, result.fake_score
        );
        Ok(result)
    }
}

impl std::fmt::Debug for FrameClassifierAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameClassifierAdapter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClassifierError;

    struct FixedClassifier(Vec<LabelScore>);

    impl ImageClassifier for FixedClassifier {
        fn classify(&self, _image: &RgbImage) -> std::result::Result<Vec<LabelScore>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    struct FailingClassifier;

    impl ImageClassifier for FailingClassifier {
        fn classify(&self, _image: &RgbImage) -> std::result::Result<Vec<LabelScore>, ClassifierError> {
            Err(ClassifierError::Inference("backend unavailable".to_string()))
        }
    }

    #[test]
    fn test_normalize_both_labels() {
        let result = normalize_scores(&[
            LabelScore::new("Real", 0.9),
            LabelScore::new("Fake", 0.1),
        ]);
        assert_eq!(result, ClassificationResult::new(0.9, 0.1));
    }

    #[test]
    fn test_normalize_missing_label_defaults_to_zero() {
        let result = normalize_scores(&[LabelScore::new("Fake", 0.7)]);
        assert_eq!(result.real_score, 0.0);
        assert_eq!(result.fake_score, 0.7);

        let result = normalize_scores(&[]);
        assert_eq!(result, ClassificationResult::new(0.0, 0.0));
    }

    #[test]
    fn test_normalize_is_case_sensitive() {
        let result = normalize_scores(&[
            LabelScore::new("real", 0.8),
            LabelScore::new("FAKE", 0.2),
            LabelScore::new("Other", 0.5),
        ]);
        assert_eq!(result, ClassificationResult::new(0.0, 0.0));
    }

    #[test]
    fn test_classify_frame_normalizes() {
        let adapter = FrameClassifierAdapter::new(Arc::new(FixedClassifier(vec![
            LabelScore::new("Fake", 0.6),
            LabelScore::new("Real", 0.4),
        ])));
        let result = adapter.classify_frame(5, &RgbImage::new(4, 4)).unwrap();
        assert!(result.is_anomaly());
        assert_eq!(result.fake_score, 0.6);
    }

    #[test]
    fn test_classify_frame_reports_frame_index_on_failure() {
        let adapter = FrameClassifierAdapter::new(Arc::new(FailingClassifier));
        match adapter.classify_frame(42, &RgbImage::new(4, 4)) {
            Err(ProcessingError::ClassificationFailed {
                frame_index,
                message,
            }) => {
                assert_eq!(frame_index, 42);
                assert!(message.contains("backend unavailable"));
            }
            other => panic!("expected ClassificationFailed, got {other:?}"),
        }
    }
}
