use std::sync::Arc;

use ndarray::Array1;

use super::encoder::FeatureEncoder;
use super::error::ClassifierError;
use super::model::IntentModel;
use super::utils::argmax;
use crate::store::{PersistedModel, FORMAT_VERSION};
use crate::tokenizer::Tokenize;

/// How the classifier obtained its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOrigin {
    Trained,
    Restored,
}

/// Best-scoring intent for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredIntent {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
}

/// A trained text-to-intent classifier.
///
/// # Thread Safety
///
/// All fields are read-only after construction, so the type is `Send + Sync`
/// and can be shared behind an `Arc`.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::sync::Arc;
/// use kotae::{Classifier, UnicodeWordTokenizer};
///
/// let classifier = Classifier::builder()
///     .with_tokenizer(Arc::new(UnicodeWordTokenizer::new()))?
///     .add_example("what are your opening hours", "hours")?
///     .add_example("can i return an item", "returns")?
///     .add_example("do you ship abroad", "shipping")?
///     .build()?;
///
/// let best = classifier.predict("opening hours please")?;
/// println!("{} ({:.2})", best.label, best.confidence);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Classifier {
    pub(crate) tokenizer: Arc<dyn Tokenize>,
    pub(crate) encoder: Box<dyn FeatureEncoder>,
    pub(crate) model: IntentModel,
    pub(crate) labels: Vec<String>,
    pub(crate) fingerprint: String,
    pub(crate) origin: ModelOrigin,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> super::ClassifierInfo {
        super::ClassifierInfo {
            num_classes: self.labels.len(),
            class_labels: self.labels.clone(),
            strategy: self.encoder.strategy(),
            input_width: self.encoder.width(),
            shape: *self.model.shape(),
            origin: self.origin,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Encodes `text` with the active feature encoder
    pub fn encode(&self, text: &str) -> Result<Array1<f32>, ClassifierError> {
        self.encoder.encode(self.tokenizer.as_ref(), text)
    }

    /// Probability for every intent, in label order
    pub fn scores(&self, text: &str) -> Result<Array1<f32>, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Input text cannot be empty".into()));
        }
        let features = self.encode(text)?;
        self.model.predict(&features)
    }

    /// Makes a prediction for the given text
    pub fn predict(&self, text: &str) -> Result<ScoredIntent, ClassifierError> {
        let scores = self.scores(text)?;
        self.select(&scores)
    }

    /// Picks the most probable intent; ties go to the lowest index.
    pub fn select(&self, scores: &Array1<f32>) -> Result<ScoredIntent, ClassifierError> {
        let (index, confidence) = argmax(scores.view())
            .ok_or_else(|| ClassifierError::PredictionError("Empty score vector".into()))?;
        let label = self.labels.get(index).cloned().ok_or_else(|| {
            ClassifierError::PredictionError(format!("No label for output index {}", index))
        })?;
        Ok(ScoredIntent {
            index,
            label,
            confidence,
        })
    }

    /// Snapshot suitable for the model store
    pub fn to_persisted(&self) -> PersistedModel {
        PersistedModel {
            format_version: FORMAT_VERSION,
            shape: *self.model.shape(),
            fingerprint: self.fingerprint.clone(),
            labels: self.labels.clone(),
            parameters: self.model.parameters().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::UnicodeWordTokenizer;

    fn setup_test_classifier() -> Classifier {
        Classifier::builder()
            .with_tokenizer(Arc::new(UnicodeWordTokenizer::new()))
            .unwrap()
            .add_example("what are your opening hours", "hours")
            .unwrap()
            .add_example("how do i return an item", "returns")
            .unwrap()
            .add_example("do you ship abroad", "shipping")
            .unwrap()
            .build()
            .expect("Failed to create classifier")
    }

    #[test]
    fn test_class_info() {
        let classifier = setup_test_classifier();
        let info = classifier.info();
        assert_eq!(info.num_classes, 3);
        assert_eq!(info.class_labels, vec!["hours", "returns", "shipping"]);
        assert_eq!(info.origin, ModelOrigin::Trained);
        assert_eq!(info.input_width, crate::classifier::DEFAULT_SEQUENCE_LENGTH);
    }

    #[test]
    fn test_scores_are_a_distribution() {
        let classifier = setup_test_classifier();
        for text in ["opening hours", "return", "completely unrelated words", "ship ship ship"] {
            let scores = classifier.scores(text).unwrap();
            assert_eq!(scores.len(), 3);
            assert!(scores.iter().all(|&p| p >= 0.0));
            assert!((scores.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        let classifier = setup_test_classifier();
        assert!(matches!(
            classifier.predict("   "),
            Err(ClassifierError::ValidationError(_))
        ));
    }
}
