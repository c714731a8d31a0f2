use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use ndarray::Array1;
use sha2::{Digest, Sha256};

use super::classifier::{Classifier, ModelOrigin};
use super::encoder::{build_encoder, EncodingStrategy, FeatureEncoder};
use super::error::ClassifierError;
use super::model::{InputLayer, IntentModel, ModelShape};
use super::vocabulary::Vocabulary;
use crate::config::EngineConfig;
use crate::corpus::Corpus;
use crate::store::{ModelStore, StoreError};
use crate::tokenizer::{Readiness, Tokenize};

/// A builder for constructing a Classifier with a fluent interface.
///
/// The builder collects labelled questions, derives the vocabulary, and then
/// either restores matching parameters from a [`ModelStore`] or trains from
/// scratch (saving the result when a store is attached).
#[derive(Default, Debug)]
pub struct ClassifierBuilder {
    tokenizer: Option<Arc<dyn Tokenize>>,
    examples: Vec<(String, String)>,
    config: EngineConfig,
    store: Option<(ModelStore, String)>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ClassifierBuilder {
    /// Creates a new empty ClassifierBuilder instance with default configuration
    ///
    /// # Example
    /// ```
    /// use kotae::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self {
            tokenizer: None,
            examples: Vec::new(),
            config: EngineConfig::default(),
            store: None,
            cancel: None,
        }
    }

    /// Sets the engine configuration (encoding strategy, layer sizes, training knobs)
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the tokenizer used for both training and inference.
    ///
    /// # Returns
    /// * `Err(ClassifierError::BuildError)` if a tokenizer was already set
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenize>) -> Result<Self, ClassifierError> {
        if self.tokenizer.is_some() {
            return Err(ClassifierError::BuildError("Tokenizer already set".to_string()));
        }
        self.tokenizer = Some(tokenizer);
        Ok(self)
    }

    /// Persists trained parameters under `key` and restores them on later builds.
    ///
    /// # Returns
    /// * `Err(ClassifierError::ValidationError)` if the key is not a valid store key
    pub fn with_store(mut self, store: ModelStore, key: impl Into<String>) -> Result<Self, ClassifierError> {
        let key = key.into();
        ModelStore::validate_key(&key).map_err(|e| ClassifierError::ValidationError(e.to_string()))?;
        self.store = Some((store, key));
        Ok(self)
    }

    /// Lets another thread abandon the build by setting `flag`.
    ///
    /// The flag is checked before every training epoch and again before the
    /// trained model is saved; a cancelled build returns
    /// `ClassifierError::Cancelled` and leaves the store untouched.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Adds one training question labelled with `intent`.
    ///
    /// # Returns
    /// * `Err(ClassifierError::ValidationError)` if either value is blank
    pub fn add_example(
        mut self,
        question: impl Into<String>,
        intent: impl Into<String>,
    ) -> Result<Self, ClassifierError> {
        let question = question.into();
        let intent = intent.into();
        if question.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Example question cannot be empty".into()));
        }
        if intent.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Intent label cannot be empty".into()));
        }
        self.examples.push((question, intent));
        Ok(self)
    }

    /// Adds every question of `corpus` as a training example
    pub fn with_corpus(mut self, corpus: &Corpus) -> Self {
        self.examples.extend(
            corpus
                .entries()
                .iter()
                .map(|entry| (entry.question.clone(), entry.intent.clone())),
        );
        self
    }

    /// Builds and returns the final Classifier instance
    ///
    /// # Returns
    /// * `Result<Classifier, ClassifierError>` - The constructed Classifier if successful, or an error if:
    ///   - No tokenizer is set, or it is not ready
    ///   - No examples were added, or they yield an empty vocabulary
    ///   - Every encoded example is all zeros, so intents cannot be told apart
    ///   - The configuration is invalid
    ///   - Training fails
    pub fn build(self) -> Result<Classifier, ClassifierError> {
        let tokenizer = self
            .tokenizer
            .ok_or_else(|| ClassifierError::BuildError("No tokenizer set".into()))?;
        if tokenizer.readiness() != Readiness::Ready {
            return Err(ClassifierError::TokenizerNotReady);
        }
        if self.examples.is_empty() {
            return Err(ClassifierError::BuildError("No training examples added".into()));
        }
        self.config
            .validate()
            .map_err(|e| ClassifierError::ValidationError(e.to_string()))?;

        let mut labels: Vec<String> = Vec::new();
        for (_, intent) in &self.examples {
            if !labels.contains(intent) {
                labels.push(intent.clone());
            }
        }

        let documents = self
            .examples
            .iter()
            .map(|(question, _)| tokenizer.tokenize(question))
            .collect::<Result<Vec<_>, _>>()?;
        let vocabulary = Vocabulary::from_documents(&documents)?;
        let fingerprint = Self::fingerprint(&vocabulary, &labels, self.config.strategy);
        let id_space = vocabulary.len() + 2;
        info!(
            "Vocabulary has {} tokens across {} examples and {} intents",
            vocabulary.len(),
            self.examples.len(),
            labels.len()
        );

        let encoder = build_encoder(self.config.strategy, vocabulary)?;
        let shape = ModelShape {
            input: match self.config.strategy {
                EncodingStrategy::TfIdf => InputLayer::Dense { width: encoder.width() },
                EncodingStrategy::Sequence { length } => InputLayer::Embedding {
                    sequence_length: length,
                    id_space,
                    dim: self.config.embedding_dim,
                },
            },
            hidden_width: self.config.hidden_width,
            output_width: labels.len(),
        };

        let features: Vec<Array1<f32>> = documents.iter().map(|tokens| encoder.encode_tokens(tokens)).collect();
        if features.iter().all(|f| f.iter().all(|&v| v == 0.0)) {
            return Err(ClassifierError::BuildError(format!(
                "Every training example encodes to zeros under {:?}; use more questions or another strategy",
                self.config.strategy
            )));
        }

        if let Some((store, key)) = &self.store {
            if let Some(model) = Self::restore(store, key, &shape, &fingerprint) {
                return Ok(Classifier {
                    tokenizer,
                    encoder,
                    model,
                    labels,
                    fingerprint,
                    origin: ModelOrigin::Restored,
                });
            }
        }

        let targets: Vec<Array1<f32>> = self
            .examples
            .iter()
            .map(|(_, intent)| {
                let mut target = Array1::zeros(labels.len());
                if let Some(index) = labels.iter().position(|l| l == intent) {
                    target[index] = 1.0;
                }
                target
            })
            .collect();

        let mut model = IntentModel::new(shape, self.config.seed)?;
        let cancelled = || self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed));
        model.train_until(&features, &targets, &self.config.training_options(), cancelled)?;
        if cancelled() {
            return Err(ClassifierError::Cancelled);
        }

        let classifier = Classifier {
            tokenizer,
            encoder,
            model,
            labels,
            fingerprint,
            origin: ModelOrigin::Trained,
        };

        if let Some((store, key)) = &self.store {
            match store.save(key, &classifier.to_persisted()) {
                Ok(()) => info!("Saved trained model under key '{}'", key),
                Err(e) => error!("Failed to save trained model under key '{}': {}", key, e),
            }
        }

        Ok(classifier)
    }

    /// Tries the store; any failure other than success means "train instead".
    fn restore(store: &ModelStore, key: &str, shape: &ModelShape, fingerprint: &str) -> Option<IntentModel> {
        match store.load(key, shape, fingerprint) {
            Ok(persisted) => match IntentModel::from_parameters(persisted.parameters) {
                Ok(model) => {
                    info!("Restored model '{}' ({})", key, shape);
                    Some(model)
                }
                Err(e) => {
                    warn!("Stored model '{}' is unusable, retraining: {}", key, e);
                    None
                }
            },
            Err(StoreError::NotFound(_)) => {
                info!("No stored model under '{}', training from scratch", key);
                None
            }
            Err(e @ (StoreError::ShapeMismatch { .. } | StoreError::FingerprintMismatch)) => {
                warn!("Discarding stored model '{}': {}", key, e);
                None
            }
            Err(e) => {
                warn!("Could not read stored model '{}', retraining: {}", key, e);
                None
            }
        }
    }

    fn fingerprint(vocabulary: &Vocabulary, labels: &[String], strategy: EncodingStrategy) -> String {
        let mut hasher = Sha256::new();
        hasher.update(vocabulary.fingerprint().as_bytes());
        for label in labels {
            hasher.update([0u8]);
            hasher.update(label.as_bytes());
        }
        hasher.update(format!("{:?}", strategy).as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
