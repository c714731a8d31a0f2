//! Entry point used by chat front ends.
//!
//! A [`Dispatcher`] starts out [`Readiness::NotReady`]. `initialize` builds
//! the vocabulary and restores or trains the model once; afterwards
//! `classify` answers one message at a time. A call that arrives while another
//! is in flight is rejected with [`DispatchError::Busy`] rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::classifier::{Classifier, ClassifierError};
use crate::config::EngineConfig;
use crate::corpus::{Corpus, CorpusError};
use crate::store::ModelStore;
use crate::tokenizer::{Readiness, Tokenize};

/// Stage of the request currently being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Encoding,
    Predicting,
    AnswerLookup,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Tokenizer not ready")]
    TokenizerNotReady,
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Invalid corpus: {0}")]
    Corpus(#[from] CorpusError),
    #[error("Failed to build classifier: {0}")]
    Build(ClassifierError),
    #[error("Initialization timed out after {0:?}")]
    Timeout(Duration),
    #[error("Initialization task failed: {0}")]
    Task(String),
    #[error("Dispatcher already initialized")]
    AlreadyInitialized,
}

impl From<ClassifierError> for InitError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::TokenizerNotReady => InitError::TokenizerNotReady,
            ClassifierError::TokenizerError(msg) => InitError::Tokenizer(msg),
            other => InitError::Build(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatcher is not ready")]
    NotReady,
    #[error("Another classification is still in progress")]
    Busy,
}

/// Answer chosen for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub intent_index: usize,
    pub intent: String,
    /// Probability of the selected intent, reported as-is
    pub confidence: f32,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyOutcome {
    Answered(Prediction),
    /// Blank input; nothing was classified
    Skipped,
    /// Classification failed; `answer` is the fallback reply
    Failed { answer: String, reason: String },
}

#[derive(Debug)]
struct Pipeline {
    classifier: Classifier,
    corpus: Corpus,
}

/// Owns the classifier context and serializes requests against it.
#[derive(Debug)]
pub struct Dispatcher {
    config: EngineConfig,
    store: Option<ModelStore>,
    pipeline: OnceLock<Pipeline>,
    state: Mutex<DispatchState>,
    init_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            store: None,
            pipeline: OnceLock::new(),
            state: Mutex::new(DispatchState::Idle),
            init_lock: Mutex::new(()),
        }
    }

    /// Persists trained models in `store` and reuses them across sessions
    pub fn with_store(mut self, store: ModelStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn readiness(&self) -> Readiness {
        if self.pipeline.get().is_some() {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    /// True while a classification holds the admission slot
    pub fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    pub fn classifier(&self) -> Option<&Classifier> {
        self.pipeline.get().map(|p| &p.classifier)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds the vocabulary and restores or trains the model.
    ///
    /// Runs once; the CPU-bound part happens on the blocking pool and is
    /// bounded by `init_timeout_secs` when configured. On timeout the build
    /// is cancelled and joined before returning, so nothing is written to the
    /// store afterwards. On error the dispatcher stays not ready.
    pub async fn initialize(
        &self,
        corpus: Corpus,
        tokenizer: Arc<dyn Tokenize>,
        model_key: &str,
    ) -> Result<Readiness, InitError> {
        let _guard = self.init_lock.lock().await;
        if self.pipeline.get().is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        if tokenizer.readiness() != Readiness::Ready {
            return Err(InitError::TokenizerNotReady);
        }
        ModelStore::validate_key(model_key)
            .map_err(|e| InitError::Build(ClassifierError::ValidationError(e.to_string())))?;

        info!(
            "Initializing dispatcher: {} corpus entries, {} intents, key '{}'",
            corpus.len(),
            corpus.intents().len(),
            model_key
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let mut builder = Classifier::builder()
            .with_config(self.config.clone())
            .with_tokenizer(tokenizer)?
            .with_cancel_flag(Arc::clone(&cancel))
            .with_corpus(&corpus);
        if let Some(store) = &self.store {
            builder = builder.with_store(store.clone(), model_key)?;
        }

        let mut task = tokio::task::spawn_blocking(move || builder.build());
        let joined = match self.config.init_timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Initialization exceeded {:?}, cancelling the build", limit);
                    cancel.store(true, Ordering::Relaxed);
                    // Still holding init_lock: a retry must not race the abandoned build.
                    let _ = task.await;
                    return Err(InitError::Timeout(limit));
                }
            },
            None => task.await,
        };
        let classifier = joined.map_err(|e| InitError::Task(e.to_string()))??;

        info!("Dispatcher ready: {:?}", classifier.info());
        self.pipeline
            .set(Pipeline { classifier, corpus })
            .map_err(|_| InitError::AlreadyInitialized)?;
        Ok(Readiness::Ready)
    }

    /// Classifies one message and looks up its answer.
    ///
    /// Blank input is skipped. Failures inside the pipeline do not surface as
    /// errors: they produce [`ClassifyOutcome::Failed`] carrying the fallback
    /// answer, and the dispatcher is immediately usable again.
    pub fn classify(&self, text: &str) -> Result<ClassifyOutcome, DispatchError> {
        let pipeline = self.pipeline.get().ok_or(DispatchError::NotReady)?;
        if text.trim().is_empty() {
            return Ok(ClassifyOutcome::Skipped);
        }

        let mut state = self.state.try_lock().map_err(|_| DispatchError::Busy)?;
        let result = self.run(pipeline, &mut state, text);
        *state = DispatchState::Idle;

        Ok(match result {
            Ok(prediction) => {
                debug!(
                    "Classified as '{}' with confidence {:.3}",
                    prediction.intent, prediction.confidence
                );
                ClassifyOutcome::Answered(prediction)
            }
            Err(e) => {
                warn!("Classification failed, using fallback answer: {}", e);
                ClassifyOutcome::Failed {
                    answer: self.config.fallback_answer.clone(),
                    reason: e.to_string(),
                }
            }
        })
    }

    fn run(&self, pipeline: &Pipeline, state: &mut DispatchState, text: &str) -> Result<Prediction, ClassifierError> {
        *state = DispatchState::Encoding;
        let features = pipeline.classifier.encode(text)?;

        *state = DispatchState::Predicting;
        let scores = pipeline.classifier.model.predict(&features)?;
        let best = pipeline.classifier.select(&scores)?;

        *state = DispatchState::AnswerLookup;
        let answer = match pipeline.corpus.answer_for(&best.label) {
            Some(answer) => answer.to_string(),
            None => {
                warn!("No corpus entry for intent '{}'", best.label);
                self.config.fallback_answer.clone()
            }
        };
        let answer = match self.config.min_confidence {
            Some(min) if best.confidence < min => self.config.fallback_answer.clone(),
            _ => answer,
        };

        Ok(Prediction {
            intent_index: best.index,
            intent: best.label,
            confidence: best.confidence,
            answer,
        })
    }
}
