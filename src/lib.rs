//! An intent classifier for closed-domain FAQ chat.
//!
//! Free-form user text is tokenized, encoded into a fixed-length feature
//! vector (TF-IDF or a padded token-id sequence), and scored by a small
//! feed-forward network trained on the FAQ questions. The best intent's canned
//! answer is returned together with the model's confidence.
//!
//! # Basic Usage
//!
//! ```rust
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use kotae::{ClassifyOutcome, Corpus, CorpusEntry, Dispatcher, EngineConfig, UnicodeWordTokenizer};
//!
//! let corpus = Corpus::new(vec![
//!     CorpusEntry::new("what are your opening hours", "We are open 9 to 6.", "hours"),
//!     CorpusEntry::new("how do i return an item", "Within 30 days.", "returns"),
//!     CorpusEntry::new("do you ship abroad", "We ship worldwide.", "shipping"),
//! ])?;
//!
//! let dispatcher = Dispatcher::new(EngineConfig::default());
//! dispatcher
//!     .initialize(corpus, Arc::new(UnicodeWordTokenizer::new()), "faq")
//!     .await?;
//!
//! if let ClassifyOutcome::Answered(prediction) = dispatcher.classify("opening hours?")? {
//!     println!("{} ({:.2})", prediction.answer, prediction.confidence);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Persistence
//!
//! Attach a [`ModelStore`] with [`Dispatcher::with_store`] to reuse trained
//! parameters across sessions. A stored model whose shape or vocabulary no
//! longer matches the corpus is discarded and retrained automatically.

pub mod classifier;
pub mod config;
pub mod corpus;
pub mod dispatcher;
pub mod store;
pub mod tokenizer;

pub use classifier::{
    Classifier, ClassifierBuilder, ClassifierError, ClassifierInfo, EncodingStrategy, FeatureEncoder,
    ModelOrigin, ModelShape, ScoredIntent,
};
pub use config::{ConfigError, EngineConfig, DEFAULT_FALLBACK_ANSWER};
pub use corpus::{Corpus, CorpusEntry, CorpusError};
pub use dispatcher::{ClassifyOutcome, DispatchError, DispatchState, Dispatcher, InitError, Prediction};
pub use store::{ModelStore, PersistedModel, StoreError};
pub use tokenizer::{PretrainedTokenizer, Readiness, SubstitutingTokenizer, Tokenize, UnicodeWordTokenizer};

/// Installs `env_logger` as the global logger, configured from `RUST_LOG`.
///
/// Later calls are no-ops, so libraries and tests can call it freely.
pub fn init_logger() {
    let _ = env_logger::try_init();
}
