mod error;
mod vocabulary;
mod encoder;
mod model;
pub mod builder;
#[allow(clippy::module_inception)]
mod classifier;
mod utils;

pub use error::ClassifierError;
pub use vocabulary::Vocabulary;
pub use encoder::{
    build_encoder, EncodingStrategy, FeatureEncoder, SequenceEncoder, TfIdfEncoder,
    DEFAULT_SEQUENCE_LENGTH, OOV_ID, PADDING_ID,
};
pub use model::{InputLayer, IntentModel, ModelParameters, ModelShape, TrainingOptions, TrainingReport};
pub use classifier::{Classifier, ModelOrigin, ScoredIntent};
pub use builder::ClassifierBuilder;

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierInfo {
    /// Number of intents the classifier distinguishes
    pub num_classes: usize,
    /// Intent labels in output order
    pub class_labels: Vec<String>,
    /// Active feature encoding
    pub strategy: EncodingStrategy,
    /// Length of every encoded feature vector
    pub input_width: usize,
    /// Network dimensions
    pub shape: ModelShape,
    /// Whether the parameters were trained this session or restored from a store
    pub origin: ModelOrigin,
}
