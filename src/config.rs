use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::{EncodingStrategy, TrainingOptions};

/// Reply used when no answer can be produced for a message.
pub const DEFAULT_FALLBACK_ANSWER: &str =
    "申し訳ありません、よく分かりませんでした。別の言葉で質問していただけますか？";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for building and running the intent engine.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub strategy: EncodingStrategy,
    /// Embedding width used by the sequence strategy
    pub embedding_dim: usize,
    pub hidden_width: usize,
    pub dropout: f32,
    pub epochs: usize,
    pub learning_rate: f32,
    pub seed: u64,
    pub fallback_answer: String,
    /// When set, answers below this confidence are swapped for the fallback
    /// answer. Off by default: confidence is reported, not gated.
    pub min_confidence: Option<f32>,
    pub init_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let training = TrainingOptions::default();
        Self {
            strategy: EncodingStrategy::default(),
            embedding_dim: 16,
            hidden_width: 32,
            dropout: training.dropout,
            epochs: training.epochs,
            learning_rate: training.learning_rate,
            seed: training.seed,
            fallback_answer: DEFAULT_FALLBACK_ANSWER.to_string(),
            min_confidence: None,
            init_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hidden_width == 0 || self.embedding_dim == 0 {
            return Err(ConfigError::Invalid("layer widths must be positive".into()));
        }
        if let EncodingStrategy::Sequence { length: 0 } = self.strategy {
            return Err(ConfigError::Invalid("sequence length must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::Invalid(format!("dropout must be in [0, 1), got {}", self.dropout)));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::Invalid("learning rate must be positive".into()));
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(ConfigError::Invalid(format!("min_confidence must be in [0, 1], got {}", min)));
            }
        }
        Ok(())
    }

    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            dropout: self.dropout,
            seed: self.seed,
        }
    }

    pub fn init_timeout(&self) -> Option<Duration> {
        self.init_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy, EncodingStrategy::Sequence { length: 10 });
        assert_eq!(config.hidden_width, 32);
        assert_eq!(config.min_confidence, None);
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kotae.json");
        fs::write(&path, r#"{"strategy": {"kind": "sequence", "length": 12}, "epochs": 50}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.strategy, EncodingStrategy::Sequence { length: 12 });
        assert_eq!(config.epochs, 50);
        assert_eq!(config.hidden_width, 32);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = EngineConfig {
            dropout: 1.0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig {
            strategy: EncodingStrategy::Sequence { length: 0 },
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
