use std::collections::HashMap;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::vocabulary::Vocabulary;
use crate::tokenizer::Tokenize;

/// Fixed length of padded index sequences unless configured otherwise.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 10;

/// Id written into unused trailing positions of a sequence.
pub const PADDING_ID: usize = 0;

/// Id standing in for any token outside the vocabulary.
pub const OOV_ID: usize = 1;

/// Which representation the encoder produces.
///
/// Padded sequences are the default: TF-IDF weights vanish on corpora with
/// only a couple of questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EncodingStrategy {
    /// Weighted bag of words, one position per vocabulary token
    TfIdf,
    /// Token ids truncated or zero-padded to `length`
    Sequence { length: usize },
}

impl Default for EncodingStrategy {
    fn default() -> Self {
        EncodingStrategy::Sequence { length: DEFAULT_SEQUENCE_LENGTH }
    }
}

/// Converts text into a fixed-length feature vector.
///
/// The width never depends on the input: it is `|Vocabulary|` for TF-IDF and
/// the configured sequence length for padded sequences.
pub trait FeatureEncoder: Send + Sync + std::fmt::Debug {
    /// Length of every vector this encoder produces
    fn width(&self) -> usize;

    /// The strategy implemented by this encoder
    fn strategy(&self) -> EncodingStrategy;

    /// Encodes an already tokenized text
    fn encode_tokens(&self, tokens: &[String]) -> Array1<f32>;

    /// Tokenizes and encodes `text`.
    ///
    /// # Errors
    /// - Forwards tokenizer errors, including `TokenizerNotReady`
    fn encode(&self, tokenizer: &dyn Tokenize, text: &str) -> Result<Array1<f32>, ClassifierError> {
        let tokens = tokenizer.tokenize(text)?;
        Ok(self.encode_tokens(&tokens))
    }
}

/// Builds the encoder selected by `strategy` over `vocabulary`.
pub fn build_encoder(
    strategy: EncodingStrategy,
    vocabulary: Vocabulary,
) -> Result<Box<dyn FeatureEncoder>, ClassifierError> {
    Ok(match strategy {
        EncodingStrategy::TfIdf => Box::new(TfIdfEncoder::new(vocabulary)?),
        EncodingStrategy::Sequence { length } => Box::new(SequenceEncoder::new(vocabulary, length)?),
    })
}

/// TF-IDF bag-of-words encoder.
///
/// `tf = count / max(1, |tokens|)` and `idf = ln(N / (df + 1))`. With the
/// smoothing term a token present in every text gets a negative weight, and
/// on a two-text corpus every weight is zero or below.
#[derive(Debug, Clone)]
pub struct TfIdfEncoder {
    vocabulary: Vocabulary,
    idf: Array1<f32>,
}

impl TfIdfEncoder {
    pub fn new(vocabulary: Vocabulary) -> Result<Self, ClassifierError> {
        if vocabulary.is_empty() {
            return Err(ClassifierError::BuildError(
                "TF-IDF encoder needs a non-empty vocabulary".into(),
            ));
        }
        let n = vocabulary.num_documents() as f32;
        let idf = (0..vocabulary.len())
            .map(|pos| (n / (vocabulary.document_frequency(pos) as f32 + 1.0)).ln())
            .collect();
        Ok(Self { vocabulary, idf })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn idf(&self) -> &Array1<f32> {
        &self.idf
    }
}

impl FeatureEncoder for TfIdfEncoder {
    fn width(&self) -> usize {
        self.vocabulary.len()
    }

    fn strategy(&self) -> EncodingStrategy {
        EncodingStrategy::TfIdf
    }

    fn encode_tokens(&self, tokens: &[String]) -> Array1<f32> {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for token in tokens {
            if let Some(pos) = self.vocabulary.position(token) {
                *counts.entry(pos).or_insert(0) += 1;
            }
        }

        let total = tokens.len().max(1) as f32;
        let mut vector = Array1::zeros(self.width());
        for (pos, count) in counts {
            vector[pos] = (count as f32 / total) * self.idf[pos];
        }
        vector
    }
}

/// Padded word-index sequence encoder.
///
/// Vocabulary position `i` maps to id `i + 2`; ids 0 and 1 are reserved for
/// padding and out-of-vocabulary tokens.
#[derive(Debug, Clone)]
pub struct SequenceEncoder {
    vocabulary: Vocabulary,
    length: usize,
}

impl SequenceEncoder {
    pub fn new(vocabulary: Vocabulary, length: usize) -> Result<Self, ClassifierError> {
        if vocabulary.is_empty() {
            return Err(ClassifierError::BuildError(
                "Sequence encoder needs a non-empty vocabulary".into(),
            ));
        }
        if length == 0 {
            return Err(ClassifierError::ValidationError(
                "Sequence length must be at least 1".into(),
            ));
        }
        Ok(Self { vocabulary, length })
    }

    /// Number of distinct ids, padding and OOV included
    pub fn id_space(&self) -> usize {
        self.vocabulary.len() + 2
    }

    pub fn token_id(&self, token: &str) -> usize {
        self.vocabulary.position(token).map_or(OOV_ID, |pos| pos + 2)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

impl FeatureEncoder for SequenceEncoder {
    fn width(&self) -> usize {
        self.length
    }

    fn strategy(&self) -> EncodingStrategy {
        EncodingStrategy::Sequence { length: self.length }
    }

    fn encode_tokens(&self, tokens: &[String]) -> Array1<f32> {
        let mut vector = Array1::from_elem(self.length, PADDING_ID as f32);
        for (slot, token) in vector.iter_mut().zip(tokens) {
            *slot = self.token_id(token) as f32;
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::UnicodeWordTokenizer;

    fn vocabulary() -> Vocabulary {
        let texts = [
            "what are your opening hours",
            "how do i return an item",
            "do you ship abroad",
            "which payment methods do you accept",
        ];
        Vocabulary::build(&texts, &UnicodeWordTokenizer::new()).unwrap()
    }

    #[test]
    fn test_tfidf_width_is_vocabulary_size() {
        let encoder = TfIdfEncoder::new(vocabulary()).unwrap();
        let tokenizer = UnicodeWordTokenizer::new();
        let short = encoder.encode(&tokenizer, "hours").unwrap();
        let long = encoder
            .encode(&tokenizer, &"opening hours and return policy and payment ".repeat(30))
            .unwrap();
        assert_eq!(short.len(), encoder.vocabulary().len());
        assert_eq!(long.len(), encoder.vocabulary().len());
    }

    #[test]
    fn test_tfidf_weights() {
        let encoder = TfIdfEncoder::new(vocabulary()).unwrap();
        let tokenizer = UnicodeWordTokenizer::new();
        // "hours" occurs in 1 of 4 texts, "you" in 2 of 4.
        let hours = encoder.vocabulary().position("hours").unwrap();
        let you = encoder.vocabulary().position("you").unwrap();
        assert!((encoder.idf()[hours] - (4.0f32 / 2.0).ln()).abs() < 1e-6);
        assert!((encoder.idf()[you] - (4.0f32 / 3.0).ln()).abs() < 1e-6);

        let vector = encoder.encode(&tokenizer, "hours hours unknown you").unwrap();
        assert!((vector[hours] - 0.5 * (2.0f32).ln()).abs() < 1e-6);
        assert!((vector[you] - 0.25 * (4.0f32 / 3.0).ln()).abs() < 1e-6);
    }

    #[test]
    fn test_tfidf_out_of_vocabulary_is_zero() {
        let encoder = TfIdfEncoder::new(vocabulary()).unwrap();
        let vector = encoder.encode(&UnicodeWordTokenizer::new(), "zebra quantum").unwrap();
        assert_eq!(vector.len(), encoder.width());
        assert!(vector.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_sequence_pads_and_truncates() {
        let encoder = SequenceEncoder::new(vocabulary(), 4).unwrap();
        let tokenizer = UnicodeWordTokenizer::new();

        let short = encoder.encode(&tokenizer, "opening hours").unwrap();
        let opening = encoder.token_id("opening") as f32;
        let hours = encoder.token_id("hours") as f32;
        assert_eq!(short.to_vec(), vec![opening, hours, 0.0, 0.0]);

        let long = encoder
            .encode(&tokenizer, "what are your opening hours on sunday")
            .unwrap();
        assert_eq!(long.len(), 4);
        assert_eq!(long[3], opening);
    }

    #[test]
    fn test_sequence_out_of_vocabulary_marker() {
        let encoder = SequenceEncoder::new(vocabulary(), DEFAULT_SEQUENCE_LENGTH).unwrap();
        let vector = encoder.encode(&UnicodeWordTokenizer::new(), "zebra quantum").unwrap();
        assert_eq!(vector.len(), DEFAULT_SEQUENCE_LENGTH);
        assert_eq!(vector[0], OOV_ID as f32);
        assert_eq!(vector[1], OOV_ID as f32);
        assert!(vector.iter().skip(2).all(|&x| x == PADDING_ID as f32));
    }

    #[test]
    fn test_encoding_is_bit_identical() {
        let tokenizer = UnicodeWordTokenizer::new();
        for strategy in [EncodingStrategy::TfIdf, EncodingStrategy::Sequence { length: 6 }] {
            let encoder = build_encoder(strategy, vocabulary()).unwrap();
            let a = encoder.encode(&tokenizer, "do you accept payment by card").unwrap();
            let b = encoder.encode(&tokenizer, "do you accept payment by card").unwrap();
            let a_bits: Vec<u32> = a.iter().map(|x| x.to_bits()).collect();
            let b_bits: Vec<u32> = b.iter().map(|x| x.to_bits()).collect();
            assert_eq!(a_bits, b_bits);
        }
    }

    #[test]
    fn test_zero_sequence_length_rejected() {
        let result = SequenceEncoder::new(vocabulary(), 0);
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
    }
}
