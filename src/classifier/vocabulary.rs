use std::collections::{HashMap, HashSet};

use log::debug;
use sha2::{Digest, Sha256};

use super::error::ClassifierError;
use crate::tokenizer::Tokenize;

/// Ordered set of distinct corpus tokens plus their document frequencies.
///
/// Token positions follow first occurrence in the corpus, so building twice
/// from the same corpus always yields the same vector layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    tokens: Vec<String>,
    positions: HashMap<String, usize>,
    document_frequency: Vec<usize>,
    num_documents: usize,
}

impl Vocabulary {
    /// Tokenizes every text and collects the vocabulary.
    ///
    /// # Errors
    /// - `ValidationError` if the corpus is empty or yields no tokens
    /// - Forwards tokenizer errors
    pub fn build<S: AsRef<str>>(texts: &[S], tokenizer: &dyn Tokenize) -> Result<Self, ClassifierError> {
        let documents = texts
            .iter()
            .map(|text| tokenizer.tokenize(text.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_documents(&documents)
    }

    /// Builds the vocabulary from already tokenized documents
    pub fn from_documents(documents: &[Vec<String>]) -> Result<Self, ClassifierError> {
        if documents.is_empty() {
            return Err(ClassifierError::ValidationError(
                "Cannot build a vocabulary from an empty corpus".into(),
            ));
        }

        let mut tokens = Vec::new();
        let mut positions = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();

        for document in documents {
            let mut seen = HashSet::new();
            for token in document {
                if !seen.insert(token.as_str()) {
                    continue;
                }
                match positions.get(token) {
                    Some(&pos) => document_frequency[pos] += 1,
                    None => {
                        positions.insert(token.clone(), tokens.len());
                        tokens.push(token.clone());
                        document_frequency.push(1);
                    }
                }
            }
        }

        if tokens.is_empty() {
            return Err(ClassifierError::ValidationError(
                "Corpus produced no tokens; the vocabulary would be empty".into(),
            ));
        }

        debug!("Built vocabulary of {} tokens from {} documents", tokens.len(), documents.len());
        Ok(Self {
            tokens,
            positions,
            document_frequency,
            num_documents: documents.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Position of `token` in the vocabulary, if known
    pub fn position(&self, token: &str) -> Option<usize> {
        self.positions.get(token).copied()
    }

    /// Number of corpus texts containing the token at `position`
    pub fn document_frequency(&self, position: usize) -> usize {
        self.document_frequency.get(position).copied().unwrap_or(0)
    }

    /// Number of corpus texts the vocabulary was built from
    pub fn num_documents(&self) -> usize {
        self.num_documents
    }

    /// SHA-256 over the ordered token list.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for token in &self.tokens {
            hasher.update(token.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::UnicodeWordTokenizer;

    #[test]
    fn test_first_seen_order_and_document_frequency() {
        let texts = ["the cat sat", "the dog sat down", "a cat"];
        let vocab = Vocabulary::build(&texts, &UnicodeWordTokenizer::new()).unwrap();

        assert_eq!(vocab.tokens(), &["the", "cat", "sat", "dog", "down", "a"]);
        assert_eq!(vocab.document_frequency(vocab.position("the").unwrap()), 2);
        assert_eq!(vocab.document_frequency(vocab.position("cat").unwrap()), 2);
        assert_eq!(vocab.document_frequency(vocab.position("dog").unwrap()), 1);
        assert_eq!(vocab.num_documents(), 3);
    }

    #[test]
    fn test_repeated_token_counts_once_per_document() {
        let texts = ["hours hours hours", "returns"];
        let vocab = Vocabulary::build(&texts, &UnicodeWordTokenizer::new()).unwrap();
        assert_eq!(vocab.document_frequency(0), 1);
    }

    #[test]
    fn test_empty_corpus_is_rejected() {
        let texts: [&str; 0] = [];
        let result = Vocabulary::build(&texts, &UnicodeWordTokenizer::new());
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));

        let result = Vocabulary::build(&["?!", "..."], &UnicodeWordTokenizer::new());
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
    }

    #[test]
    fn test_fingerprint_tracks_order() {
        let a = Vocabulary::build(&["alpha beta"], &UnicodeWordTokenizer::new()).unwrap();
        let b = Vocabulary::build(&["beta alpha"], &UnicodeWordTokenizer::new()).unwrap();
        let c = Vocabulary::build(&["alpha beta"], &UnicodeWordTokenizer::new()).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
    }
}
