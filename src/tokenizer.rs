//! Tokenizers used to turn raw text into normalized word tokens.
//!
//! The classifier treats tokenization as an injected capability: anything
//! implementing [`Tokenize`] can be handed to the dispatcher. A tokenizer is
//! either [`Readiness::NotReady`] or [`Readiness::Ready`]; calling it before it
//! is ready is an error, never an empty token list.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use log::{error, info};
use unicode_segmentation::UnicodeSegmentation;

use crate::classifier::ClassifierError;

/// Lifecycle state shared by tokenizers and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
}

/// Segments text into an ordered list of normalized tokens.
///
/// Implementations must be deterministic: the same input always yields the
/// same tokens.
pub trait Tokenize: Send + Sync + fmt::Debug {
    /// Reports whether the tokenizer can accept calls yet
    fn readiness(&self) -> Readiness {
        Readiness::Ready
    }

    /// Splits `text` into tokens.
    ///
    /// # Errors
    /// - `TokenizerNotReady` if called before the tokenizer is loaded
    /// - `TokenizerError` if the underlying segmenter fails
    fn tokenize(&self, text: &str) -> Result<Vec<String>, ClassifierError>;
}

/// Splits text on Unicode word boundaries (UAX #29) and lowercases each word.
///
/// Punctuation and whitespace are dropped. Scripts without word separators
/// (kanji, kana) come out one character per token, which is enough for the
/// short questions an FAQ corpus holds.
///
/// ```
/// use kotae::{Tokenize, UnicodeWordTokenizer};
///
/// let tokens = UnicodeWordTokenizer::new().tokenize("Opening Hours?").unwrap();
/// assert_eq!(tokens, vec!["opening", "hours"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct UnicodeWordTokenizer;

impl UnicodeWordTokenizer {
    pub fn new() -> Self {
        UnicodeWordTokenizer
    }
}

impl Tokenize for UnicodeWordTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>, ClassifierError> {
        Ok(text.unicode_words().map(str::to_lowercase).collect())
    }
}

/// A HuggingFace tokenizer loaded from a `tokenizer.json` file.
///
/// Starts out not ready; [`PretrainedTokenizer::load_from_file`] moves it to
/// ready exactly once.
#[derive(Debug, Default)]
pub struct PretrainedTokenizer {
    inner: OnceLock<tokenizers::Tokenizer>,
}

impl PretrainedTokenizer {
    pub fn new() -> Self {
        Self { inner: OnceLock::new() }
    }

    /// Loads the tokenizer definition from disk.
    ///
    /// # Errors
    /// - `TokenizerError` if the file is missing or cannot be parsed
    /// - `TokenizerError` if the tokenizer was already loaded
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ClassifierError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClassifierError::TokenizerError(format!(
                "Tokenizer file not found: {}",
                path.display()
            )));
        }

        let tokenizer = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            error!("Failed to load tokenizer: {}", e);
            ClassifierError::TokenizerError(format!("Failed to load tokenizer: {}", e))
        })?;

        self.inner
            .set(tokenizer)
            .map_err(|_| ClassifierError::TokenizerError("Tokenizer already loaded".into()))?;
        info!("Tokenizer loaded successfully from {:?}", path);
        Ok(())
    }

    /// Convenience constructor that loads immediately
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let tokenizer = Self::new();
        tokenizer.load_from_file(path)?;
        Ok(tokenizer)
    }
}

impl Tokenize for PretrainedTokenizer {
    fn readiness(&self) -> Readiness {
        if self.inner.get().is_some() {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    fn tokenize(&self, text: &str) -> Result<Vec<String>, ClassifierError> {
        let tokenizer = self.inner.get().ok_or(ClassifierError::TokenizerNotReady)?;
        let encoding = tokenizer
            .encode(text, false)
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))?;
        Ok(encoding.get_tokens().to_vec())
    }
}

/// Rewrites phrases before handing text to an inner tokenizer.
///
/// Used to fold synonyms and spelling variants onto the wording the corpus
/// uses. Longer phrases are replaced first so that a short key never splits a
/// longer one; ties are broken alphabetically to keep the order stable.
#[derive(Debug)]
pub struct SubstitutingTokenizer<T> {
    inner: T,
    substitutions: Vec<(String, String)>,
}

impl<T: Tokenize> SubstitutingTokenizer<T> {
    pub fn new(inner: T, dictionary: HashMap<String, String>) -> Self {
        let mut substitutions: Vec<(String, String)> = dictionary
            .into_iter()
            .filter(|(from, _)| !from.is_empty())
            .collect();
        substitutions.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });
        Self { inner, substitutions }
    }

    /// Applies every substitution in order
    pub fn normalize(&self, text: &str) -> String {
        self.substitutions
            .iter()
            .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
    }
}

impl<T: Tokenize> Tokenize for SubstitutingTokenizer<T> {
    fn readiness(&self) -> Readiness {
        self.inner.readiness()
    }

    fn tokenize(&self, text: &str) -> Result<Vec<String>, ClassifierError> {
        self.inner.tokenize(&self.normalize(text))
    }
}
