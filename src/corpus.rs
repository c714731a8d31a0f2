//! FAQ corpus loading and validation.
//!
//! Two JSON layouts are accepted:
//!
//! ```json
//! [{"question": "営業時間は?", "answer": "9時〜18時です", "intent": "hours"}]
//! ```
//!
//! ```json
//! [{"intent": "hours", "answer": "9時〜18時です", "questions": ["営業時間は?", "何時まで?"]}]
//! ```
//!
//! The grouped layout is expanded into one entry per question.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed corpus: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Corpus has no entries")]
    Empty,
    #[error("Entry {index}: field '{field}' cannot be empty")]
    EmptyField { index: usize, field: &'static str },
    #[error("Intent '{intent}' has conflicting answers")]
    ConflictingAnswers { intent: String },
}

/// One FAQ question with its canned answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorpusEntry {
    pub question: String,
    pub answer: String,
    pub intent: String,
}

impl CorpusEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            intent: intent.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupedEntry {
    intent: String,
    answer: String,
    questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Flat(CorpusEntry),
    Grouped(GroupedEntry),
}

/// Validated, immutable list of corpus entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
}

impl Corpus {
    /// Validates `entries`: at least one entry, no blank fields, and a single
    /// answer per intent.
    pub fn new(entries: Vec<CorpusEntry>) -> Result<Self, CorpusError> {
        if entries.is_empty() {
            return Err(CorpusError::Empty);
        }

        let mut answers: HashMap<&str, &str> = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            for (field, value) in [
                ("question", &entry.question),
                ("answer", &entry.answer),
                ("intent", &entry.intent),
            ] {
                if value.trim().is_empty() {
                    return Err(CorpusError::EmptyField { index, field });
                }
            }
            match answers.get(entry.intent.as_str()) {
                Some(&answer) if answer != entry.answer => {
                    return Err(CorpusError::ConflictingAnswers {
                        intent: entry.intent.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    answers.insert(&entry.intent, &entry.answer);
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn from_json(json: &str) -> Result<Self, CorpusError> {
        let raw: Vec<RawEntry> = serde_json::from_str(json)?;
        let mut entries = Vec::new();
        for (index, item) in raw.into_iter().enumerate() {
            match item {
                RawEntry::Flat(entry) => entries.push(entry),
                RawEntry::Grouped(group) => {
                    if group.questions.is_empty() {
                        return Err(CorpusError::EmptyField {
                            index,
                            field: "questions",
                        });
                    }
                    entries.extend(
                        group
                            .questions
                            .into_iter()
                            .map(|q| CorpusEntry::new(q, group.answer.clone(), group.intent.clone())),
                    );
                }
            }
        }
        Self::new(entries)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct intents in order of first appearance
    pub fn intents(&self) -> Vec<String> {
        let mut intents: Vec<String> = Vec::new();
        for entry in &self.entries {
            if !intents.contains(&entry.intent) {
                intents.push(entry.intent.clone());
            }
        }
        intents
    }

    /// Answer for `intent`, matched by identifier rather than position
    pub fn answer_for(&self, intent: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.intent == intent)
            .map(|entry| entry.answer.as_str())
    }
}

/// Loads a phrase substitution dictionary (`{"from": "to", ...}`).
pub fn load_dictionary<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>, CorpusError> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
