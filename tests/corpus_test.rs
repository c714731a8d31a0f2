use std::path::PathBuf;
use std::sync::Arc;

use kotae::corpus::load_dictionary;
use kotae::{Classifier, Corpus, CorpusError, EncodingStrategy, EngineConfig, Tokenize, UnicodeWordTokenizer};

fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
}

#[test]
fn test_bundled_corpus_loads() -> Result<(), Box<dyn std::error::Error>> {
    let corpus = Corpus::from_file(data_path("faq.json"))?;
    assert_eq!(corpus.len(), 10);
    assert_eq!(corpus.intents(), vec!["hours", "return", "shipping", "payment"]);
    assert_eq!(corpus.answer_for("hours"), Some("9時〜18時です"));
    assert_eq!(corpus.answer_for("weather"), None);
    Ok(())
}

#[test]
fn test_bundled_dictionary_loads() -> Result<(), Box<dyn std::error::Error>> {
    let dictionary = load_dictionary(data_path("dictionary.json"))?;
    assert_eq!(dictionary.get("返却").map(String::as_str), Some("返品"));
    Ok(())
}

#[test]
fn test_missing_file_is_io_error() {
    let result = Corpus::from_file(data_path("does-not-exist.json"));
    assert!(matches!(result, Err(CorpusError::IoError(_))));
}

#[test]
fn test_encoder_width_is_fixed_for_any_input() -> Result<(), Box<dyn std::error::Error>> {
    let corpus = Corpus::from_file(data_path("faq.json"))?;
    let tokenizer = Arc::new(UnicodeWordTokenizer::new());
    let classifier = Classifier::builder()
        .with_config(EngineConfig {
            strategy: EncodingStrategy::TfIdf,
            epochs: 5,
            ..EngineConfig::default()
        })
        .with_tokenizer(tokenizer.clone())?
        .with_corpus(&corpus)
        .build()?;

    let width = classifier.info().input_width;
    let vocabulary_size = corpus
        .entries()
        .iter()
        .map(|entry| tokenizer.tokenize(&entry.question))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect::<std::collections::HashSet<_>>()
        .len();
    assert_eq!(width, vocabulary_size);

    let long_question = "営業時間は?".repeat(20);
    for text in ["", "?", "カード", long_question.as_str()] {
        assert_eq!(classifier.encode(text)?.len(), width);
    }
    Ok(())
}
