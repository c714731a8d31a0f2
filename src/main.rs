use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use kotae::classifier::DEFAULT_SEQUENCE_LENGTH;
use kotae::{
    corpus, ClassifyOutcome, Corpus, Dispatcher, EncodingStrategy, EngineConfig, ModelStore,
    PretrainedTokenizer, SubstitutingTokenizer, Tokenize, UnicodeWordTokenizer,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    Tfidf,
    Sequence,
}

#[derive(Parser)]
#[command(author, version, about = "Answer FAQ questions from stdin", long_about = None)]
struct Args {
    /// FAQ corpus (JSON)
    #[arg(short, long)]
    corpus: PathBuf,

    /// Phrase substitution dictionary applied before tokenizing (JSON object)
    #[arg(short, long)]
    dictionary: Option<PathBuf>,

    /// HuggingFace tokenizer.json; defaults to Unicode word segmentation
    #[arg(short, long)]
    tokenizer: Option<PathBuf>,

    /// Engine config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feature encoding, overriding the config file
    #[arg(short, long, value_enum)]
    strategy: Option<Strategy>,

    /// Key the trained model is stored under
    #[arg(short, long, default_value = "faq")]
    key: String,

    /// Model store directory (defaults to $KOTAE_CACHE or the platform cache dir)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Discard any stored model and retrain
    #[arg(short, long)]
    fresh: bool,
}

fn load_tokenizer(args: &Args) -> Result<Arc<dyn Tokenize>> {
    let dictionary = match &args.dictionary {
        Some(path) => Some(
            corpus::load_dictionary(path)
                .with_context(|| format!("loading dictionary {}", path.display()))?,
        ),
        None => None,
    };

    let tokenizer: Arc<dyn Tokenize> = match (&args.tokenizer, dictionary) {
        (Some(path), Some(dictionary)) => Arc::new(SubstitutingTokenizer::new(
            PretrainedTokenizer::from_file(path)?,
            dictionary,
        )),
        (Some(path), None) => Arc::new(PretrainedTokenizer::from_file(path)?),
        (None, Some(dictionary)) => Arc::new(SubstitutingTokenizer::new(UnicodeWordTokenizer::new(), dictionary)),
        (None, None) => Arc::new(UnicodeWordTokenizer::new()),
    };
    Ok(tokenizer)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    match args.strategy {
        Some(Strategy::Tfidf) => config.strategy = EncodingStrategy::TfIdf,
        Some(Strategy::Sequence) => {
            config.strategy = EncodingStrategy::Sequence { length: DEFAULT_SEQUENCE_LENGTH }
        }
        None => {}
    }

    let corpus = Corpus::from_file(&args.corpus)
        .with_context(|| format!("loading corpus {}", args.corpus.display()))?;
    let tokenizer = load_tokenizer(&args)?;

    let store = match &args.store_dir {
        Some(dir) => ModelStore::new(dir)?,
        None => ModelStore::new_default()?,
    };
    if args.fresh {
        info!("Fresh training requested - removing stored model '{}'", args.key);
        store.remove(&args.key)?;
    }

    let start_time = Instant::now();
    let dispatcher = Dispatcher::new(config).with_store(store);
    dispatcher.initialize(corpus, tokenizer, &args.key).await?;
    if let Some(classifier) = dispatcher.classifier() {
        let info = classifier.info();
        info!(
            "Ready in {:.2?}: {} intents, {:?} model, {}",
            start_time.elapsed(),
            info.num_classes,
            info.origin,
            info.shape
        );
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        match dispatcher.classify(&line)? {
            ClassifyOutcome::Answered(prediction) => {
                writeln!(
                    stdout,
                    "{}\t[{} {:.1}%]",
                    prediction.answer,
                    prediction.intent,
                    prediction.confidence * 100.0
                )?;
            }
            ClassifyOutcome::Failed { answer, reason } => {
                eprintln!("classification failed: {}", reason);
                writeln!(stdout, "{}", answer)?;
            }
            ClassifyOutcome::Skipped => continue,
        }
        stdout.flush()?;
    }

    Ok(())
}
