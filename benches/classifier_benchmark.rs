use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kotae::{
    Classifier, Corpus, CorpusEntry, Dispatcher, EncodingStrategy, EngineConfig, Tokenize,
    UnicodeWordTokenizer,
};

fn bench_corpus() -> Corpus {
    Corpus::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/data/faq.json")).unwrap()
}

fn setup_benchmark_classifier(strategy: EncodingStrategy) -> Classifier {
    Classifier::builder()
        .with_config(EngineConfig {
            strategy,
            ..EngineConfig::default()
        })
        .with_tokenizer(Arc::new(UnicodeWordTokenizer::new()))
        .unwrap()
        .with_corpus(&bench_corpus())
        .build()
        .unwrap()
}

fn bench_tokenization(c: &mut Criterion) {
    let tokenizer = UnicodeWordTokenizer::new();
    let mut group = c.benchmark_group("Tokenization");

    // Configure sampling
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    group.bench_function("short_text", |b| b.iter(|| {
        tokenizer.tokenize(black_box("営業時間は?")).unwrap()
    }));

    group.bench_function("long_text", |b| b.iter(|| {
        tokenizer.tokenize(black_box(
            "先週注文した商品がまだ届いていないのですが、配送にはどのくらいかかりますか? \
             届かない場合は返品や返金はできますか? Opening hours and shipping costs too, please."
        )).unwrap()
    }));

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("Prediction");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    let strategies = [
        ("tf_idf", EncodingStrategy::TfIdf),
        ("sequence", EncodingStrategy::Sequence { length: 10 }),
    ];

    for (name, strategy) in strategies {
        let classifier = setup_benchmark_classifier(strategy);

        group.bench_function(format!("encode_{}", name), |b| b.iter(|| {
            classifier.encode(black_box("送料はいくらですか?")).unwrap()
        }));

        group.bench_function(format!("predict_{}", name), |b| b.iter(|| {
            classifier.predict(black_box("送料はいくらですか?")).unwrap()
        }));
    }

    let dispatcher = Dispatcher::new(EngineConfig::default());
    tokio_test::block_on(dispatcher.initialize(
        bench_corpus(),
        Arc::new(UnicodeWordTokenizer::new()),
        "bench",
    ))
    .unwrap();
    group.bench_function("dispatch", |b| b.iter(|| {
        dispatcher.classify(black_box("返品できますか?")).unwrap()
    }));

    group.finish();
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("Training");
    group.sample_size(10);
    group.warm_up_time(std::time::Duration::from_secs(1));

    // Scaling with number of intents
    for &count in &[2, 5, 10, 20] {
        let entries = (0..count)
            .flat_map(|i| {
                (0..3).map(move |j| {
                    CorpusEntry::new(
                        format!("question {} variant {}", i, j),
                        format!("answer {}", i),
                        format!("intent_{}", i),
                    )
                })
            })
            .collect();
        let corpus = Corpus::new(entries).unwrap();

        group.bench_function(format!("intents_{}", count), |b| b.iter(|| {
            Classifier::builder()
                .with_tokenizer(Arc::new(UnicodeWordTokenizer::new()))
                .unwrap()
                .with_corpus(black_box(&corpus))
                .build()
                .unwrap()
        }));
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_tokenization,
    bench_prediction,
    bench_training
);
criterion_main!(benches);
