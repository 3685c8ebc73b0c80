#![allow(dead_code)]

use std::{collections::BTreeMap, path::PathBuf};

use burn::backend::{ndarray::NdArrayDevice, NdArray};
use tokenizers::Tokenizer;
use topic_classifier::{
    datasets::news::Item,
    models::bert::text_classification::Config,
    pipelines::text_classification::{artifacts::FineTunedModel, tokenizer},
};

pub type B = NdArray<f32>;

pub const MAX_LENGTH: usize = 16;

pub const LABELS: [&str; 4] = ["World", "Sports", "Business", "Sci/Tech"];

pub const WORDS: [&str; 24] = [
    "the", "a", "today", "election", "minister", "summit", "war", "team", "match", "season",
    "coach", "goal", "stock", "market", "rallied", "shares", "profit", "bank", "software",
    "chip", "space", "internet", "launch", "research",
];

/// A fresh directory under the system temp dir, unique to this process
pub fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("topic-it-{}-{}", name, std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A lowercase word-level tokenizer truncating at `MAX_LENGTH`
pub fn word_tokenizer(words: &[&str]) -> Tokenizer {
    let tokenizer = tokenizer::testing::word_level(words).unwrap();

    tokenizer::configure(tokenizer, MAX_LENGTH).unwrap()
}

/// The tokenizer shared by the fixtures
pub fn news_tokenizer() -> Tokenizer {
    word_tokenizer(&WORDS)
}

/// A one-layer BERT small enough to train in a test
pub fn tiny_config() -> Config {
    let id2label: BTreeMap<usize, String> = LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| (i, label.to_string()))
        .collect();

    Config::new(2, 1, 1e-12, 8, 16, 32, 32, 2, 0.0, "bert".to_string(), 0, id2label)
        .with_max_seq_len(Some(MAX_LENGTH))
        .with_with_pooling_layer(Some(true))
}

/// Persist a randomly initialized classifier with the fixture tokenizer
pub fn random_model(dir: PathBuf) -> FineTunedModel {
    let config = tiny_config();
    let model = config.init::<B>(&NdArrayDevice::Cpu);

    FineTunedModel::save(dir, &config, model, &news_tokenizer()).unwrap()
}

/// Texts exercising every class, an unknown word and an over-long input
pub fn fixture_texts() -> Vec<String> {
    vec![
        "the minister arrived at the summit".to_string(),
        "the team won the match".to_string(),
        "the stock market rallied today".to_string(),
        "a space launch for internet research".to_string(),
        "an unseen headline".to_string(),
        vec!["stock market"; 20].join(" "),
    ]
}

/// Labeled items, cycling through the classes
pub fn items(per_class: usize) -> Vec<Item> {
    let texts = [
        ["the election summit", "the minister war", "a war today"],
        ["the team match", "a coach goal season", "the season goal"],
        ["the stock market rallied", "bank profit shares", "shares rallied today"],
        ["software chip research", "a space launch", "internet software launch"],
    ];

    (0..per_class)
        .flat_map(|i| {
            texts
                .iter()
                .enumerate()
                .map(move |(label, texts)| Item::new(texts[i % texts.len()].to_string(), label))
        })
        .collect()
}
