/// BERT for Text Classification (such as topic classification)
pub mod text_classification;

/// Name prefixes of the checkpoints the BERT encoder can load
pub static FAMILIES: [&str; 2] = ["bert-", "roberta-"];

/// The default pretrained checkpoint
pub static BERT_BASE_UNCASED: &str = "bert-base-uncased";
