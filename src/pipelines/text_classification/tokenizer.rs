use std::path::Path;

use tokenizers::{Tokenizer, TruncationParams};

/// The tokenizer file saved next to the fine-tuned weights
pub static TOKENIZER_FILE: &str = "tokenizer.json";

/// Fetch the tokenizer of a pretrained checkpoint from the Hugging Face hub
pub fn from_pretrained(model_name: &str, max_length: usize) -> anyhow::Result<Tokenizer> {
    let tokenizer = Tokenizer::from_pretrained(model_name, None)
        .map_err(|e| anyhow!("Unable to load the {} tokenizer: {}", model_name, e))?;

    configure(tokenizer, max_length)
}

/// Load the `tokenizer.json` saved in a model directory
pub fn from_dir(dir: impl AsRef<Path>, max_length: usize) -> anyhow::Result<Tokenizer> {
    from_file(dir.as_ref().join(TOKENIZER_FILE), max_length)
}

/// Load a tokenizer file
pub fn from_file(path: impl AsRef<Path>, max_length: usize) -> anyhow::Result<Tokenizer> {
    let path = path.as_ref();

    let tokenizer = Tokenizer::from_file(path)
        .map_err(|e| anyhow!("Unable to load tokenizer from {}: {}", path.display(), e))?;

    configure(tokenizer, max_length)
}

/// Truncate every encoding to `max_length` tokens (special tokens included), never pad
///
/// Padding is left to the batcher so batches are only as long as their longest text.
pub fn configure(mut tokenizer: Tokenizer, max_length: usize) -> anyhow::Result<Tokenizer> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| anyhow!("Unable to configure truncation: {}", e))?;

    tokenizer.with_padding(None);

    Ok(tokenizer)
}

/// Number of distinct token ids, added tokens included
pub fn vocab_size(tokenizer: &Tokenizer) -> usize {
    tokenizer.get_vocab(true).len()
}

/// Word-level tokenizers for tests that must not touch the network
#[doc(hidden)]
pub mod testing {
    use std::str::FromStr;

    use serde_json::json;
    use tokenizers::Tokenizer;

    /// Build a lowercase word-level tokenizer with BERT special tokens: [PAD]=0, [UNK]=1,
    /// [CLS]=2, [SEP]=3, then one id per word
    pub fn word_level(words: &[&str]) -> anyhow::Result<Tokenizer> {
        let mut vocab = json!({ "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3 });
        for (i, word) in words.iter().enumerate() {
            vocab[*word] = json!(i + 4);
        }

        let special = |id: usize, content: &str| {
            json!({
                "id": id,
                "content": content,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            })
        };

        let tokenizer = json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                special(0, "[PAD]"),
                special(1, "[UNK]"),
                special(2, "[CLS]"),
                special(3, "[SEP]")
            ],
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": {
                "type": "BertProcessing",
                "sep": ["[SEP]", 3],
                "cls": ["[CLS]", 2]
            },
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": "[UNK]"
            }
        });

        Tokenizer::from_str(&tokenizer.to_string())
            .map_err(|e| anyhow!("Invalid word-level tokenizer: {}", e))
    }
}
