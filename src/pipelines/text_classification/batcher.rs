use burn::{
    data::dataloader,
    nn::attention::generate_padding_mask,
    tensor::{backend::Backend, Bool, Data, ElementConversion, Int, Tensor},
};
use derive_new::new;
use tokenizers::Tokenizer;

use crate::{datasets::news::Item, models::bert::text_classification::Config};

/// An inference batch for text classification
#[derive(Debug, Clone, new)]
pub struct Infer<B: Backend> {
    /// Token ids as 2D tensor: [batch_size, seq_length]
    pub input_ids: Tensor<B, 2, Int>,

    /// Padding mask for the token ids, true at padding locations
    pub mask_pad: Tensor<B, 2, Bool>,
}

impl<B: Backend> Infer<B> {
    /// The attention mask in its integer form: 1 for real tokens, 0 for padding
    pub fn attention_mask(&self) -> Tensor<B, 2, Int> {
        self.mask_pad.clone().bool_not().int()
    }
}

/// A training batch for text classification
#[derive(Clone, Debug, new)]
pub struct Train<B: Backend> {
    /// Bert Model input
    pub input: Infer<B>,

    /// Class ids for the batch
    pub labels: Tensor<B, 1, Int>,
}

/// Struct for batching text classification items
#[derive(Clone)]
pub struct Batcher<B: Backend> {
    /// Tokenizer for converting text to token IDs
    tokenizer: Tokenizer,

    /// Maximum sequence length for tokenized text
    max_seq_length: usize,

    /// ID of the padding token
    pad_token_id: usize,

    /// Device on which to perform computation (e.g., CPU or CUDA device)
    device: B::Device,
}

impl<B: Backend> Batcher<B> {
    /// Creates a new batcher
    pub fn new(tokenizer: Tokenizer, config: &Config, device: B::Device) -> Self {
        Self {
            tokenizer,
            max_seq_length: config.max_length(),
            pad_token_id: config.pad_token_id,
            device,
        }
    }

    /// Convert texts to token ids, special tokens included
    pub fn tokenize(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<usize>>> {
        texts
            .into_iter()
            .map(|text| {
                let tokens = self
                    .tokenizer
                    .encode(text, true)
                    .map_err(|e| anyhow!("Unable to encode text: {}", e))?;

                Ok(tokens.get_ids().iter().map(|t| *t as usize).collect())
            })
            .collect()
    }

    /// Pad token ids to the longest sequence of the batch
    pub fn pad(&self, token_ids: Vec<Vec<usize>>) -> Infer<B> {
        let padding = generate_padding_mask(
            self.pad_token_id,
            token_ids,
            Some(self.max_seq_length),
            &self.device,
        );

        Infer {
            input_ids: padding.tensor,
            mask_pad: padding.mask,
        }
    }

    /// Tokenize and pad texts into an inference batch
    pub fn encode(&self, texts: Vec<String>) -> anyhow::Result<Infer<B>> {
        Ok(self.pad(self.tokenize(texts)?))
    }
}

/// Implement Batcher trait for Batcher struct for training
impl<B: Backend> dataloader::batcher::Batcher<Item, Train<B>> for Batcher<B> {
    /// Collects a vector of text classification items into a training batch
    fn batch(&self, items: Vec<Item>) -> Train<B> {
        let batch_size = items.len();

        let mut texts = Vec::with_capacity(batch_size);
        let mut class_id_list = Vec::with_capacity(batch_size);

        for item in items {
            class_id_list.push(Tensor::from_data(
                Data::from([(item.label as i64).elem()]),
                &self.device,
            ));
            texts.push(item.text);
        }

        let input = self.encode(texts).expect("unable to encode");

        let labels = Tensor::cat(class_id_list, 0);

        // Create and return training batch
        Train { input, labels }
    }
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::{ndarray::NdArrayDevice, NdArray},
        data::dataloader::batcher::Batcher as _,
    };
    use pretty_assertions::assert_eq;

    use crate::pipelines::text_classification::tokenizer::{configure, testing};

    use super::*;

    type B = NdArray<f32>;

    fn batcher(max_length: usize) -> Batcher<B> {
        let tokenizer = configure(
            testing::word_level(&["stocks", "rally", "team", "wins", "again"]).unwrap(),
            max_length,
        )
        .unwrap();

        Batcher {
            tokenizer,
            max_seq_length: max_length,
            pad_token_id: 0,
            device: NdArrayDevice::Cpu,
        }
    }

    #[test]
    fn pads_to_the_longest_sequence() {
        let batch = batcher(16)
            .encode(vec!["stocks".to_string(), "team wins again".to_string()])
            .unwrap();

        assert_eq!(batch.input_ids.dims(), [2, 5]);

        let mask = batch.attention_mask().into_data().convert::<i64>().value;
        assert_eq!(mask, vec![1, 1, 1, 0, 0, 1, 1, 1, 1, 1]);

        let ids = batch.input_ids.into_data().convert::<i64>().value;
        assert_eq!(&ids[..5], &[2, 4, 3, 0, 0]);
    }

    #[test]
    fn caps_sequences_at_max_length() {
        let long = vec!["stocks rally"; 30].join(" ");

        let batch = batcher(8).encode(vec![long, "team".to_string()]).unwrap();

        assert_eq!(batch.input_ids.dims(), [2, 8]);
    }

    #[test]
    fn keeps_every_label() {
        let items = vec![
            Item::new("stocks rally".to_string(), 2),
            Item::new("team wins".to_string(), 1),
            Item::new("again".to_string(), 3),
        ];

        let batch: Train<B> = batcher(16).batch(items);

        assert_eq!(batch.input.input_ids.dims()[0], 3);
        assert_eq!(
            batch.labels.into_data().convert::<i64>().value,
            vec![2, 1, 3]
        );
    }
}
