use std::path::Path;

use bert_burn::{
    data::BertInferenceBatch,
    model::{BertModel, BertModelOutput},
};
use burn::{
    module::{ConstantRecord, Module},
    nn::{loss::CrossEntropyLossConfig, Linear, LinearConfig, LinearRecord},
    tensor::{backend::Backend, Tensor},
    train::ClassificationOutput,
};
use derive_new::new;

use crate::pipelines::text_classification::batcher::{Infer, Train};

use super::Config;

/// BERT for Text Classification
#[derive(Module, Debug, new)]
pub struct Model<B: Backend> {
    /// The base BERT model
    pub model: BertModel<B>,

    /// Linear layer for sequence classification
    pub output: Linear<B>,

    /// Total number of classes
    pub n_classes: usize,
}

/// Define model behavior
impl<B: Backend> Model<B> {
    /// Load the pretrained encoder from safetensors and attach a freshly initialized head
    pub fn load_from_safetensors(
        device: &B::Device,
        model_file: impl AsRef<Path>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let n_classes = config.num_labels();
        if n_classes == 0 {
            return Err(anyhow::anyhow!(
                "Classes are not defined in the model configuration"
            ));
        }

        let model_file = model_file.as_ref();
        if !model_file.exists() {
            return Err(anyhow!(
                "Pretrained weights not found at {}",
                model_file.display()
            ));
        }

        // Initialize the linear output
        let output = LinearConfig::new(config.hidden_size, n_classes).init(device);

        let model = config.init(device).load_record(ModelRecord {
            model: BertModel::from_safetensors(
                model_file.to_path_buf(),
                device,
                config.get_bert_config(),
            ),
            output: LinearRecord {
                weight: output.weight,
                bias: output.bias,
            },
            n_classes: ConstantRecord::new(),
        });

        Ok(model)
    }

    /// Class scores for the first token of every sequence: [batch_size, n_classes]
    fn logits(&self, input: Infer<B>) -> Tensor<B, 2> {
        let [batch_size, _seq_length] = input.input_ids.dims();

        let BertModelOutput {
            pooled_output,
            hidden_states,
        } = self.model.forward(BertInferenceBatch {
            tokens: input.input_ids,
            mask_pad: input.mask_pad,
        });

        self.output
            .forward(pooled_output.unwrap_or(hidden_states))
            .slice([0..batch_size, 0..1])
            .reshape([batch_size, self.n_classes])
    }

    /// Defines forward pass for training
    pub fn forward(&self, item: Train<B>) -> ClassificationOutput<B> {
        let device = &self.devices()[0];
        let targets = item.labels.to_device(device);

        let output = self.logits(item.input);

        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput {
            loss,
            output,
            targets,
        }
    }

    /// Defines forward pass for inference, returning raw logits
    pub fn infer(&self, input: Infer<B>) -> Tensor<B, 2> {
        self.logits(input)
    }
}
