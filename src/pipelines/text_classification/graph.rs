use std::path::Path;

use burn::{
    module::Module,
    record::{FullPrecisionSettings, HalfPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{backend::Backend, Int, Tensor},
};
use tokenizers::Tokenizer;

use crate::models::bert::text_classification::{Model, ModelRecord};

use super::{
    batcher::{Batcher, Infer},
    export::{GraphManifest, WeightPrecision},
    inference::{Forward, Predictor},
    tokenizer,
};

/// Graph Error
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// The manifest could not be read, parsed or written
    #[error("invalid graph manifest: {0}")]
    Manifest(String),

    /// The manifest was written by an incompatible version
    #[error("unsupported graph format version {0}")]
    UnsupportedVersion(u32),

    /// The named inputs or outputs are not the expected ones
    #[error("unexpected graph signature: {0}")]
    Signature(String),

    /// The tokenizer does not match the one the graph was exported with
    #[error("tokenizer has {found} tokens but the graph was exported with {expected}")]
    VocabularyMismatch {
        /// Vocabulary size recorded in the manifest
        expected: usize,
        /// Vocabulary size of the given tokenizer
        found: usize,
    },

    /// The reloaded graph does not reproduce the export-time probe
    #[error("probe logits differ by {max_diff}, more than {tolerance}")]
    ProbeMismatch {
        /// Largest absolute difference found
        max_diff: f32,
        /// Largest difference accepted
        tolerance: f32,
    },

    /// The weights could not be loaded
    #[error("unable to load graph weights: {0}")]
    Weights(String),

    /// An input or output does not have the declared shape
    #[error("shape error: {0}")]
    Shape(String),
}

/// A loaded inference graph, ready to run on backend `B`
pub struct GraphSession<B: Backend> {
    manifest: GraphManifest,
    module: Model<B>,
}

impl<B: Backend> GraphSession<B> {
    /// Load a graph, checking its manifest and the tokenizer it will be fed by
    pub fn load(
        path: impl AsRef<Path>,
        tokenizer: &Tokenizer,
        device: &B::Device,
    ) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let manifest = GraphManifest::load(path)?;

        let found = tokenizer::vocab_size(tokenizer);
        if found != manifest.vocab_size {
            return Err(GraphError::VocabularyMismatch {
                expected: manifest.vocab_size,
                found,
            });
        }

        let weights = manifest.weights_path(path);
        if !weights.is_file() {
            return Err(GraphError::Weights(format!(
                "{} does not exist",
                weights.display()
            )));
        }

        let record: ModelRecord<B> = match manifest.precision {
            WeightPrecision::Full => {
                NamedMpkFileRecorder::<FullPrecisionSettings>::new().load(weights.clone(), device)
            }
            WeightPrecision::Half => {
                NamedMpkFileRecorder::<HalfPrecisionSettings>::new().load(weights.clone(), device)
            }
        }
        .map_err(|e| GraphError::Weights(format!("{}: {}", weights.display(), e)))?;

        let module = manifest.classifier.init::<B>(device).load_record(record);

        Ok(Self { manifest, module })
    }

    /// The manifest the graph was loaded from
    pub fn manifest(&self) -> &GraphManifest {
        &self.manifest
    }

    /// Run the graph on its named inputs and return the `logits` output
    pub fn run(
        &self,
        input_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Result<Tensor<B, 2>, GraphError> {
        let [batch_size, seq_length] = input_ids.dims();

        if attention_mask.dims() != [batch_size, seq_length] {
            return Err(GraphError::Shape(format!(
                "attention_mask is {:?} but input_ids is {:?}",
                attention_mask.dims(),
                [batch_size, seq_length]
            )));
        }

        if seq_length == 0 || seq_length > self.manifest.max_length {
            return Err(GraphError::Shape(format!(
                "sequence length {} is outside 1..={}",
                seq_length, self.manifest.max_length
            )));
        }

        let logits = self.module.infer(Infer {
            input_ids,
            mask_pad: attention_mask.equal_elem(0),
        });

        let num_labels = self.manifest.classifier.num_labels();
        if logits.dims() != [batch_size, num_labels] {
            return Err(GraphError::Shape(format!(
                "logits are {:?}, expected [{}, {}]",
                logits.dims(),
                batch_size,
                num_labels
            )));
        }

        Ok(logits)
    }
}

impl<B: Backend> Forward<B> for GraphSession<B> {
    fn logits(&self, input: Infer<B>) -> anyhow::Result<Tensor<B, 2>> {
        let attention_mask = input.attention_mask();

        Ok(self.run(input.input_ids, attention_mask)?)
    }
}

/// Load the tokenizer from `tokenizer_dir` and the graph at `model_path` into a predictor
pub fn load_predictor<B: Backend>(
    model_path: impl AsRef<Path>,
    tokenizer_dir: impl AsRef<Path>,
    device: &B::Device,
) -> anyhow::Result<Predictor<B, GraphSession<B>>> {
    let model_path = model_path.as_ref();

    let manifest = GraphManifest::load(model_path)?;
    let tokenizer = tokenizer::from_dir(tokenizer_dir, manifest.max_length)?;

    log::info!("Loading inference graph from {}", model_path.display());
    let session = GraphSession::<B>::load(model_path, &tokenizer, device)?;

    let batcher = Batcher::new(tokenizer, &session.manifest().classifier, device.clone());

    Ok(Predictor::new(batcher, session))
}
