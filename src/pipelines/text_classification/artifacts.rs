use std::path::{Path, PathBuf};

use burn::{
    config::Config as _,
    module::Module,
    record::{CompactRecorder, Recorder},
    tensor::backend::Backend,
};
use tokenizers::Tokenizer;

use crate::models::bert::text_classification::{Config, Model};

use super::tokenizer::{self, TOKENIZER_FILE};

/// The classifier configuration file of a fine-tuned model
pub static CONFIG_FILE: &str = "config.json";

/// The weights file of a fine-tuned model, without the extension added by the recorder
pub static WEIGHTS_STEM: &str = "model";

/// A fine-tuned model on disk: `config.json`, `model.mpk` and `tokenizer.json` in one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FineTunedModel {
    dir: PathBuf,
}

impl FineTunedModel {
    /// Open an existing fine-tuned model directory, checking every file is present
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let model = Self { dir: dir.into() };

        for path in [
            model.config_path(),
            model.weights_file(),
            model.tokenizer_path(),
        ] {
            if !path.is_file() {
                return Err(anyhow!(
                    "{} is not a fine-tuned model directory: missing {}",
                    model.dir.display(),
                    path.display()
                ));
            }
        }

        Ok(model)
    }

    /// Persist a classifier with its configuration and tokenizer
    pub fn save<B: Backend>(
        dir: impl Into<PathBuf>,
        config: &Config,
        model: Model<B>,
        tokenizer: &Tokenizer,
    ) -> anyhow::Result<Self> {
        let model_dir = Self { dir: dir.into() };

        std::fs::create_dir_all(&model_dir.dir)
            .map_err(|e| anyhow!("Unable to create {}: {}", model_dir.dir.display(), e))?;

        config
            .save(model_dir.config_path())
            .map_err(|e| anyhow!("Unable to save the model config: {}", e))?;

        CompactRecorder::new()
            .record(model.into_record(), model_dir.weights_path())
            .map_err(|e| anyhow!("Unable to save the model weights: {}", e))?;

        tokenizer
            .save(model_dir.tokenizer_path(), false)
            .map_err(|e| anyhow!("Unable to save the tokenizer: {}", e))?;

        log::info!("Saved fine-tuned model to {}", model_dir.dir.display());

        Ok(model_dir)
    }

    /// The model directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the classifier configuration
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Path handed to the recorder, which appends the `.mpk` extension
    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_STEM)
    }

    /// Path of the weights file as written on disk
    pub fn weights_file(&self) -> PathBuf {
        self.weights_path().with_extension("mpk")
    }

    /// Path of the tokenizer
    pub fn tokenizer_path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load the classifier configuration
    pub fn load_config(&self) -> anyhow::Result<Config> {
        Config::load(self.config_path())
            .map_err(|e| anyhow!("Unable to load config file: {}", e))
    }

    /// Load the tokenizer, truncating at the length the model was trained with
    pub fn load_tokenizer(&self, config: &Config) -> anyhow::Result<Tokenizer> {
        tokenizer::from_file(self.tokenizer_path(), config.max_length())
    }

    /// Load the trained weights on the given device
    pub fn load_model<B: Backend>(&self, config: &Config, device: &B::Device) -> anyhow::Result<Model<B>> {
        let record = CompactRecorder::new()
            .load(self.weights_path(), device)
            .map_err(|e| anyhow!("Unable to load trained model weights: {}", e))?;

        Ok(config.init::<B>(device).load_record(record))
    }
}
