use std::{fmt::Display, path::Path, str::FromStr};

use burn::LearningRate;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::{backend::Accelerator, models::bert::BERT_BASE_UNCASED};

/// The default configuration file read by the training binary
pub static DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Pretrained model and optimizer settings
#[derive(burn::config::Config)]
pub struct ModelConfig {
    /// Hugging Face checkpoint to fine-tune (e.g., "bert-base-uncased")
    #[config(default = "BERT_BASE_UNCASED.to_string()")]
    pub name: String,

    /// Number of classes
    #[config(default = 4)]
    pub num_labels: usize,

    /// Learning rate
    #[config(default = 5e-5)]
    pub lr: LearningRate,

    /// AdamW weight decay
    #[config(default = 0.01)]
    pub weight_decay: f64,

    /// Dropout rate
    #[config(default = 0.1)]
    pub hidden_dropout_prob: f64,
}

/// Dataset and dataloader settings
#[derive(burn::config::Config)]
pub struct DataConfig {
    /// The dataset to use (e.g., "ag_news")
    #[config(default = "crate::datasets::news::DATASET.to_string()")]
    pub dataset_name: String,

    /// The location of the top-level data directory
    #[config(default = "\"data\".to_string()")]
    pub data_dir: String,

    /// Maximum number of tokens per text
    #[config(default = 128)]
    pub max_length: usize,

    /// Batch size
    #[config(default = 16)]
    pub batch_size: usize,

    /// Number of training items used for validation
    #[config(default = 4000)]
    pub val_size: usize,

    /// Whether the validation items are removed from the training items
    #[config(default = true)]
    pub holdout_validation: bool,

    /// Number of dataloader workers
    #[config(default = "default_num_workers()")]
    pub num_workers: usize,
}

/// Learner settings
#[derive(burn::config::Config)]
pub struct TrainerConfig {
    /// Number of epochs
    #[config(default = 1)]
    pub max_epochs: usize,

    /// Number of devices to train on
    #[config(default = 1)]
    pub devices: usize,

    /// Hardware to train on
    #[config(default = "Accelerator::Auto")]
    pub accelerator: Accelerator,

    /// Floating point precision
    #[config(default = "Precision::Full")]
    pub precision: Precision,

    /// How often training progress is logged
    #[config(default = 50)]
    pub log_every_n_steps: usize,
}

/// Experiment tracking settings
#[derive(burn::config::Config)]
pub struct LoggingConfig {
    /// Track the run externally when `WANDB_API_KEY` is also set
    #[config(default = false)]
    pub use_wandb: bool,

    /// Project name for external tracking
    #[config(default = "\"topic-classifier\".to_string()")]
    pub project: String,

    /// Root directory of the run logs
    #[config(default = "\"logs\".to_string()")]
    pub save_dir: String,
}

/// Output locations
#[derive(burn::config::Config)]
pub struct ArtifactsConfig {
    /// Directory receiving checkpoints, the fine-tuned model and the exported graph
    #[config(default = "\"artifacts\".to_string()")]
    pub dir: String,
}

/// Define configuration struct for the experiment
#[derive(burn::config::Config)]
pub struct TrainingConfig {
    /// Seed for the backend and dataloader random number generators
    #[config(default = 42)]
    pub seed: u64,

    /// Pretrained model and optimizer settings
    #[config(default = "ModelConfig::new()")]
    pub model: ModelConfig,

    /// Dataset and dataloader settings
    #[config(default = "DataConfig::new()")]
    pub data: DataConfig,

    /// Learner settings
    #[config(default = "TrainerConfig::new()")]
    pub trainer: TrainerConfig,

    /// Experiment tracking settings
    #[config(default = "LoggingConfig::new()")]
    pub logging: LoggingConfig,

    /// Output locations
    #[config(default = "ArtifactsConfig::new()")]
    pub artifacts: ArtifactsConfig,
}

fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl TrainingConfig {
    /// Read a YAML file over the defaults, then apply `dotted.key=value` overrides
    pub fn load(path: impl AsRef<Path>, overrides: &[String]) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_yaml(&yaml, overrides)
    }

    /// Parse YAML over the defaults, then apply `dotted.key=value` overrides
    pub fn from_yaml(yaml: &str, overrides: &[String]) -> Result<Self, ConfigError> {
        let mut value = serde_yaml::to_value(TrainingConfig::new())?;

        let file: Value = serde_yaml::from_str(yaml)?;
        if !file.is_null() {
            merge(&mut value, file);
        }

        for item in overrides {
            apply_override(&mut value, item)?;
        }

        Ok(serde_yaml::from_value(value)?)
    }

    /// The resolved configuration as YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Recursively merge `overlay` into `base`, mappings key by key and everything else by replacement
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_override(root: &mut Value, item: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidOverride(item.to_string());

    let (key, raw) = item.split_once('=').ok_or_else(invalid)?;
    let path: Vec<&str> = key.trim().split('.').collect();

    if path.iter().any(|segment| segment.is_empty()) {
        return Err(invalid());
    }

    // Values are YAML scalars: `8`, `true`, `5e-5` and plain strings all parse
    let value = serde_yaml::from_str::<Value>(raw)
        .unwrap_or_else(|_| Value::String(raw.to_string()));

    let mut node = root;
    for segment in &path {
        let mapping: &mut Mapping = node.as_mapping_mut().ok_or_else(invalid)?;
        node = mapping.get_mut(*segment).ok_or_else(invalid)?;
    }

    *node = value;

    Ok(())
}

/// Floating point precision used by the native backend
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PrecisionRepr", into = "String")]
pub enum Precision {
    /// 32 bit floats
    Full,
    /// 16 bit floats
    Half,
    /// 16 bit brain floats
    BFloat,
}

/// Precision as written in YAML: either `32` or a name such as `16-mixed`
#[derive(Deserialize)]
#[serde(untagged)]
enum PrecisionRepr {
    Bits(u32),
    Name(String),
}

impl TryFrom<PrecisionRepr> for Precision {
    type Error = ConfigError;

    fn try_from(value: PrecisionRepr) -> Result<Self, Self::Error> {
        match value {
            PrecisionRepr::Bits(bits) => bits.to_string().parse(),
            PrecisionRepr::Name(name) => name.parse(),
        }
    }
}

impl FromStr for Precision {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "32" | "32-true" | "fp32" => Ok(Precision::Full),
            "16" | "16-mixed" | "fp16" => Ok(Precision::Half),
            "bf16" | "bf16-mixed" => Ok(Precision::BFloat),
            other => Err(ConfigError::UnknownPrecision(other.to_string())),
        }
    }
}

impl Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Precision::Full => "32",
            Precision::Half => "16-mixed",
            Precision::BFloat => "bf16-mixed",
        };

        write!(f, "{}", name)
    }
}

impl From<Precision> for String {
    fn from(precision: Precision) -> Self {
        precision.to_string()
    }
}

/// Config Error
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("unable to read {path}: {source}")]
    Read {
        /// The file path
        path: String,
        /// The underlying error
        source: std::io::Error,
    },

    /// The configuration is not valid YAML or does not match the expected shape
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An override is not of the form `known.key=value`
    #[error("invalid override {0}, expected an existing key.path=value")]
    InvalidOverride(String),

    /// No precision found for the given string
    #[error("unknown precision {0}, expected 32, 16-mixed or bf16-mixed")]
    UnknownPrecision(String),
}
