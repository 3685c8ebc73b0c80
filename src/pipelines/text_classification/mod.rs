//! Fine-tune, export and run a sequence classifier over news texts

/// Hierarchical training configuration
pub mod config;

/// Tokenizer loading and truncation
pub mod tokenizer;

/// Batcher
pub mod batcher;

/// Train, validation and test dataloaders
pub mod loader;

/// Macro accuracy and macro F1
pub mod metrics;

/// Experiment tracking
pub mod tracking;

/// The fine-tuned model directory
pub mod artifacts;

/// Training
pub mod training;

/// Static inference graph export
pub mod export;

/// Static inference graph execution
pub mod graph;

/// Inference
pub mod inference;

/// Name of the pipeline
pub static PIPELINE: &str = "text-classification";

pub use artifacts::FineTunedModel;
pub use batcher::Batcher;
pub use config::TrainingConfig;
pub use export::{export, GraphManifest};
pub use graph::{GraphError, GraphSession};
pub use inference::{Forward, Locked, Prediction, Predictor};
pub use training::{fit, prepare, run};
