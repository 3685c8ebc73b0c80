/// BERT variants
pub mod bert;

/// Supported pretrained model families
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Model {
    /// BERT / RoBERTa checkpoints, identified by their Hugging Face name
    Bert(String),
}

impl Model {
    /// The Hugging Face identifier of the checkpoint
    pub fn name(&self) -> &str {
        match self {
            Model::Bert(name) => name,
        }
    }
}

impl TryFrom<&str> for Model {
    type Error = ModelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Accept namespaced checkpoints such as `google-bert/bert-base-uncased`
        let base = value.rsplit('/').next().unwrap_or(value);

        if bert::FAMILIES.iter().any(|family| base.starts_with(family)) {
            Ok(Self::Bert(value.to_string()))
        } else {
            Err(ModelError::Unknown(value.to_string()))
        }
    }
}

/// Model Error
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// No model found for the given string
    #[error("no model found for {0}")]
    Unknown(String),
}
