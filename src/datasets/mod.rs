/// News topic datasets (AG News and compatible CSV exports)
pub mod news;

/// A dataset split which can be loaded
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Split {
    /// The training split
    Train,
    /// The held-out test split
    Test,
}

impl Split {
    /// Get the name used for this split on disk and on the hub
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl TryFrom<&str> for Split {
    type Error = DatasetError;

    /// Try to convert a string to a Split
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            _ => Err(DatasetError::UnknownSplit(value.to_string())),
        }
    }
}

/// Dataset Error
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// No split found for the given string
    #[error("no dataset split found for {0}")]
    UnknownSplit(String),

    /// The dataset could not be read from disk or fetched from the hub
    #[error("unable to load dataset {name}: {reason}")]
    Unavailable {
        /// The dataset name
        name: String,
        /// What went wrong
        reason: String,
    },

    /// An item carries a label the classifier cannot predict
    #[error("label {label} of item {index} is out of range for {num_labels} classes")]
    LabelOutOfRange {
        /// Index of the offending item
        index: usize,
        /// The label found
        label: usize,
        /// Number of classes of the classifier
        num_labels: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_splits() {
        assert_eq!(Split::try_from("train").unwrap(), Split::Train);
        assert_eq!(Split::try_from("test").unwrap().as_str(), "test");
        assert!(matches!(
            Split::try_from("validation"),
            Err(DatasetError::UnknownSplit(_))
        ));
    }
}
