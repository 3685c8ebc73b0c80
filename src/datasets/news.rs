use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use burn::data::dataset::{
    self, source::huggingface::HuggingfaceDatasetLoader, InMemDataset, SqliteDataset,
};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::utils::files::read_file;

use super::{DatasetError, Split};

/// The name of the AG News dataset
pub static DATASET: &str = "ag_news";

/// The class names of the AG News dataset, in label order
pub static AG_NEWS_LABELS: [&str; 4] = ["World", "Sports", "Business", "Sci/Tech"];

/// A labeled news text
#[derive(Clone, Debug, Serialize, Deserialize, new)]
pub struct Item {
    /// The text to classify
    pub text: String,

    /// The class id of the text
    #[serde(alias = "labels")]
    pub label: usize,
}

/// Where the items of a split live
enum Source {
    /// A local CSV export loaded into memory
    InMem(InMemDataset<Item>),

    /// A Hugging Face dataset imported into sqlite by burn
    Hub(SqliteDataset<Item>),
}

impl Source {
    fn get(&self, index: usize) -> Option<Item> {
        match self {
            Source::InMem(dataset) => dataset::Dataset::get(dataset, index),
            Source::Hub(dataset) => dataset::Dataset::get(dataset, index),
        }
    }

    fn len(&self) -> usize {
        match self {
            Source::InMem(dataset) => dataset::Dataset::len(dataset),
            Source::Hub(dataset) => dataset::Dataset::len(dataset),
        }
    }
}

/// A contiguous view over the items of a news dataset split
#[derive(Clone)]
pub struct Dataset {
    /// Shared underlying storage
    source: Arc<Source>,

    /// First item of the view
    start: usize,

    /// One past the last item of the view
    end: usize,
}

/// Implement the Dataset trait for the news dataset
impl dataset::Dataset<Item> for Dataset {
    /// Returns a specific item from the dataset
    fn get(&self, index: usize) -> Option<Item> {
        if index >= self.end - self.start {
            return None;
        }

        self.source.get(self.start + index)
    }

    /// Returns the length of the dataset
    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// The CSV export of a split: `{data_dir}/datasets/{name}/{split}.csv`
pub fn csv_path(data_dir: &str, name: &str, split: Split) -> PathBuf {
    Path::new(data_dir)
        .join("datasets")
        .join(name)
        .join(format!("{}.csv", split.as_str()))
}

impl Dataset {
    fn from_source(source: Source) -> Self {
        let end = source.len();

        Self {
            source: Arc::new(source),
            start: 0,
            end,
        }
    }

    /// Wrap items already in memory
    pub fn from_items(items: Vec<Item>) -> Self {
        Self::from_source(Source::InMem(InMemDataset::new(items)))
    }

    /// Load a split from its local CSV export, or from the Hugging Face hub when there is none
    pub fn load(data_dir: &str, name: &str, split: Split) -> Result<Self, DatasetError> {
        let path = csv_path(data_dir, name, split);

        let source = if path.exists() {
            log::info!("Loading {} split of {} from {}", split.as_str(), name, path.display());

            let reader = csv::ReaderBuilder::new();
            let dataset = InMemDataset::from_csv(&path, &reader).map_err(|e| {
                DatasetError::Unavailable {
                    name: name.to_string(),
                    reason: format!("{}: {}", path.display(), e),
                }
            })?;

            Source::InMem(dataset)
        } else {
            log::info!("Fetching {} split of {} from the Hugging Face hub", split.as_str(), name);

            let dataset = HuggingfaceDatasetLoader::new(name)
                .dataset::<Item>(split.as_str())
                .map_err(|e| DatasetError::Unavailable {
                    name: name.to_string(),
                    reason: format!("{:?}", e),
                })?;

            Source::Hub(dataset)
        };

        Ok(Self::from_source(source))
    }

    /// The first `len` items (or all of them when there are fewer)
    pub fn prefix(&self, len: usize) -> Self {
        let len = len.min(dataset::Dataset::len(self));

        Self {
            source: self.source.clone(),
            start: self.start,
            end: self.start + len,
        }
    }

    /// Every item after the first `len`
    pub fn skip(&self, len: usize) -> Self {
        let len = len.min(dataset::Dataset::len(self));

        Self {
            source: self.source.clone(),
            start: self.start + len,
            end: self.end,
        }
    }

    /// Make sure every label can be predicted by a classifier with `num_labels` classes
    pub fn check_labels(&self, num_labels: usize) -> Result<(), DatasetError> {
        for index in 0..dataset::Dataset::len(self) {
            let Some(item) = dataset::Dataset::get(self, index) else {
                continue;
            };

            if item.label >= num_labels {
                return Err(DatasetError::LabelOutOfRange {
                    index,
                    label: item.label,
                    num_labels,
                });
            }
        }

        Ok(())
    }
}

/// Class names for a dataset
///
/// Read from `{data_dir}/datasets/{name}/labels.txt` (one name per line) when present. AG News
/// falls back to its well-known names, anything else to `LABEL_{i}`.
pub async fn labels(data_dir: &str, name: &str, num_labels: usize) -> anyhow::Result<Vec<String>> {
    let path = Path::new(data_dir).join("datasets").join(name).join("labels.txt");

    let labels: Vec<String> = if path.exists() {
        read_file(&path)
            .await
            .map_err(|e| anyhow!("Unable to read {}: {}", path.display(), e))?
            .into_iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect()
    } else if name == DATASET && num_labels == AG_NEWS_LABELS.len() {
        AG_NEWS_LABELS.iter().map(|label| label.to_string()).collect()
    } else {
        (0..num_labels).map(|i| format!("LABEL_{i}")).collect()
    };

    if labels.len() != num_labels {
        return Err(anyhow!(
            "{} declares {} labels but the model is configured for {}",
            path.display(),
            labels.len(),
            num_labels
        ));
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use burn::data::dataset::Dataset as _;
    use pretty_assertions::assert_eq;

    use super::*;

    fn items(n: usize) -> Dataset {
        Dataset::from_items(
            (0..n)
                .map(|i| Item::new(format!("text {i}"), i % 4))
                .collect(),
        )
    }

    #[test]
    fn prefix_and_skip_partition_the_items() {
        let dataset = items(10);

        let head = dataset.prefix(4);
        let tail = dataset.skip(4);

        assert_eq!(head.len(), 4);
        assert_eq!(tail.len(), 6);
        assert_eq!(head.get(3).unwrap().text, "text 3");
        assert_eq!(tail.get(0).unwrap().text, "text 4");
        assert!(head.get(4).is_none());
    }

    #[test]
    fn prefix_is_clamped() {
        let dataset = items(3);

        assert_eq!(dataset.prefix(4000).len(), 3);
        assert_eq!(dataset.skip(4000).len(), 0);
    }

    #[test]
    fn rejects_labels_out_of_range() {
        let dataset = Dataset::from_items(vec![Item::new("a".into(), 1), Item::new("b".into(), 7)]);

        assert!(dataset.check_labels(8).is_ok());
        assert!(matches!(
            dataset.check_labels(4),
            Err(DatasetError::LabelOutOfRange {
                index: 1,
                label: 7,
                num_labels: 4
            })
        ));
    }

    #[test]
    fn loads_csv_exports() {
        let dir = std::env::temp_dir().join(format!("topic-news-{}", std::process::id()));
        let data_dir = dir.to_string_lossy().to_string();
        let path = csv_path(&data_dir, "tiny", Split::Train);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "text,label\nstocks fell,2\nteam wins,1\n").unwrap();

        let dataset = Dataset::load(&data_dir, "tiny", Split::Train).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0).unwrap().label, 2);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn falls_back_to_known_label_names() {
        let known = labels("missing-data-dir", DATASET, 4).await.unwrap();
        assert_eq!(known, vec!["World", "Sports", "Business", "Sci/Tech"]);

        let generic = labels("missing-data-dir", "other", 2).await.unwrap();
        assert_eq!(generic, vec!["LABEL_0", "LABEL_1"]);
    }
}
