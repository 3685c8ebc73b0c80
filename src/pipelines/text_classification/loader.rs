use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::tensor::backend::Backend;

use crate::datasets::{news, Split};

use super::{
    batcher::{Batcher, Train},
    config::DataConfig,
};

/// The three splits of a training run
#[derive(Clone)]
pub struct Splits {
    /// Items the model learns from
    pub train: news::Dataset,

    /// Items the best checkpoint is chosen by
    pub valid: news::Dataset,

    /// Items the best checkpoint is evaluated on
    pub test: news::Dataset,
}

impl Splits {
    /// Carve the validation split out of the first `val_size` training items
    ///
    /// With `holdout` the validation items are removed from training, otherwise they stay in both.
    pub fn new(
        train: news::Dataset,
        test: news::Dataset,
        val_size: usize,
        holdout: bool,
    ) -> anyhow::Result<Self> {
        use burn::data::dataset::Dataset as _;

        let valid = train.prefix(val_size);

        let train = if holdout {
            train.skip(val_size)
        } else {
            log::warn!(
                "Validating on the first {} training items, which are also trained on",
                valid.len()
            );
            train
        };

        if train.is_empty() {
            return Err(anyhow!(
                "No training items left after holding out {} validation items",
                valid.len()
            ));
        }

        Ok(Self { train, valid, test })
    }

    /// Load the train and test splits of the configured dataset and derive the validation split
    pub fn load(config: &DataConfig, num_labels: usize) -> anyhow::Result<Self> {
        let train = news::Dataset::load(&config.data_dir, &config.dataset_name, Split::Train)?;
        let test = news::Dataset::load(&config.data_dir, &config.dataset_name, Split::Test)?;

        train.check_labels(num_labels)?;
        test.check_labels(num_labels)?;

        Self::new(train, test, config.val_size, config.holdout_validation)
    }
}

/// A shuffling loader over the training items
pub fn train_loader<B: Backend>(
    batcher: Batcher<B>,
    dataset: news::Dataset,
    config: &DataConfig,
    seed: u64,
) -> Arc<dyn DataLoader<Train<B>>> {
    DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .shuffle(seed)
        .num_workers(config.num_workers.max(1))
        .build(dataset)
}

/// An in-order loader for validation and test items
pub fn eval_loader<B: Backend>(
    batcher: Batcher<B>,
    dataset: news::Dataset,
    config: &DataConfig,
) -> Arc<dyn DataLoader<Train<B>>> {
    DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers.max(1))
        .build(dataset)
}

#[cfg(test)]
mod tests {
    use burn::data::dataset::Dataset as _;
    use pretty_assertions::assert_eq;

    use super::*;

    fn dataset(n: usize) -> news::Dataset {
        news::Dataset::from_items(
            (0..n)
                .map(|i| news::Item::new(format!("item {i}"), i % 4))
                .collect(),
        )
    }

    #[test]
    fn holds_out_the_validation_prefix() {
        let splits = Splits::new(dataset(10), dataset(2), 4, true).unwrap();

        assert_eq!(splits.valid.len(), 4);
        assert_eq!(splits.train.len(), 6);
        assert_eq!(splits.valid.get(0).unwrap().text, "item 0");
        assert_eq!(splits.train.get(0).unwrap().text, "item 4");
    }

    #[test]
    fn can_overlap_validation_with_training() {
        let splits = Splits::new(dataset(10), dataset(2), 4, false).unwrap();

        assert_eq!(splits.valid.len(), 4);
        assert_eq!(splits.train.len(), 10);
    }

    #[test]
    fn clamps_the_validation_size() {
        let splits = Splits::new(dataset(3), dataset(2), 4000, false).unwrap();

        assert_eq!(splits.valid.len(), 3);
        assert!(Splits::new(dataset(3), dataset(2), 4000, true).is_err());
    }
}
