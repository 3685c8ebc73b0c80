mod common;

use std::{collections::BTreeMap, path::Path};

use burn::backend::{ndarray::NdArrayDevice, Autodiff};
use pretty_assertions::assert_eq;
use topic_classifier::{
    backend::{graph_device, GraphBackend},
    datasets::news,
    pipelines::text_classification::{
        artifacts::FineTunedModel,
        config::TrainingConfig,
        export::{export, WeightPrecision},
        graph,
        loader::Splits,
        training::{best_checkpoint, fit, Prepared},
    },
};

fn prepared(dir: &Path, max_epochs: usize) -> Prepared {
    let mut config = TrainingConfig::new();
    config.seed = 7;
    config.model.lr = 1e-3;
    config.data.batch_size = 4;
    config.data.num_workers = 1;
    config.data.val_size = 4;
    config.trainer.max_epochs = max_epochs;
    config.trainer.log_every_n_steps = 1;
    config.logging.save_dir = dir.join("logs").to_string_lossy().to_string();
    config.artifacts.dir = dir.join("artifacts").to_string_lossy().to_string();

    let splits = Splits::new(
        news::Dataset::from_items(common::items(4)),
        news::Dataset::from_items(common::items(2)),
        config.data.val_size,
        config.data.holdout_validation,
    )
    .unwrap();

    Prepared {
        config,
        model_config: common::tiny_config(),
        pretrained_weights: None,
        tokenizer: common::news_tokenizer(),
        splits,
    }
}

/// Mean of each epoch's rows for one metric of a tabular log
fn metric_by_epoch(path: &Path, metric: &str) -> BTreeMap<usize, f64> {
    let mut rows: BTreeMap<usize, Vec<f64>> = BTreeMap::new();

    let mut reader = csv::Reader::from_path(path).unwrap();
    for record in reader.records() {
        let record = record.unwrap();
        if &record[1] == metric {
            rows.entry(record[0].parse().unwrap())
                .or_default()
                .push(record[2].parse().unwrap());
        }
    }

    rows.into_iter()
        .map(|(epoch, values)| (epoch, values.iter().sum::<f64>() / values.len() as f64))
        .collect()
}

#[test]
fn fine_tunes_exports_and_predicts() {
    let dir = common::scratch("pipeline");
    let prepared = prepared(&dir, 1);

    let trained = fit::<Autodiff<common::B>>(vec![NdArrayDevice::Cpu], prepared).unwrap();

    assert_eq!(trained.test.items, 8);
    assert!((0.0..=1.0).contains(&trained.test.f1));
    assert!(trained
        .best_checkpoint
        .as_ref()
        .is_some_and(|path| path.ends_with("checkpoint/model-1.mpk")));
    assert_eq!(trained.model.dir(), dir.join("artifacts").join("hf"));
    assert!(FineTunedModel::open(trained.model.dir()).is_ok());

    let logs = dir.join("logs").join("runs").join("version_0");
    assert!(logs.join("valid.csv").is_file());
    assert!(logs.join("hparams.yaml").is_file());

    let graph_path = dir.join("artifacts").join("model.graph");
    export(&trained.model, &graph_path, WeightPrecision::Full).unwrap();

    let predictor =
        graph::load_predictor::<GraphBackend>(&graph_path, trained.model.dir(), &graph_device())
            .unwrap();
    let prediction = predictor.predict("the stock market rallied today").unwrap();

    assert!(prediction.pred < 4);
    assert_eq!(prediction.probs.len(), 4);
    assert!((prediction.probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn keeps_only_the_epoch_with_the_best_validation_f1() {
    let dir = common::scratch("best-epoch");

    let trained = fit::<Autodiff<common::B>>(vec![NdArrayDevice::Cpu], prepared(&dir, 3)).unwrap();

    let valid = dir.join("logs").join("runs").join("version_0").join("valid.csv");
    let f1 = metric_by_epoch(&valid, "Macro F1");
    assert_eq!(f1.keys().cloned().collect::<Vec<_>>(), vec![1, 2, 3]);

    let kept: Vec<usize> = std::fs::read_dir(dir.join("artifacts").join("checkpoint"))
        .unwrap()
        .filter_map(|entry| {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            name.strip_prefix("model-")
                .and_then(|rest| rest.strip_suffix(".mpk"))
                .and_then(|epoch| epoch.parse().ok())
        })
        .collect();
    assert_eq!(kept.len(), 1, "checkpoints kept: {:?}", kept);

    let best = f1.values().cloned().fold(f64::MIN, f64::max);
    assert_eq!(f1[&kept[0]], best, "validation F1 by epoch: {:?}", f1);

    let (epoch, _path) = best_checkpoint(&dir.join("artifacts").join("checkpoint"))
        .unwrap()
        .unwrap();
    assert_eq!(epoch, kept[0]);
    assert!(trained
        .best_checkpoint
        .is_some_and(|path| path.ends_with(format!("model-{}.mpk", kept[0]))));

    std::fs::remove_dir_all(dir).unwrap();
}
