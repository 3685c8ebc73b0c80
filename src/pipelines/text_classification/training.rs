use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use burn::{
    backend::Autodiff,
    data::dataloader::DataLoader,
    module::{AutodiffModule, Module},
    optim::AdamWConfig,
    record::{CompactRecorder, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
    train::{
        checkpoint::MetricCheckpointingStrategy,
        metric::{
            store::{Aggregate, Direction, Split},
            LearningRateMetric, LossMetric,
        },
        LearnerBuilder,
    },
};
use tokenizers::Tokenizer;

use crate::{
    backend::{native_devices, NativeBackend},
    models::{self, bert::text_classification::{Config, Model}},
    utils::{hugging_face::download_hf_model, renderer::LogRenderer},
};

use super::{
    artifacts::FineTunedModel,
    batcher::{Batcher, Train},
    config::{Precision, TrainingConfig},
    loader::{eval_loader, train_loader, Splits},
    metrics::{ClassificationInput, ConfusionMatrix, MacroAccuracyMetric, MacroF1Metric},
    tokenizer,
    tracking::Tracker,
};

/// Everything a training run needs, resolved before the learner starts
pub struct Prepared {
    /// The resolved configuration
    pub config: TrainingConfig,

    /// The classifier configuration, labels and max length included
    pub model_config: Config,

    /// Pretrained encoder weights; `None` starts from random weights
    pub pretrained_weights: Option<PathBuf>,

    /// The tokenizer, truncating at the configured max length
    pub tokenizer: Tokenizer,

    /// Train, validation and test items
    pub splits: Splits,
}

/// Loss, macro accuracy and macro F1 over a whole split
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    /// Mean cross-entropy loss per item
    pub loss: f64,

    /// Macro accuracy in [0, 1]
    pub accuracy: f64,

    /// Macro F1 in [0, 1]
    pub f1: f64,

    /// Number of items evaluated
    pub items: u64,
}

/// The outcome of a training run
#[derive(Debug)]
pub struct Trained {
    /// The persisted fine-tuned model
    pub model: FineTunedModel,

    /// The checkpoint the fine-tuned model came from, if one was kept
    pub best_checkpoint: Option<PathBuf>,

    /// The best model scored on the test split
    pub test: EvalReport,
}

/// Download the pretrained checkpoint and tokenizer, read the class names and the dataset
pub async fn prepare(config: TrainingConfig) -> anyhow::Result<Prepared> {
    let model = models::Model::try_from(config.model.name.as_str())?;

    let (config_file, weights_file) = download_hf_model(model.name()).await?;

    let labels = crate::datasets::news::labels(
        &config.data.data_dir,
        &config.data.dataset_name,
        config.model.num_labels,
    )
    .await?;

    let model_config = Config::load_pretrained(
        config_file,
        &labels,
        config.model.hidden_dropout_prob,
        config.data.max_length,
    )?;

    let tokenizer = tokenizer::from_pretrained(model.name(), config.data.max_length)?;

    let vocab_size = tokenizer::vocab_size(&tokenizer);
    if vocab_size > model_config.vocab_size {
        return Err(anyhow!(
            "The {} tokenizer has {} tokens but the model only embeds {}",
            model.name(),
            vocab_size,
            model_config.vocab_size
        ));
    }

    let splits = Splits::load(&config.data, config.model.num_labels)?;

    Ok(Prepared {
        config,
        model_config,
        pretrained_weights: Some(weights_file),
        tokenizer,
        splits,
    })
}

/// Print the configuration, prepare the run and train with the configured precision
pub async fn run(config: TrainingConfig) -> anyhow::Result<Trained> {
    println!("Config:\n{}", config.to_yaml()?);

    let devices = native_devices(config.trainer.accelerator, config.trainer.devices);
    let precision = config.trainer.precision;

    let prepared = prepare(config).await?;

    #[cfg(feature = "tch")]
    let trained = match precision {
        Precision::Full => fit::<Autodiff<NativeBackend>>(devices, prepared),
        Precision::Half => {
            fit::<Autodiff<burn::backend::LibTorch<burn::tensor::f16>>>(devices, prepared)
        }
        Precision::BFloat => {
            fit::<Autodiff<burn::backend::LibTorch<burn::tensor::bf16>>>(devices, prepared)
        }
    }?;

    #[cfg(not(feature = "tch"))]
    let trained = {
        if precision != Precision::Full {
            log::warn!("Precision {} needs the `tch` feature, training in 32 bit", precision);
        }

        fit::<Autodiff<NativeBackend>>(devices, prepared)?
    };

    println!(
        "Best checkpoint: {}",
        trained
            .best_checkpoint
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default()
    );

    Ok(trained)
}

/// Fine-tune, keep the best epoch by validation macro F1, score it on the test split and persist it
pub fn fit<B: AutodiffBackend>(
    devices: Vec<B::Device>, // Devices on which to perform computation (e.g., CPU or CUDA devices)
    prepared: Prepared,
) -> anyhow::Result<Trained> {
    let Prepared {
        config,
        model_config,
        pretrained_weights,
        tokenizer,
        splits,
    } = prepared;

    let device = devices
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("No device available for training"))?;

    B::seed(config.seed);

    let model: Model<B> = match &pretrained_weights {
        Some(weights) => Model::load_from_safetensors(&device, weights, &model_config)?,
        None => {
            log::warn!("No pretrained weights given, starting from random weights");
            model_config.init(&device)
        }
    };

    // Initialize batchers for training and evaluation data
    let batcher_train = Batcher::<B>::new(tokenizer.clone(), &model_config, device.clone());
    let batcher_eval =
        Batcher::<B::InnerBackend>::new(tokenizer.clone(), &model_config, device.clone());

    // Initialize data loaders
    let dataloader_train = train_loader(batcher_train, splits.train, &config.data, config.seed);
    let dataloader_valid = eval_loader(batcher_eval.clone(), splits.valid, &config.data);
    let dataloader_test = eval_loader(batcher_eval, splits.test, &config.data);

    let tracker = Tracker::from_env(&config.logging)?;
    let (logger_train, logger_valid) = tracker.loggers()?;
    tracker.record_hparams(&config.to_yaml()?)?;
    log::info!("Logging metrics to {}", tracker.dir().display());

    let artifact_dir = PathBuf::from(&config.artifacts.dir);
    let checkpoint_dir = artifact_dir.join("checkpoint");

    // Only this run's checkpoints may be picked as the best one
    if checkpoint_dir.exists() {
        std::fs::remove_dir_all(&checkpoint_dir)
            .map_err(|e| anyhow!("Unable to clear {}: {}", checkpoint_dir.display(), e))?;
    }
    std::fs::create_dir_all(&artifact_dir)
        .map_err(|e| anyhow!("Unable to create {}: {}", artifact_dir.display(), e))?;

    // Initialize optimizer
    let optimizer = AdamWConfig::new()
        .with_weight_decay(config.model.weight_decay as f32)
        .init();

    // Initialize learner
    let learner = LearnerBuilder::new(artifact_dir.to_string_lossy().as_ref())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(MacroAccuracyMetric::new())
        .metric_valid_numeric(MacroAccuracyMetric::new())
        .metric_train_numeric(MacroF1Metric::new())
        .metric_valid_numeric(MacroF1Metric::new())
        .metric_train_numeric(LearningRateMetric::new())
        .metric_loggers(logger_train, logger_valid)
        .with_file_checkpointer(CompactRecorder::new())
        .with_checkpointing_strategy(MetricCheckpointingStrategy::new::<
            MacroF1Metric<B::InnerBackend>,
        >(Aggregate::Mean, Direction::Highest, Split::Valid))
        .devices(devices)
        .num_epochs(config.trainer.max_epochs)
        .renderer(LogRenderer::new(config.trainer.log_every_n_steps))
        .build(model, optimizer, config.model.lr);

    // Train the model
    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    let best = best_checkpoint(&checkpoint_dir)?;

    let model = match &best {
        Some((epoch, path)) => {
            log::info!("Loading the best checkpoint from epoch {}", epoch);

            let record = CompactRecorder::new()
                .load(path.with_extension(""), &device)
                .map_err(|e| anyhow!("Unable to load checkpoint {}: {}", path.display(), e))?;

            model_config
                .init::<B::InnerBackend>(&device)
                .load_record(record)
        }
        None => {
            log::warn!("No checkpoint was kept, using the weights of the last epoch");
            model_trained.valid()
        }
    };

    let test = evaluate(&model, dataloader_test);
    log::info!(
        "Test: loss {:.4}, macro accuracy {:.2}%, macro F1 {:.2}% over {} items",
        test.loss,
        100.0 * test.accuracy,
        100.0 * test.f1,
        test.items
    );

    let fine_tuned = FineTunedModel::save(artifact_dir.join("hf"), &model_config, model, &tokenizer)?;

    Ok(Trained {
        model: fine_tuned,
        best_checkpoint: best.map(|(_, path)| path),
        test,
    })
}

/// Score a model over every batch of a loader
pub fn evaluate<B: Backend>(model: &Model<B>, loader: Arc<dyn DataLoader<Train<B>>>) -> EvalReport {
    let mut loss_sum = 0.0;
    let mut matrix = ConfusionMatrix::new(model.n_classes);

    for batch in loader.iter() {
        let output = model.forward(batch);
        let [batch_size, _num_classes] = output.output.dims();

        loss_sum += output.loss.into_scalar().elem::<f64>() * batch_size as f64;

        let input = ClassificationInput {
            outputs: output.output,
            targets: output.targets,
        };
        matrix.merge(&input.confusion_matrix());
    }

    let items = matrix.total();

    EvalReport {
        loss: if items == 0 { 0.0 } else { loss_sum / items as f64 },
        accuracy: matrix.macro_accuracy(),
        f1: matrix.macro_f1(),
        items,
    }
}

/// Find the checkpoint kept by the learner: the `model-{epoch}.mpk` with the highest epoch
pub fn best_checkpoint(dir: &Path) -> anyhow::Result<Option<(usize, PathBuf)>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut best: Option<(usize, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        let epoch = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix("model-"))
            .and_then(|rest| rest.split('.').next())
            .and_then(|epoch| epoch.parse::<usize>().ok());

        if let Some(epoch) = epoch {
            if best.as_ref().map_or(true, |(current, _)| epoch > *current) {
                best = Some((epoch, path));
            }
        }
    }

    Ok(best)
}
