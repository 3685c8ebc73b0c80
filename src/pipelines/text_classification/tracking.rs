use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
};

use burn::train::{
    logger::MetricLogger,
    metric::{MetricEntry, NumericEntry},
};

use crate::utils::files::next_version_dir;

use super::config::LoggingConfig;

/// The environment variable enabling external tracking
pub static WANDB_API_KEY: &str = "WANDB_API_KEY";

/// Where a training run records its metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tracker {
    /// Tabular logs under `{save_dir}/runs/version_{n}`
    Local {
        /// The run directory
        dir: PathBuf,
    },

    /// External tracking requested for a project, mirrored under `{save_dir}/{project}/version_{n}`
    Wandb {
        /// The project name
        project: String,
        /// The run directory
        dir: PathBuf,
    },
}

impl Tracker {
    /// Pick the tracker for a run: external only when requested *and* an API key is present
    pub fn select(config: &LoggingConfig, api_key: Option<&str>) -> std::io::Result<Self> {
        let save_dir = Path::new(&config.save_dir);
        let has_key = api_key.is_some_and(|key| !key.trim().is_empty());

        if config.use_wandb && has_key {
            let dir = next_version_dir(&save_dir.join(&config.project))?;

            log::warn!(
                "No Weights & Biases client is available, recording project {} to {}",
                config.project,
                dir.display()
            );

            return Ok(Tracker::Wandb {
                project: config.project.clone(),
                dir,
            });
        }

        if config.use_wandb {
            log::info!("{} is not set, using local tabular logs", WANDB_API_KEY);
        }

        Ok(Tracker::Local {
            dir: next_version_dir(&save_dir.join("runs"))?,
        })
    }

    /// Select the tracker using the `WANDB_API_KEY` environment variable
    pub fn from_env(config: &LoggingConfig) -> std::io::Result<Self> {
        let api_key = std::env::var(WANDB_API_KEY).ok();

        Self::select(config, api_key.as_deref())
    }

    /// The run directory
    pub fn dir(&self) -> &Path {
        match self {
            Tracker::Local { dir } | Tracker::Wandb { dir, .. } => dir,
        }
    }

    /// Create the run directory and a metric logger for each split
    pub fn loggers(&self) -> anyhow::Result<(TabularLogger, TabularLogger)> {
        std::fs::create_dir_all(self.dir())
            .map_err(|e| anyhow!("Unable to create {}: {}", self.dir().display(), e))?;

        let train = TabularLogger::new(self.dir().join("train.csv"))?;
        let valid = TabularLogger::new(self.dir().join("valid.csv"))?;

        Ok((train, valid))
    }

    /// Save the resolved configuration next to the metrics
    pub fn record_hparams(&self, yaml: &str) -> anyhow::Result<()> {
        let path = self.dir().join("hparams.yaml");

        std::fs::write(&path, yaml).map_err(|e| anyhow!("Unable to write {}: {}", path.display(), e))
    }
}

/// A metric logger writing one `epoch,metric,value` row per numeric entry
///
/// Entries are also kept in memory so the learner can read them back when picking the best
/// checkpoint.
pub struct TabularLogger {
    writer: csv::Writer<File>,
    epoch: usize,
    entries: HashMap<(String, usize), Vec<String>>,
}

impl TabularLogger {
    /// Create the CSV file and write its header
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| anyhow!("Unable to create {}: {}", path.display(), e))?;
        writer.write_record(["epoch", "metric", "value"])?;
        writer.flush()?;

        Ok(Self {
            writer,
            epoch: 1,
            entries: HashMap::new(),
        })
    }

    fn write(&mut self, name: &str, value: f64) -> csv::Result<()> {
        self.writer
            .write_record([self.epoch.to_string(), name.to_string(), value.to_string()])
    }
}

impl MetricLogger for TabularLogger {
    fn log(&mut self, item: &MetricEntry) {
        self.entries
            .entry((item.name.clone(), self.epoch))
            .or_default()
            .push(item.serialize.clone());

        let value = match NumericEntry::deserialize(&item.serialize) {
            Ok(NumericEntry::Value(value)) => value,
            Ok(NumericEntry::Aggregated(value, _)) => value,
            Err(_) => return,
        };

        if let Err(e) = self.write(&item.name, value) {
            log::warn!("Unable to record {}: {}", item.name, e);
        }
    }

    fn end_epoch(&mut self, epoch: usize) {
        if let Err(e) = self.writer.flush() {
            log::warn!("Unable to flush metrics for epoch {}: {}", epoch, e);
        }

        self.epoch = epoch + 1;
    }

    fn read_numeric(&mut self, name: &str, epoch: usize) -> Result<Vec<NumericEntry>, String> {
        let Some(entries) = self.entries.get(&(name.to_string(), epoch)) else {
            return Ok(Vec::new());
        };

        entries
            .iter()
            .map(|entry| NumericEntry::deserialize(entry))
            .collect()
    }
}
