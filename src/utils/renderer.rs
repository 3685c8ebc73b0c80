use std::collections::BTreeMap;

use burn::train::renderer::{MetricState, MetricsRenderer, TrainingProgress};

/// A renderer that reports training progress through the `log` facade every N steps
pub struct LogRenderer {
    /// How many training iterations between two progress lines
    every_n_steps: usize,

    /// Latest numeric value of each training metric
    train: BTreeMap<String, f64>,

    /// Latest numeric value of each validation metric
    valid: BTreeMap<String, f64>,
}

impl LogRenderer {
    /// Create a renderer logging every `every_n_steps` training iterations
    pub fn new(every_n_steps: usize) -> Self {
        Self {
            every_n_steps: every_n_steps.max(1),
            train: BTreeMap::new(),
            valid: BTreeMap::new(),
        }
    }

    fn should_log(&self, iteration: usize) -> bool {
        iteration % self.every_n_steps == 0
    }
}

fn record(metrics: &mut BTreeMap<String, f64>, state: MetricState) {
    if let MetricState::Numeric(entry, value) = state {
        metrics.insert(entry.name, value);
    }
}

fn summary(metrics: &BTreeMap<String, f64>) -> String {
    metrics
        .iter()
        .map(|(name, value)| format!("{name}: {value:.4}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl MetricsRenderer for LogRenderer {
    fn update_train(&mut self, state: MetricState) {
        record(&mut self.train, state);
    }

    fn update_valid(&mut self, state: MetricState) {
        record(&mut self.valid, state);
    }

    fn render_train(&mut self, item: TrainingProgress) {
        if !self.should_log(item.iteration) {
            return;
        }

        log::info!(
            "[train] epoch {}/{} step {} ({}/{} items) {}",
            item.epoch,
            item.epoch_total,
            item.iteration,
            item.progress.items_processed,
            item.progress.items_total,
            summary(&self.train)
        );
    }

    fn render_valid(&mut self, item: TrainingProgress) {
        if item.progress.items_processed < item.progress.items_total {
            return;
        }

        log::info!(
            "[valid] epoch {}/{} {}",
            item.epoch,
            item.epoch_total,
            summary(&self.valid)
        );
    }
}
