use std::marker::PhantomData;

use burn::{
    tensor::{backend::Backend, Int, Tensor},
    train::{
        metric::{
            state::{FormatOptions, NumericMetricState},
            Adaptor, Metric, MetricEntry, MetricMetadata, Numeric,
        },
        ClassificationOutput,
    },
};

/// Counts of (target, prediction) pairs for a fixed number of classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    num_classes: usize,

    /// Row-major: `counts[target * num_classes + pred]`
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    /// An empty matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * num_classes],
        }
    }

    /// Record a batch of predictions against their targets; out-of-range ids are ignored
    pub fn update(&mut self, preds: &[i64], targets: &[i64]) {
        let n = self.num_classes as i64;

        for (&pred, &target) in preds.iter().zip(targets) {
            if (0..n).contains(&pred) && (0..n).contains(&target) {
                self.counts[(target * n + pred) as usize] += 1;
            }
        }
    }

    /// Fold another matrix of the same size into this one
    pub fn merge(&mut self, other: &ConfusionMatrix) {
        for (count, extra) in self.counts.iter_mut().zip(&other.counts) {
            *count += extra;
        }
    }

    /// Total number of recorded pairs
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn count(&self, target: usize, pred: usize) -> u64 {
        self.counts[target * self.num_classes + pred]
    }

    /// (true positives, false positives, false negatives) of a class
    fn outcomes(&self, class: usize) -> (u64, u64, u64) {
        let tp = self.count(class, class);
        let predicted: u64 = (0..self.num_classes).map(|t| self.count(t, class)).sum();
        let actual: u64 = (0..self.num_classes).map(|p| self.count(class, p)).sum();

        (tp, predicted - tp, actual - tp)
    }

    /// Average a per-class score over the classes seen in predictions or targets
    fn macro_average(&self, score: impl Fn(u64, u64, u64) -> f64) -> f64 {
        let scores: Vec<f64> = (0..self.num_classes)
            .map(|class| self.outcomes(class))
            .filter(|(tp, fp, fn_)| tp + fp + fn_ > 0)
            .map(|(tp, fp, fn_)| score(tp, fp, fn_))
            .collect();

        if scores.is_empty() {
            return 0.0;
        }

        scores.iter().sum::<f64>() / scores.len() as f64
    }

    /// Unweighted mean of the per-class recall, in [0, 1]
    pub fn macro_accuracy(&self) -> f64 {
        self.macro_average(|tp, _fp, fn_| ratio(tp, tp + fn_))
    }

    /// Unweighted mean of the per-class F1 score, in [0, 1]
    pub fn macro_f1(&self) -> f64 {
        self.macro_average(|tp, fp, fn_| ratio(2 * tp, 2 * tp + fp + fn_))
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// The input type shared by the macro metrics
pub struct ClassificationInput<B: Backend> {
    /// Logits: [batch_size, num_classes]
    pub outputs: Tensor<B, 2>,

    /// Class ids: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassificationInput<B> {
    /// Confusion matrix of the argmax predictions
    pub fn confusion_matrix(&self) -> ConfusionMatrix {
        let [_batch_size, num_classes] = self.outputs.dims();

        let preds = self
            .outputs
            .clone()
            .argmax(1)
            .flatten::<1>(0, 1)
            .into_data()
            .convert::<i64>()
            .value;
        let targets = self.targets.clone().into_data().convert::<i64>().value;

        let mut matrix = ConfusionMatrix::new(num_classes);
        matrix.update(&preds, &targets);

        matrix
    }
}

impl<B: Backend> Adaptor<ClassificationInput<B>> for ClassificationOutput<B> {
    fn adapt(&self) -> ClassificationInput<B> {
        ClassificationInput {
            outputs: self.output.clone(),
            targets: self.targets.clone(),
        }
    }
}

/// Macro-averaged accuracy (mean per-class recall)
pub struct MacroAccuracyMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> MacroAccuracyMetric<B> {
    /// Creates the metric
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Default for MacroAccuracyMetric<B> {
    fn default() -> Self {
        Self {
            state: NumericMetricState::new(),
            _b: PhantomData,
        }
    }
}

impl<B: Backend> Metric for MacroAccuracyMetric<B> {
    const NAME: &'static str = "Macro Accuracy";

    type Input = ClassificationInput<B>;

    fn update(&mut self, input: &ClassificationInput<B>, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, _num_classes] = input.outputs.dims();
        let accuracy = input.confusion_matrix().macro_accuracy();

        self.state.update(
            100.0 * accuracy,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for MacroAccuracyMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// Macro-averaged F1 score, the metric the best checkpoint is chosen by
pub struct MacroF1Metric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> MacroF1Metric<B> {
    /// Creates the metric
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Default for MacroF1Metric<B> {
    fn default() -> Self {
        Self {
            state: NumericMetricState::new(),
            _b: PhantomData,
        }
    }
}

impl<B: Backend> Metric for MacroF1Metric<B> {
    const NAME: &'static str = "Macro F1";

    type Input = ClassificationInput<B>;

    fn update(&mut self, input: &ClassificationInput<B>, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, _num_classes] = input.outputs.dims();
        let f1 = input.confusion_matrix().macro_f1();

        self.state.update(
            100.0 * f1,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for MacroF1Metric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::{ndarray::NdArrayDevice, NdArray},
        data::dataloader::Progress,
        tensor::Data,
    };

    use super::*;

    type B = NdArray<f32>;

    fn metadata() -> MetricMetadata {
        MetricMetadata {
            progress: Progress {
                items_processed: 3,
                items_total: 3,
            },
            epoch: 1,
            epoch_total: 1,
            iteration: 1,
            lr: None,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn perfect_predictions_score_one() {
        let mut matrix = ConfusionMatrix::new(4);
        matrix.update(&[0, 1, 2, 3, 1], &[0, 1, 2, 3, 1]);

        assert!(close(matrix.macro_accuracy(), 1.0));
        assert!(close(matrix.macro_f1(), 1.0));
    }

    #[test]
    fn scores_a_known_matrix() {
        // class 0: tp 2, fn 1 | class 1: tp 1, fp 2, fn 1 | class 2: tp 0, fp 1, fn 1
        let mut matrix = ConfusionMatrix::new(4);
        matrix.update(&[0, 0, 1, 1, 2, 1], &[0, 0, 0, 1, 1, 2]);

        // recall: class 0 = 2/3, class 1 = 1/2, class 2 = 0; class 3 is absent
        assert!(close(matrix.macro_accuracy(), (2.0 / 3.0 + 0.5 + 0.0) / 3.0));

        // f1: class 0 = 4/5, class 1 = 2/5, class 2 = 0
        let expected_f1 = (4.0 / 5.0 + 2.0 / 5.0 + 0.0) / 3.0;
        assert!(close(matrix.macro_f1(), expected_f1));
    }

    #[test]
    fn empty_matrix_scores_zero() {
        let matrix = ConfusionMatrix::new(4);

        assert_eq!(matrix.macro_accuracy(), 0.0);
        assert_eq!(matrix.macro_f1(), 0.0);
    }

    #[test]
    fn merges_batches() {
        let mut total = ConfusionMatrix::new(2);
        let mut batch = ConfusionMatrix::new(2);
        batch.update(&[0, 1], &[0, 0]);
        total.merge(&batch);
        total.merge(&batch);

        assert_eq!(total.total(), 4);
        assert!(close(total.macro_accuracy(), 0.25));
    }

    #[test]
    fn metric_reports_percentages() {
        let device = NdArrayDevice::Cpu;
        let outputs = Tensor::<B, 2>::from_data(
            Data::<f32, 2>::from([[2.0, 0.1, 0.0], [0.0, 3.0, 0.2], [0.0, 3.0, 0.1]]),
            &device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(Data::<i64, 1>::from([0, 1, 2]), &device);
        let input = ClassificationInput { outputs, targets };

        let mut f1 = MacroF1Metric::<B>::new();
        f1.update(&input, &metadata());

        // class 0 = 1, class 1 = 2/3, class 2 = 0
        assert!((f1.value() - 100.0 * (1.0 + 2.0 / 3.0) / 3.0).abs() < 1e-6);

        let mut accuracy = MacroAccuracyMetric::<B>::new();
        accuracy.update(&input, &metadata());
        assert!((accuracy.value() - 100.0 * 2.0 / 3.0).abs() < 1e-6);

        accuracy.clear();
        assert!(accuracy.value().is_nan() || accuracy.value() == 0.0);
    }
}
