use std::sync::Mutex;

use burn::tensor::{activation::softmax, backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::models::bert::text_classification::Model;

use super::{artifacts::FineTunedModel, batcher::{Batcher, Infer}};

/// Runs the forward pass for a padded batch and returns logits: [batch_size, num_labels]
pub trait Forward<B: Backend>: Send {
    /// Compute class scores for a batch
    fn logits(&self, input: Infer<B>) -> anyhow::Result<Tensor<B, 2>>;
}

impl<B: Backend> Forward<B> for Model<B> {
    fn logits(&self, input: Infer<B>) -> anyhow::Result<Tensor<B, 2>> {
        Ok(self.infer(input))
    }
}

/// Serializes forward passes so a module can be shared between request handlers
pub struct Locked<F>(Mutex<F>);

impl<F> Locked<F> {
    /// Wrap a forward pass
    pub fn new(forward: F) -> Self {
        Self(Mutex::new(forward))
    }
}

impl<B: Backend, F: Forward<B>> Forward<B> for Locked<F> {
    fn logits(&self, input: Infer<B>) -> anyhow::Result<Tensor<B, 2>> {
        let forward = self
            .0
            .lock()
            .map_err(|_| anyhow!("A previous forward pass panicked"))?;

        forward.logits(input)
    }
}

/// A predicted class with the probability of every class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// The most probable class id
    pub pred: usize,

    /// One probability per class, summing to 1
    pub probs: Vec<f32>,
}

/// Turn logits into predictions: softmax over the class dimension, then argmax
pub fn postprocess<B: Backend>(logits: Tensor<B, 2>) -> Vec<Prediction> {
    let [_batch_size, num_labels] = logits.dims();

    let preds = logits
        .clone()
        .argmax(1)
        .flatten::<1>(0, 1)
        .into_data()
        .convert::<i64>()
        .value;

    let probs = softmax(logits, 1).into_data().convert::<f32>().value;

    preds
        .into_iter()
        .zip(probs.chunks(num_labels.max(1)))
        .map(|(pred, probs)| Prediction {
            pred: pred as usize,
            probs: probs.to_vec(),
        })
        .collect()
}

/// Tokenize, run a forward pass and post-process, whatever executes the forward pass
pub struct Predictor<B: Backend, F> {
    batcher: Batcher<B>,
    forward: F,
}

impl<B: Backend, F: Forward<B>> Predictor<B, F> {
    /// Pair a batcher with a forward pass
    pub fn new(batcher: Batcher<B>, forward: F) -> Self {
        Self { batcher, forward }
    }

    /// Split the predictor back into its batcher and forward pass
    pub fn into_parts(self) -> (Batcher<B>, F) {
        (self.batcher, self.forward)
    }

    /// Predict the class of one text
    pub fn predict(&self, text: &str) -> anyhow::Result<Prediction> {
        self.predict_batch(vec![text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow!("The model returned no prediction"))
    }

    /// Predict the class of every text, in order
    pub fn predict_batch(&self, texts: Vec<String>) -> anyhow::Result<Vec<Prediction>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let input = self.batcher.encode(texts)?;
        let logits = self.forward.logits(input)?;

        Ok(postprocess(logits))
    }
}

/// Load a fine-tuned model for direct inference on the given backend
pub fn load_native<B: Backend>(
    model: &FineTunedModel,
    device: &B::Device,
) -> anyhow::Result<Predictor<B, Model<B>>> {
    let config = model.load_config()?;
    let tokenizer = model.load_tokenizer(&config)?;

    log::info!("Loading weights from {}", model.weights_file().display());
    let module = model.load_model::<B>(&config, device)?;

    let batcher = Batcher::new(tokenizer, &config, device.clone());

    Ok(Predictor::new(batcher, module))
}

/// How closely two predictors agree on the same texts
#[derive(Debug, Clone, PartialEq)]
pub struct Agreement {
    /// Number of texts compared
    pub texts: usize,

    /// Indexes of the texts whose predicted class differs
    pub disagreements: Vec<usize>,

    /// Largest absolute difference between two probabilities of the same class
    pub max_prob_diff: f32,
}

impl Agreement {
    /// True when every class matches and no probability differs by more than `tolerance`
    pub fn within(&self, tolerance: f32) -> bool {
        self.disagreements.is_empty() && self.max_prob_diff <= tolerance
    }
}

/// Run two predictors over the same texts and measure how far apart they are
pub fn compare<B1, F1, B2, F2>(
    left: &Predictor<B1, F1>,
    right: &Predictor<B2, F2>,
    texts: &[String],
) -> anyhow::Result<Agreement>
where
    B1: Backend,
    F1: Forward<B1>,
    B2: Backend,
    F2: Forward<B2>,
{
    let left = left.predict_batch(texts.to_vec())?;
    let right = right.predict_batch(texts.to_vec())?;

    let mut agreement = Agreement {
        texts: texts.len(),
        disagreements: Vec::new(),
        max_prob_diff: 0.0,
    };

    for (i, (a, b)) in left.iter().zip(&right).enumerate() {
        if a.pred != b.pred || a.probs.len() != b.probs.len() {
            agreement.disagreements.push(i);
        }

        for (p, q) in a.probs.iter().zip(&b.probs) {
            agreement.max_prob_diff = agreement.max_prob_diff.max((p - q).abs());
        }
    }

    Ok(agreement)
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::{ndarray::NdArrayDevice, NdArray},
        tensor::Data,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    type B = NdArray<f32>;

    #[test]
    fn postprocess_normalizes_and_picks_the_argmax() {
        let logits = Tensor::<B, 2>::from_data(
            Data::<f32, 2>::from([[1.0, 3.0, 0.5, -1.0], [0.0, 0.0, 0.0, 2.0]]),
            &NdArrayDevice::Cpu,
        );

        let predictions = postprocess(logits);

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].pred, 1);
        assert_eq!(predictions[1].pred, 3);

        for prediction in &predictions {
            assert_eq!(prediction.probs.len(), 4);
            let sum: f32 = prediction.probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);

            let max = prediction
                .probs
                .iter()
                .cloned()
                .fold(f32::MIN, f32::max);
            assert_eq!(prediction.probs[prediction.pred], max);
        }
    }

    #[test]
    fn agreement_tolerance() {
        let agreement = Agreement {
            texts: 2,
            disagreements: Vec::new(),
            max_prob_diff: 5e-4,
        };

        assert!(agreement.within(1e-3));
        assert!(!agreement.within(1e-4));
    }

    #[test]
    fn predictions_serialize_as_pred_and_probs() {
        let prediction = Prediction {
            pred: 2,
            probs: vec![0.25, 0.25, 0.5],
        };

        assert_eq!(
            serde_json::to_string(&prediction).unwrap(),
            r#"{"pred":2,"probs":[0.25,0.25,0.5]}"#
        );
    }
}
