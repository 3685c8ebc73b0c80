use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, HalfPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::{
    backend::{graph_device, GraphBackend},
    models::bert::text_classification::Config,
};

use super::{
    artifacts::FineTunedModel,
    batcher::Batcher,
    graph::{GraphError, GraphSession},
    inference::Forward,
    tokenizer,
};

/// Version of the manifest layout written by this crate
pub const FORMAT_VERSION: u32 = 1;

/// The text traced through the model at export time
pub static PROBE_TEXT: &str = "hello world";

/// Where the exported graph is written by default
pub static DEFAULT_GRAPH_PATH: &str = "artifacts/model.graph";

/// Name of the token id input
pub static INPUT_IDS: &str = "input_ids";

/// Name of the attention mask input
pub static ATTENTION_MASK: &str = "attention_mask";

/// Name of the class score output
pub static LOGITS: &str = "logits";

/// One dimension of a graph tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dim {
    /// A size fixed at export time
    Fixed(usize),

    /// A named size chosen per call (e.g., "batch")
    Dynamic(String),
}

/// Name and shape of a graph input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    /// Tensor name
    pub name: String,

    /// Tensor dimensions
    pub dims: Vec<Dim>,
}

impl TensorSpec {
    fn new(name: &str, dims: Vec<Dim>) -> Self {
        Self {
            name: name.to_string(),
            dims,
        }
    }
}

/// Precision of the stored graph weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightPrecision {
    /// 32 bit floats
    Full,
    /// 16 bit floats
    Half,
}

impl WeightPrecision {
    /// Largest logit difference accepted by the export self-check
    pub fn tolerance(&self) -> f32 {
        match self {
            WeightPrecision::Full => 1e-3,
            WeightPrecision::Half => 5e-2,
        }
    }
}

/// The logits the probe text produced at export time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    /// The traced text
    pub text: String,

    /// One logit per class
    pub logits: Vec<f32>,

    /// Largest difference accepted when replaying the probe
    pub tolerance: f32,
}

/// Everything needed to run the exported graph, stored as JSON next to its weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphManifest {
    /// Manifest layout version
    pub format_version: u32,

    /// Named inputs: `input_ids` and `attention_mask`, both [batch, sequence]
    pub inputs: Vec<TensorSpec>,

    /// Named outputs: `logits`, [batch, num_labels]
    pub outputs: Vec<TensorSpec>,

    /// The classifier architecture and labels
    pub classifier: Config,

    /// Longest accepted sequence
    pub max_length: usize,

    /// Vocabulary size of the tokenizer the model was trained with
    pub vocab_size: usize,

    /// Precision of the stored weights
    pub precision: WeightPrecision,

    /// Weights file name, relative to the manifest
    pub weights: String,

    /// Export-time probe replayed by the self-check
    pub probe: Probe,
}

impl GraphManifest {
    /// The signature every graph exposes
    pub fn signature(num_labels: usize) -> (Vec<TensorSpec>, Vec<TensorSpec>) {
        let batch = || Dim::Dynamic("batch".to_string());
        let sequence = || Dim::Dynamic("sequence".to_string());

        let inputs = vec![
            TensorSpec::new(INPUT_IDS, vec![batch(), sequence()]),
            TensorSpec::new(ATTENTION_MASK, vec![batch(), sequence()]),
        ];
        let outputs = vec![TensorSpec::new(LOGITS, vec![batch(), Dim::Fixed(num_labels)])];

        (inputs, outputs)
    }

    /// Read a manifest and check it can be executed by this crate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();

        let file = std::fs::File::open(path)
            .map_err(|e| GraphError::Manifest(format!("{}: {}", path.display(), e)))?;
        let manifest: GraphManifest = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| GraphError::Manifest(format!("{}: {}", path.display(), e)))?;

        manifest.validate()?;

        Ok(manifest)
    }

    /// Write the manifest as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let path = path.as_ref();

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| GraphError::Manifest(e.to_string()))?;

        std::fs::write(path, json)
            .map_err(|e| GraphError::Manifest(format!("{}: {}", path.display(), e)))
    }

    /// Check the version and signature
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.format_version != FORMAT_VERSION {
            return Err(GraphError::UnsupportedVersion(self.format_version));
        }

        let (inputs, outputs) = Self::signature(self.classifier.num_labels());
        if self.inputs != inputs || self.outputs != outputs {
            return Err(GraphError::Signature(format!(
                "expected inputs {:?} and outputs {:?}",
                inputs, outputs
            )));
        }

        if self.probe.logits.len() != self.classifier.num_labels() {
            return Err(GraphError::Signature(format!(
                "the probe has {} logits for {} classes",
                self.probe.logits.len(),
                self.classifier.num_labels()
            )));
        }

        Ok(())
    }

    /// Path of the weights file, resolved against the manifest location
    pub fn weights_path(&self, manifest_path: &Path) -> PathBuf {
        manifest_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.weights)
    }
}

/// Export a fine-tuned model to a static inference graph at `output`
///
/// The weights land next to the manifest with the `.mpk` extension. The written graph is reloaded
/// on the graph backend and the probe replayed before returning.
pub fn export(
    model: &FineTunedModel,
    output: impl AsRef<Path>,
    precision: WeightPrecision,
) -> anyhow::Result<GraphManifest> {
    let output = output.as_ref();

    if output.extension().is_some_and(|ext| ext == "mpk") {
        return Err(anyhow!(
            "The graph path {} would be overwritten by its own weights file",
            output.display()
        ));
    }

    let device = graph_device();

    let config = model.load_config()?;
    let tokenizer = model.load_tokenizer(&config)?;
    let module = model.load_model::<GraphBackend>(&config, &device)?;

    // Trace the probe to fix the output shape
    let batcher = Batcher::<GraphBackend>::new(tokenizer.clone(), &config, device);
    let probe_input = batcher.encode(vec![PROBE_TEXT.to_string()])?;
    let logits = module.logits(probe_input)?;

    let [batch_size, num_labels] = logits.dims();
    if batch_size != 1 || num_labels != config.num_labels() {
        return Err(GraphError::Shape(format!(
            "probe produced [{}, {}], expected [1, {}]",
            batch_size,
            num_labels,
            config.num_labels()
        ))
        .into());
    }
    let probe_logits = logits.into_data().convert::<f32>().value;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Unable to create {}: {}", parent.display(), e))?;
    }

    // The recorder replaces the manifest extension with `.mpk`
    let record = module.into_record();
    match precision {
        WeightPrecision::Full => NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .record(record, output.to_path_buf()),
        WeightPrecision::Half => NamedMpkFileRecorder::<HalfPrecisionSettings>::new()
            .record(record, output.to_path_buf()),
    }
    .map_err(|e| anyhow!("Unable to write graph weights: {}", e))?;

    let weights = output
        .with_extension("mpk")
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| anyhow!("Invalid graph path {}", output.display()))?;

    let (inputs, outputs) = GraphManifest::signature(config.num_labels());

    let manifest = GraphManifest {
        format_version: FORMAT_VERSION,
        inputs,
        outputs,
        max_length: config.max_length(),
        vocab_size: tokenizer::vocab_size(&tokenizer),
        classifier: config,
        precision,
        weights,
        probe: Probe {
            text: PROBE_TEXT.to_string(),
            logits: probe_logits,
            tolerance: precision.tolerance(),
        },
    };

    manifest.save(output)?;

    verify(output, &tokenizer)?;

    log::info!("Exported inference graph to {}", output.display());

    Ok(manifest)
}

/// Reload a written graph on the graph backend and replay its probe
pub fn verify(path: &Path, tokenizer: &tokenizers::Tokenizer) -> Result<(), GraphError> {
    let session = GraphSession::<GraphBackend>::load(path, tokenizer, &graph_device())?;
    let manifest = session.manifest();

    let batcher = Batcher::<GraphBackend>::new(tokenizer.clone(), &manifest.classifier, graph_device());
    let input = batcher
        .encode(vec![manifest.probe.text.clone()])
        .map_err(|e| GraphError::Shape(e.to_string()))?;

    let logits = session.run(input.input_ids.clone(), input.attention_mask())?;
    let replayed = logits.into_data().convert::<f32>().value;

    let max_diff = manifest
        .probe
        .logits
        .iter()
        .zip(&replayed)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f32, f32::max);

    if replayed.len() != manifest.probe.logits.len() || max_diff > manifest.probe.tolerance {
        return Err(GraphError::ProbeMismatch {
            max_diff,
            tolerance: manifest.probe.tolerance,
        });
    }

    Ok(())
}
