use std::{path::PathBuf, sync::Arc};

use rocket::{fairing::AdHoc, routes, Build, Rocket};

use crate::{
    backend::{graph_device, GraphBackend},
    pipelines::text_classification::{
        export::DEFAULT_GRAPH_PATH,
        graph::{self, GraphSession},
        inference::{Locked, Predictor},
    },
};

/// Request handlers
pub mod routes;

/// The environment variable naming the inference graph
pub static MODEL_PATH: &str = "MODEL_PATH";

/// The environment variable naming the tokenizer directory
pub static TOKENIZER_DIR: &str = "TOKENIZER_DIR";

/// The tokenizer directory used when `TOKENIZER_DIR` is unset
pub static DEFAULT_TOKENIZER_DIR: &str = "artifacts/hf";

/// The predictor shared by every request: the graph forward pass runs one request at a time
pub type ServingPredictor = Predictor<GraphBackend, Locked<GraphSession<GraphBackend>>>;

/// The managed predictor, handed to blocking inference tasks
pub type SharedPredictor = Arc<ServingPredictor>;

/// Artifact locations, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Path of the exported inference graph
    pub model_path: PathBuf,

    /// Directory holding `tokenizer.json`
    pub tokenizer_dir: PathBuf,
}

impl Settings {
    /// Read `MODEL_PATH` and `TOKENIZER_DIR` from the environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the settings with the given variable lookup, falling back to the defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let model_path = lookup(MODEL_PATH).unwrap_or_else(|| DEFAULT_GRAPH_PATH.to_string());
        let tokenizer_dir =
            lookup(TOKENIZER_DIR).unwrap_or_else(|| DEFAULT_TOKENIZER_DIR.to_string());

        Self {
            model_path: PathBuf::from(model_path),
            tokenizer_dir: PathBuf::from(tokenizer_dir),
        }
    }
}

/// Load the tokenizer and the inference graph named by the settings
pub fn load(settings: &Settings) -> anyhow::Result<ServingPredictor> {
    let predictor = graph::load_predictor::<GraphBackend>(
        &settings.model_path,
        &settings.tokenizer_dir,
        &graph_device(),
    )?;

    let (batcher, session) = predictor.into_parts();

    Ok(Predictor::new(batcher, Locked::new(session)))
}

/// The routes, without any predictor: `/predict` answers 503 until one is managed
pub fn build() -> Rocket<Build> {
    rocket::build().mount("/", routes![routes::healthz, routes::predict])
}

/// The service: loads the predictor once at ignition, aborting launch when loading fails
pub fn rocket(settings: Settings) -> Rocket<Build> {
    build().attach(AdHoc::try_on_ignite("Load inference graph", move |rocket| async move {
        let loaded = rocket::tokio::task::spawn_blocking(move || load(&settings)).await;

        match loaded {
            Ok(Ok(predictor)) => {
                log::info!("Inference graph loaded");
                Ok(rocket.manage::<SharedPredictor>(Arc::new(predictor)))
            }
            Ok(Err(e)) => {
                log::error!("Unable to load the inference graph: {:#}", e);
                Err(rocket)
            }
            Err(e) => {
                log::error!("Inference graph loader panicked: {}", e);
                Err(rocket)
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn settings_fall_back_to_defaults() {
        let settings = Settings::from_lookup(|_| None);

        assert_eq!(settings.model_path, PathBuf::from("artifacts/model.graph"));
        assert_eq!(settings.tokenizer_dir, PathBuf::from("artifacts/hf"));
    }

    #[test]
    fn settings_read_the_environment() {
        let settings = Settings::from_lookup(|key| match key {
            "MODEL_PATH" => Some("/models/news.graph".to_string()),
            _ => None,
        });

        assert_eq!(settings.model_path, PathBuf::from("/models/news.graph"));
        assert_eq!(settings.tokenizer_dir, PathBuf::from("artifacts/hf"));
    }
}
