use std::path::PathBuf;

use hf_hub::api::tokio;

/// The pretrained weights file expected in every model repository
pub static WEIGHTS_FILE: &str = "model.safetensors";

/// The pretrained configuration file expected in every model repository
pub static CONFIG_FILE: &str = "config.json";

/// Download model config and weights from Hugging Face Hub
/// If file exists in cache, it will not be downloaded again
pub async fn download_hf_model(model_name: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
    let api = tokio::Api::new()
        .map_err(|e| anyhow!("Unable to reach the Hugging Face Hub: {}", e))?;
    let repo = api.model(model_name.to_string());

    let model_filepath = repo.get(WEIGHTS_FILE).await.map_err(|e| {
        anyhow!(
            "Failed to download: {} weights with name: {} from HuggingFace Hub: {}",
            model_name,
            WEIGHTS_FILE,
            e
        )
    })?;

    let config_filepath = repo.get(CONFIG_FILE).await.map_err(|e| {
        anyhow!(
            "Failed to download: {} config with name: {} from HuggingFace Hub: {}",
            model_name,
            CONFIG_FILE,
            e
        )
    })?;

    Ok((config_filepath, model_filepath))
}
