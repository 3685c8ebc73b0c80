//! HTTP service answering topic predictions from the exported inference graph

use pico_args::Arguments;
use topic_classifier::server::{self, Settings};

const HELP: &str = "\
Usage: serve

Serves GET /healthz and POST /predict. The graph and tokenizer are read from $MODEL_PATH
(defaults to 'artifacts/model.graph') and $TOKENIZER_DIR (defaults to 'artifacts/hf'). The bind
address comes from $ROCKET_ADDRESS, $ROCKET_PORT or Rocket.toml.

Options:
  -h, --help           Print help
";

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);

        return Ok(());
    }

    pretty_env_logger::init();

    let settings = Settings::from_env();
    log::info!(
        "Serving {} with the tokenizer in {}",
        settings.model_path.display(),
        settings.tokenizer_dir.display()
    );

    server::rocket(settings)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
