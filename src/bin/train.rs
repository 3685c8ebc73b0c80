//! Command line tool for fine-tuning the news topic classifier

use pico_args::Arguments;
use topic_classifier::pipelines::text_classification::{
    config::{TrainingConfig, DEFAULT_CONFIG_PATH},
    training,
};

const HELP: &str = "\
Usage: train [OPTIONS] [KEY=VALUE ...]

Arguments:
  KEY=VALUE            Override a configuration value (e.g., 'trainer.max_epochs=3')

Options:
  -h, --help           Print help
  -c, --config         The YAML configuration file (defaults to 'configs/config.yaml')
";

#[derive(Debug)]
struct Args {
    config: String,
    overrides: Vec<String>,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let config = pargs
            .opt_value_from_str(["-c", "--config"])?
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let overrides = pargs
            .finish()
            .into_iter()
            .map(|arg| {
                arg.into_string()
                    .map_err(|arg| anyhow::anyhow!("Invalid argument: {:?}", arg))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Some(Args { config, overrides }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);

        return Ok(());
    };

    let config = TrainingConfig::load(&args.config, &args.overrides)?;

    training::run(config).await?;

    Ok(())
}
