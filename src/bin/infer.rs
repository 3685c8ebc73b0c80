//! Command line tool for classifying a text with the fine-tuned model

use pico_args::Arguments;
use topic_classifier::{
    backend::{native_device, Accelerator, NativeBackend},
    pipelines::text_classification::{artifacts::FineTunedModel, inference::load_native},
};

const HELP: &str = "\
Usage: infer --text TEXT [OPTIONS]

Options:
  -h, --help           Print help
  -t, --text           The text to classify
  -m, --model-dir      The fine-tuned model directory (defaults to 'artifacts/hf')
  -a, --accelerator    The device to run on: 'auto', 'cpu', 'cuda' or 'mps' (defaults to 'auto')
";

#[derive(Debug)]
struct Args {
    text: String,
    model_dir: String,
    accelerator: Accelerator,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            model_dir: pargs
                .opt_value_from_str(["-m", "--model-dir"])?
                .unwrap_or_else(|| "artifacts/hf".to_string()),
            accelerator: pargs
                .opt_value_from_str(["-a", "--accelerator"])?
                .unwrap_or(Accelerator::Auto),
            text: pargs.value_from_str(["-t", "--text"]).map_err(|e| match e {
                pico_args::Error::MissingOption(_) => {
                    anyhow::anyhow!("Missing required option: --text")
                }
                _ => anyhow::anyhow!("{}", e),
            })?,
        };

        Ok(Some(args))
    }
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);

        return Ok(());
    };

    let device = native_device(args.accelerator);
    let model = FineTunedModel::open(&args.model_dir)?;
    let predictor = load_native::<NativeBackend>(&model, &device)?;

    let prediction = predictor.predict(&args.text)?;

    println!("{}", serde_json::to_string(&prediction)?);

    Ok(())
}
