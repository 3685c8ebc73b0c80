//! Command line tool for classifying a text with the exported inference graph

use pico_args::Arguments;
use topic_classifier::{
    backend::{graph_device, GraphBackend},
    pipelines::text_classification::graph::load_predictor,
    server::Settings,
};

const HELP: &str = "\
Usage: infer_graph --text TEXT [OPTIONS]

Options:
  -h, --help           Print help
  -t, --text           The text to classify
  -m, --model-path     The inference graph (defaults to $MODEL_PATH, then 'artifacts/model.graph')
  -d, --tokenizer-dir  The tokenizer directory (defaults to $TOKENIZER_DIR, then 'artifacts/hf')
";

#[derive(Debug)]
struct Args {
    text: String,
    model_path: Option<String>,
    tokenizer_dir: Option<String>,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            model_path: pargs.opt_value_from_str(["-m", "--model-path"])?,
            tokenizer_dir: pargs.opt_value_from_str(["-d", "--tokenizer-dir"])?,
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

    let mut settings = Settings::from_env();
    if let Some(model_path) = args.model_path {
        settings.model_path = model_path.into();
    }
    if let Some(tokenizer_dir) = args.tokenizer_dir {
        settings.tokenizer_dir = tokenizer_dir.into();
    }

    let predictor = load_predictor::<GraphBackend>(
        &settings.model_path,
        &settings.tokenizer_dir,
        &graph_device(),
    )?;

    let prediction = predictor.predict(&args.text)?;

    println!("{}", serde_json::to_string(&prediction)?);

    Ok(())
}
