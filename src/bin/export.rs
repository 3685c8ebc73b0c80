//! Command line tool for exporting a fine-tuned model to a static inference graph

use pico_args::Arguments;
use topic_classifier::pipelines::text_classification::{
    artifacts::FineTunedModel,
    export::{export, WeightPrecision, DEFAULT_GRAPH_PATH},
};

const HELP: &str = "\
Usage: export [OPTIONS]

Options:
  -h, --help           Print help
  -m, --model-dir      The fine-tuned model directory (defaults to 'artifacts/hf')
  -o, --output         Where to write the graph (defaults to 'artifacts/model.graph')
  --half               Store the weights in half precision
";

#[derive(Debug)]
struct Args {
    model_dir: String,
    output: String,
    half: bool,
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
            output: pargs
                .opt_value_from_str(["-o", "--output"])?
                .unwrap_or_else(|| DEFAULT_GRAPH_PATH.to_string()),
            half: pargs.contains("--half"),
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

    let precision = if args.half {
        WeightPrecision::Half
    } else {
        WeightPrecision::Full
    };

    let model = FineTunedModel::open(&args.model_dir)?;
    let manifest = export(&model, &args.output, precision)?;

    println!(
        "Exported {} classes ({:?} precision) to {}",
        manifest.classifier.num_labels(),
        manifest.precision,
        args.output
    );

    Ok(())
}
