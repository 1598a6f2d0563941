use std::panic;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use coderunner_harness::{Harness, HarnessConfig, core::domain::EvaluationEvent, problems};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coderunner-harness")]
#[command(version, about = "Run and grade Python submissions in an embedded interpreter")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Flags layered over the `CODERUNNER_*` environment.
#[derive(Args)]
struct Overrides {
    /// Python executable
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Execution timeout in milliseconds, 0 disables it
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Reject submissions containing any of these substrings
    #[arg(long, global = true, value_delimiter = ',')]
    restrict: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a submission once and print the result
    Run {
        /// Source file (or - for stdin)
        code: PathBuf,

        /// Input text, one line per `input()` call
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read input text from a file
        #[arg(long)]
        input_file: Option<PathBuf>,
    },

    /// Grade a submission against a problem set
    Check {
        /// Source file (or - for stdin)
        code: PathBuf,

        /// Problem-set JSON file
        #[arg(short, long)]
        examples: PathBuf,

        /// Print one JSON event per line as examples finish
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let config = apply_overrides(HarnessConfig::from_env(), cli.overrides);
    tracing::debug!("Using config: {:?}", config);

    let harness = Harness::new(&config);
    harness.initialize().await?;

    let all_passed = match cli.command {
        Commands::Run {
            code,
            input,
            input_file,
        } => {
            let code = read_source(&code)?;
            let input = match (input, input_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => String::new(),
            };

            let result = harness.run(&code, &input).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            result.is_ok()
        }

        Commands::Check {
            code,
            examples,
            stream,
        } => {
            let code = read_source(&code)?;
            let examples = problems::load(examples)?;

            if stream {
                let mut events = harness.stream(code, examples);
                let mut all_passed = false;
                while let Some(event) = events.next().await {
                    if let EvaluationEvent::Finished(evaluation) = &event {
                        all_passed = evaluation.aggregate.all_passed;
                    }
                    println!("{}", serde_json::to_string(&event)?);
                }
                all_passed
            } else {
                let evaluation = harness.evaluate(&code, &examples).await;
                println!("{}", serde_json::to_string_pretty(&evaluation)?);
                evaluation.aggregate.all_passed
            }
        }
    };

    harness.shutdown().await;
    if !all_passed {
        std::process::exit(1);
    }
    Ok(())
}

fn apply_overrides(mut config: HarnessConfig, overrides: Overrides) -> HarnessConfig {
    if let Some(python) = overrides.python {
        config.python = python;
    }
    if let Some(ms) = overrides.timeout_ms {
        config.execution_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }
    if !overrides.restrict.is_empty() {
        config.restricted_keywords = overrides.restrict;
    }
    config
}

fn read_source(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())
    } else {
        std::fs::read_to_string(path)
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
