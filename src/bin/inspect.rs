#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::prelude::*;

use inspection_client::api::{
    ClientConfig, ConfigService, HttpEvaluationClient, MeteredService, TracingCallSink,
};
use inspection_client::{EvaluationMode, EvaluationSession};

#[derive(Parser)]
#[command(name = "inspect", version, about = "Inspection evaluation client")]
struct Cli {
    /// Evaluation service root, including the API prefix
    #[arg(long, env = "INSPECTION_API_BASE_URL", default_value = "http://127.0.0.1:8000/api")]
    api_base: String,

    /// Request timeout in seconds
    #[arg(long, env = "INSPECTION_API_TIMEOUT_SECONDS", default_value_t = 60)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the available models, detectors and jury roles
    Config {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run several models on the same input and diff their outputs
    Compare {
        /// Model IDs to compare (repeatable or comma-separated)
        #[arg(long = "model", value_delimiter = ',')]
        models: Vec<String>,

        #[command(flatten)]
        eval: EvalArgs,
    },
    /// Have jury roles score the input
    Jury {
        /// Jury roles as "id" or "id:weight" (weight defaults to 1.0)
        #[arg(long = "role", value_delimiter = ',', value_parser = parse_role)]
        roles: Vec<(String, f64)>,

        #[command(flatten)]
        eval: EvalArgs,
    },
}

#[derive(Args)]
struct EvalArgs {
    /// Text to evaluate
    #[arg(long, conflicts_with = "text_file")]
    text: Option<String>,

    /// Read the text to evaluate from a file
    #[arg(long)]
    text_file: Option<PathBuf>,

    /// Detector IDs to switch off (all catalog detectors start enabled)
    #[arg(long = "disable-detector", value_delimiter = ',')]
    disabled_detectors: Vec<String>,

    /// Detector thresholds as "id=value"
    #[arg(long = "threshold", value_parser = parse_threshold)]
    thresholds: Vec<(String, f64)>,

    /// Base URL of the OpenAI-compatible endpoint the service should call
    #[arg(long, env = "INSPECTION_LLM_BASE_URL", default_value = "")]
    llm_base_url: String,

    /// API key for the LLM endpoint
    #[arg(long, env = "INSPECTION_LLM_API_KEY", default_value = "", hide_env_values = true)]
    llm_api_key: String,

    /// Write the result JSON here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

fn parse_role(raw: &str) -> Result<(String, f64), String> {
    match raw.split_once(':') {
        Some((id, weight)) => {
            let weight: f64 = weight
                .trim()
                .parse()
                .map_err(|_| format!("invalid weight in role '{raw}'"))?;
            Ok((id.trim().to_string(), weight))
        }
        None => Ok((raw.trim().to_string(), 1.0)),
    }
}

fn parse_threshold(raw: &str) -> Result<(String, f64), String> {
    let (id, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected id=value, got '{raw}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid threshold in '{raw}'"))?;
    Ok((id.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let config =
        ClientConfig::new(cli.api_base).timeout(Duration::from_secs(cli.timeout_secs));
    let client = Arc::new(MeteredService::new(
        HttpEvaluationClient::with_config(config)?,
        Arc::new(TracingCallSink),
    ));

    match cli.command {
        Commands::Config { out } => {
            let catalog = client.fetch_config().await?;
            write_json(out.as_ref(), &catalog)?;
        }
        Commands::Compare { models, eval } => {
            let session = EvaluationSession::with_client(client);
            session.set_mode(EvaluationMode::Compare);
            session.set_selected_models(models);
            run_evaluation(&session, eval).await?;
        }
        Commands::Jury { roles, eval } => {
            let session = EvaluationSession::with_client(client);
            session.set_mode(EvaluationMode::Jury);
            for (id, weight) in roles {
                session.update_roles(&id, weight, true);
            }
            run_evaluation(&session, eval).await?;
        }
    }

    Ok(())
}

async fn run_evaluation(
    session: &EvaluationSession,
    args: EvalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = match (args.text, args.text_file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => return Err("one of --text or --text-file is required".into()),
    };

    if let Err(err) = session.initialise().await {
        return Err(format!("{}: {err}", session.error_message()).into());
    }

    session.set_input_text(text);
    session.set_llm_base_url(args.llm_base_url);
    session.set_llm_api_key(args.llm_api_key);

    for id in &args.disabled_detectors {
        session.toggle_detector(id, false);
    }
    for (id, threshold) in &args.thresholds {
        if session.detector_selection(id).is_none() {
            tracing::warn!(detector = %id, "ignoring threshold for unknown detector");
        }
        session.update_detector_threshold(id, *threshold);
    }

    match session.submit().await {
        Ok(response) => write_json(args.out.as_ref(), &response),
        Err(_) => Err(session.error_message().into()),
    }
}

fn write_json<T: serde::Serialize>(
    path: Option<&PathBuf>,
    value: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    let rendered = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            let mut file = File::create(path)?;
            writeln!(file, "{rendered}")?;
            eprintln!("[inspect] result written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
