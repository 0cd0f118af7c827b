//! Converts one document into an SOP step list printed as JSON on stdout.
//!
//! Pipeline failures still print a (single-step) list and exit 0; only bad
//! arguments exit non-zero.

use clap::{Parser, error::ErrorKind};
use sop_gateway::config::PipelineConfig;
use sop_gateway::services::llm;
use sop_gateway::services::pipeline::{self, DocumentRequest};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str = "Usage: process-document <file_path> <mime_type> [custom_prompt_file]";

#[derive(Parser)]
#[command(name = "process-document")]
#[command(about = "Generate SOP steps from a document", long_about = None)]
struct Cli {
    /// Document to process
    file_path: PathBuf,

    /// MIME type reported for the document
    mime_type: String,

    /// File whose contents replace the default generation instructions
    custom_prompt_file: Option<PathBuf>,

    #[arg(hide = true)]
    extra: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => {
            println!("{}", serde_json::json!({ "error": USAGE }));
            std::process::exit(1);
        }
    };

    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = PipelineConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!("{}; using default LLM settings", e);
        PipelineConfig::default()
    });
    let provider = llm::create_provider(&config);

    let request = DocumentRequest {
        file_path: cli.file_path,
        mime_type: cli.mime_type,
        custom_prompt_file: cli.custom_prompt_file,
    };
    let steps = pipeline::run(&request, provider.as_ref()).await;

    println!("{}", serde_json::to_string(&steps)?);
    Ok(())
}
