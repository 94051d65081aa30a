//! Command line video analysis.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vtag_models::{AnalysisResult, VideoSource};
use vtag_storage::LogMode;
use vtag_worker::{AnalysisOrchestrator, WorkerConfig, WorkerError};

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "vtag-analyze",
    version,
    about = "Summarize, tag and categorize a video with Gemini",
    after_help = "EXAMPLES:\n  \
                  vtag-analyze --file ./clip.mp4\n  \
                  vtag-analyze --s3 --bucket my-bucket --key videos/clip.mp4\n  \
                  vtag-analyze --file ./clip.mp4 --log-mode jsonl --output results.jsonl"
)]
struct Cli {
    /// Local video file to analyze
    #[arg(long, value_name = "PATH", conflicts_with_all = ["s3", "bucket", "key"])]
    file: Option<PathBuf>,

    /// Analyze an object from S3-compatible storage
    #[arg(long)]
    s3: bool,

    /// Bucket name (with --s3)
    #[arg(long)]
    bucket: Option<String>,

    /// Object key (with --s3)
    #[arg(long)]
    key: Option<String>,

    /// Gemini model name
    #[arg(long)]
    model: Option<String>,

    /// Result log path
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Result log format: snapshot or jsonl
    #[arg(long, value_name = "MODE")]
    log_mode: Option<LogMode>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and skip the formatted output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn source(&self) -> Result<VideoSource, String> {
        if let Some(path) = &self.file {
            return Ok(VideoSource::local(path));
        }
        if !self.s3 {
            return Err("either --file or --s3 is required".to_string());
        }
        match (&self.bucket, &self.key) {
            (Some(bucket), Some(key)) => Ok(VideoSource::remote(bucket, key)),
            _ => Err("--s3 requires both --bucket and --key".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let source = match cli.source() {
        Ok(source) => source,
        Err(message) => Cli::command()
            .error(ErrorKind::MissingRequiredArgument, message)
            .exit(),
    };

    dotenvy::dotenv().ok();
    if let Err(e) = init_tracing(&cli) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    match run(&cli, source).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<WorkerError>() {
            Some(WorkerError::Cancelled) => {
                warn!("Interrupted");
                ExitCode::from(EXIT_INTERRUPTED)
            }
            _ => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: &Cli, source: VideoSource) -> anyhow::Result<()> {
    let mut config = WorkerConfig::from_env().context("Failed to load configuration")?;
    if let Some(model) = &cli.model {
        config.gemini.model = model.clone();
    }
    if let Some(output) = &cli.output {
        config.output_path = output.clone();
    }
    if let Some(mode) = cli.log_mode {
        config.log_mode = mode;
    }
    info!(model = %config.gemini.model, output = %config.output_path.display(), "Configuration loaded");

    let orchestrator = AnalysisOrchestrator::from_config(&config)
        .await
        .context("Failed to initialise the analysis pipeline")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    let result = orchestrator
        .analyze_with_cancel(&source, Some(cancel_rx))
        .await?;

    if !cli.quiet {
        print_result(&source, &result)?;
    }
    info!(output = %config.output_path.display(), "Result saved");
    Ok(())
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("vtag={0},vtag_worker={0},vtag_gemini={0},vtag_storage={0},warn", default_level)))
        .context("Invalid log filter")?;

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .try_init()
            .context("Failed to set tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()
            .context("Failed to set tracing subscriber")?;
    }
    Ok(())
}

fn print_result(source: &VideoSource, result: &AnalysisResult) -> anyhow::Result<()> {
    println!("{}", "=".repeat(60));
    println!("Source:   {}", source);
    println!("Summary:  {}", result.summary);
    println!("Tags:     {}", result.tags.join(", "));
    println!("Category: {}", result.category);
    println!("{}", "=".repeat(60));
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
