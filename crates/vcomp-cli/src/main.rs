//! vcomp command-line front end.

mod load;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcomp_media::{check_engine, plan, EngineConfig, Executor};
use vcomp_models::CompositionManifest;

#[derive(Debug, Parser)]
#[command(name = "vcomp", version, about = "Compose videos from a JSON manifest with FFmpeg")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the filter graph and FFmpeg arguments without running anything
    Plan {
        /// Composition manifest
        manifest: PathBuf,

        /// Fill undeclared asset metadata with ffprobe
        #[arg(long)]
        probe: bool,
    },

    /// Run a composition and write the result
    Compose {
        /// Composition manifest
        manifest: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Engine timeout in seconds
        #[arg(long, env = "VCOMP_TIMEOUT_SECS")]
        timeout: Option<u64>,

        /// Skip probing inputs for undeclared metadata
        #[arg(long)]
        no_probe: bool,
    },

    /// Print the manifest JSON schema
    Schema,

    /// Check that ffmpeg and ffprobe can be found
    Check,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vcomp=info,vcomp_media=info,vcomp_cli=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = EngineConfig::from_env();

    match cli.command {
        Command::Plan { manifest, probe } => {
            let manifest = load::load_manifest(&manifest).await?;
            let ffprobe = probe.then_some(config.ffprobe_path.as_path());
            let state = load::build_state(manifest, ffprobe).await?;

            let program = plan(&state)?;
            println!("# path: {}", if program.is_delegated() { "single-pass overlay" } else { "full compile" });
            println!("# inputs: {}", program.inputs().len());
            if program.filter_graph().is_empty() {
                println!("# no filter graph");
            } else {
                println!("{}", program.pretty_graph());
            }
            println!("# output args: {}", program.extra_args().join(" "));
        }

        Command::Compose {
            manifest,
            output,
            timeout,
            no_probe,
        } => {
            let mut config = config;
            if let Some(secs) = timeout {
                config = config.with_timeout(Duration::from_secs(secs));
            }
            info!("Engine config: {:?}", config);

            let manifest = load::load_manifest(&manifest).await?;
            let ffprobe = (!no_probe).then_some(config.ffprobe_path.clone());
            let state = load::build_state(manifest, ffprobe.as_deref()).await?;

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received interrupt, cancelling");
                    let _ = cancel_tx.send(true);
                }
            });

            let executor = Executor::new(config).with_cancel(cancel_rx);
            let result = executor.compose(&state).await?;

            tokio::fs::write(&output, result.output.bytes())
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!(
                bytes = result.output.len(),
                processing_time_ms = result.processing_time_ms,
                "Wrote {}",
                output.display()
            );
            println!("{}", serde_json::to_string_pretty(result.output.metadata())?);
        }

        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&CompositionManifest::schema())?);
        }

        Command::Check => {
            let ffmpeg = check_engine(&config.ffmpeg_path)?;
            let ffprobe = check_engine(&config.ffprobe_path)?;
            println!("ffmpeg: {}", ffmpeg.display());
            println!("ffprobe: {}", ffprobe.display());
        }
    }

    Ok(())
}
