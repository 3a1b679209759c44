//! vidshrink - batch HEVC transcoding
//!
//! Entry point: parses the command line, loads configuration, sets up
//! logging and runs the batch until it finishes or Ctrl-C is pressed.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use vidshrink::batch::BatchRunner;
use vidshrink::cli::Args;
use vidshrink::config::Config;
use vidshrink::error::VidshrinkError;
use vidshrink::logging::{default_log_dir, resolve_level, setup_logging};
use vidshrink::media::TranscoderFactory;

/// Conventional exit status after SIGINT
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<VidshrinkError>() {
            Some(VidshrinkError::Cancelled) => ExitCode::from(EXIT_CANCELLED),
            _ => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.init_config {
        Config::default().save_to_file(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let level = resolve_level(args.debug, &config.engine.log_level)?;
    setup_logging(level, &default_log_dir()?)?;

    let input = args.input.as_deref().context("No input folder given")?;
    info!("Converting videos in {}", input.display());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            on_interrupt.cancel();
        }
    });

    // The spinner fights with debug output for the same terminal lines
    let show_progress = level != Level::DEBUG && std::io::stderr().is_terminal();
    let transcoder = TranscoderFactory::create_transcoder(&config, show_progress);

    let result = BatchRunner::new(&config, transcoder).run(input, &cancel).await?;

    if let Some(report) = &args.report {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(report, json)
            .with_context(|| format!("Failed to write report to {}", report.display()))?;
        info!("Report written to {}", report.display());
    }

    Ok(())
}
