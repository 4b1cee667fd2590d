//! ivoice - batch text-to-speech downloader.
//!
//! Reads an input file line by line, asks the veed.io voice preview endpoint to
//! synthesize each line, and stores every clip as `<line>.mp3`. Requests are
//! authenticated with the session cookies of a locally installed browser.

mod batch;
mod config;
mod cookies;
mod error;
mod synth;

use std::fs::{self, File};
use std::io::BufReader;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use batch::{BatchOptions, BatchSummary, Downloader};
use config::AppConfig;
use synth::VeedClient;

/// Read the browser cookies and build the header for the configured domain.
///
/// # Errors
/// Returns an error if the cookie store cannot be located, opened or decrypted.
fn load_cookie_header(config: &AppConfig) -> Result<String> {
    let source = config.cookie_source().context("Failed to locate browser cookie store")?;
    let (header, matched) =
        cookies::load_header(source.as_ref(), &config.cookie_domain).with_context(|| format!("Failed to read cookies from {}", source.name()))?;

    if matched == 0 {
        warn!("No cookies for {} in {}; requests will be anonymous", config.cookie_domain, source.name());
    } else {
        info!("🍪 Loaded {} cookies for {} from {}", matched, config.cookie_domain, source.name());
    }
    Ok(header)
}

/// Run the whole batch and return its summary.
fn run(config: &AppConfig) -> Result<BatchSummary> {
    let cookie_header = load_cookie_header(config)?;
    let client = VeedClient::new(config, cookie_header)?;

    if !config.output_dir.exists() {
        info!("Output directory does not exist, creating {}", config.output_dir.display());
        fs::create_dir_all(&config.output_dir).with_context(|| format!("Failed to create output directory {}", config.output_dir.display()))?;
    }

    let input = File::open(&config.input_file).with_context(|| format!("Failed to open input file {}", config.input_file.display()))?;

    let downloader = Downloader::new(client, BatchOptions::from(config));
    let summary = downloader.run(BufReader::new(input)).with_context(|| format!("Failed to read input file {}", config.input_file.display()))?;

    summary.log();
    if let Some(ref report) = config.report {
        summary.write_json(report)?;
    }

    Ok(summary)
}

fn main() {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🎙️ ivoice v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }
    config.log_config();

    match run(&config) {
        Ok(summary) if summary.is_success() => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            error!("❌ {:#}", e);
            std::process::exit(1);
        }
    }
}
