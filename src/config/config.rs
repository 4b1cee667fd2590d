//! Application configuration and CLI argument parsing.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cookies::{ChromeCookies, CookieSource, FirefoxCookies};

/// Browser whose cookie store provides the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    /// Google Chrome, default profile (encrypted cookie values)
    #[default]
    Chrome,
    /// Mozilla Firefox, default profile (plaintext cookie values)
    Firefox,
}

impl std::fmt::Display for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Browser::Chrome => write!(f, "chrome"),
            Browser::Firefox => write!(f, "firefox"),
        }
    }
}

/// Batch downloader configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "ivoice")]
#[command(author, version, about = "Download synthesized speech for every line of a text file", long_about = None)]
pub struct AppConfig {
    /// Text file with one utterance per line
    pub input_file: PathBuf,

    /// Directory receiving one .mp3 file per line (created if missing)
    pub output_dir: PathBuf,

    /// Browser whose cookie store holds the logged-in session
    #[arg(long, short = 'b', value_enum, env = "IVOICE_BROWSER", default_value = "chrome")]
    pub browser: Browser,

    /// Cookie database to read instead of the browser's default profile
    #[arg(long, env = "IVOICE_COOKIE_FILE")]
    pub cookie_file: Option<PathBuf>,

    /// Cookie domain to take from the store (exact match, no subdomains)
    #[arg(long, default_value = ".veed.io")]
    pub cookie_domain: String,

    /// Password for Chromium cookie decryption (skips keychain lookup)
    #[arg(long, env = "IVOICE_SAFE_STORAGE_PASSWORD", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub safe_storage_password: Option<String>,

    /// Speech synthesis endpoint
    #[arg(long, short = 'e', env = "IVOICE_ENDPOINT", default_value = "https://www.veed.io/api/v1/subtitles/synthesize/preview")]
    pub endpoint: String,

    /// Voice identifier sent with every request (e.g., zh-CN-XiaoxiaoNeural, en-US-JennyNeural)
    #[arg(long, default_value = "zh-CN-XiaoxiaoNeural")]
    pub voice: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Delay in milliseconds between consecutive requests
    #[arg(long, default_value = "0")]
    pub delay_ms: u64,

    /// Pause in milliseconds after a rate-limited line (0 disables)
    #[arg(long, default_value = "5000")]
    pub rate_limit_pause_ms: u64,

    /// Write a JSON summary of the run to this file
    #[arg(long, short = 'r')]
    pub report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    ///
    /// Usage errors exit with status 1; `--help` and `--version` exit with 0.
    pub fn from_args() -> Self {
        match Self::try_parse() {
            Ok(config) => config,
            Err(e) => {
                let code = if e.use_stderr() { 1 } else { 0 };
                let _ = e.print();
                std::process::exit(code);
            }
        }
    }

    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Inter-request delay as a duration.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Pause after a rate-limited line as a duration.
    pub fn rate_limit_pause(&self) -> Duration {
        Duration::from_millis(self.rate_limit_pause_ms)
    }

    /// Build the cookie source for the configured browser.
    ///
    /// An explicit `--cookie-file` replaces the default profile lookup.
    ///
    /// # Errors
    /// Returns an error if no default profile can be located.
    pub fn cookie_source(&self) -> Result<Box<dyn CookieSource>> {
        let source: Box<dyn CookieSource> = match self.browser {
            Browser::Chrome => {
                let path = match &self.cookie_file {
                    Some(path) => path.clone(),
                    None => ChromeCookies::default_path()?,
                };
                Box::new(ChromeCookies::new(path).with_password(self.safe_storage_password.clone()))
            }
            Browser::Firefox => {
                let path = match &self.cookie_file {
                    Some(path) => path.clone(),
                    None => FirefoxCookies::default_path()?,
                };
                Box::new(FirefoxCookies::new(path))
            }
        };
        Ok(source)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.input_file.is_file() {
            anyhow::bail!("Input file does not exist: {}", self.input_file.display());
        }

        if self.output_dir.exists() && !self.output_dir.is_dir() {
            anyhow::bail!("Output path is not a directory: {}", self.output_dir.display());
        }

        if self.timeout_secs == 0 {
            anyhow::bail!("Request timeout must be positive");
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            anyhow::bail!("Endpoint must be an http(s) URL: {}", self.endpoint);
        }

        if self.cookie_domain.trim().is_empty() {
            anyhow::bail!("Cookie domain must not be empty");
        }

        if !is_voice_id(&self.voice) {
            anyhow::bail!("Voice '{}' is not a locale voice id like zh-CN-XiaoxiaoNeural", self.voice);
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Input file: {}", self.input_file.display());
        info!("  Output directory: {}", self.output_dir.display());
        info!("  Browser: {}", self.browser);
        if let Some(ref cookie_file) = self.cookie_file {
            info!("  Cookie file: {}", cookie_file.display());
        }
        info!("  Cookie domain: {}", self.cookie_domain);
        info!("  Endpoint: {}", self.endpoint);
        info!("  Voice: {}", self.voice);
        info!("  Request timeout: {}s", self.timeout_secs);
        if self.delay_ms > 0 {
            info!("  Delay between requests: {}ms", self.delay_ms);
        }
        info!("  Rate-limit pause: {}ms", self.rate_limit_pause_ms);
        if let Some(ref report) = self.report {
            info!("  Report: {}", report.display());
        }
    }
}

/// `<lang>-<REGION>-<Name>`, the form the service expects.
static VOICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2,3}-[A-Z]{2}(-[A-Za-z]+)?-[A-Za-z0-9]+$").expect("valid voice id pattern"));

fn is_voice_id(voice: &str) -> bool {
    VOICE_ID.is_match(voice)
}
