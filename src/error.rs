//! Per-line failure types.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Transport errors whose text matches this are treated as rate limiting.
static RATE_LIMIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)rate[\s_-]?limit|too many requests").expect("valid rate-limit pattern"));

/// Why a single input line produced no audio file.
#[derive(Error, Debug)]
pub enum LineError {
    #[error("line is not valid UTF-8: \"{text}\"")]
    InvalidText { text: String },

    #[error("failed to build request for text \"{text}\": {reason}")]
    RequestConstruction { text: String, reason: String },

    #[error("rate limit exceeded for text \"{text}\": {detail}")]
    RateLimited { text: String, detail: String },

    #[error("failed to get audio data for text \"{text}\": {reason}")]
    Transport { text: String, reason: String },

    #[error("failed to get audio data for text \"{text}\": HTTP status {status}")]
    HttpStatus { text: String, status: u16 },

    #[error("failed to write audio file \"{}\" for text \"{text}\": {source}", path.display())]
    OutputFile {
        text: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LineError {
    /// Classify a transport failure by its message.
    pub fn transport(text: &str, reason: String) -> Self {
        if RATE_LIMIT_PATTERN.is_match(&reason) {
            LineError::RateLimited { text: text.to_string(), detail: reason }
        } else {
            LineError::Transport { text: text.to_string(), reason }
        }
    }

    /// Stable label for logs and the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            LineError::InvalidText { .. } => "invalid_text",
            LineError::RequestConstruction { .. } => "request",
            LineError::RateLimited { .. } => "rate_limited",
            LineError::Transport { .. } => "transport",
            LineError::HttpStatus { .. } => "http_status",
            LineError::OutputFile { .. } => "output_file",
        }
    }

    /// The input text the failure belongs to.
    pub fn text(&self) -> &str {
        match self {
            LineError::InvalidText { text }
            | LineError::RequestConstruction { text, .. }
            | LineError::RateLimited { text, .. }
            | LineError::Transport { text, .. }
            | LineError::HttpStatus { text, .. }
            | LineError::OutputFile { text, .. } => text,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LineError::RateLimited { .. })
    }
}

/// Render an error with its source chain, `outer: inner: innermost`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
