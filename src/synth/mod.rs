//! Speech synthesis client module.
//!
//! Talks to the veed.io voice preview endpoint using a browser session cookie.

mod client;

use std::io::Read;

use crate::error::LineError;

pub use client::VeedClient;

/// Source of synthesized audio for one line of text.
pub trait SpeechApi {
    /// Request audio for `text` and return the response body on HTTP 200.
    fn fetch(&self, text: &str) -> Result<Box<dyn Read>, LineError>;
}
