//! Blocking HTTP client for the voice preview endpoint.

use std::io::Read;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Request};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER, USER_AGENT};
use tracing::{debug, info};

use super::SpeechApi;
use crate::config::AppConfig;
use crate::error::{LineError, error_chain};

const USER_AGENT_VALUE: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36";
const ACCEPT_LANGUAGE_VALUE: &str = "zh-CN,zh;q=0.9,ca;q=0.8,en;q=0.7";
const SEC_CH_UA: &str = "\"Google Chrome\";v=\"111\", \"Not(A:Brand\";v=\"8\", \"Chromium\";v=\"111\"";

/// Client for the voice preview endpoint.
/// The service only answers requests that look like they come from the logged-in browser tab.
pub struct VeedClient {
    http: Client,          // Blocking reqwest client with request timeout
    endpoint: String,      // Full endpoint URL without query
    voice: String,         // Voice identifier query parameter
    authority: String,     // Host[:port] of the endpoint
    referer: String,       // Origin of the endpoint with trailing slash
    cookie_header: String, // Browser session cookies
}

impl VeedClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `config` - Application configuration
    /// * `cookie_header` - Cookie header built from the browser store
    ///
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL or the HTTP client cannot be built.
    pub fn new(config: &AppConfig, cookie_header: String) -> Result<Self> {
        let url = reqwest::Url::parse(&config.endpoint).with_context(|| format!("Invalid endpoint URL: {}", config.endpoint))?;
        let host = url.host_str().context("Endpoint URL has no host")?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let referer = format!("{}://{}/", url.scheme(), authority);

        let http = Client::builder().timeout(config.timeout()).build().context("Failed to create HTTP client")?;

        info!("Using endpoint {} with voice {}", config.endpoint, config.voice);

        Ok(Self { http, endpoint: config.endpoint.clone(), voice: config.voice.clone(), authority, referer, cookie_header })
    }

    /// Build the GET request for one line of text.
    pub fn build_request(&self, text: &str) -> Result<Request, LineError> {
        let url = format!("{}?text={}&voice={}", self.endpoint, urlencoding::encode(text), urlencoding::encode(&self.voice));

        self.http
            .get(&url)
            .header("authority", &self.authority)
            .header(ACCEPT, "*/*")
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .header(COOKIE, &self.cookie_header)
            .header(REFERER, &self.referer)
            .header("sec-ch-ua", SEC_CH_UA)
            .header("sec-ch-ua-mobile", "?0")
            .header("sec-ch-ua-platform", "\"macOS\"")
            .header("sec-fetch-dest", "empty")
            .header("sec-fetch-mode", "cors")
            .header("sec-fetch-site", "same-origin")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .build()
            .map_err(|e| LineError::RequestConstruction { text: text.to_string(), reason: error_chain(&e) })
    }
}

impl SpeechApi for VeedClient {
    fn fetch(&self, text: &str) -> Result<Box<dyn Read>, LineError> {
        let request = self.build_request(text)?;
        debug!("GET {}", request.url());

        let response = self.http.execute(request).map_err(|e| LineError::transport(text, error_chain(&e)))?;
        let status = response.status();
        debug!("Response {} for \"{}\"", status, text);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LineError::RateLimited { text: text.to_string(), detail: format!("HTTP status {}", status.as_u16()) });
        }
        if status != StatusCode::OK {
            return Err(LineError::HttpStatus { text: text.to_string(), status: status.as_u16() });
        }

        Ok(Box::new(response))
    }
}
