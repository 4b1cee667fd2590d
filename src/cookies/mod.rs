//! Browser cookie extraction.
//!
//! Each supported browser implements [`CookieSource`]; the downloader only
//! ever sees the resulting cookie header string.

mod chrome;
mod crypto;
mod firefox;

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

pub use chrome::ChromeCookies;
pub use firefox::FirefoxCookies;

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub domain: String,
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(domain: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { domain: domain.into(), name: name.into(), value: value.into() }
    }
}

/// Errors raised while reading a browser cookie store.
#[derive(Error, Debug)]
pub enum CookieError {
    #[error("cookie store not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cookie database error in {}", path.display())]
    Database {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to decrypt cookie '{name}' for {domain}: {reason}")]
    Decrypt { domain: String, name: String, reason: String },

    #[error("keychain lookup failed: {0}")]
    Keychain(String),

    #[error("unsupported cookie store: {0}")]
    Unsupported(String),
}

/// A browser cookie store that can be read in full.
pub trait CookieSource {
    /// Human-readable source name for logs.
    fn name(&self) -> &str;

    /// Read every cookie in the store.
    fn load(&self) -> Result<Vec<Cookie>, CookieError>;
}

/// Fixed cookie list standing in for a browser profile.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryCookies {
    cookies: Vec<Cookie>,
}

#[cfg(test)]
impl MemoryCookies {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }
}

#[cfg(test)]
impl CookieSource for MemoryCookies {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self) -> Result<Vec<Cookie>, CookieError> {
        Ok(self.cookies.clone())
    }
}

/// Open a browser's SQLite database without taking locks or writing.
///
/// `immutable=1` lets the read succeed while the browser holds the file open.
fn open_read_only(path: &Path) -> Result<Connection, CookieError> {
    if !path.is_file() {
        return Err(CookieError::NotFound(path.to_path_buf()));
    }

    let escaped = path.to_string_lossy().replace('%', "%25").replace('?', "%3f").replace('#', "%23");
    let uri = format!("file:{}?immutable=1", escaped);
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    Connection::open_with_flags(&uri, flags).map_err(|source| CookieError::Database { path: path.to_path_buf(), source })
}

/// Build a `Cookie` header value from every cookie whose domain equals `domain`.
///
/// Each match contributes `name=value; ` in store order. Subdomains do not match.
pub fn cookie_header(cookies: &[Cookie], domain: &str) -> String {
    cookies
        .iter()
        .filter(|cookie| cookie.domain == domain)
        .map(|cookie| format!("{}={}; ", cookie.name, cookie.value))
        .collect()
}

/// Load a source and build the header for `domain`.
///
/// Returns the header and the number of cookies that matched.
pub fn load_header(source: &dyn CookieSource, domain: &str) -> Result<(String, usize), CookieError> {
    let cookies = source.load()?;
    let matched = cookies.iter().filter(|cookie| cookie.domain == domain).count();
    Ok((cookie_header(&cookies, domain), matched))
}
