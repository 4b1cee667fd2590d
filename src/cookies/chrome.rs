//! Google Chrome cookie store (SQLite `cookies` table with encrypted values).

use std::collections::HashMap;
use std::path::PathBuf;
#[cfg(unix)]
use std::process::Command;

use tracing::debug;

use super::crypto::{self, Scheme};
use super::{Cookie, CookieError, CookieSource, open_read_only};

/// Cookies from a Chrome profile database.
pub struct ChromeCookies {
    path: PathBuf,            // Path to the `Cookies` database
    password: Option<String>, // Safe-storage password override
    label: String,            // Name used in logs
}

impl ChromeCookies {
    /// Create a source reading the given `Cookies` database.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("chrome ({})", path.display());
        Self { path, password: None, label }
    }

    /// Use a fixed safe-storage password instead of asking the system keychain.
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Locate the default profile's cookie database.
    ///
    /// # Errors
    /// Returns `NotFound` if no candidate file exists.
    pub fn default_path() -> Result<PathBuf, CookieError> {
        let profile = default_profile_dir().ok_or_else(|| CookieError::Unsupported("no user configuration directory".to_string()))?;
        let candidates = [profile.join("Network").join("Cookies"), profile.join("Cookies")];

        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| CookieError::NotFound(candidates[1].clone()))
    }

    fn key_for(&self, scheme: Scheme, keys: &mut HashMap<Scheme, [u8; 16]>) -> Result<[u8; 16], CookieError> {
        if let Some(key) = keys.get(&scheme) {
            return Ok(*key);
        }
        let password = match &self.password {
            Some(password) => password.clone(),
            None => safe_storage_password(scheme)?,
        };
        let key = crypto::derive_key(password.as_bytes(), crypto::ITERATIONS);
        keys.insert(scheme, key);
        Ok(key)
    }

    fn decode(&self, row: RawCookie, version: i64, keys: &mut HashMap<Scheme, [u8; 16]>) -> Result<Cookie, CookieError> {
        if !row.value.is_empty() || row.encrypted.is_empty() {
            return Ok(Cookie::new(row.host, row.name, row.value));
        }

        let fail = |reason: String| CookieError::Decrypt { domain: row.host.clone(), name: row.name.clone(), reason };

        let (scheme, ciphertext) = Scheme::split(&row.encrypted).ok_or_else(|| fail("unsupported encryption scheme".to_string()))?;
        let key = self.key_for(scheme, keys)?;
        let mut plain = crypto::decrypt(&key, ciphertext).map_err(fail)?;

        if version >= crypto::HOST_DIGEST_MIN_VERSION && plain.len() >= crypto::HOST_DIGEST_LEN {
            plain.drain(..crypto::HOST_DIGEST_LEN);
        }

        let value = String::from_utf8(plain).map_err(|_| fail("value is not UTF-8".to_string()))?;
        Ok(Cookie::new(row.host, row.name, value))
    }
}

struct RawCookie {
    host: String,
    name: String,
    value: String,
    encrypted: Vec<u8>,
}

impl CookieSource for ChromeCookies {
    fn name(&self) -> &str {
        &self.label
    }

    fn load(&self) -> Result<Vec<Cookie>, CookieError> {
        let conn = open_read_only(&self.path)?;
        let db_err = |source| CookieError::Database { path: self.path.clone(), source };

        // Missing meta table means an old schema without host digests.
        let version: i64 = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| row.get::<_, String>(0))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        debug!("Chrome cookie database version {}", version);

        let mut stmt = conn.prepare("SELECT host_key, name, value, encrypted_value FROM cookies").map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawCookie {
                    host: row.get(0)?,
                    name: row.get(1)?,
                    value: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    encrypted: row.get::<_, Option<Vec<u8>>>(3)?.unwrap_or_default(),
                })
            })
            .map_err(db_err)?;

        let mut keys = HashMap::new();
        let mut cookies = Vec::new();
        for row in rows {
            let row = row.map_err(db_err)?;
            cookies.push(self.decode(row, version, &mut keys)?);
        }

        debug!("Read {} cookies from {}", cookies.len(), self.path.display());
        Ok(cookies)
    }
}

/// Default Chrome profile directory for this platform.
fn default_profile_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        dirs::config_dir().map(|dir| dir.join("Google").join("Chrome").join("Default"))
    }

    #[cfg(target_os = "windows")]
    {
        dirs::data_local_dir().map(|dir| dir.join("Google").join("Chrome").join("User Data").join("Default"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        dirs::config_dir().map(|dir| dir.join("google-chrome").join("Default"))
    }
}

/// Ask the platform secret store for Chrome's safe-storage password.
#[cfg(target_os = "macos")]
fn safe_storage_password(_scheme: Scheme) -> Result<String, CookieError> {
    run_secret_command("security", &["find-generic-password", "-w", "-s", "Chrome Safe Storage"])
}

/// Ask the platform secret store for Chrome's safe-storage password.
#[cfg(all(unix, not(target_os = "macos")))]
fn safe_storage_password(scheme: Scheme) -> Result<String, CookieError> {
    match scheme {
        Scheme::V10 => Ok(crypto::LINUX_FALLBACK_PASSWORD.to_string()),
        Scheme::V11 => run_secret_command("secret-tool", &["lookup", "application", "chrome"]),
    }
}

/// Ask the platform secret store for Chrome's safe-storage password.
#[cfg(not(unix))]
fn safe_storage_password(_scheme: Scheme) -> Result<String, CookieError> {
    Err(CookieError::Unsupported("Chrome cookie decryption is only supported on macOS and Linux".to_string()))
}

#[cfg(unix)]
fn run_secret_command(program: &str, args: &[&str]) -> Result<String, CookieError> {
    let output = Command::new(program).args(args).output().map_err(|e| CookieError::Keychain(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CookieError::Keychain(format!("{} exited with {}: {}", program, output.status, stderr.trim())));
    }

    let password = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if password.is_empty() {
        return Err(CookieError::Keychain(format!("{} returned an empty password", program)));
    }
    Ok(password)
}
