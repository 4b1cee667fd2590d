//! Mozilla Firefox cookie store (`cookies.sqlite`, plaintext values).

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Cookie, CookieError, CookieSource, open_read_only};

/// Cookies from a Firefox profile database.
pub struct FirefoxCookies {
    path: PathBuf,
    label: String,
}

impl FirefoxCookies {
    /// Create a source reading the given `cookies.sqlite`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("firefox ({})", path.display());
        Self { path, label }
    }

    /// Locate `cookies.sqlite` in the default profile.
    ///
    /// Prefers a `*.default-release` profile, then `*.default`.
    pub fn default_path() -> Result<PathBuf, CookieError> {
        let root = profiles_root().ok_or_else(|| CookieError::Unsupported("no user configuration directory".to_string()))?;
        find_default_profile(&root).map(|profile| profile.join("cookies.sqlite")).ok_or(CookieError::NotFound(root))
    }
}

impl CookieSource for FirefoxCookies {
    fn name(&self) -> &str {
        &self.label
    }

    fn load(&self) -> Result<Vec<Cookie>, CookieError> {
        let conn = open_read_only(&self.path)?;
        let db_err = |source| CookieError::Database { path: self.path.clone(), source };

        let mut stmt = conn.prepare("SELECT host, name, value FROM moz_cookies").map_err(db_err)?;
        let cookies = stmt
            .query_map([], |row| Ok(Cookie::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        debug!("Read {} cookies from {}", cookies.len(), self.path.display());
        Ok(cookies)
    }
}

/// Directory holding Firefox profile folders.
fn profiles_root() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        dirs::config_dir().map(|dir| dir.join("Firefox").join("Profiles"))
    }

    #[cfg(target_os = "windows")]
    {
        dirs::config_dir().map(|dir| dir.join("Mozilla").join("Firefox").join("Profiles"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        dirs::home_dir().map(|dir| dir.join(".mozilla").join("firefox"))
    }
}

fn find_default_profile(root: &Path) -> Option<PathBuf> {
    let mut profiles: Vec<PathBuf> = std::fs::read_dir(root).ok()?.filter_map(|entry| entry.ok()).map(|entry| entry.path()).filter(|path| path.is_dir()).collect();
    profiles.sort();

    for suffix in [".default-release", ".default"] {
        if let Some(profile) = profiles.iter().find(|path| path.file_name().and_then(|name| name.to_str()).is_some_and(|name| name.ends_with(suffix))) {
            return Some(profile.clone());
        }
    }
    None
}
