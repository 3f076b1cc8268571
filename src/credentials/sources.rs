use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use super::{CookiePayload, CredentialError};

/// Extraction strategy for one profile
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short label for logs, never containing secret material
    fn describe(&self) -> String;

    async fn extract(&self, profile: &str) -> Result<CookiePayload, CredentialError>;
}

/// Browsers the engine can read cookie stores from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Brave,
    Chrome,
    Chromium,
    Edge,
    Firefox,
    Opera,
    Safari,
    Vivaldi,
    Whale,
}

impl Browser {
    pub const ALL: [Browser; 9] = [
        Browser::Brave,
        Browser::Chrome,
        Browser::Chromium,
        Browser::Edge,
        Browser::Firefox,
        Browser::Opera,
        Browser::Safari,
        Browser::Vivaldi,
        Browser::Whale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Brave => "brave",
            Browser::Chrome => "chrome",
            Browser::Chromium => "chromium",
            Browser::Edge => "edge",
            Browser::Firefox => "firefox",
            Browser::Opera => "opera",
            Browser::Safari => "safari",
            Browser::Vivaldi => "vivaldi",
            Browser::Whale => "whale",
        }
    }
}

impl FromStr for Browser {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Browser::ALL
            .into_iter()
            .find(|b| b.as_str() == wanted)
            .ok_or_else(|| CredentialError::UnsupportedBrowser(s.to_string()))
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cookies read by the engine straight from a local browser profile
#[derive(Debug, Clone)]
pub struct BrowserSource {
    browser: Browser,
    browser_profile: Option<String>,
}

impl BrowserSource {
    pub fn new(browser: Browser, browser_profile: Option<String>) -> Self {
        Self {
            browser,
            browser_profile,
        }
    }
}

#[async_trait]
impl CredentialSource for BrowserSource {
    fn describe(&self) -> String {
        format!("browser:{}", self.browser)
    }

    async fn extract(&self, _profile: &str) -> Result<CookiePayload, CredentialError> {
        Ok(CookiePayload::Browser {
            browser: self.browser.as_str().to_string(),
            profile: self.browser_profile.clone(),
        })
    }
}

/// Netscape cookie jar exported to disk, re-read on every extraction
#[derive(Debug, Clone)]
pub struct CookieFileSource {
    path: PathBuf,
}

impl CookieFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";

#[async_trait]
impl CredentialSource for CookieFileSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn extract(&self, profile: &str) -> Result<CookiePayload, CredentialError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| CredentialError::Io {
                    path: self.path.clone(),
                    source,
                })?;

        let cookie_lines = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            // `#HttpOnly_` prefixed lines are cookies, other `#` lines are comments
            .filter(|line| !line.starts_with('#') || line.starts_with("#HttpOnly_"))
            .count();

        if cookie_lines == 0 {
            return Err(CredentialError::EmptyCookieFile(self.path.clone()));
        }

        if !contents.trim_start().starts_with(NETSCAPE_HEADER) {
            warn!(
                profile,
                path = %self.path.display(),
                "Cookie file lacks Netscape header, engine may reject it"
            );
        }

        Ok(CookiePayload::Netscape(contents))
    }
}
