//! Session cookie cache shared by every acquisition
//!
//! One [`CredentialManager`] owns the cache for all profiles. A cached credential is
//! handed out only while `now < expires_at`; a miss or expiry extracts a fresh payload
//! from the profile's [`CredentialSource`] before the caller proceeds. Extraction for a
//! profile is single-flight: concurrent callers queue on the profile's slot and reuse the
//! result of the extraction already in progress.

mod registry;
mod sources;

pub use registry::CredentialRegistry;
pub use sources::{Browser, BrowserSource, CookieFileSource, CredentialSource};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("unknown credential profile: {0}")]
    UnknownProfile(String),

    #[error("unsupported browser '{0}'")]
    UnsupportedBrowser(String),

    #[error("failed to read cookie file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cookie file {0} contains no cookies")]
    EmptyCookieFile(PathBuf),

    #[error("credential extraction failed for profile '{profile}': {reason}")]
    Extraction { profile: String, reason: String },
}

/// Opaque cookie material handed to the download engine
#[derive(Clone, PartialEq, Eq)]
pub enum CookiePayload {
    /// Engine reads the named browser's cookie store itself
    Browser {
        browser: String,
        profile: Option<String>,
    },
    /// Netscape-format cookie jar contents
    Netscape(String),
}

impl fmt::Debug for CookiePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CookiePayload::Browser { browser, profile } => f
                .debug_struct("Browser")
                .field("browser", browser)
                .field("profile", profile)
                .finish(),
            CookiePayload::Netscape(contents) => {
                write!(f, "Netscape(<{} bytes redacted>)", contents.len())
            }
        }
    }
}

/// A cached payload and the instant it stops being usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub profile: String,
    pub payload: CookiePayload,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

type Slot = Arc<AsyncMutex<Option<Credential>>>;

pub struct CredentialManager {
    registry: CredentialRegistry,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl CredentialManager {
    pub fn new(
        registry: CredentialRegistry,
        ttl: chrono::Duration,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            ttl,
            clock,
            metrics,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &CredentialRegistry {
        &self.registry
    }

    fn slot(&self, profile: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(profile.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    /// Current credential for `profile`, extracting a fresh one on miss or expiry
    pub async fn get(&self, profile: &str) -> Result<Credential, CredentialError> {
        let source = self.registry.get(profile)?;
        let slot = self.slot(profile);
        let mut cached = slot.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_valid_at(self.clock.now()) {
                debug!(profile, expires_at = %credential.expires_at, "Credential cache hit");
                return Ok(credential.clone());
            }
            debug!(profile, "Cached credential expired");
        }

        self.extract_into(profile, source.as_ref(), &mut cached).await
    }

    /// Drop the cached credential so the next `get` extracts again
    pub async fn invalidate(&self, profile: &str) {
        let slot = self.slot(profile);
        let mut cached = slot.lock().await;
        if cached.take().is_some() {
            debug!(profile, "Credential invalidated");
        }
    }

    /// Replace `rejected` with a fresh credential.
    ///
    /// Callers that saw the same credential fail share one extraction: if another
    /// refresh already replaced `rejected`, its result is returned as is.
    pub async fn refresh(
        &self,
        profile: &str,
        rejected: &Credential,
    ) -> Result<Credential, CredentialError> {
        let source = self.registry.get(profile)?;
        let slot = self.slot(profile);
        let mut cached = slot.lock().await;

        if let Some(current) = cached.as_ref() {
            if current != rejected && current.is_valid_at(self.clock.now()) {
                debug!(profile, fetched_at = %current.fetched_at, "Reusing refreshed credential");
                return Ok(current.clone());
            }
        }

        self.extract_into(profile, source.as_ref(), &mut cached).await
    }

    async fn extract_into(
        &self,
        profile: &str,
        source: &dyn CredentialSource,
        cached: &mut Option<Credential>,
    ) -> Result<Credential, CredentialError> {
        let payload = source.extract(profile).await?;
        self.metrics.credential_extracted();

        let fetched_at = self.clock.now();
        // an oversized ttl never expires rather than overflowing
        let expires_at = fetched_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let credential = Credential {
            profile: profile.to_string(),
            payload,
            fetched_at,
            expires_at,
        };
        info!(
            profile,
            source = source.describe(),
            expires_at = %credential.expires_at,
            "Extracted fresh credential"
        );

        *cached = Some(credential.clone());
        Ok(credential)
    }
}
