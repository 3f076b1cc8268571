//! Boundary to the external download engine
//!
//! The engine is a black box that writes files into a workspace directory. This module
//! only defines what it is asked to do ([`EngineRequest`]) and how it reports failure
//! ([`EngineError`]); classification of those failures lives in [`crate::auth`].

pub mod ytdlp;

pub use ytdlp::YtDlpEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::credentials::CookiePayload;

/// Where an [`EngineError`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// The engine ran and reported a failure
    Reported,
    /// The engine could not be started or awaited
    Spawn,
    /// The invocation was stopped through its cancellation token
    Cancelled,
    /// The engine reported success but left nothing usable behind
    NoOutput,
}

/// Failure reported by an engine invocation
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
    pub origin: ErrorOrigin,
    pub exit_code: Option<i32>,
    pub http_status: Option<u16>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: ErrorOrigin::Reported,
            exit_code: None,
            http_status: None,
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn spawn(err: std::io::Error) -> Self {
        Self {
            origin: ErrorOrigin::Spawn,
            ..Self::new(format!("failed to run download engine: {}", err))
        }
    }

    pub fn cancelled() -> Self {
        Self {
            origin: ErrorOrigin::Cancelled,
            ..Self::new("engine invocation cancelled")
        }
    }

    pub fn no_output(workspace: &Path) -> Self {
        Self {
            origin: ErrorOrigin::NoOutput,
            ..Self::new(format!(
                "engine reported success but produced no files in {}",
                workspace.display()
            ))
        }
    }

    /// Build from captured stderr of a failed run
    pub fn from_stderr(stderr: &str, exit_code: Option<i32>) -> Self {
        let message = stderr
            .lines()
            .rev()
            .find_map(|line| line.trim().strip_prefix("ERROR:").map(str::trim))
            .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| match exit_code {
                Some(code) => format!("engine exited with status {}", code),
                None => "engine terminated by signal".to_string(),
            });

        let mut err = Self::new(message).with_exit_code(exit_code);
        if let Some(status) = parse_http_status(stderr) {
            err = err.with_http_status(status);
        }
        err
    }
}

/// Extract the status from the last `HTTP Error NNN` mention
pub fn parse_http_status(text: &str) -> Option<u16> {
    const MARKER: &str = "http error ";
    let lower = text.to_ascii_lowercase();
    let start = lower.rfind(MARKER)? + MARKER.len();
    let digits = lower.get(start..start + 3)?;
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Non-authentication failure classes recorded on failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineFailureClass {
    Network,
    RateLimited,
    Unavailable,
    NoOutput,
    Cancelled,
    Process,
    Other,
}

impl EngineFailureClass {
    /// Whether re-running the same request later may succeed
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EngineFailureClass::Network
                | EngineFailureClass::RateLimited
                | EngineFailureClass::Process
        )
    }
}

/// Bound on how many items a multi-item request may fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemLimit {
    Unlimited,
    AtMost(u32),
}

impl ItemLimit {
    /// Resolve the effective bound.
    ///
    /// An explicit positive cap always wins, even when `no_limit` is also set. An
    /// explicit `0` means unlimited. Otherwise `no_limit` disables the configured
    /// default cap.
    pub fn resolve(explicit: Option<u32>, no_limit: bool, default: Option<u32>) -> Self {
        match explicit {
            Some(0) => ItemLimit::Unlimited,
            Some(n) => ItemLimit::AtMost(n),
            None if no_limit => ItemLimit::Unlimited,
            None => match default {
                Some(n) if n > 0 => ItemLimit::AtMost(n),
                _ => ItemLimit::Unlimited,
            },
        }
    }

    /// How many of `available` items fit under the bound
    pub fn take(&self, available: usize) -> usize {
        match self {
            ItemLimit::Unlimited => available,
            ItemLimit::AtMost(n) => available.min(*n as usize),
        }
    }
}

/// One invocation of the engine
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub url: String,
    /// Local temp workspace the engine writes into
    pub workspace: PathBuf,
    /// Full output template, rooted in `workspace`
    pub output_template: String,
    pub restrict_filenames: bool,
    pub playlist: bool,
    pub limit: ItemLimit,
    pub cookies: Option<CookiePayload>,
}

impl EngineRequest {
    /// Root a per-file name template (e.g. `%(title)s [%(id)s].%(ext)s`) in a workspace
    pub fn template_in(workspace: &Path, name_template: &str) -> String {
        workspace.join(name_template).to_string_lossy().into_owned()
    }
}

/// External download engine
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Run one request to completion. Must stop promptly once `cancel` fires.
    async fn fetch(
        &self,
        request: &EngineRequest,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>;
}
