use crate::humanize::HumanDuration;
use crate::storage::DEFAULT_REMOTE_INDICATORS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Temp workspace root and remote classification
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Local directory holding per-job workspaces; must not be on a share
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
    /// Case-insensitive path fragments that mark a destination as network-attached
    #[serde(default = "default_remote_indicators")]
    pub remote_indicators: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
            remote_indicators: default_remote_indicators(),
        }
    }
}

fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("haulbox")
}

fn default_remote_indicators() -> Vec<String> {
    DEFAULT_REMOTE_INDICATORS.iter().map(|s| s.to_string()).collect()
}

/// Job ledger location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
    /// Keep jobs in memory only; nothing survives the process
    #[serde(default)]
    pub ephemeral: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            ephemeral: false,
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Download engine invocation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_binary")]
    pub binary: PathBuf,
    /// Per-file name template, rooted in the job workspace at run time
    #[serde(default = "default_output_template")]
    pub output_template: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            output_template: default_output_template(),
            extra_args: Vec::new(),
        }
    }
}

fn default_engine_binary() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_output_template() -> String {
    "%(title)s [%(id)s].%(ext)s".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSourceKind {
    Browser,
    File,
}

/// One credential profile (`[credentials.profiles.<name>]`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileConfig {
    pub source: CredentialSourceKind,
    /// Browser to read cookies from; defaults to the profile name
    pub browser: Option<String>,
    /// Browser-internal profile, e.g. `default-release`
    pub browser_profile: Option<String>,
    /// Netscape cookie file for `file` sources
    pub path: Option<PathBuf>,
}

/// Cookie cache settings and profiles
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_credential_ttl")]
    pub ttl: HumanDuration,
    pub default_profile: Option<String>,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            ttl: default_credential_ttl(),
            default_profile: None,
            profiles: HashMap::new(),
        }
    }
}

fn default_credential_ttl() -> HumanDuration {
    HumanDuration::from_secs(30 * 60)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Credential refreshes allowed per engine invocation
    #[serde(default = "default_max_auth_retries")]
    pub max_auth_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_auth_retries: default_max_auth_retries(),
        }
    }
}

fn default_max_auth_retries() -> u32 {
    crate::auth::DEFAULT_MAX_AUTH_RETRIES
}

/// Default item bound for playlist jobs; `0` or absent means unlimited
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlaylistConfig {
    pub max_items: Option<u32>,
    #[serde(default)]
    pub no_limit: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Concurrent jobs in a batch
    #[serde(default = "default_max_inflight_jobs")]
    pub max_inflight_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_inflight_jobs: default_max_inflight_jobs(),
        }
    }
}

fn default_max_inflight_jobs() -> usize {
    4
}
