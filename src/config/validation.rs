use super::models::{Config, CredentialSourceKind};
use crate::credentials::Browser;
use crate::storage::{RemoteStorage, StorageAdapter};
use thiserror::Error;

/// Upper bound on `retry.max_auth_retries`
pub const MAX_AUTH_RETRIES_LIMIT: u32 = 10;

/// Upper bound on `credentials.ttl` (30 days)
pub const MAX_CREDENTIAL_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Default credential profile '{0}' is not configured")]
    UnknownDefaultProfile(String),

    #[error("Profile '{profile}' uses unsupported browser '{browser}'")]
    UnsupportedBrowser { profile: String, browser: String },

    #[error("Profile '{profile}' uses a file source but has no path")]
    MissingCookiePath { profile: String },

    #[error("Credential TTL must be positive")]
    InvalidCredentialTtl,

    #[error("Credential TTL of {actual}s exceeds limit of {limit}s")]
    CredentialTtlTooLong { actual: u64, limit: u64 },

    #[error("max_auth_retries ({actual}) exceeds limit of {limit}")]
    AuthRetriesExceedLimit { actual: u32, limit: u32 },

    #[error("max_inflight_jobs must be at least 1")]
    InvalidInflightJobs,

    #[error("Temp root '{0}' looks like a network share; workspaces must be local")]
    RemoteTempRoot(String),

    #[error("Output template '{0}' must contain %(ext)s")]
    InvalidOutputTemplate(String),

    #[error("Engine binary must not be empty")]
    EmptyEngineBinary,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_credentials(config)?;
    validate_retry(config)?;
    validate_worker(config)?;
    validate_storage(config)?;
    validate_engine(config)?;
    Ok(())
}

fn validate_credentials(config: &Config) -> Result<(), ValidationError> {
    let credentials = &config.credentials;

    if credentials.ttl.as_secs() == 0 {
        return Err(ValidationError::InvalidCredentialTtl);
    }
    if credentials.ttl.as_secs() > MAX_CREDENTIAL_TTL_SECS {
        return Err(ValidationError::CredentialTtlTooLong {
            actual: credentials.ttl.as_secs(),
            limit: MAX_CREDENTIAL_TTL_SECS,
        });
    }

    if let Some(ref default) = credentials.default_profile {
        if !credentials.profiles.contains_key(default) {
            return Err(ValidationError::UnknownDefaultProfile(default.clone()));
        }
    }

    for (name, profile) in &credentials.profiles {
        match profile.source {
            CredentialSourceKind::Browser => {
                let browser = profile.browser.as_deref().unwrap_or(name);
                if browser.parse::<Browser>().is_err() {
                    return Err(ValidationError::UnsupportedBrowser {
                        profile: name.clone(),
                        browser: browser.to_string(),
                    });
                }
            }
            CredentialSourceKind::File => {
                if profile.path.is_none() {
                    return Err(ValidationError::MissingCookiePath {
                        profile: name.clone(),
                    });
                }
            }
        }
    }

    Ok(())
}

fn validate_retry(config: &Config) -> Result<(), ValidationError> {
    if config.retry.max_auth_retries > MAX_AUTH_RETRIES_LIMIT {
        return Err(ValidationError::AuthRetriesExceedLimit {
            actual: config.retry.max_auth_retries,
            limit: MAX_AUTH_RETRIES_LIMIT,
        });
    }
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    if config.worker.max_inflight_jobs == 0 {
        return Err(ValidationError::InvalidInflightJobs);
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let classifier = RemoteStorage::new(
        config.storage.temp_root.clone(),
        config.storage.remote_indicators.clone(),
    );
    if classifier.is_remote(&config.storage.temp_root) {
        return Err(ValidationError::RemoteTempRoot(
            config.storage.temp_root.display().to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(config: &Config) -> Result<(), ValidationError> {
    if config.engine.binary.as_os_str().is_empty() {
        return Err(ValidationError::EmptyEngineBinary);
    }
    if !config.engine.output_template.contains("%(ext)s") {
        return Err(ValidationError::InvalidOutputTemplate(
            config.engine.output_template.clone(),
        ));
    }
    Ok(())
}
