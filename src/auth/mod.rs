//! Authentication-failure detection and the bounded refresh-and-retry loop
//!
//! Every engine call site goes through [`AuthRetryHandler::execute`], and every failure
//! goes through [`classify`]. The loop is an explicit state machine:
//!
//! ```text
//! ATTEMPT --ok--> DONE
//! ATTEMPT --err--> CLASSIFY --auth--> REFRESH --> ATTEMPT   (at most `max_refreshes`)
//!                           --other--> FAIL
//! ```

mod classify;

pub use classify::{classify, is_auth_failure, FailureClass};

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::credentials::{Credential, CredentialError, CredentialManager};
use crate::engine::{EngineError, EngineFailureClass};
use crate::observability::Metrics;

pub const DEFAULT_MAX_AUTH_RETRIES: u32 = 2;

/// Outcome of a single attempt after classification
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    AuthRetryable(EngineError),
    Fatal(EngineFailureClass, EngineError),
}

impl<T> AttemptOutcome<T> {
    pub fn from_result(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(err) => match classify(&err) {
                FailureClass::Auth => AttemptOutcome::AuthRetryable(err),
                FailureClass::Engine(class) => AttemptOutcome::Fatal(class, err),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("authentication still failing after {attempts} attempts: {last}")]
    AuthExhausted { attempts: u32, last: EngineError },

    #[error("engine failure ({class:?}): {error}")]
    Fatal {
        class: EngineFailureClass,
        error: EngineError,
    },

    #[error("credential unavailable: {0}")]
    Credential(#[from] CredentialError),
}

pub struct AuthRetryHandler {
    credentials: Arc<CredentialManager>,
    max_refreshes: u32,
    metrics: Arc<Metrics>,
}

impl AuthRetryHandler {
    pub fn new(credentials: Arc<CredentialManager>, max_refreshes: u32, metrics: Arc<Metrics>) -> Self {
        Self {
            credentials,
            max_refreshes,
            metrics,
        }
    }

    pub fn max_refreshes(&self) -> u32 {
        self.max_refreshes
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// Run `attempt` until it succeeds, fails for a non-auth reason, or the refresh
    /// budget is spent.
    ///
    /// With a `profile`, each attempt receives the current credential and every auth
    /// failure refreshes it before the next attempt. Without one there is nothing to
    /// refresh, so the first auth failure is terminal.
    pub async fn execute<T, F, Fut>(
        &self,
        profile: Option<&str>,
        mut attempt: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(Option<Credential>) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut credential = match profile {
            Some(profile) => Some(self.credentials.get(profile).await?),
            None => None,
        };
        let mut attempts = 0u32;
        let mut refreshes = 0u32;

        loop {
            attempts += 1;
            debug!(attempts, profile, "Engine attempt");

            match AttemptOutcome::from_result(attempt(credential.clone()).await) {
                AttemptOutcome::Success(value) => {
                    if attempts > 1 {
                        debug!(attempts, refreshes, "Engine succeeded after credential refresh");
                    }
                    return Ok(value);
                }
                AttemptOutcome::Fatal(class, error) => {
                    return Err(RetryError::Fatal { class, error });
                }
                AttemptOutcome::AuthRetryable(error) => {
                    let Some(profile) = profile else {
                        warn!(error = %error, "Authentication failure with no credential profile");
                        return Err(RetryError::AuthExhausted { attempts, last: error });
                    };

                    if refreshes >= self.max_refreshes {
                        warn!(
                            profile,
                            attempts,
                            error = %error,
                            "Authentication retries exhausted"
                        );
                        return Err(RetryError::AuthExhausted { attempts, last: error });
                    }

                    refreshes += 1;
                    warn!(
                        profile,
                        attempts,
                        refreshes,
                        error = %error,
                        "Authentication failure, refreshing credentials"
                    );
                    let fresh = match &credential {
                        Some(rejected) => self.credentials.refresh(profile, rejected).await?,
                        None => self.credentials.get(profile).await?,
                    };
                    credential = Some(fresh);
                    self.metrics.auth_refreshed();
                }
            }
        }
    }
}
