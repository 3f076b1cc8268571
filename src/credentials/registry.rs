use std::collections::BTreeMap;
use std::sync::Arc;

use super::sources::{Browser, BrowserSource, CookieFileSource, CredentialSource};
use super::CredentialError;
use crate::config::{CredentialSourceKind, CredentialsConfig};

/// Registry mapping profile identifiers to extraction strategies
#[derive(Clone, Default)]
pub struct CredentialRegistry {
    sources: BTreeMap<String, Arc<dyn CredentialSource>>,
}

impl CredentialRegistry {
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, profile: impl Into<String>, source: Arc<dyn CredentialSource>) {
        self.sources.insert(profile.into(), source);
    }

    pub fn get(&self, profile: &str) -> Result<Arc<dyn CredentialSource>, CredentialError> {
        self.sources
            .get(profile)
            .cloned()
            .ok_or_else(|| CredentialError::UnknownProfile(profile.to_string()))
    }

    pub fn has_profile(&self, profile: &str) -> bool {
        self.sources.contains_key(profile)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Build from the `[credentials.profiles.*]` config tables
    pub fn from_config(config: &CredentialsConfig) -> Result<Self, CredentialError> {
        let mut registry = Self::new();

        for (name, profile) in &config.profiles {
            let source: Arc<dyn CredentialSource> = match profile.source {
                CredentialSourceKind::Browser => {
                    let browser_name = profile.browser.as_deref().unwrap_or(name);
                    let browser: Browser = browser_name.parse()?;
                    Arc::new(BrowserSource::new(browser, profile.browser_profile.clone()))
                }
                CredentialSourceKind::File => {
                    let path = profile.path.clone().ok_or_else(|| CredentialError::Extraction {
                        profile: name.clone(),
                        reason: "file source requires a path".to_string(),
                    })?;
                    Arc::new(CookieFileSource::new(path))
                }
            };
            registry.register(name.clone(), source);
        }

        Ok(registry)
    }
}
