use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::presentation_exchange::Restrictions;

/// Configuration of the wallet flows. Every field has a default.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub onboarding: OnboardingConfig,
    /// Restrictions applied when matching credentials against presentation requests.
    pub presentation: Restrictions,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid wallet flows configuration")
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct OnboardingConfig {
    pub machine_id: String,
    /// DID method of the identity credential issued during setup.
    pub did_method: String,
    pub proof_format: String,
    /// JSON-LD context of the identity credential, next to the W3C credentials context.
    pub identity_context: Option<Url>,
    pub setup_timeout_secs: u64,
    /// Do not fall back to the default navigation listener.
    pub require_custom_navigation_hook: bool,
}

impl OnboardingConfig {
    pub fn setup_timeout(&self) -> Duration {
        Duration::from_secs(self.setup_timeout_secs)
    }
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            machine_id: "Onboarding".into(),
            did_method: "key".into(),
            proof_format: "jwt".into(),
            identity_context: None,
            setup_timeout_secs: 60,
            require_custom_navigation_hook: false,
        }
    }
}
