use std::{fmt::Debug, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use super::context::OnboardingContext;
use crate::{core::credential::OriginalCredential, store::CredentialStore};

/// Result of a successful wallet setup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSetupOutcome {
    /// Hash of the identity credential stored in the wallet.
    pub credential_hash: String,
}

/// The asynchronous step run when the machine enters `SetupWallet`.
#[async_trait]
pub trait SetupService: Send + Sync {
    async fn run(&self, context: OnboardingContext) -> Result<WalletSetupOutcome>;
}

/// Signs credentials on behalf of the wallet holder.
#[async_trait]
pub trait CredentialIssuer: Debug + Send + Sync {
    async fn issue(
        &self,
        credential: Json,
        did_method: &str,
        proof_format: &str,
    ) -> Result<OriginalCredential>;
}

/// Issues the identity credential described by the onboarding context and stores it.
#[derive(Debug, Clone)]
pub struct IssuingSetupService {
    issuer: Arc<dyn CredentialIssuer>,
    store: Arc<dyn CredentialStore>,
}

impl IssuingSetupService {
    pub fn new(issuer: Arc<dyn CredentialIssuer>, store: Arc<dyn CredentialStore>) -> Self {
        Self { issuer, store }
    }
}

#[async_trait]
impl SetupService for IssuingSetupService {
    async fn run(&self, context: OnboardingContext) -> Result<WalletSetupOutcome> {
        let draft = context
            .credential_draft
            .as_ref()
            .context("onboarding context has no credential draft")?;
        let personal_data = context
            .personal_data
            .as_ref()
            .context("onboarding context has no personal data")?;

        let credential = self
            .issuer
            .issue(
                draft.credential_for(personal_data),
                &draft.did_method,
                &draft.proof_format,
            )
            .await
            .context("failed to issue identity credential")?;

        let credential_hash = self
            .store
            .save(credential)
            .await
            .context("failed to store identity credential")?;

        debug!(
            %credential_hash,
            did_method = draft.did_method.as_str(),
            "issued identity credential"
        );
        Ok(WalletSetupOutcome { credential_hash })
    }
}
