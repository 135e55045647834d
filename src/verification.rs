use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::credential::OriginalCredential;

/// Checks applied by a credential verifier besides the proof itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPolicies {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuance_date: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<bool>,
}

/// The two result shapes a credential verifier may produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerifyOutcome {
    /// Plain verdict, as returned for JWT credentials.
    Bool(bool),
    Structured(VerifyResult),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<VerifyError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<VerifyErrorDetails>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<VerifyError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl VerifyError {
    fn summary(&self) -> Option<String> {
        self.message
            .as_ref()
            .or(self.name.as_ref())
            .filter(|text| !text.is_empty())
            .cloned()
    }

    fn details_summary(&self) -> Option<String> {
        let details = self.details.as_ref()?;
        join([details.code.clone(), details.url.clone()])
    }
}

/// External verifier of credential proofs and policies.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(
        &self,
        credential: &OriginalCredential,
        policies: &VerificationPolicies,
    ) -> Result<VerifyOutcome>;
}

/// Normalized verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub source: OriginalCredential,
    pub verified: bool,
    pub sub_results: Vec<VerificationSubResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSubResult {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl VerificationResult {
    /// Resolve either outcome shape into a result.
    pub fn from_outcome(
        source: OriginalCredential,
        outcome: VerifyOutcome,
        policies: &VerificationPolicies,
    ) -> Self {
        match outcome {
            VerifyOutcome::Bool(true) => Self {
                source,
                verified: true,
                sub_results: Vec::new(),
                error: None,
                error_details: None,
            },
            VerifyOutcome::Bool(false) => {
                let policies = serde_json::to_string(policies).unwrap_or_default();
                Self {
                    source,
                    verified: false,
                    sub_results: Vec::new(),
                    error: Some("Invalid JWT VC".into()),
                    error_details: Some(format!("JWT VC was not valid with policies: {policies}")),
                }
            }
            VerifyOutcome::Structured(result) => {
                let Some(error) = result.error else {
                    return Self {
                        source,
                        verified: result.verified,
                        sub_results: Vec::new(),
                        error: None,
                        error_details: None,
                    };
                };

                let sub_results = error
                    .errors
                    .iter()
                    .map(|nested| VerificationSubResult {
                        verified: false,
                        error: nested.summary(),
                        error_details: nested.details_summary(),
                    })
                    .collect();

                Self {
                    source,
                    verified: result.verified,
                    sub_results,
                    error: join(
                        std::iter::once(error.message.clone())
                            .chain(error.errors.iter().map(VerifyError::summary)),
                    ),
                    error_details: join(
                        std::iter::once(error.details_summary())
                            .chain(error.errors.iter().map(VerifyError::details_summary)),
                    ),
                }
            }
        }
    }

    fn fault(source: OriginalCredential, error: anyhow::Error) -> Self {
        Self {
            source,
            verified: false,
            sub_results: Vec::new(),
            error: Some("Verification failed".into()),
            error_details: Some(format!("{error:#}")),
        }
    }
}

/// Verify a credential, always producing a result.
///
/// A verifier that fails outright is reported as an unverified credential.
pub async fn verify_credential(
    verifier: &dyn CredentialVerifier,
    credential: &OriginalCredential,
    policies: &VerificationPolicies,
) -> VerificationResult {
    let result = match verifier.verify(credential, policies).await {
        Ok(outcome) => VerificationResult::from_outcome(credential.clone(), outcome, policies),
        Err(e) => {
            warn!("credential verifier failed: {e:#}");
            VerificationResult::fault(credential.clone(), e)
        }
    };

    debug!(
        verified = result.verified,
        error = result.error.as_deref(),
        "credential verification finished"
    );
    result
}

fn join(parts: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    let joined = parts
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}
