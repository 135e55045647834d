use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use url::Url;
use uuid::Uuid;

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const DEFAULT_IDENTITY_CONTEXT: &str = "https://w3id.org/wallet/v1";
pub const IDENTITY_CREDENTIAL_TYPE: &str = "WalletIdentityCredential";

/// Personal details entered during onboarding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalData {
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
}

impl PersonalData {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email_address: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email_address: email_address.into(),
        }
    }
}

/// A PIN code. Its value never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PinCode(String);

impl PinCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for PinCode {
    fn from(pin: String) -> Self {
        Self(pin)
    }
}

impl From<&str> for PinCode {
    fn from(pin: &str) -> Self {
        Self(pin.to_owned())
    }
}

impl fmt::Debug for PinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("PinCode(<empty>)")
        } else {
            f.write_str("PinCode(<redacted>)")
        }
    }
}

/// The identity credential issued at the end of onboarding, before it has a subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDraft {
    pub did_method: String,
    pub proof_format: String,
    pub credential: Json,
}

impl CredentialDraft {
    /// A draft with a fresh `urn:uuid` id, issued now.
    pub fn new(
        did_method: impl Into<String>,
        proof_format: impl Into<String>,
        identity_context: Option<&Url>,
    ) -> Self {
        let identity_context = identity_context
            .map(Url::as_str)
            .unwrap_or(DEFAULT_IDENTITY_CONTEXT);

        Self::with_template(
            did_method,
            proof_format,
            json!({
                "@context": [CREDENTIALS_V1_CONTEXT, identity_context],
                "id": format!("urn:uuid:{}", Uuid::new_v4()),
                "type": ["VerifiableCredential", IDENTITY_CREDENTIAL_TYPE],
                "issuanceDate": Utc::now().to_rfc3339(),
                "credentialSubject": {},
            }),
        )
    }

    pub fn with_template(
        did_method: impl Into<String>,
        proof_format: impl Into<String>,
        credential: Json,
    ) -> Self {
        Self {
            did_method: did_method.into(),
            proof_format: proof_format.into(),
            credential,
        }
    }

    /// The credential to issue, with `personal_data` as its subject.
    pub fn credential_for(&self, personal_data: &PersonalData) -> Json {
        let mut credential = self.credential.clone();
        if let Some(credential) = credential.as_object_mut() {
            credential.insert(
                "credentialSubject".into(),
                json!({
                    "firstName": personal_data.first_name,
                    "lastName": personal_data.last_name,
                    "emailAddress": personal_data.email_address,
                }),
            );
        }
        credential
    }
}

/// Everything collected while the user goes through onboarding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OnboardingContext {
    pub terms_accepted: bool,
    pub privacy_accepted: bool,
    pub personal_data: Option<PersonalData>,
    pub pin_code: PinCode,
    pub credential_draft: Option<CredentialDraft>,
}

impl OnboardingContext {
    pub fn new(credential_draft: CredentialDraft) -> Self {
        Self {
            credential_draft: Some(credential_draft),
            ..Default::default()
        }
    }

    /// True once nothing sensitive is left in the context.
    pub fn is_scrubbed(&self) -> bool {
        *self == Self::default()
    }
}
