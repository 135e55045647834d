use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use sha2::{Digest, Sha256};

use super::credential_format::ClaimFormatDesignation;

/// A credential in the form it was issued to the wallet.
///
/// JWT credentials are kept as their compact serialization so the signature stays
/// verifiable, JSON-LD credentials are kept as the JSON object carrying the proof.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OriginalCredential {
    Jwt(String),
    Json(Json),
}

impl OriginalCredential {
    /// The claim format the credential is held in.
    pub fn format(&self) -> ClaimFormatDesignation {
        match self {
            Self::Jwt(_) => ClaimFormatDesignation::JwtVc,
            Self::Json(_) => ClaimFormatDesignation::LdpVc,
        }
    }

    /// Content derived identifier of the credential: hex encoded SHA-256 of its
    /// serialized form.
    pub fn hash(&self) -> String {
        let digest = match self {
            Self::Jwt(jwt) => Sha256::digest(jwt.as_bytes()),
            Self::Json(value) => Sha256::digest(value.to_string().as_bytes()),
        };
        hex::encode(digest)
    }

    /// Return the W3C JSON view of the credential, which is what input descriptor
    /// constraints are evaluated against.
    pub fn decode(&self) -> Result<Json> {
        match self {
            Self::Json(value) => {
                if !value.is_object() {
                    bail!("JSON credential is not an object")
                }
                Ok(value.clone())
            }
            Self::Jwt(jwt) => decode_jwt_vc(jwt),
        }
    }
}

impl From<Json> for OriginalCredential {
    fn from(value: Json) -> Self {
        match value {
            Json::String(jwt) => Self::Jwt(jwt),
            value => Self::Json(value),
        }
    }
}

/// A stored credential together with its content hash.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UniqueCredential {
    hash: String,
    credential: OriginalCredential,
}

impl UniqueCredential {
    pub fn new(credential: OriginalCredential) -> Self {
        Self {
            hash: credential.hash(),
            credential,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn original(&self) -> &OriginalCredential {
        &self.credential
    }

    pub fn into_original(self) -> OriginalCredential {
        self.credential
    }

    pub fn format(&self) -> ClaimFormatDesignation {
        self.credential.format()
    }

    pub fn decode(&self) -> Result<Json> {
        self.credential
            .decode()
            .with_context(|| format!("failed to decode credential {}", self.hash))
    }
}

impl From<OriginalCredential> for UniqueCredential {
    fn from(credential: OriginalCredential) -> Self {
        Self::new(credential)
    }
}

/// Return the DID method of the issuer of a decoded credential.
///
/// The issuer may be a plain identifier or an object carrying an `id`. Returns `None`
/// when the issuer is not identified by a DID.
pub fn issuer_did_method(decoded: &Json) -> Option<&str> {
    let issuer = match decoded.get("issuer")? {
        Json::Object(issuer) => issuer.get("id")?,
        issuer => issuer,
    };
    issuer.as_str().and_then(did_method)
}

/// Return the method of a DID, e.g. `key` for `did:key:z6Mk...`.
pub fn did_method(did: &str) -> Option<&str> {
    let mut parts = did.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("did"), Some(method), Some(id)) if !method.is_empty() && !id.is_empty() => {
            Some(method)
        }
        _ => None,
    }
}

fn decode_jwt_vc(jwt: &str) -> Result<Json> {
    let mut segments = jwt.split('.');
    let (Some(_header), Some(payload), Some(_signature)) =
        (segments.next(), segments.next(), segments.next())
    else {
        bail!("JWT credential must have three segments")
    };

    let payload = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("failed to base64 decode JWT payload")?;
    let payload: Map<String, Json> =
        serde_json::from_slice(&payload).context("JWT payload is not a JSON object")?;

    let Some(Json::Object(mut vc)) = payload.get("vc").cloned() else {
        bail!("JWT payload does not contain a `vc` claim")
    };

    if let Some(iss) = payload.get("iss") {
        vc.entry("issuer").or_insert_with(|| iss.clone());
    }
    if let Some(jti) = payload.get("jti") {
        vc.entry("id").or_insert_with(|| jti.clone());
    }
    if let Some(date) = payload.get("nbf").and_then(numeric_date) {
        vc.entry("issuanceDate").or_insert(date);
    }
    if let Some(date) = payload.get("exp").and_then(numeric_date) {
        vc.entry("expirationDate").or_insert(date);
    }
    if let (Some(sub), Some(Json::Object(subject))) =
        (payload.get("sub"), vc.get_mut("credentialSubject"))
    {
        subject.entry("id").or_insert_with(|| sub.clone());
    }

    Ok(Json::Object(vc))
}

fn numeric_date(value: &Json) -> Option<Json> {
    let seconds = value.as_i64()?;
    DateTime::<Utc>::from_timestamp(seconds, 0).map(|date| Json::String(date.to_rfc3339()))
}
