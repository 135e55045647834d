use core::fmt;
use std::{borrow::Cow, collections::HashMap, str::FromStr};

use serde::{Deserialize, Serialize};

const FORMAT_JWT: &str = "jwt";
const FORMAT_JWT_VC: &str = "jwt_vc";
const FORMAT_JWT_VP: &str = "jwt_vp";
const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";
const FORMAT_JWT_VP_JSON: &str = "jwt_vp_json";
const FORMAT_LDP: &str = "ldp";
const FORMAT_LDP_VC: &str = "ldp_vc";
const FORMAT_LDP_VP: &str = "ldp_vp";

/// A Json object of claim formats, keyed by designation.
///
/// Used both by presentation definitions (what the requester can process) and by
/// the wallet's own restriction parameters when selecting candidates.
pub type ClaimFormatMap = HashMap<ClaimFormatDesignation, ClaimFormatPayload>;

/// Claim format payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimFormatPayload {
    #[serde(rename = "alg")]
    Alg(Vec<String>),
    /// This variant is primarily used for `jwt_vc_json` and `jwt_vp_json`
    /// claim presentation algorithm types supported by a wallet.
    #[serde(rename = "alg_values_supported")]
    AlgValuesSupported(Vec<String>),
    #[serde(rename = "proof_type")]
    ProofType(Vec<String>),
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// The claim format designation type is used in the input description object to specify the format of the claim.
///
/// Registry of claim format type: https://identity.foundation/claim-format-registry/#registry
///
/// Only the W3C credential formats a wallet can hold are named here, anything else is
/// carried through [ClaimFormatDesignation::Other].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClaimFormatDesignation {
    /// A JSON Web Token (JWT) as defined by [RFC7519](https://identity.foundation/claim-format-registry/#ref:RFC7519).
    Jwt,

    /// JWT encoded W3C verifiable credential, with a payload extractable from it as defined by the
    /// JSON Web Token section of the W3C [VC-DATA-MODEL](https://identity.foundation/claim-format-registry/#term:vc-data-model).
    JwtVc,

    /// See [JwtVc](JwtVc) for more information.
    JwtVp,

    JwtVcJson,

    JwtVpJson,

    /// A Linked-Data Proof that will be submitted as an object.
    Ldp,

    /// Verifiable Credentials signed with Linked Data Proof formats, submitted as a JSON object.
    LdpVc,

    /// See [LdpVc](LdpVc) for more information.
    LdpVp,

    /// Other claim format designations not covered by the above.
    ///
    /// The value of this variant is the name of the claim format designation.
    Other(String),
}

impl ClaimFormatDesignation {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_JWT => Self::Jwt,
            FORMAT_JWT_VC => Self::JwtVc,
            FORMAT_JWT_VP => Self::JwtVp,
            FORMAT_JWT_VC_JSON => Self::JwtVcJson,
            FORMAT_JWT_VP_JSON => Self::JwtVpJson,
            FORMAT_LDP => Self::Ldp,
            FORMAT_LDP_VC => Self::LdpVc,
            FORMAT_LDP_VP => Self::LdpVp,
            _ => Self::Other(name.into_owned()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Jwt => FORMAT_JWT,
            Self::JwtVc => FORMAT_JWT_VC,
            Self::JwtVp => FORMAT_JWT_VP,
            Self::JwtVcJson => FORMAT_JWT_VC_JSON,
            Self::JwtVpJson => FORMAT_JWT_VP_JSON,
            Self::Ldp => FORMAT_LDP,
            Self::LdpVc => FORMAT_LDP_VC,
            Self::LdpVp => FORMAT_LDP_VP,
            Self::Other(other) => other,
        }
    }

    /// Returns true if a credential held in the `held` format can be submitted
    /// for a request that lists `self`.
    ///
    /// The generic `jwt` and `ldp` designations cover their credential
    /// specific variants, and `jwt_vc` and `jwt_vc_json` are interchangeable.
    pub fn accepts(&self, held: &ClaimFormatDesignation) -> bool {
        match (self, held) {
            (Self::Jwt, Self::Jwt | Self::JwtVc | Self::JwtVcJson) => true,
            (Self::JwtVc | Self::JwtVcJson, Self::JwtVc | Self::JwtVcJson) => true,
            (Self::Ldp, Self::Ldp | Self::LdpVc) => true,
            (Self::Other(a), Self::Other(b)) => a.eq_ignore_ascii_case(b),
            (requested, held) => requested == held,
        }
    }
}

/// Returns true if any designation in `formats` accepts the `held` format.
pub fn format_map_accepts(formats: &ClaimFormatMap, held: &ClaimFormatDesignation) -> bool {
    formats.keys().any(|format| format.accepts(held))
}

impl From<&str> for ClaimFormatDesignation {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for ClaimFormatDesignation {
    fn from(value: String) -> Self {
        Self::from_name(Cow::Owned(value))
    }
}

impl FromStr for ClaimFormatDesignation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl From<ClaimFormatDesignation> for String {
    fn from(format: ClaimFormatDesignation) -> Self {
        format.name().to_owned()
    }
}

impl fmt::Display for ClaimFormatDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for ClaimFormatDesignation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimFormatDesignation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_restriction_format_map() {
        let value = json!({
            "jwt_vc": {
              "alg": ["ES256", "EdDSA"]
            },
            "com.example.custom_vc": {
              "version": "1.0"
            }
        });

        let formats: ClaimFormatMap =
            serde_json::from_value(value).expect("Failed to parse claim format map");

        assert!(formats.contains_key(&ClaimFormatDesignation::JwtVc));
        assert!(format_map_accepts(&formats, &ClaimFormatDesignation::JwtVcJson));
        assert!(!format_map_accepts(&formats, &ClaimFormatDesignation::LdpVc));
        assert!(format_map_accepts(
            &formats,
            &ClaimFormatDesignation::Other("COM.example.custom_vc".into())
        ));
    }

    #[test]
    fn test_generic_designations_cover_credential_formats() {
        assert!(ClaimFormatDesignation::Jwt.accepts(&ClaimFormatDesignation::JwtVc));
        assert!(ClaimFormatDesignation::Ldp.accepts(&ClaimFormatDesignation::LdpVc));
        assert!(!ClaimFormatDesignation::LdpVc.accepts(&ClaimFormatDesignation::JwtVc));
        assert!(!ClaimFormatDesignation::JwtVp.accepts(&ClaimFormatDesignation::JwtVc));
    }
}
