//! Matching of held credentials against presentation definitions.
//!
//! Everything in this module is a pure function of its inputs: nothing here keeps
//! state between calls, so the functions may be called from any thread.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use crate::core::{
    credential::{issuer_did_method, UniqueCredential},
    credential_format::{format_map_accepts, ClaimFormatMap},
    input_descriptor::InputDescriptor,
    presentation_definition::{
        PresentationDefinition, SubmissionRequirement, SubmissionRequirementSource,
    },
};

/// Input descriptor id to the credentials able to satisfy it, in store order.
pub type AvailableMatches = BTreeMap<String, Vec<UniqueCredential>>;

/// Wallet side restrictions applied when selecting candidates for a request.
///
/// `None` means no restriction.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Restrictions {
    /// Claim formats the requester accepts.
    restrict_to_formats: Option<ClaimFormatMap>,
    /// DID methods the credential issuer must use, e.g. `did:key` or `key`.
    restrict_to_did_methods: Option<Vec<String>>,
}

impl Restrictions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_formats(mut self, formats: ClaimFormatMap) -> Self {
        self.restrict_to_formats = Some(formats);
        self
    }

    pub fn with_did_methods(mut self, did_methods: Vec<String>) -> Self {
        self.restrict_to_did_methods = Some(did_methods);
        self
    }

    pub fn formats(&self) -> Option<&ClaimFormatMap> {
        self.restrict_to_formats.as_ref()
    }

    pub fn did_methods(&self) -> Option<&Vec<String>> {
        self.restrict_to_did_methods.as_ref()
    }

    fn allows(&self, credential: &UniqueCredential, decoded: &Json) -> bool {
        if let Some(formats) = &self.restrict_to_formats {
            if !format_map_accepts(formats, &credential.format()) {
                return false;
            }
        }

        if let Some(methods) = &self.restrict_to_did_methods {
            let Some(method) = issuer_did_method(decoded) else {
                return false;
            };
            if !methods
                .iter()
                .any(|allowed| allowed.strip_prefix("did:").unwrap_or(allowed) == method)
            {
                return false;
            }
        }

        true
    }
}

/// Return the candidates satisfying `input_descriptor`, keeping their order.
///
/// Credentials that cannot be decoded, that are held in a format the descriptor or the
/// restrictions exclude, or that fail the descriptor constraints are left out.
pub fn select_candidates(
    input_descriptor: &InputDescriptor,
    restrictions: &Restrictions,
    candidates: &[UniqueCredential],
) -> Vec<UniqueCredential> {
    candidates
        .iter()
        .filter(|candidate| {
            let decoded = match candidate.decode() {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!("skipping credential: {e:#}");
                    return false;
                }
            };

            if !input_descriptor.accepts_format(&candidate.format())
                || !restrictions.allows(candidate, &decoded)
            {
                return false;
            }

            match input_descriptor.is_satisfied_by(&decoded) {
                Ok(satisfied) => satisfied,
                Err(e) => {
                    debug!(input_descriptor = input_descriptor.id(), "selection failed: {e:#}");
                    false
                }
            }
        })
        .cloned()
        .collect()
}

/// Select the candidates of every input descriptor of `definition`.
pub fn available_matches(
    definition: &PresentationDefinition,
    restrictions: &Restrictions,
    candidates: &[UniqueCredential],
) -> AvailableMatches {
    definition
        .input_descriptors()
        .iter()
        .map(|input_descriptor| {
            let matches = select_candidates(input_descriptor, restrictions, candidates);
            debug!(
                input_descriptor = input_descriptor.id(),
                matches = matches.len(),
                "selected candidates"
            );
            (input_descriptor.id().to_owned(), matches)
        })
        .collect()
}

/// Outcome of an evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Every required input is present.
    Info,
    /// Required inputs are present but some credentials could not be read.
    Warn,
    /// Required inputs are missing or the definition could not be evaluated.
    Error,
}

/// Results of evaluating a set of credentials against a presentation definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationResults {
    status: Status,
    matches: BTreeMap<String, Vec<String>>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl EvaluationResults {
    pub fn status(&self) -> Status {
        self.status
    }

    /// Input descriptor id to the hashes of the credentials satisfying it.
    pub fn matches(&self) -> &BTreeMap<String, Vec<String>> {
        &self.matches
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// True only for a clean result: any error or warning means the requirements are
    /// not considered satisfied.
    pub fn are_required_credentials_present(&self) -> bool {
        self.status == Status::Info
    }
}

/// Evaluate `candidates` as one flat set against every input descriptor and
/// submission requirement of `definition`.
///
/// Problems are reported inside the results, this never fails.
pub fn evaluate(
    definition: &PresentationDefinition,
    candidates: &[UniqueCredential],
) -> EvaluationResults {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let decoded: Vec<(&UniqueCredential, Json)> = candidates
        .iter()
        .filter_map(|candidate| match candidate.decode() {
            Ok(decoded) => Some((candidate, decoded)),
            Err(e) => {
                warnings.push(format!("{e:#}"));
                None
            }
        })
        .filter(|(candidate, _)| {
            definition
                .format()
                .map_or(true, |formats| format_map_accepts(formats, &candidate.format()))
        })
        .collect();

    let mut matches = BTreeMap::new();
    for input_descriptor in definition.input_descriptors() {
        let mut hashes = Vec::new();
        for (candidate, credential) in decoded.iter() {
            if !input_descriptor.accepts_format(&candidate.format()) {
                continue;
            }
            match input_descriptor.is_satisfied_by(credential) {
                Ok(true) => hashes.push(candidate.hash().to_owned()),
                Ok(false) => {}
                Err(e) => {
                    errors.push(format!("{e:#}"));
                    break;
                }
            }
        }
        matches.insert(input_descriptor.id().to_owned(), hashes);
    }

    let is_satisfied = |id: &str| matches.get(id).is_some_and(|hashes| !hashes.is_empty());

    match definition.submission_requirements() {
        None => {
            for input_descriptor in definition.input_descriptors() {
                if !is_satisfied(input_descriptor.id()) {
                    errors.push(format!(
                        "input descriptor {} is not satisfied",
                        input_descriptor.id()
                    ));
                }
            }
        }
        Some(requirements) => {
            for (index, requirement) in requirements.iter().enumerate() {
                if !requirement_is_met(definition, requirement, &is_satisfied, &mut errors) {
                    errors.push(format!(
                        "submission requirement {} is not met",
                        requirement
                            .name()
                            .cloned()
                            .unwrap_or_else(|| index.to_string())
                    ));
                }
            }
        }
    }

    let status = if !errors.is_empty() {
        Status::Error
    } else if !warnings.is_empty() {
        Status::Warn
    } else {
        Status::Info
    };

    EvaluationResults {
        status,
        matches,
        errors,
        warnings,
    }
}

/// The completeness verdict: true iff `candidates` satisfy `definition`.
pub fn is_satisfied(definition: &PresentationDefinition, candidates: &[UniqueCredential]) -> bool {
    let results = evaluate(definition, candidates);
    if !results.are_required_credentials_present() {
        debug!(
            definition = definition.id(),
            errors = ?results.errors(),
            warnings = ?results.warnings(),
            "presentation definition not satisfied"
        );
    }
    results.are_required_credentials_present()
}

fn requirement_is_met(
    definition: &PresentationDefinition,
    requirement: &SubmissionRequirement,
    is_satisfied: &impl Fn(&str) -> bool,
    errors: &mut Vec<String>,
) -> bool {
    let (satisfied, total) = match requirement.source() {
        SubmissionRequirementSource::From { from } => {
            let members = definition.group(from);
            if members.is_empty() {
                errors.push(format!(
                    "submission requirement group {from} has no input descriptors"
                ));
                return false;
            }
            let satisfied = members
                .iter()
                .filter(|member| is_satisfied(member.id()))
                .count();
            (satisfied, members.len())
        }
        SubmissionRequirementSource::FromNested { from_nested } => {
            let satisfied = from_nested
                .iter()
                .filter(|nested| requirement_is_met(definition, nested, is_satisfied, errors))
                .count();
            (satisfied, from_nested.len())
        }
    };

    requirement.is_met(satisfied, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::core::{
        credential::tests::jwt,
        credential::OriginalCredential,
        credential_format::{ClaimFormatDesignation, ClaimFormatPayload},
        presentation_definition::SubmissionRequirement,
    };

    fn definition() -> PresentationDefinition {
        serde_json::from_value(json!({
            "id": "kyc",
            "input_descriptors": [
                {
                    "id": "name",
                    "group": ["identity"],
                    "constraints": { "fields": [{ "path": ["$.credentialSubject.name"] }] }
                },
                {
                    "id": "adult",
                    "group": ["identity"],
                    "constraints": { "fields": [{
                        "path": ["$.credentialSubject.age"],
                        "filter": { "type": "number", "minimum": 18 }
                    }] }
                }
            ]
        }))
        .unwrap()
    }

    fn credential(issuer: &str, subject: Json) -> UniqueCredential {
        OriginalCredential::Json(json!({
            "type": ["VerifiableCredential"],
            "issuer": issuer,
            "credentialSubject": subject,
            "proof": { "type": "Ed25519Signature2018" }
        }))
        .into()
    }

    #[test]
    fn available_matches_per_descriptor() {
        let a = credential("did:key:a", json!({ "name": "Alice" }));
        let b = credential("did:key:b", json!({ "age": 30 }));
        let c = credential("did:key:c", json!({ "age": 12 }));
        let d = credential("did:key:d", json!({ "name": "Dave", "age": 44 }));

        let matches = available_matches(
            &definition(),
            &Restrictions::new(),
            &[a.clone(), b.clone(), c, d.clone()],
        );

        assert_eq!(matches["name"], vec![a, d.clone()]);
        assert_eq!(matches["adult"], vec![b, d]);
    }

    #[test]
    fn restrictions_filter_format_and_issuer_method() {
        let ldp = credential("did:ethr:0x1", json!({ "name": "Alice" }));
        let jwt_vc: UniqueCredential = OriginalCredential::Jwt(jwt(&json!({
            "iss": "did:key:z6Mk",
            "vc": { "credentialSubject": { "name": "Bob" } }
        })))
        .into();
        let candidates = [ldp.clone(), jwt_vc.clone()];
        let descriptor = definition().input_descriptors()[0].clone();

        let mut formats = ClaimFormatMap::new();
        formats.insert(
            ClaimFormatDesignation::JwtVcJson,
            ClaimFormatPayload::AlgValuesSupported(vec!["ES256".into()]),
        );
        let jwt_only = Restrictions::new().with_formats(formats);
        assert_eq!(
            select_candidates(&descriptor, &jwt_only, &candidates),
            vec![jwt_vc.clone()]
        );

        let ethr_only = Restrictions::new().with_did_methods(vec!["did:ethr".into()]);
        assert_eq!(
            select_candidates(&descriptor, &ethr_only, &candidates),
            vec![ldp.clone()]
        );

        assert_eq!(
            select_candidates(&descriptor, &Restrictions::new(), &candidates),
            vec![ldp, jwt_vc]
        );
    }

    #[test]
    fn evaluate_flat_candidate_set() {
        let name = credential("did:key:a", json!({ "name": "Alice" }));
        let adult = credential("did:key:b", json!({ "age": 30 }));

        let results = evaluate(&definition(), &[name.clone(), adult.clone()]);
        assert_eq!(results.status(), Status::Info);
        assert_eq!(results.matches()["adult"], vec![adult.hash().to_owned()]);

        let results = evaluate(&definition(), &[name.clone()]);
        assert_eq!(results.status(), Status::Error);
        assert_eq!(results.errors(), ["input descriptor adult is not satisfied"]);

        assert!(!is_satisfied(&definition(), &[]));
    }

    #[test]
    fn unreadable_credentials_are_not_satisfying() {
        let name = credential("did:key:a", json!({ "name": "Dave", "age": 44 }));
        let broken: UniqueCredential = OriginalCredential::Jwt("broken".into()).into();

        let results = evaluate(&definition(), &[name, broken]);
        assert_eq!(results.status(), Status::Warn);
        assert!(!results.are_required_credentials_present());
    }

    #[test]
    fn invalid_path_is_reported_as_error() {
        let definition: PresentationDefinition = serde_json::from_value(json!({
            "id": "broken",
            "input_descriptors": [{
                "id": "bad",
                "constraints": { "fields": [{ "path": ["credentialSubject["] }] }
            }]
        }))
        .unwrap();

        let results = evaluate(
            &definition,
            &[credential("did:key:a", json!({ "age": 30 }))],
        );
        assert_eq!(results.status(), Status::Error);
        assert!(!results.are_required_credentials_present());
    }

    #[test]
    fn submission_requirements_pick() {
        let definition = definition().add_submission_requirement(
            SubmissionRequirement::pick_from("identity".into()).set_count(1),
        );
        let name = credential("did:key:a", json!({ "name": "Alice" }));

        assert!(is_satisfied(&definition, &[name.clone()]));
        assert!(!is_satisfied(
            &definition,
            &[name, credential("did:key:b", json!({ "age": 30 }))]
        ));

        let unknown_group = PresentationDefinition::default()
            .add_submission_requirement(SubmissionRequirement::all_from("nope".into()));
        assert!(!is_satisfied(&unknown_group, &[]));
    }
}
