use super::credential_format::*;
use super::input_descriptor::*;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A presentation definition describes the information a requester (verifier) needs from the holder.
///
/// Presentation Definitions are composed of inputs ([InputDescriptor]s), which describe the forms and
/// details of the proofs they require, and optional sets of selection rules
/// ([SubmissionRequirement]s) that give the holder flexibility in how the inputs are satisfied.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    submission_requirements: Option<Vec<SubmissionRequirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<ClaimFormatMap>,
}

impl PresentationDefinition {
    /// The Presentation Definition MUST contain an id property and at least one
    /// Input Descriptor.
    pub fn new(id: String, input_descriptor: InputDescriptor) -> Self {
        Self {
            id,
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    /// A definition asking only for `input_descriptor`, keyed by the descriptor id.
    ///
    /// Used to check a single requirement in isolation.
    pub fn for_input_descriptor(input_descriptor: &InputDescriptor) -> Self {
        Self::new(input_descriptor.id().to_owned(), input_descriptor.clone())
    }

    /// Return the id of the presentation definition.
    pub fn id(&self) -> &String {
        &self.id
    }

    /// Add a new input descriptor to the presentation definition.
    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    /// Return the input descriptors of the presentation definition.
    pub fn input_descriptors(&self) -> &Vec<InputDescriptor> {
        &self.input_descriptors
    }

    /// Return the input descriptor with the given id, if any.
    pub fn input_descriptor(&self, id: &str) -> Option<&InputDescriptor> {
        self.input_descriptors
            .iter()
            .find(|descriptor| descriptor.id() == id)
    }

    /// Return the input descriptors that are members of `group`.
    pub fn group(&self, group: &str) -> Vec<&InputDescriptor> {
        self.input_descriptors
            .iter()
            .filter(|descriptor| descriptor.groups().iter().any(|g| g == group))
            .collect()
    }

    /// Add a submission requirement to the presentation definition.
    pub fn add_submission_requirement(mut self, requirement: SubmissionRequirement) -> Self {
        self.submission_requirements
            .get_or_insert_with(Vec::new)
            .push(requirement);
        self
    }

    /// Return the submission requirements, if any.
    pub fn submission_requirements(&self) -> Option<&Vec<SubmissionRequirement>> {
        self.submission_requirements.as_ref()
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Attach a format to the presentation definition.
    ///
    /// The properties inform the holder of the claim format configurations the requester can process.
    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = Some(format);
        self
    }

    /// Add a new format to the presentation definition.
    pub fn add_format(mut self, format: ClaimFormatDesignation, value: ClaimFormatPayload) -> Self {
        self.format
            .get_or_insert_with(HashMap::new)
            .insert(format, value);
        self
    }

    /// Return the format of the presentation definition.
    pub fn format(&self) -> Option<&ClaimFormatMap> {
        self.format.as_ref()
    }

    /// Return the human-readable representation of the fields requested
    /// in the presentation definition's input descriptors.
    ///
    /// `$.credentialSubject.givenName` -> Given Name
    pub fn requested_fields(&self) -> Vec<String> {
        self.input_descriptors
            .iter()
            .flat_map(InputDescriptor::requested_fields_human_readable)
            .collect()
    }
}

/// Whether a submission requirement needs all of its members or a number of them.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionRequirementRule {
    All,
    Pick,
}

/// The members a submission requirement is evaluated over.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SubmissionRequirementSource {
    /// A group of input descriptors.
    From { from: GroupId },
    /// Nested submission requirements.
    FromNested {
        from_nested: Vec<SubmissionRequirement>,
    },
}

/// Submission requirements describe which combinations of inputs satisfy a definition.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#submission-requirements](https://identity.foundation/presentation-exchange/spec/v2.0.0/#submission-requirements)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SubmissionRequirement {
    rule: SubmissionRequirementRule,
    #[serde(flatten)]
    source: SubmissionRequirementSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<u64>,
}

impl SubmissionRequirement {
    /// All input descriptors of `group` must be satisfied.
    pub fn all_from(group: GroupId) -> Self {
        Self::new(
            SubmissionRequirementRule::All,
            SubmissionRequirementSource::From { from: group },
        )
    }

    /// Some input descriptors of `group` must be satisfied, see [Self::set_count],
    /// [Self::set_min] and [Self::set_max].
    pub fn pick_from(group: GroupId) -> Self {
        Self::new(
            SubmissionRequirementRule::Pick,
            SubmissionRequirementSource::From { from: group },
        )
    }

    pub fn new(rule: SubmissionRequirementRule, source: SubmissionRequirementSource) -> Self {
        Self {
            rule,
            source,
            name: None,
            purpose: None,
            count: None,
            min: None,
            max: None,
        }
    }

    pub fn rule(&self) -> SubmissionRequirementRule {
        self.rule
    }

    pub fn source(&self) -> &SubmissionRequirementSource {
        &self.source
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    pub fn set_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn set_min(mut self, min: u64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn set_max(mut self, max: u64) -> Self {
        self.max = Some(max);
        self
    }

    /// Decide the rule given how many of its `total` members are satisfied.
    ///
    /// A `pick` rule without `count`, `min` or `max` needs at least one member.
    pub fn is_met(&self, satisfied: usize, total: usize) -> bool {
        match self.rule {
            SubmissionRequirementRule::All => satisfied == total,
            SubmissionRequirementRule::Pick => {
                let satisfied = satisfied as u64;
                if self.count.is_none() && self.min.is_none() && self.max.is_none() {
                    return satisfied >= 1;
                }
                self.count.map_or(true, |count| satisfied == count)
                    && self.min.map_or(true, |min| satisfied >= min)
                    && self.max.map_or(true, |max| satisfied <= max)
            }
        }
    }
}
