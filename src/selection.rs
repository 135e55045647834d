use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::debug;

use crate::{
    core::{
        credential::UniqueCredential, input_descriptor::InputDescriptor,
        presentation_definition::PresentationDefinition,
    },
    presentation_exchange::{available_matches, is_satisfied, AvailableMatches, Restrictions},
    store::CredentialStore,
};

/// Input descriptor id to the credentials the user picked for it.
pub type Selection = BTreeMap<String, Vec<UniqueCredential>>;

/// Tracks the credentials a user picks while answering a presentation request.
///
/// Every pick is checked against the credentials offered for that input descriptor, so
/// the selection never contains a credential that was not offered.
#[derive(Debug, Clone)]
pub struct SelectionTracker {
    definition: PresentationDefinition,
    available: AvailableMatches,
    selection: Selection,
}

/// Display data for one input descriptor of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementSummary {
    pub id: String,
    pub title: String,
    pub purpose: Option<String>,
    pub requested_fields: Vec<String>,
    pub available: usize,
    pub selected: usize,
    pub is_matching: bool,
}

impl SelectionTracker {
    /// Start a session with an empty selection for every input descriptor.
    pub fn new(definition: PresentationDefinition, available: AvailableMatches) -> Self {
        let selection = definition
            .input_descriptors()
            .iter()
            .map(|descriptor| (descriptor.id().to_owned(), Vec::new()))
            .collect();

        Self {
            definition,
            available,
            selection,
        }
    }

    /// Start a session for a request, matching every credential held in `store`.
    pub async fn for_request(
        store: &dyn CredentialStore,
        definition: PresentationDefinition,
        restrictions: &Restrictions,
    ) -> Result<Self> {
        let candidates = store.fetch_all().await?;
        let available = available_matches(&definition, restrictions, &candidates);
        Ok(Self::new(definition, available))
    }

    pub fn definition(&self) -> &PresentationDefinition {
        &self.definition
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// The credentials offered for an input descriptor.
    pub fn available(&self, requirement_id: &str) -> &[UniqueCredential] {
        self.available
            .get(requirement_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace the picks of one input descriptor.
    ///
    /// Hashes that were not offered for the descriptor are ignored.
    pub fn set_selection<S: AsRef<str>>(
        &mut self,
        requirement_id: &str,
        chosen_hashes: &[S],
    ) -> Result<&Selection> {
        let Some(entry) = self.selection.get_mut(requirement_id) else {
            bail!("unknown input descriptor: {requirement_id}")
        };

        *entry = self
            .available
            .get(requirement_id)
            .into_iter()
            .flatten()
            .filter(|credential| {
                chosen_hashes
                    .iter()
                    .any(|hash| hash.as_ref() == credential.hash())
            })
            .cloned()
            .collect();

        debug!(requirement_id, selected = entry.len(), "selection updated");

        Ok(&self.selection)
    }

    pub fn is_selected(&self, requirement_id: &str, hash: &str) -> bool {
        self.selection
            .get(requirement_id)
            .is_some_and(|chosen| chosen.iter().any(|credential| credential.hash() == hash))
    }

    /// Every picked credential, in input descriptor order.
    pub fn selected_credentials(&self) -> Vec<UniqueCredential> {
        self.definition
            .input_descriptors()
            .iter()
            .filter_map(|descriptor| self.selection.get(descriptor.id()))
            .flatten()
            .cloned()
            .collect()
    }

    /// Whether the current picks, taken together, satisfy the whole request.
    pub fn is_complete(&self) -> bool {
        is_satisfied(&self.definition, &self.selected_credentials())
    }

    /// Whether the picks for one input descriptor satisfy that descriptor on its own.
    pub fn is_requirement_satisfied(&self, requirement_id: &str) -> bool {
        match (
            self.definition.input_descriptor(requirement_id),
            self.selection.get(requirement_id),
        ) {
            (Some(descriptor), Some(chosen)) => is_descriptor_satisfied(descriptor, chosen),
            _ => false,
        }
    }

    /// One row per input descriptor, in request order.
    pub fn summaries(&self) -> Vec<RequirementSummary> {
        self.definition
            .input_descriptors()
            .iter()
            .map(|descriptor| {
                let chosen = self
                    .selection
                    .get(descriptor.id())
                    .map(Vec::as_slice)
                    .unwrap_or_default();

                RequirementSummary {
                    id: descriptor.id().to_owned(),
                    title: descriptor.title().to_owned(),
                    purpose: descriptor.purpose().cloned(),
                    requested_fields: descriptor.requested_fields_human_readable(),
                    available: self.available(descriptor.id()).len(),
                    selected: chosen.len(),
                    is_matching: is_descriptor_satisfied(descriptor, chosen),
                }
            })
            .collect()
    }
}

fn is_descriptor_satisfied(descriptor: &InputDescriptor, chosen: &[UniqueCredential]) -> bool {
    !chosen.is_empty()
        && is_satisfied(&PresentationDefinition::for_input_descriptor(descriptor), chosen)
}
