//! Subject and collaborator resource shapes.
//!
//! These resources ride along in record bundles or come back from directory
//! lookups. The workflow layer never mutates them, so they serialise directly
//! without a translation layer; unknown fields are ignored on input.

use crate::primitives::{CodeableConcept, HumanName, Reference};
use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};

/// The subject of a registration event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deceased_date_time: Option<String>,
}

/// An informant or other person related to the subject.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPerson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,
}

/// The authenticated actor performing a workflow action.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Practitioner {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,
}

impl Practitioner {
    /// The relative reference used when stamping provenance.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] for a practitioner with no id,
    /// which can only come from a store that handed back an unsaved resource.
    pub fn reference(&self) -> FhirResult<String> {
        let id = self
            .id
            .as_deref()
            .ok_or_else(|| FhirError::InvalidInput("practitioner has no id".to_owned()))?;
        Ok(format!("Practitioner/{id}"))
    }

    /// Display name for provenance extensions, when one exists.
    pub fn display_name(&self) -> Option<String> {
        self.name.first().map(HumanName::full)
    }
}

/// An office or administrative jurisdiction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub location_type: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_of: Option<Reference>,
}

impl Location {
    /// The relative reference used when stamping provenance.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] for a location with no id.
    pub fn reference(&self) -> FhirResult<String> {
        let id = self
            .id
            .as_deref()
            .ok_or_else(|| FhirError::InvalidInput("location has no id".to_owned()))?;
        Ok(format!("Location/{id}"))
    }
}

/// Supporting evidence attached to a declaration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<CodeableConcept>,
    /// Attachment payloads are passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

/// A captured fact about the event (cause of death, birth weight, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
}
