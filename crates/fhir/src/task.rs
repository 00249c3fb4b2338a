//! The state-bearing `Task` resource and its translation helpers.
//!
//! This module provides both domain-level types and a wire model for the task
//! resource, which carries a record's workflow status and provenance.
//!
//! Responsibilities:
//! - Define the domain [`Task`] with *keyed* identifier/extension collections
//! - Define the wire model (FHIR's array-of-objects shape) for the JSON store
//!   boundary
//! - Provide translation helpers between the two
//!
//! Notes:
//! - A task holds at most one identifier slot per well-known system URL;
//!   setting an existing kind overwrites the slot in place. Registration
//!   numbers are the exception and accumulate via [`Task::push_identifier`].
//! - Extensions follow the same overwrite-in-place rule.
//! - Notes are append-only; an author, once present, is never overwritten.

use crate::primitives::{CodeableConcept, Reference};
use crate::urls;
use crate::FhirError;
use chrono::{DateTime, Utc};
use crvs_types::EventType;
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifier and extension keys
// ============================================================================

/// The kind of a task identifier, keyed by its well-known system URL.
///
/// Unknown systems coming back from the store are preserved verbatim in the
/// `Other` variant so a read-modify-write cycle never drops them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    BirthTrackingId,
    DeathTrackingId,
    MarriageTrackingId,
    BirthRegistrationNumber,
    DeathRegistrationNumber,
    MarriageRegistrationNumber,
    PaperFormId,
    SystemIdentifier,
    /// An identifier system this crate does not model; preserved untouched.
    Other(String),
}

impl IdentifierKind {
    /// The system URL this kind is stored under.
    pub fn system_url(&self) -> &str {
        match self {
            Self::BirthTrackingId => urls::BIRTH_TRACKING_ID,
            Self::DeathTrackingId => urls::DEATH_TRACKING_ID,
            Self::MarriageTrackingId => urls::MARRIAGE_TRACKING_ID,
            Self::BirthRegistrationNumber => urls::BIRTH_REGISTRATION_NUMBER,
            Self::DeathRegistrationNumber => urls::DEATH_REGISTRATION_NUMBER,
            Self::MarriageRegistrationNumber => urls::MARRIAGE_REGISTRATION_NUMBER,
            Self::PaperFormId => urls::PAPER_FORM_ID,
            Self::SystemIdentifier => urls::SYSTEM_IDENTIFIER,
            Self::Other(url) => url,
        }
    }

    /// Maps a stored system URL back to a kind, falling back to `Other`.
    pub fn from_system_url(url: &str) -> Self {
        match url {
            urls::BIRTH_TRACKING_ID => Self::BirthTrackingId,
            urls::DEATH_TRACKING_ID => Self::DeathTrackingId,
            urls::MARRIAGE_TRACKING_ID => Self::MarriageTrackingId,
            urls::BIRTH_REGISTRATION_NUMBER => Self::BirthRegistrationNumber,
            urls::DEATH_REGISTRATION_NUMBER => Self::DeathRegistrationNumber,
            urls::MARRIAGE_REGISTRATION_NUMBER => Self::MarriageRegistrationNumber,
            urls::PAPER_FORM_ID => Self::PaperFormId,
            urls::SYSTEM_IDENTIFIER => Self::SystemIdentifier,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The tracking-id kind for an event.
    pub fn tracking_id(event: EventType) -> Self {
        match event {
            EventType::Birth => Self::BirthTrackingId,
            EventType::Death => Self::DeathTrackingId,
            EventType::Marriage => Self::MarriageTrackingId,
        }
    }

    /// The registration-number kind for an event.
    pub fn registration_number(event: EventType) -> Self {
        match event {
            EventType::Birth => Self::BirthRegistrationNumber,
            EventType::Death => Self::DeathRegistrationNumber,
            EventType::Marriage => Self::MarriageRegistrationNumber,
        }
    }
}

/// One identifier slot on a task.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskIdentifier {
    pub kind: IdentifierKind,
    pub value: String,
}

/// The kind of a task extension, keyed by its well-known extension URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    /// Reference to the practitioner who last acted on the record.
    RegLastUser,
    /// Reference to the jurisdiction location of the last action.
    RegLastLocation,
    /// Reference to the registration office of the last action.
    RegLastOffice,
    /// Marker set while a correction request is open.
    RequestingCorrection,
    /// Snapshot of the registration status before a correction request.
    RegPreviousStatus,
    /// Marker set when the record is flagged as a duplicate.
    MarkedAsDuplicate,
    /// An extension URL this crate does not model; preserved untouched.
    Other(String),
}

impl ExtensionKind {
    /// The extension URL this kind is stored under.
    pub fn url(&self) -> &str {
        match self {
            Self::RegLastUser => urls::REG_LAST_USER,
            Self::RegLastLocation => urls::REG_LAST_LOCATION,
            Self::RegLastOffice => urls::REG_LAST_OFFICE,
            Self::RequestingCorrection => urls::REQUESTING_CORRECTION,
            Self::RegPreviousStatus => urls::REG_PREVIOUS_STATUS,
            Self::MarkedAsDuplicate => urls::MARKED_AS_DUPLICATE,
            Self::Other(url) => url,
        }
    }

    /// Maps a stored extension URL back to a kind, falling back to `Other`.
    pub fn from_url(url: &str) -> Self {
        match url {
            urls::REG_LAST_USER => Self::RegLastUser,
            urls::REG_LAST_LOCATION => Self::RegLastLocation,
            urls::REG_LAST_OFFICE => Self::RegLastOffice,
            urls::REQUESTING_CORRECTION => Self::RequestingCorrection,
            urls::REG_PREVIOUS_STATUS => Self::RegPreviousStatus,
            urls::MARKED_AS_DUPLICATE => Self::MarkedAsDuplicate,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// The value carried by a task extension.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtensionValue {
    /// A resource reference (`valueReference` on the wire).
    Reference(Reference),
    /// Free text (`valueString` on the wire).
    Text(String),
    /// A code token (`valueCode` on the wire).
    Code(String),
}

/// One extension slot on a task.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskExtension {
    pub kind: ExtensionKind,
    pub value: ExtensionValue,
}

/// An annotation on a task: free text with provenance.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    pub text: String,
    pub time: Option<DateTime<Utc>>,
    /// Practitioner reference; back-filled once and then never overwritten.
    pub author: Option<String>,
}

// ============================================================================
// Domain Task
// ============================================================================

/// The state-bearing resource of a registration record.
///
/// Identifier and extension collections are keyed internally; the FHIR
/// array-of-objects shape only exists in the wire model below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskWire", into = "TaskWire")]
pub struct Task {
    pub id: Option<String>,
    /// FHIR task status; live registration tasks stay `ready`.
    pub status: String,
    /// Reference to the composition this task governs.
    pub focus: Option<Reference>,
    /// Event-type coding (`BIRTH`/`DEATH`/`MARRIAGE`).
    pub code: Option<CodeableConcept>,
    /// Registration status concept; one coding per system URL.
    pub business_status: Option<CodeableConcept>,
    /// Structured reason text, set on rejection.
    pub status_reason: Option<CodeableConcept>,
    pub identifiers: Vec<TaskIdentifier>,
    pub extensions: Vec<TaskExtension>,
    pub notes: Vec<Note>,
    /// Set once on first stamp; renewed only by an explicit touch.
    pub last_modified: Option<DateTime<Utc>>,
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl Task {
    /// An empty task in the `ready` state.
    pub fn new() -> Self {
        Self {
            id: None,
            status: "ready".to_owned(),
            focus: None,
            code: None,
            business_status: None,
            status_reason: None,
            identifiers: Vec::new(),
            extensions: Vec::new(),
            notes: Vec::new(),
            last_modified: None,
        }
    }

    /// Returns the identifier value stored for `kind`, if any.
    ///
    /// When a kind carries several entries (registration-number history) the
    /// most recently pushed value wins.
    pub fn identifier(&self, kind: &IdentifierKind) -> Option<&str> {
        self.identifiers
            .iter()
            .rev()
            .find(|entry| entry.kind == *kind)
            .map(|entry| entry.value.as_str())
    }

    /// Sets the identifier for `kind`, overwriting an existing slot in place.
    ///
    /// A task holds one slot per kind; only when no slot exists is a new one
    /// appended.
    pub fn set_identifier(&mut self, kind: IdentifierKind, value: impl Into<String>) {
        let value = value.into();
        match self.identifiers.iter_mut().find(|entry| entry.kind == kind) {
            Some(existing) => existing.value = value,
            None => self.identifiers.push(TaskIdentifier { kind, value }),
        }
    }

    /// Appends an identifier entry regardless of existing slots.
    ///
    /// Used for registration numbers, where a corrected record keeps its
    /// historical numbers alongside the current one.
    pub fn push_identifier(&mut self, kind: IdentifierKind, value: impl Into<String>) {
        self.identifiers.push(TaskIdentifier {
            kind,
            value: value.into(),
        });
    }

    /// Returns the extension value stored for `kind`, if any.
    pub fn extension(&self, kind: &ExtensionKind) -> Option<&ExtensionValue> {
        self.extensions
            .iter()
            .find(|entry| entry.kind == *kind)
            .map(|entry| &entry.value)
    }

    /// Sets the extension for `kind`, overwriting an existing slot in place.
    pub fn set_extension(&mut self, kind: ExtensionKind, value: ExtensionValue) {
        match self.extensions.iter_mut().find(|entry| entry.kind == kind) {
            Some(existing) => existing.value = value,
            None => self.extensions.push(TaskExtension { kind, value }),
        }
    }

    /// Removes the extension slot for `kind`, returning its value if present.
    pub fn remove_extension(&mut self, kind: &ExtensionKind) -> Option<ExtensionValue> {
        let position = self.extensions.iter().position(|entry| entry.kind == *kind)?;
        Some(self.extensions.remove(position).value)
    }

    /// Returns the registration-status code carried by `business_status`.
    pub fn business_status_code(&self) -> Option<&str> {
        self.business_status
            .as_ref()
            .and_then(|concept| concept.code_for_system(urls::REG_STATUS_SYSTEM))
    }

    /// Writes the registration-status code, overwriting the existing coding
    /// for the reg-status system in place or appending one if absent.
    pub fn set_business_status_code(&mut self, code: impl Into<String>) {
        match self.business_status.as_mut() {
            Some(concept) => concept.set_code_for_system(urls::REG_STATUS_SYSTEM, code),
            None => {
                self.business_status = Some(CodeableConcept::from_coding(
                    urls::REG_STATUS_SYSTEM,
                    code,
                ));
            }
        }
    }

    /// Appends a note with no author; authorship is back-filled separately.
    pub fn add_note(&mut self, text: impl Into<String>, time: DateTime<Utc>) {
        self.notes.push(Note {
            text: text.into(),
            time: Some(time),
            author: None,
        });
    }
}

// ============================================================================
// Wire model (internal)
// ============================================================================

/// Wire representation of a task for the JSON store boundary.
///
/// This is the exact array-of-objects structure persisted by the store.
/// Unknown *fields* are ignored on input (FHIR resources carry more than this
/// crate models); unknown identifier systems and extension URLs are preserved
/// through the keyed domain collections.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default = "default_task_status")]
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    focus: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    business_status: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_reason: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier: Vec<IdentifierWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extension: Vec<ExtensionWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    note: Vec<NoteWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<DateTime<Utc>>,
}

fn default_task_status() -> String {
    "ready".to_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct IdentifierWire {
    system: String,
    value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtensionWire {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_reference: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_code: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteWire {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author_string: Option<String>,
}

// ============================================================================
// Translation helpers (internal)
// ============================================================================

impl TryFrom<TaskWire> for Task {
    type Error = FhirError;

    fn try_from(wire: TaskWire) -> Result<Self, Self::Error> {
        let identifiers = wire
            .identifier
            .into_iter()
            .map(|entry| TaskIdentifier {
                kind: IdentifierKind::from_system_url(&entry.system),
                value: entry.value,
            })
            .collect();

        let extensions = wire
            .extension
            .into_iter()
            .map(wire_extension_to_domain)
            .collect::<Result<Vec<_>, _>>()?;

        let notes = wire
            .note
            .into_iter()
            .map(|entry| Note {
                text: entry.text,
                time: entry.time,
                author: entry.author_string,
            })
            .collect();

        Ok(Self {
            id: wire.id,
            status: wire.status,
            focus: wire.focus,
            code: wire.code,
            business_status: wire.business_status,
            status_reason: wire.status_reason,
            identifiers,
            extensions,
            notes,
            last_modified: wire.last_modified,
        })
    }
}

fn wire_extension_to_domain(wire: ExtensionWire) -> Result<TaskExtension, FhirError> {
    let kind = ExtensionKind::from_url(&wire.url);
    let value = if let Some(reference) = wire.value_reference {
        ExtensionValue::Reference(reference)
    } else if let Some(text) = wire.value_string {
        ExtensionValue::Text(text)
    } else if let Some(code) = wire.value_code {
        ExtensionValue::Code(code)
    } else {
        return Err(FhirError::Translation(format!(
            "task extension '{}' carries no supported value",
            wire.url
        )));
    };
    Ok(TaskExtension { kind, value })
}

impl From<Task> for TaskWire {
    fn from(task: Task) -> Self {
        let identifier = task
            .identifiers
            .into_iter()
            .map(|entry| IdentifierWire {
                system: entry.kind.system_url().to_owned(),
                value: entry.value,
            })
            .collect();

        let extension = task
            .extensions
            .into_iter()
            .map(|entry| {
                let url = entry.kind.url().to_owned();
                match entry.value {
                    ExtensionValue::Reference(reference) => ExtensionWire {
                        url,
                        value_reference: Some(reference),
                        value_string: None,
                        value_code: None,
                    },
                    ExtensionValue::Text(text) => ExtensionWire {
                        url,
                        value_reference: None,
                        value_string: Some(text),
                        value_code: None,
                    },
                    ExtensionValue::Code(code) => ExtensionWire {
                        url,
                        value_reference: None,
                        value_string: None,
                        value_code: Some(code),
                    },
                }
            })
            .collect();

        let note = task
            .notes
            .into_iter()
            .map(|entry| NoteWire {
                text: entry.text,
                time: entry.time,
                author_string: entry.author,
            })
            .collect();

        Self {
            id: task.id,
            status: task.status,
            focus: task.focus,
            code: task.code,
            business_status: task.business_status,
            status_reason: task.status_reason,
            identifier,
            extension,
            note,
            last_modified: task.last_modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urls;

    fn sample_wire_json() -> &'static str {
        r#"{
            "id": "task-1",
            "status": "ready",
            "focus": { "reference": "Composition/comp-1" },
            "businessStatus": {
                "coding": [
                    { "system": "http://crvs.org/specs/reg-status", "code": "DECLARED" }
                ]
            },
            "identifier": [
                { "system": "http://crvs.org/specs/id/birth-tracking-id", "value": "B7N2K4Q" },
                { "system": "urn:some-national-id", "value": "X-99" }
            ],
            "extension": [
                {
                    "url": "http://crvs.org/specs/extension/regLastUser",
                    "valueReference": { "reference": "Practitioner/pr-1" }
                }
            ],
            "note": [
                { "text": "first visit", "authorString": "Practitioner/pr-0" }
            ],
            "lastModified": "2026-03-01T10:00:00Z"
        }"#
    }

    #[test]
    fn wire_round_trip_preserves_unknown_systems() {
        let task: Task = serde_json::from_str(sample_wire_json()).expect("parse task");

        assert_eq!(task.id.as_deref(), Some("task-1"));
        assert_eq!(task.business_status_code(), Some("DECLARED"));
        assert_eq!(
            task.identifier(&IdentifierKind::BirthTrackingId),
            Some("B7N2K4Q")
        );
        assert_eq!(
            task.identifier(&IdentifierKind::Other("urn:some-national-id".into())),
            Some("X-99")
        );

        let json = serde_json::to_value(&task).expect("serialize task");
        let systems: Vec<&str> = json["identifier"]
            .as_array()
            .expect("identifier array")
            .iter()
            .map(|entry| entry["system"].as_str().expect("system"))
            .collect();
        assert_eq!(
            systems,
            vec![urls::BIRTH_TRACKING_ID, "urn:some-national-id"]
        );
    }

    #[test]
    fn set_identifier_overwrites_in_place() {
        let mut task = Task::new();
        task.set_identifier(IdentifierKind::BirthTrackingId, "B7N2K4Q");
        task.set_identifier(IdentifierKind::BirthTrackingId, "B8P3L5R");

        assert_eq!(task.identifiers.len(), 1);
        assert_eq!(
            task.identifier(&IdentifierKind::BirthTrackingId),
            Some("B8P3L5R")
        );
    }

    #[test]
    fn distinct_kinds_occupy_distinct_slots() {
        let mut task = Task::new();
        task.set_identifier(IdentifierKind::BirthTrackingId, "B7N2K4Q");
        task.set_identifier(IdentifierKind::BirthRegistrationNumber, "2026B0001");

        assert_eq!(task.identifiers.len(), 2);
        assert_eq!(
            task.identifier(&IdentifierKind::BirthTrackingId),
            Some("B7N2K4Q")
        );
        assert_eq!(
            task.identifier(&IdentifierKind::BirthRegistrationNumber),
            Some("2026B0001")
        );
    }

    #[test]
    fn push_identifier_accumulates_history() {
        let mut task = Task::new();
        task.push_identifier(IdentifierKind::BirthRegistrationNumber, "2026B0001");
        task.push_identifier(IdentifierKind::BirthRegistrationNumber, "2026B0002");

        assert_eq!(task.identifiers.len(), 2);
        // the latest pushed value is the live one
        assert_eq!(
            task.identifier(&IdentifierKind::BirthRegistrationNumber),
            Some("2026B0002")
        );
    }

    #[test]
    fn set_extension_overwrites_in_place() {
        let mut task = Task::new();
        task.set_extension(
            ExtensionKind::RegLastUser,
            ExtensionValue::Reference(Reference::to("Practitioner", "a")),
        );
        task.set_extension(
            ExtensionKind::RegLastUser,
            ExtensionValue::Reference(Reference::to("Practitioner", "b")),
        );

        assert_eq!(task.extensions.len(), 1);
        match task.extension(&ExtensionKind::RegLastUser) {
            Some(ExtensionValue::Reference(reference)) => {
                assert_eq!(reference.reference.as_deref(), Some("Practitioner/b"));
            }
            other => panic!("expected reference extension, got {other:?}"),
        }
    }

    #[test]
    fn remove_extension_returns_removed_value() {
        let mut task = Task::new();
        task.set_extension(
            ExtensionKind::MarkedAsDuplicate,
            ExtensionValue::Code("duplicate".into()),
        );

        let removed = task.remove_extension(&ExtensionKind::MarkedAsDuplicate);
        assert!(matches!(removed, Some(ExtensionValue::Code(_))));
        assert!(task.extension(&ExtensionKind::MarkedAsDuplicate).is_none());
        assert!(task
            .remove_extension(&ExtensionKind::MarkedAsDuplicate)
            .is_none());
    }

    #[test]
    fn business_status_keeps_single_reg_status_coding() {
        let mut task = Task::new();
        task.set_business_status_code("DECLARED");
        task.set_business_status_code("REGISTERED");

        let concept = task.business_status.as_ref().expect("business status");
        assert_eq!(concept.coding.len(), 1);
        assert_eq!(task.business_status_code(), Some("REGISTERED"));
    }

    #[test]
    fn valueless_extension_fails_translation() {
        let json = r#"{
            "status": "ready",
            "extension": [ { "url": "http://crvs.org/specs/extension/regLastUser" } ]
        }"#;
        let result: Result<Task, _> = serde_json::from_str(json);
        let err = result.expect_err("should reject valueless extension");
        assert!(err.to_string().contains("no supported value"));
    }

    #[test]
    fn note_authors_survive_round_trip() {
        let task: Task = serde_json::from_str(sample_wire_json()).expect("parse task");
        assert_eq!(task.notes.len(), 1);
        assert_eq!(task.notes[0].author.as_deref(), Some("Practitioner/pr-0"));

        let json = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(json["note"][0]["authorString"], "Practitioner/pr-0");
    }
}
