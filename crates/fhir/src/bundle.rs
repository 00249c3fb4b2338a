//! The record bundle: one registration exchange.
//!
//! A record is a bundle whose first entry is the anchoring composition,
//! followed by exactly one live task and the subject resources. Partial
//! updates (a bare task re-stamp) are also bundles, with the task as the
//! first entry; the accessors below tolerate both shapes.

use crate::composition::Composition;
use crate::resources::{
    DocumentReference, Location, Observation, Patient, Practitioner, RelatedPerson,
};
use crate::task::Task;
use crate::urls;
use crate::{FhirError, FhirResult};
use crvs_types::EventType;
use serde::{Deserialize, Serialize};

/// Any resource a record bundle can carry, discriminated by `resourceType`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resourceType")]
pub enum Resource {
    Composition(Composition),
    Task(Task),
    Patient(Patient),
    RelatedPerson(RelatedPerson),
    Practitioner(Practitioner),
    Location(Location),
    DocumentReference(DocumentReference),
    Observation(Observation),
}

/// One bundle entry: a resource plus its addressable URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    pub resource: Resource,
}

/// A record bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Always `"Bundle"`; kept as a field so serialisation is lossless.
    #[serde(rename = "resourceType", default = "bundle_resource_type")]
    pub resource_type: String,
    #[serde(rename = "type", default = "bundle_document_type")]
    pub bundle_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
}

fn bundle_resource_type() -> String {
    "Bundle".to_owned()
}

fn bundle_document_type() -> String {
    "document".to_owned()
}

impl Default for Bundle {
    fn default() -> Self {
        Self {
            resource_type: bundle_resource_type(),
            bundle_type: bundle_document_type(),
            entry: Vec::new(),
        }
    }
}

impl Bundle {
    /// Parse a record bundle from JSON text.
    ///
    /// This uses `serde_path_to_error` to surface a best-effort "path" (e.g.
    /// `entry[1].resource.identifier[0]`) to the failing field when the JSON
    /// does not match the wire schema.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Translation`] naming the failing path when the
    /// input does not represent a valid record bundle.
    pub fn from_json(json_text: &str) -> FhirResult<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(json_text);
        match serde_path_to_error::deserialize::<_, Bundle>(&mut deserializer) {
            Ok(parsed) => Ok(parsed),
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() { "<root>" } else { path.as_str() };
                Err(FhirError::Translation(format!(
                    "record bundle schema mismatch at {path}: {source}"
                )))
            }
        }
    }

    /// Render the bundle as JSON text for the store boundary.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidJson`] if serialisation fails.
    pub fn to_json(&self) -> FhirResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The anchoring composition: the first entry, which must be one.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::MalformedRecord`] when the first entry is absent
    /// or not a composition.
    pub fn composition(&self) -> FhirResult<&Composition> {
        match self.entry.first().map(|entry| &entry.resource) {
            Some(Resource::Composition(composition)) => Ok(composition),
            _ => Err(FhirError::MalformedRecord(
                "first bundle entry is not a Composition".to_owned(),
            )),
        }
    }

    /// Mutable access to the anchoring composition.
    ///
    /// # Errors
    ///
    /// Same contract as [`Bundle::composition`].
    pub fn composition_mut(&mut self) -> FhirResult<&mut Composition> {
        match self.entry.first_mut().map(|entry| &mut entry.resource) {
            Some(Resource::Composition(composition)) => Ok(composition),
            _ => Err(FhirError::MalformedRecord(
                "first bundle entry is not a Composition".to_owned(),
            )),
        }
    }

    /// The record's live task, wherever it sits in the bundle.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::MalformedRecord`] when no task entry exists.
    pub fn task(&self) -> FhirResult<&Task> {
        self.entry
            .iter()
            .find_map(|entry| match &entry.resource {
                Resource::Task(task) => Some(task),
                _ => None,
            })
            .ok_or_else(|| FhirError::MalformedRecord("no task resource in record".to_owned()))
    }

    /// Mutable access to the record's live task.
    ///
    /// # Errors
    ///
    /// Same contract as [`Bundle::task`].
    pub fn task_mut(&mut self) -> FhirResult<&mut Task> {
        self.entry
            .iter_mut()
            .find_map(|entry| match &mut entry.resource {
                Resource::Task(task) => Some(task),
                _ => None,
            })
            .ok_or_else(|| FhirError::MalformedRecord("no task resource in record".to_owned()))
    }

    /// Derives the record's event type.
    ///
    /// The composition's document type coding is the primary source. Partial
    /// update bundles whose first entry is already the task fall back to the
    /// task's event coding.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidBundle`] when neither source names an
    /// event.
    pub fn event_type(&self) -> FhirResult<EventType> {
        if let Ok(composition) = self.composition() {
            if let Some(event) = composition.event_type() {
                return Ok(event);
            }
        }

        if let Ok(task) = self.task() {
            if let Some(code) = task
                .code
                .as_ref()
                .and_then(|concept| concept.code_for_system(urls::EVENT_TYPE_SYSTEM))
            {
                return code.parse::<EventType>().map_err(|_| {
                    FhirError::InvalidBundle(format!("unknown event code '{code}' on task"))
                });
            }
        }

        Err(FhirError::InvalidBundle(
            "no event type derivable from composition or task".to_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::CodeableConcept;

    fn record_json() -> String {
        r#"{
            "resourceType": "Bundle",
            "type": "document",
            "entry": [
                {
                    "fullUrl": "urn:uuid:comp-1",
                    "resource": {
                        "resourceType": "Composition",
                        "id": "comp-1",
                        "identifier": { "value": "B7N2K4Q" },
                        "status": "preliminary",
                        "type": {
                            "coding": [
                                {
                                    "system": "http://crvs.org/specs/document-types",
                                    "code": "birth-declaration"
                                }
                            ]
                        }
                    }
                },
                {
                    "resource": {
                        "resourceType": "Task",
                        "id": "task-1",
                        "status": "ready",
                        "focus": { "reference": "Composition/comp-1" }
                    }
                },
                {
                    "resource": {
                        "resourceType": "Patient",
                        "id": "child-1",
                        "name": [ { "given": ["Mwansa"], "family": "Phiri" } ]
                    }
                }
            ]
        }"#
        .to_owned()
    }

    #[test]
    fn parses_record_and_locates_resources() {
        let bundle = Bundle::from_json(&record_json()).expect("parse record");

        let composition = bundle.composition().expect("composition");
        assert_eq!(composition.id.as_deref(), Some("comp-1"));

        let task = bundle.task().expect("task");
        assert_eq!(task.id.as_deref(), Some("task-1"));

        assert_eq!(bundle.event_type().expect("event"), EventType::Birth);
    }

    #[test]
    fn reports_path_on_schema_mismatch() {
        let bad = r#"{ "resourceType": "Bundle", "entry": [ { "resource": { "resourceType": "Task", "status": 42 } } ] }"#;
        let err = Bundle::from_json(bad).expect_err("should reject bad task status");
        match err {
            FhirError::Translation(msg) => {
                assert!(msg.contains("schema mismatch"), "got: {msg}");
            }
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_task_is_malformed() {
        let json = r#"{
            "resourceType": "Bundle",
            "type": "document",
            "entry": [
                {
                    "resource": {
                        "resourceType": "Composition",
                        "type": {
                            "coding": [
                                {
                                    "system": "http://crvs.org/specs/document-types",
                                    "code": "death-declaration"
                                }
                            ]
                        }
                    }
                }
            ]
        }"#;
        let bundle = Bundle::from_json(json).expect("parse");
        assert!(matches!(bundle.task(), Err(FhirError::MalformedRecord(_))));
    }

    #[test]
    fn task_first_bundle_falls_back_to_task_code() {
        let mut task = Task::new();
        task.code = Some(CodeableConcept::from_coding(
            urls::EVENT_TYPE_SYSTEM,
            "DEATH",
        ));
        let bundle = Bundle {
            entry: vec![BundleEntry {
                full_url: None,
                resource: Resource::Task(task),
            }],
            ..Bundle::default()
        };

        assert!(matches!(
            bundle.composition(),
            Err(FhirError::MalformedRecord(_))
        ));
        assert_eq!(bundle.event_type().expect("event"), EventType::Death);
    }

    #[test]
    fn empty_bundle_has_no_event_type() {
        let bundle = Bundle::default();
        assert!(matches!(
            bundle.event_type(),
            Err(FhirError::InvalidBundle(_))
        ));
    }

    #[test]
    fn round_trip_preserves_entry_order() {
        let bundle = Bundle::from_json(&record_json()).expect("parse record");
        let json = bundle.to_json().expect("serialize");
        let back = Bundle::from_json(&json).expect("reparse");
        assert_eq!(back, bundle);
        assert_eq!(back.entry.len(), 3);
    }
}
