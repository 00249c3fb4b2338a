//! The anchoring `Composition` resource.
//!
//! The composition is the first entry of every record bundle. It names the
//! event through its type coding and carries the record's tracking id in its
//! identifier; that value is kept in sync with the task's tracking-id slot by
//! the workflow layer.

use crate::primitives::{CodeableConcept, Reference};
use crate::urls;
use chrono::{DateTime, Utc};
use crvs_types::EventType;
use serde::{Deserialize, Serialize};

/// The composition anchoring a record's sections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "CompositionWire", into = "CompositionWire")]
pub struct Composition {
    pub id: Option<String>,
    /// The record's tracking id, when one has been assigned.
    pub tracking_id: Option<String>,
    /// Document status (`preliminary` until registered, then `final`).
    pub status: Option<String>,
    /// Document type coding naming the event (`birth-declaration` etc).
    pub comp_type: CodeableConcept,
    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub sections: Vec<CompositionSection>,
}

/// One titled section grouping references to subject resources.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<Reference>,
}

impl Composition {
    /// Derives the event type from the document type coding, if present.
    pub fn event_type(&self) -> Option<EventType> {
        let code = self.comp_type.code_for_system(urls::DOC_TYPE_SYSTEM)?;
        match code {
            "birth-declaration" | "birth-notification" => Some(EventType::Birth),
            "death-declaration" | "death-notification" => Some(EventType::Death),
            "marriage-declaration" | "marriage-notification" => Some(EventType::Marriage),
            _ => None,
        }
    }

    /// The document type code for an event's declaration.
    pub fn declaration_code(event: EventType) -> &'static str {
        match event {
            EventType::Birth => "birth-declaration",
            EventType::Death => "death-declaration",
            EventType::Marriage => "marriage-declaration",
        }
    }
}

// ============================================================================
// Wire model (internal)
// ============================================================================

/// Wire representation of a composition for the JSON store boundary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositionWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identifier: Option<CompositionIdentifierWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(rename = "type", default)]
    comp_type: CodeableConcept,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    section: Vec<CompositionSection>,
}

/// Composition identifiers only ever carry the tracking id value.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct CompositionIdentifierWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    value: String,
}

impl From<CompositionWire> for Composition {
    fn from(wire: CompositionWire) -> Self {
        Self {
            id: wire.id,
            tracking_id: wire.identifier.map(|identifier| identifier.value),
            status: wire.status,
            comp_type: wire.comp_type,
            title: wire.title,
            date: wire.date,
            sections: wire.section,
        }
    }
}

impl From<Composition> for CompositionWire {
    fn from(composition: Composition) -> Self {
        Self {
            id: composition.id,
            identifier: composition
                .tracking_id
                .map(|value| CompositionIdentifierWire {
                    system: Some("urn:ietf:rfc:3986".to_owned()),
                    value,
                }),
            status: composition.status,
            comp_type: composition.comp_type,
            title: composition.title,
            date: composition.date,
            section: composition.sections,
        }
    }
}
