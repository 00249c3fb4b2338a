//! FHIR wire/boundary support for civil-registration records.
//!
//! This crate provides **wire models** and **format/translation helpers** for
//! the resource bundles exchanged with the record store:
//! - the record [`Bundle`] (composition + task + subject resources)
//! - the state-bearing [`Task`] with its keyed identifier/extension collections
//! - the anchoring [`Composition`] carrying the record's tracking id
//!
//! This crate focuses on:
//! - FHIR semantic alignment (resource shapes, well-known system URLs)
//! - serialisation/deserialisation of the JSON store boundary
//! - translation between domain structures and wire structs
//!
//! Workflow semantics (status vocabulary, stamping rules, orchestration) live
//! in `crvs-core`; this crate only guarantees the document's structural
//! invariants, such as one identifier slot per well-known system URL.

pub mod bundle;
pub mod composition;
pub mod primitives;
pub mod resources;
pub mod task;
pub mod urls;

// Re-export the document model at the crate root
pub use bundle::{Bundle, BundleEntry, Resource};
pub use composition::{Composition, CompositionSection};
pub use primitives::{CodeableConcept, Coding, HumanName, Reference};
pub use resources::{
    DocumentReference, Location, Observation, Patient, Practitioner, RelatedPerson,
};
pub use task::{
    ExtensionKind, ExtensionValue, IdentifierKind, Note, Task, TaskExtension, TaskIdentifier,
};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    /// A required resource (task or composition) is missing from the record.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The bundle is structurally unusable for the requested operation.
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
