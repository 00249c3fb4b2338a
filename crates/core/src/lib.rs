//! # CRVS Core
//!
//! Core workflow logic for the civil-registration record service.
//!
//! This crate contains the registration-record state machine and its
//! document-mutation contract:
//! - Status registry and transition rules (`status`)
//! - Pure stamping operations on a record's task (`mutator`)
//! - Per-action orchestration: authorize, mutate, persist, notify
//!   (`orchestrator`)
//! - External validation gateway with its compensating rejection path
//!   (`validation`)
//! - HTTP clients for the store, directory and notification collaborators
//!   (`hearth`, `directory`, `notify`)
//!
//! **No API concerns**: request decoding, HTTP routing and OpenAPI belong in
//! `api-rest`; the document model belongs in the `fhir` crate.

pub mod collaborators;
pub mod config;
pub mod directory;
pub mod error;
pub mod hearth;
pub mod mutator;
pub mod notify;
pub mod orchestrator;
pub mod rejection;
pub mod status;
pub mod validation;

pub use collaborators::{EventNotifier, ExternalValidator, PractitionerDirectory, RecordStore};
pub use config::CoreConfig;
pub use directory::HttpPractitionerDirectory;
pub use error::{WorkflowError, WorkflowResult};
pub use hearth::HearthStore;
pub use notify::HttpEventNotifier;
pub use orchestrator::{ActionReceipt, WorkflowService, MAX_SUBMISSION_ATTEMPTS};
pub use rejection::RejectionDetails;
pub use status::{RegistrationStatus, ScopeStatusPolicy};
pub use validation::{
    HttpExternalValidator, ValidationOutcome, REGISTRATION_FAILURE_REASON,
};
