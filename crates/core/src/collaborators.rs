//! Collaborator seams of the workflow service.
//!
//! Everything the workflow reaches outside its own process sits behind one of
//! these object-safe async traits: the record store, the practitioner/location
//! directory, the notification pipeline and the external validation endpoint.
//! HTTP implementations live in sibling modules; tests substitute in-memory
//! fakes.

use crate::WorkflowResult;
use async_trait::async_trait;
use fhir::{Bundle, Location, Practitioner, Task};

/// The FHIR-speaking document store holding records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetches a task by its own id. `None` when the store has never seen it.
    async fn get_task(&self, task_id: &str) -> WorkflowResult<Option<Task>>;

    /// Fetches the live task governing a composition. `None` when the record
    /// has no task yet.
    async fn get_task_by_composition(&self, composition_id: &str)
        -> WorkflowResult<Option<Task>>;

    /// Upserts a task by id.
    ///
    /// # Errors
    ///
    /// [`crate::WorkflowError::PersistenceConflict`] when the store refuses
    /// the write over an identifier collision; other failures surface as
    /// [`crate::WorkflowError::Persistence`].
    async fn update_task(&self, task: &Task) -> WorkflowResult<()>;

    /// Submits a whole record bundle (the declare path).
    ///
    /// Same conflict contract as [`RecordStore::update_task`]; a conflict
    /// here means the freshly generated tracking id is already taken.
    async fn submit_record(&self, record: &Bundle) -> WorkflowResult<()>;
}

/// Resolves actors and their places of work.
#[async_trait]
pub trait PractitionerDirectory: Send + Sync {
    /// The practitioner resource for an authenticated actor.
    async fn practitioner(&self, practitioner_id: &str) -> WorkflowResult<Practitioner>;

    /// The office a practitioner is assigned to.
    async fn primary_office(&self, practitioner_id: &str) -> WorkflowResult<Location>;

    /// The administrative jurisdiction an office sits in.
    async fn office_jurisdiction(&self, office_id: &str) -> WorkflowResult<Location>;
}

/// The internal notification/event pipeline.
///
/// Emission is best-effort: callers log failures and carry on.
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn emit(&self, event: &str, payload: &serde_json::Value) -> WorkflowResult<()>;
}

/// The third-party validation endpoint a jurisdiction may require.
#[async_trait]
pub trait ExternalValidator: Send + Sync {
    /// Posts the record for external sign-off, forwarding the caller's token.
    ///
    /// Success only means the record was accepted for validation; the final
    /// disposition arrives asynchronously through the confirmation action.
    async fn validate(&self, record: &Bundle, token: &str) -> WorkflowResult<()>;
}
