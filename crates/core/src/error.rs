use crate::status::RegistrationStatus;
use crvs_types::Scope;

/// Errors raised by workflow actions and the collaborators they drive.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The record document itself is unusable (missing task/composition,
    /// no derivable event type, schema mismatch).
    #[error(transparent)]
    Record(#[from] fhir::FhirError),

    /// The record is already in the status about to be written.
    #[error("declaration is already in {status} state")]
    DuplicateTransition { status: RegistrationStatus },

    /// The requested transition is outside the transition table.
    #[error("cannot move a record from {from} to {to}")]
    IllegalTransition {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },

    /// No target status can be derived from the actor's scopes.
    #[error("no registration status can be derived from scopes {scopes:?}")]
    MissingScope { scopes: Vec<Scope> },

    #[error("practitioner lookup failed: {0}")]
    PractitionerLookup(String),

    #[error("location lookup failed: {0}")]
    LocationLookup(String),

    /// The store refused the write because the identifier is already taken.
    #[error("persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The declare submission kept colliding on regenerated tracking ids.
    #[error("tracking id still colliding after {attempts} submission attempts")]
    TrackingIdExhausted { attempts: u32 },

    /// The external validation endpoint rejected or could not be reached.
    /// Consumed by the compensating rejection path, never surfaced raw.
    #[error("external validation failed: {0}")]
    ExternalValidation(String),

    /// Notification emission failed; logged at emit sites, never propagated.
    #[error("notification failed: {0}")]
    Notification(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Type alias for Results that can fail with a [`WorkflowError`].
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
