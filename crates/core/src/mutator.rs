//! Stamping operations on a record's task.
//!
//! Every workflow action funnels through these functions. They mutate the
//! in-memory document only; persistence is an explicit, separate step the
//! orchestrator performs once a whole mutation sequence has succeeded, so no
//! partially stamped task ever reaches the store.
//!
//! The operations are idempotent-safe by construction: provenance extensions
//! and the reg-status coding are searched and overwritten in place, never
//! appended twice. The two deliberate exceptions are notes (append-only, with
//! authorship back-filled at most once) and registration numbers (append, so
//! a corrected record keeps its historical numbers).

use crate::collaborators::{PractitionerDirectory, RecordStore};
use crate::status::{RegistrationStatus, ScopeStatusPolicy};
use crate::{WorkflowError, WorkflowResult};
use api_shared::TokenClaims;
use chrono::Utc;
use crvs_tracking::{RegistrationNumber, TrackingId, TrackingIdGenerator};
use crvs_types::EventType;
use fhir::urls;
use fhir::{
    Bundle, CodeableConcept, ExtensionKind, ExtensionValue, FhirError, IdentifierKind,
    Practitioner, Reference, Task,
};

/// Sets the event-type coding on `task.code`, overwriting any existing one.
pub fn setup_registration_type(task: &mut Task, event: EventType) {
    match task.code.as_mut() {
        Some(concept) => concept.set_code_for_system(urls::EVENT_TYPE_SYSTEM, event.as_str()),
        None => {
            task.code = Some(CodeableConcept::from_coding(
                urls::EVENT_TYPE_SYSTEM,
                event.as_str(),
            ));
        }
    }
}

/// Stamps the registration status onto the task.
///
/// The target is `explicit_status` when given, otherwise derived from the
/// actor's scopes through `policy`. Before anything is written the duplicate
/// guard compares the target against the *previously persisted* status.
///
/// Returns the status that was stamped.
///
/// # Errors
///
/// - [`WorkflowError::MissingScope`] when no target can be derived.
/// - [`WorkflowError::DuplicateTransition`] when the persisted record already
///   carries the target status and the target does not allow repeats.
/// - Store failures propagate unmodified.
pub async fn setup_registration_workflow(
    task: &mut Task,
    claims: &TokenClaims,
    explicit_status: Option<RegistrationStatus>,
    policy: &ScopeStatusPolicy,
    store: &dyn RecordStore,
) -> WorkflowResult<RegistrationStatus> {
    let target = match explicit_status {
        Some(status) => status,
        None => policy.status_for(&claims.scopes)?,
    };

    guard_duplicate_status(task, target, store).await?;
    task.set_business_status_code(target.as_str());
    Ok(target)
}

/// The duplicate-status guard: a best-effort race check against double
/// submission.
///
/// This reads the persisted task and compares codes; it is not a
/// compare-and-swap, so two writers can still interleave between this read
/// and the eventual persist. Tasks with no id have never been persisted and
/// pass trivially.
async fn guard_duplicate_status(
    task: &Task,
    target: RegistrationStatus,
    store: &dyn RecordStore,
) -> WorkflowResult<()> {
    let Some(task_id) = task.id.as_deref() else {
        return Ok(());
    };
    let Some(persisted) = store.get_task(task_id).await? else {
        return Ok(());
    };

    if persisted.business_status_code() == Some(target.as_str()) && !target.allows_repeat() {
        return Err(WorkflowError::DuplicateTransition { status: target });
    }
    Ok(())
}

/// Stamps the acting practitioner into the last-reg-user extension.
///
/// Overwrites an existing slot in place. `last_modified` is set only when the
/// task has never been stamped; callers that need "time of this transition"
/// must call [`touch_last_modified`] themselves.
///
/// # Errors
///
/// Fails when the practitioner resource carries no id.
pub fn setup_last_reg_user(task: &mut Task, practitioner: &Practitioner) -> WorkflowResult<()> {
    let reference = practitioner.reference()?;
    task.set_extension(
        ExtensionKind::RegLastUser,
        ExtensionValue::Reference(Reference {
            reference: Some(reference),
            display: None,
        }),
    );

    if task.last_modified.is_none() {
        task.last_modified = Some(Utc::now());
    }
    Ok(())
}

/// Renews the task's `last_modified` stamp.
pub fn touch_last_modified(task: &mut Task) {
    task.last_modified = Some(Utc::now());
}

/// Stamps the acting practitioner's office and jurisdiction into the
/// last-reg-office and last-reg-location extensions.
///
/// Both lookups go through the directory; their failures propagate unmodified
/// with no local retry.
///
/// # Errors
///
/// Directory failures, or a practitioner/location resource without an id.
pub async fn setup_last_reg_location(
    task: &mut Task,
    practitioner: &Practitioner,
    directory: &dyn PractitionerDirectory,
) -> WorkflowResult<()> {
    let practitioner_id = practitioner
        .id
        .as_deref()
        .ok_or_else(|| FhirError::InvalidInput("practitioner has no id".to_owned()))?;

    let office = directory.primary_office(practitioner_id).await?;
    let office_id = office
        .id
        .as_deref()
        .ok_or_else(|| WorkflowError::LocationLookup("primary office has no id".to_owned()))?;
    let jurisdiction = directory.office_jurisdiction(office_id).await?;

    task.set_extension(
        ExtensionKind::RegLastLocation,
        ExtensionValue::Reference(Reference {
            reference: Some(jurisdiction.reference()?),
            display: jurisdiction.name.clone(),
        }),
    );
    task.set_extension(
        ExtensionKind::RegLastOffice,
        ExtensionValue::Reference(Reference {
            reference: Some(office.reference()?),
            display: office.name.clone(),
        }),
    );
    Ok(())
}

/// Back-fills the acting practitioner as author on notes that have none.
///
/// Notes that already carry an author keep it, so replayed stamps preserve
/// original authorship.
///
/// # Errors
///
/// Fails when the practitioner resource carries no id.
pub fn setup_author_on_notes(task: &mut Task, practitioner: &Practitioner) -> WorkflowResult<()> {
    let reference = practitioner.reference()?;
    for note in &mut task.notes {
        if note.author.is_none() {
            note.author = Some(reference.clone());
        }
    }
    Ok(())
}

/// Generates a fresh tracking id and writes it to both homes: the
/// composition's identifier and the task's tracking-id slot.
///
/// Existing values are overwritten, which is exactly what the declare retry
/// loop needs after a collision.
///
/// # Errors
///
/// Returns [`FhirError::InvalidBundle`] when the record has no entries or no
/// derivable event type, and [`FhirError::MalformedRecord`] when it has
/// neither composition nor task to stamp.
pub fn set_tracking_id(
    record: &mut Bundle,
    generator: &dyn TrackingIdGenerator,
) -> WorkflowResult<TrackingId> {
    if record.entry.is_empty() {
        return Err(FhirError::InvalidBundle("record has no entries".to_owned()).into());
    }

    let event = record.event_type()?;
    let tracking_id = generator.generate(event);

    let mut stamped = false;
    if let Ok(composition) = record.composition_mut() {
        composition.tracking_id = Some(tracking_id.to_string());
        stamped = true;
    }
    if let Ok(task) = record.task_mut() {
        task.set_identifier(IdentifierKind::tracking_id(event), tracking_id.as_str());
        stamped = true;
    }

    if !stamped {
        return Err(
            FhirError::MalformedRecord("record has neither composition nor task".to_owned()).into(),
        );
    }
    Ok(tracking_id)
}

/// Records a registration number and stamps the registered status.
///
/// The number is *appended*: a corrected, re-registered record keeps its
/// historical numbers alongside the current one. The status stamp runs the
/// duplicate guard, so registering an already-registered record fails.
///
/// # Errors
///
/// Same contract as [`setup_registration_workflow`].
pub async fn mark_event_as_registered(
    task: &mut Task,
    registration_number: &RegistrationNumber,
    event: EventType,
    claims: &TokenClaims,
    policy: &ScopeStatusPolicy,
    store: &dyn RecordStore,
) -> WorkflowResult<()> {
    task.push_identifier(
        IdentifierKind::registration_number(event),
        registration_number.as_str(),
    );
    setup_registration_workflow(
        task,
        claims,
        Some(RegistrationStatus::Registered),
        policy,
        store,
    )
    .await?;
    Ok(())
}

/// Opens a correction request on the task.
///
/// The current reg-status code is snapshotted into the previous-status
/// extension first, so the record can be restored once the request resolves;
/// then the requesting-correction marker is set. The business status itself
/// is left untouched.
pub fn mark_requesting_correction(task: &mut Task) {
    if let Some(code) = task.business_status_code().map(str::to_owned) {
        task.set_extension(ExtensionKind::RegPreviousStatus, ExtensionValue::Code(code));
    }
    task.set_extension(
        ExtensionKind::RequestingCorrection,
        ExtensionValue::Code("requested".to_owned()),
    );
}

/// Flags the record as a duplicate of another declaration.
pub fn mark_as_duplicate(task: &mut Task, duplicate_of: Option<&str>) {
    let value = match duplicate_of {
        Some(tracking_id) => ExtensionValue::Text(tracking_id.to_owned()),
        None => ExtensionValue::Code("duplicate".to_owned()),
    };
    task.set_extension(ExtensionKind::MarkedAsDuplicate, value);
}

/// Clears the duplicate flag. Returns whether a flag was present.
pub fn mark_not_duplicate(task: &mut Task) -> bool {
    task.remove_extension(&ExtensionKind::MarkedAsDuplicate).is_some()
}

/// Strips the three last-* provenance extensions.
///
/// Used before exposing a task through anonymised or system-initiated read
/// paths. Every other extension and identifier is left untouched.
pub fn make_task_anonymous(task: &mut Task) {
    task.remove_extension(&ExtensionKind::RegLastUser);
    task.remove_extension(&ExtensionKind::RegLastLocation);
    task.remove_extension(&ExtensionKind::RegLastOffice);
}
