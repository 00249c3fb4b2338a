//! The per-action workflow entry points.
//!
//! Every action follows the same template: resolve the acting practitioner
//! from the token claims, run the relevant mutator sequence, persist the
//! mutated task, and emit a notification event. Notification is best-effort;
//! an emission failure is logged and the action still succeeds. Persistence
//! failures, by contrast, abort the action before anything downstream sees
//! the record.

use crate::collaborators::{EventNotifier, ExternalValidator, PractitionerDirectory, RecordStore};
use crate::config::CoreConfig;
use crate::mutator::{
    mark_as_duplicate, mark_event_as_registered, mark_not_duplicate, mark_requesting_correction,
    set_tracking_id, setup_author_on_notes, setup_last_reg_location, setup_last_reg_user,
    setup_registration_type, setup_registration_workflow, touch_last_modified,
};
use crate::rejection::RejectionDetails;
use crate::status::{RegistrationStatus, ScopeStatusPolicy};
use crate::validation::{invoke_registration_validation, ValidationOutcome};
use crate::{WorkflowError, WorkflowResult};
use api_shared::TokenClaims;
use chrono::Utc;
use crvs_tracking::{
    RegistrationNumber, RegistrationNumberGenerator, TrackingId, TrackingIdGenerator,
};
use crvs_types::Scope;
use fhir::{Bundle, CodeableConcept, IdentifierKind, Practitioner, Task};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Total submission attempts against a tracking-id collision, the first
/// attempt included.
pub const MAX_SUBMISSION_ATTEMPTS: u32 = 5;

/// What an action did, for the API surface and the event payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionReceipt {
    pub composition_id: Option<String>,
    pub tracking_id: Option<String>,
    pub status: Option<RegistrationStatus>,
}

/// The workflow orchestrator.
///
/// Holds the startup configuration plus every injected collaborator. One
/// instance serves all requests; actions take the record document and the
/// caller's claims per invocation.
#[derive(Clone)]
pub struct WorkflowService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn RecordStore>,
    directory: Arc<dyn PractitionerDirectory>,
    notifier: Arc<dyn EventNotifier>,
    validator: Arc<dyn ExternalValidator>,
    tracking_ids: Arc<dyn TrackingIdGenerator>,
    registration_numbers: Arc<dyn RegistrationNumberGenerator>,
    policy: ScopeStatusPolicy,
}

impl WorkflowService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: Arc<CoreConfig>,
        store: Arc<dyn RecordStore>,
        directory: Arc<dyn PractitionerDirectory>,
        notifier: Arc<dyn EventNotifier>,
        validator: Arc<dyn ExternalValidator>,
        tracking_ids: Arc<dyn TrackingIdGenerator>,
        registration_numbers: Arc<dyn RegistrationNumberGenerator>,
        policy: ScopeStatusPolicy,
    ) -> Self {
        Self {
            cfg,
            store,
            directory,
            notifier,
            validator,
            tracking_ids,
            registration_numbers,
            policy,
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Submits a new declaration.
    ///
    /// Drafts stamp the in-progress status explicitly; complete declarations
    /// derive their status from the actor's scopes. The submission retries a
    /// tracking-id collision up to [`MAX_SUBMISSION_ATTEMPTS`] total attempts,
    /// regenerating the id each time.
    pub async fn declare_record(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
        draft: bool,
    ) -> WorkflowResult<ActionReceipt> {
        let derived = self.policy.status_for(&claims.scopes)?;
        let target = if draft {
            RegistrationStatus::InProgress
        } else {
            derived
        };

        let event = record.event_type()?;
        let practitioner = self.resolve_practitioner(claims).await?;

        {
            let task = record.task_mut()?;
            setup_registration_type(task, event);
            setup_registration_workflow(task, claims, Some(target), &self.policy, &*self.store)
                .await?;
            setup_last_reg_location(task, &practitioner, &*self.directory).await?;
            setup_last_reg_user(task, &practitioner)?;
            setup_author_on_notes(task, &practitioner)?;
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            set_tracking_id(&mut record, &*self.tracking_ids)?;
            match self.store.submit_record(&record).await {
                Ok(()) => break,
                Err(WorkflowError::PersistenceConflict(reason)) => {
                    if attempts >= MAX_SUBMISSION_ATTEMPTS {
                        return Err(WorkflowError::TrackingIdExhausted { attempts });
                    }
                    tracing::warn!(attempts, %reason, "tracking id collision, regenerating");
                }
                Err(other) => return Err(other),
            }
        }

        self.notify(event_name(target), &record).await;
        Ok(receipt(&record))
    }

    /// Confirms a declaration is complete and consistent.
    pub async fn validate_record(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Validate, Scope::Register])?;
        self.stamp_action(&mut record, claims, RegistrationStatus::Validated)
            .await?;
        self.persist_task(&record).await?;
        self.notify("validated", &record).await;
        Ok(receipt(&record))
    }

    /// Registers the event.
    ///
    /// When the jurisdiction requires third-party sign-off the record is
    /// parked in waiting-validation and handed to the validation gateway; the
    /// registered status then arrives through [`Self::confirm_registration`].
    /// Otherwise a registration number is generated in-process and the record
    /// registers directly.
    pub async fn register_record(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
        token: &str,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Register])?;

        if self.cfg.external_validation_enabled() {
            self.stamp_action(&mut record, claims, RegistrationStatus::WaitingValidation)
                .await?;
            self.persist_task(&record).await?;
            self.notify("waiting-validation", &record).await;

            let outcome = invoke_registration_validation(
                &record,
                token,
                claims,
                &*self.validator,
                &*self.store,
                &*self.directory,
                &*self.notifier,
            )
            .await?;

            let mut receipt = receipt(&record);
            if outcome == ValidationOutcome::RejectedCompensated {
                receipt.status = Some(RegistrationStatus::Rejected);
            }
            return Ok(receipt);
        }

        let event = record.event_type()?;
        let practitioner = self.resolve_practitioner(claims).await?;
        let tracking_id = current_tracking_id(record.task()?, event)?;
        let number = self.registration_numbers.generate(event, &tracking_id);

        check_transition(record.task()?, RegistrationStatus::Registered)?;
        let task = record.task_mut()?;
        mark_event_as_registered(task, &number, event, claims, &self.policy, &*self.store).await?;
        setup_last_reg_location(task, &practitioner, &*self.directory).await?;
        setup_last_reg_user(task, &practitioner)?;

        self.persist_task(&record).await?;
        self.notify("registered", &record).await;
        Ok(receipt(&record))
    }

    /// Applies the asynchronous disposition of an external validation: the
    /// authority accepted the event and assigned its registration number.
    pub async fn confirm_registration(
        &self,
        mut record: Bundle,
        registration_number: RegistrationNumber,
        claims: &TokenClaims,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Register])?;

        let event = record.event_type()?;
        let practitioner = self.resolve_practitioner(claims).await?;

        check_transition(record.task()?, RegistrationStatus::Registered)?;
        let task = record.task_mut()?;
        mark_event_as_registered(
            task,
            &registration_number,
            event,
            claims,
            &self.policy,
            &*self.store,
        )
        .await?;
        setup_last_reg_location(task, &practitioner, &*self.directory).await?;
        setup_last_reg_user(task, &practitioner)?;

        self.persist_task(&record).await?;
        self.notify("registered", &record).await;
        Ok(receipt(&record))
    }

    /// Rejects a declaration, recording structured reasons.
    pub async fn reject_record(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
        details: &RejectionDetails,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Validate, Scope::Register])?;
        let practitioner = self
            .stamp_action(&mut record, claims, RegistrationStatus::Rejected)
            .await?;

        let encoded = details.encode();
        let task = record.task_mut()?;
        task.status_reason = Some(CodeableConcept::from_text(encoded.clone()));
        task.add_note(encoded, Utc::now());
        setup_author_on_notes(task, &practitioner)?;
        touch_last_modified(task);

        self.persist_task(&record).await?;
        self.notify("rejected", &record).await;
        Ok(receipt(&record))
    }

    /// Produces a certified copy. Repeatable by design.
    pub async fn certify_record(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Certify])?;
        self.stamp_action(&mut record, claims, RegistrationStatus::Certified)
            .await?;
        self.persist_task(&record).await?;
        self.notify("certified", &record).await;
        Ok(receipt(&record))
    }

    /// Hands a printed certificate to the informant.
    pub async fn issue_record(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Issue])?;
        self.stamp_action(&mut record, claims, RegistrationStatus::Issued)
            .await?;
        self.persist_task(&record).await?;
        self.notify("issued", &record).await;
        Ok(receipt(&record))
    }

    /// Amends a previously submitted declaration.
    pub async fn update_declaration(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Declare, Scope::Validate, Scope::Register])?;
        self.stamp_action(&mut record, claims, RegistrationStatus::DeclarationUpdated)
            .await?;
        self.persist_task(&record).await?;
        self.notify("declaration-updated", &record).await;
        Ok(receipt(&record))
    }

    /// Opens a correction request.
    ///
    /// The business status stays untouched: the pre-correction status is
    /// snapshotted so the record can be restored when the request resolves.
    pub async fn request_correction(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
        comment: Option<String>,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Register])?;
        let practitioner = self.resolve_practitioner(claims).await?;

        let task = record.task_mut()?;
        mark_requesting_correction(task);
        if let Some(comment) = comment {
            task.add_note(comment, Utc::now());
        }
        setup_author_on_notes(task, &practitioner)?;
        setup_last_reg_location(task, &practitioner, &*self.directory).await?;
        setup_last_reg_user(task, &practitioner)?;
        touch_last_modified(task);

        self.persist_task(&record).await?;
        self.notify("correction-requested", &record).await;
        Ok(receipt(&record))
    }

    /// Flags the record as a duplicate of another declaration.
    pub async fn mark_record_duplicate(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
        duplicate_of: Option<String>,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Validate, Scope::Register])?;
        let practitioner = self.resolve_practitioner(claims).await?;

        let task = record.task_mut()?;
        mark_as_duplicate(task, duplicate_of.as_deref());
        setup_last_reg_location(task, &practitioner, &*self.directory).await?;
        setup_last_reg_user(task, &practitioner)?;

        self.persist_task(&record).await?;
        self.notify("marked-duplicate", &record).await;
        Ok(receipt(&record))
    }

    /// Clears a duplicate flag after review.
    pub async fn mark_record_not_duplicate(
        &self,
        mut record: Bundle,
        claims: &TokenClaims,
    ) -> WorkflowResult<ActionReceipt> {
        self.require_any_scope(claims, &[Scope::Validate, Scope::Register])?;
        let practitioner = self.resolve_practitioner(claims).await?;

        let task = record.task_mut()?;
        mark_not_duplicate(task);
        setup_last_reg_location(task, &practitioner, &*self.directory).await?;
        setup_last_reg_user(task, &practitioner)?;

        self.persist_task(&record).await?;
        self.notify("not-duplicate", &record).await;
        Ok(receipt(&record))
    }

    // ------------------------------------------------------------------
    // Shared steps
    // ------------------------------------------------------------------

    async fn resolve_practitioner(&self, claims: &TokenClaims) -> WorkflowResult<Practitioner> {
        self.directory.practitioner(&claims.subject).await
    }

    fn require_any_scope(&self, claims: &TokenClaims, allowed: &[Scope]) -> WorkflowResult<()> {
        if allowed.iter().any(|scope| claims.has_scope(*scope)) {
            return Ok(());
        }
        Err(WorkflowError::MissingScope {
            scopes: claims.scopes.clone(),
        })
    }

    /// The common stamp sequence: transition check, workflow status,
    /// last-location, last-user. Returns the resolved practitioner for
    /// actions with extra steps.
    async fn stamp_action(
        &self,
        record: &mut Bundle,
        claims: &TokenClaims,
        target: RegistrationStatus,
    ) -> WorkflowResult<Practitioner> {
        let practitioner = self.resolve_practitioner(claims).await?;
        check_transition(record.task()?, target)?;

        let task = record.task_mut()?;
        setup_registration_workflow(task, claims, Some(target), &self.policy, &*self.store).await?;
        setup_last_reg_location(task, &practitioner, &*self.directory).await?;
        setup_last_reg_user(task, &practitioner)?;
        Ok(practitioner)
    }

    async fn persist_task(&self, record: &Bundle) -> WorkflowResult<()> {
        self.store.update_task(record.task()?).await
    }

    /// Best-effort notification: failures are logged, never propagated.
    async fn notify(&self, event: &str, record: &Bundle) {
        let details = receipt(record);
        let payload = json!({
            "composition_id": details.composition_id,
            "tracking_id": details.tracking_id,
            "status": details.status,
        });
        if let Err(error) = self.notifier.emit(event, &payload).await {
            tracing::warn!(%error, event, "notification emission failed");
        }
    }
}

/// Checks the in-memory status against the transition table.
///
/// Records with no status yet (fresh declarations) pass trivially; the
/// duplicate guard still runs against the persisted status afterwards.
fn check_transition(task: &Task, target: RegistrationStatus) -> WorkflowResult<()> {
    let Some(from) = task
        .business_status_code()
        .and_then(|code| code.parse::<RegistrationStatus>().ok())
    else {
        return Ok(());
    };

    if !from.may_transition_to(target) {
        return Err(WorkflowError::IllegalTransition { from, to: target });
    }
    Ok(())
}

/// Reads the task's tracking id for `event`, validating canonical form.
fn current_tracking_id(task: &Task, event: crvs_types::EventType) -> WorkflowResult<TrackingId> {
    let value = task
        .identifier(&IdentifierKind::tracking_id(event))
        .ok_or_else(|| WorkflowError::InvalidInput("record has no tracking id".to_owned()))?;
    TrackingId::parse(value)
        .map_err(|err| WorkflowError::InvalidInput(format!("stored tracking id invalid: {err}")))
}

fn event_name(status: RegistrationStatus) -> &'static str {
    match status {
        RegistrationStatus::InProgress => "in-progress",
        RegistrationStatus::Declared => "declared",
        RegistrationStatus::Validated => "validated",
        RegistrationStatus::WaitingValidation => "waiting-validation",
        RegistrationStatus::Registered => "registered",
        RegistrationStatus::Certified => "certified",
        RegistrationStatus::Rejected => "rejected",
        RegistrationStatus::DeclarationUpdated => "declaration-updated",
        RegistrationStatus::Issued => "issued",
    }
}

/// Builds the action receipt from the mutated record.
fn receipt(record: &Bundle) -> ActionReceipt {
    let composition = record.composition().ok();
    let composition_id = composition.and_then(|c| c.id.clone());
    let tracking_id = composition
        .and_then(|c| c.tracking_id.clone())
        .or_else(|| {
            let event = record.event_type().ok()?;
            let task = record.task().ok()?;
            task.identifier(&IdentifierKind::tracking_id(event))
                .map(str::to_owned)
        });
    let status = record
        .task()
        .ok()
        .and_then(Task::business_status_code)
        .and_then(|code| code.parse().ok());

    ActionReceipt {
        composition_id,
        tracking_id,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{EventNotifier, ExternalValidator, PractitionerDirectory};
    use async_trait::async_trait;
    use crvs_tracking::SequentialRegistrationNumberGenerator;
    use fhir::{
        urls, BundleEntry, Composition, ExtensionKind, HumanName, Location, Resource,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct FakeStore {
        tasks: Mutex<HashMap<String, Task>>,
        by_composition: Mutex<HashMap<String, Task>>,
        submitted: Mutex<Vec<Bundle>>,
        updates: Mutex<Vec<Task>>,
        conflicts_before_success: AtomicU32,
        always_conflict: bool,
    }

    impl FakeStore {
        fn conflicting(always: bool, conflicts_before_success: u32) -> Self {
            Self {
                conflicts_before_success: AtomicU32::new(conflicts_before_success),
                always_conflict: always,
                ..Self::default()
            }
        }

        fn seed_task(&self, task: Task) {
            let id = task.id.clone().expect("seeded task needs an id");
            self.tasks.lock().expect("lock").insert(id, task);
        }

        fn seed_composition_task(&self, composition_id: &str, task: Task) {
            self.by_composition
                .lock()
                .expect("lock")
                .insert(composition_id.to_owned(), task);
        }

        fn submission_count(&self) -> usize {
            self.submitted.lock().expect("lock").len()
        }

        fn last_update(&self) -> Task {
            self.updates
                .lock()
                .expect("lock")
                .last()
                .cloned()
                .expect("a task was persisted")
        }
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn get_task(&self, task_id: &str) -> WorkflowResult<Option<Task>> {
            Ok(self.tasks.lock().expect("lock").get(task_id).cloned())
        }

        async fn get_task_by_composition(
            &self,
            composition_id: &str,
        ) -> WorkflowResult<Option<Task>> {
            Ok(self
                .by_composition
                .lock()
                .expect("lock")
                .get(composition_id)
                .cloned())
        }

        async fn update_task(&self, task: &Task) -> WorkflowResult<()> {
            self.updates.lock().expect("lock").push(task.clone());
            if let Some(id) = task.id.clone() {
                self.tasks.lock().expect("lock").insert(id, task.clone());
            }
            Ok(())
        }

        async fn submit_record(&self, record: &Bundle) -> WorkflowResult<()> {
            if self.always_conflict {
                return Err(WorkflowError::PersistenceConflict(
                    "tracking id taken".to_owned(),
                ));
            }
            let remaining = self.conflicts_before_success.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts_before_success
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(WorkflowError::PersistenceConflict(
                    "tracking id taken".to_owned(),
                ));
            }
            self.submitted.lock().expect("lock").push(record.clone());
            Ok(())
        }
    }

    struct FakeDirectory;

    #[async_trait]
    impl PractitionerDirectory for FakeDirectory {
        async fn practitioner(&self, practitioner_id: &str) -> WorkflowResult<Practitioner> {
            Ok(Practitioner {
                id: Some(practitioner_id.into()),
                name: vec![HumanName {
                    name_use: None,
                    given: vec!["Kennedy".into()],
                    family: Some("Mweene".into()),
                }],
            })
        }

        async fn primary_office(&self, _practitioner_id: &str) -> WorkflowResult<Location> {
            Ok(Location {
                id: Some("office-1".into()),
                name: Some("Ibombo District Office".into()),
                ..Location::default()
            })
        }

        async fn office_jurisdiction(&self, _office_id: &str) -> WorkflowResult<Location> {
            Ok(Location {
                id: Some("district-1".into()),
                name: Some("Ibombo District".into()),
                ..Location::default()
            })
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        emitted: Mutex<Vec<String>>,
        fail: bool,
    }

    impl CountingNotifier {
        fn failing() -> Self {
            Self {
                emitted: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn events(&self) -> Vec<String> {
            self.emitted.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl EventNotifier for CountingNotifier {
        async fn emit(&self, event: &str, _payload: &serde_json::Value) -> WorkflowResult<()> {
            self.emitted.lock().expect("lock").push(event.to_owned());
            if self.fail {
                return Err(WorkflowError::Notification("pipe closed".to_owned()));
            }
            Ok(())
        }
    }

    struct FakeValidator {
        succeed: bool,
    }

    #[async_trait]
    impl ExternalValidator for FakeValidator {
        async fn validate(&self, _record: &Bundle, _token: &str) -> WorkflowResult<()> {
            if self.succeed {
                Ok(())
            } else {
                Err(WorkflowError::ExternalValidation(
                    "endpoint responded 500: boom".to_owned(),
                ))
            }
        }
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    struct Harness {
        service: WorkflowService,
        store: Arc<FakeStore>,
        notifier: Arc<CountingNotifier>,
    }

    fn harness(
        store: FakeStore,
        notifier: CountingNotifier,
        validator_succeeds: bool,
        external_validation: bool,
    ) -> Harness {
        let cfg = CoreConfig::new(
            "http://hearth:3447/fhir",
            "http://directory:4000",
            "http://notify:2020",
            "http://countryconfig:3040",
            external_validation,
        )
        .expect("config")
        .into_shared();

        let store = Arc::new(store);
        let notifier = Arc::new(notifier);
        let service = WorkflowService::new(
            cfg,
            store.clone(),
            Arc::new(FakeDirectory),
            notifier.clone(),
            Arc::new(FakeValidator {
                succeed: validator_succeeds,
            }),
            Arc::new(crvs_tracking::RandomTrackingIdGenerator),
            Arc::new(SequentialRegistrationNumberGenerator::new(2026)),
            ScopeStatusPolicy::default(),
        );

        Harness {
            service,
            store,
            notifier,
        }
    }

    fn record(event_code: &str, status: Option<RegistrationStatus>) -> Bundle {
        let composition = Composition {
            id: Some("comp-1".into()),
            comp_type: CodeableConcept::from_coding(urls::DOC_TYPE_SYSTEM, event_code),
            ..Composition::default()
        };
        let mut task = Task::new();
        task.id = Some("task-1".into());
        if let Some(status) = status {
            task.set_business_status_code(status.as_str());
        }
        Bundle {
            entry: vec![
                BundleEntry {
                    full_url: None,
                    resource: Resource::Composition(composition),
                },
                BundleEntry {
                    full_url: None,
                    resource: Resource::Task(task),
                },
            ],
            ..Bundle::default()
        }
    }

    fn fresh_record(event_code: &str) -> Bundle {
        let mut bundle = record(event_code, None);
        // fresh submissions have not been persisted yet
        bundle.task_mut().expect("task").id = None;
        bundle
    }

    fn declared_record() -> Bundle {
        let mut bundle = record("birth-declaration", Some(RegistrationStatus::Declared));
        bundle
            .task_mut()
            .expect("task")
            .set_identifier(IdentifierKind::BirthTrackingId, "B7N2K4Q");
        bundle
    }

    fn field_agent() -> TokenClaims {
        TokenClaims::new("pr-agent", vec![Scope::Declare])
    }

    fn registrar() -> TokenClaims {
        TokenClaims::new("pr-registrar", vec![Scope::Validate, Scope::Register])
    }

    // ------------------------------------------------------------------
    // Declare
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn declare_submits_record_with_tracking_id() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);

        let receipt = h
            .service
            .declare_record(fresh_record("birth-declaration"), &field_agent(), false)
            .await
            .expect("declare");

        assert_eq!(receipt.status, Some(RegistrationStatus::Declared));
        let tracking_id = receipt.tracking_id.expect("tracking id");
        assert!(tracking_id.starts_with('B'));
        assert_eq!(tracking_id.len(), crvs_tracking::TRACKING_ID_LEN);

        assert_eq!(h.store.submission_count(), 1);
        let submitted = h.store.submitted.lock().expect("lock")[0].clone();
        let task = submitted.task().expect("task");
        assert_eq!(
            task.identifier(&IdentifierKind::BirthTrackingId),
            Some(tracking_id.as_str())
        );
        assert!(task.extension(&ExtensionKind::RegLastUser).is_some());
        assert!(task.extension(&ExtensionKind::RegLastOffice).is_some());

        assert_eq!(h.notifier.events(), ["declared"]);
    }

    #[tokio::test]
    async fn declare_draft_stamps_in_progress() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);

        let receipt = h
            .service
            .declare_record(fresh_record("death-declaration"), &field_agent(), true)
            .await
            .expect("draft declare");

        assert_eq!(receipt.status, Some(RegistrationStatus::InProgress));
        assert_eq!(h.notifier.events(), ["in-progress"]);
    }

    #[tokio::test]
    async fn declare_without_mapped_scope_fails() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);
        let claims = TokenClaims::new("pr-x", vec![Scope::Certify]);

        let result = h
            .service
            .declare_record(fresh_record("birth-declaration"), &claims, false)
            .await;
        assert!(matches!(result, Err(WorkflowError::MissingScope { .. })));
        assert_eq!(h.store.submission_count(), 0);
    }

    #[tokio::test]
    async fn declare_retries_collisions_with_fresh_tracking_ids() {
        let h = harness(
            FakeStore::conflicting(false, 2),
            CountingNotifier::default(),
            true,
            false,
        );

        let receipt = h
            .service
            .declare_record(fresh_record("birth-declaration"), &field_agent(), false)
            .await
            .expect("third attempt succeeds");

        assert_eq!(h.store.submission_count(), 1);
        assert!(receipt.tracking_id.is_some());
    }

    #[tokio::test]
    async fn declare_gives_up_after_five_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));

        struct AlwaysConflict(Arc<AtomicU32>);

        #[async_trait]
        impl RecordStore for AlwaysConflict {
            async fn get_task(&self, _task_id: &str) -> WorkflowResult<Option<Task>> {
                Ok(None)
            }
            async fn get_task_by_composition(
                &self,
                _composition_id: &str,
            ) -> WorkflowResult<Option<Task>> {
                Ok(None)
            }
            async fn update_task(&self, _task: &Task) -> WorkflowResult<()> {
                Ok(())
            }
            async fn submit_record(&self, _record: &Bundle) -> WorkflowResult<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(WorkflowError::PersistenceConflict(
                    "tracking id taken".to_owned(),
                ))
            }
        }

        let cfg = CoreConfig::new("http://h", "http://d", "http://n", "http://c", false)
            .expect("config")
            .into_shared();
        let service = WorkflowService::new(
            cfg,
            Arc::new(AlwaysConflict(attempts.clone())),
            Arc::new(FakeDirectory),
            Arc::new(CountingNotifier::default()),
            Arc::new(FakeValidator { succeed: true }),
            Arc::new(crvs_tracking::RandomTrackingIdGenerator),
            Arc::new(SequentialRegistrationNumberGenerator::new(2026)),
            ScopeStatusPolicy::default(),
        );

        let result = service
            .declare_record(fresh_record("birth-declaration"), &field_agent(), false)
            .await;

        match result {
            Err(WorkflowError::TrackingIdExhausted { attempts: n }) => {
                assert_eq!(n, MAX_SUBMISSION_ATTEMPTS);
            }
            other => panic!("expected TrackingIdExhausted, got {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_SUBMISSION_ATTEMPTS);
    }

    // ------------------------------------------------------------------
    // Validate / duplicate guard / transitions
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn validate_stamps_and_persists() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);

        let receipt = h
            .service
            .validate_record(declared_record(), &registrar())
            .await
            .expect("validate");

        assert_eq!(receipt.status, Some(RegistrationStatus::Validated));
        assert_eq!(h.store.last_update().business_status_code(), Some("VALIDATED"));
        assert_eq!(h.notifier.events(), ["validated"]);
    }

    #[tokio::test]
    async fn validate_requires_review_scope() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);
        let result = h
            .service
            .validate_record(declared_record(), &field_agent())
            .await;
        assert!(matches!(result, Err(WorkflowError::MissingScope { .. })));
    }

    #[tokio::test]
    async fn double_validation_hits_duplicate_guard() {
        let store = FakeStore::default();
        let mut persisted = Task::new();
        persisted.id = Some("task-1".into());
        persisted.set_business_status_code("VALIDATED");
        store.seed_task(persisted);

        let h = harness(store, CountingNotifier::default(), true, false);
        let mut record = declared_record();
        record
            .task_mut()
            .expect("task")
            .set_business_status_code("DECLARED");

        let result = h.service.validate_record(record, &registrar()).await;
        match result {
            Err(WorkflowError::DuplicateTransition { status }) => {
                assert_eq!(status, RegistrationStatus::Validated);
            }
            other => panic!("expected DuplicateTransition, got {other:?}"),
        }
        assert!(h.store.updates.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn issuing_an_unregistered_record_is_illegal() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);
        let claims = TokenClaims::new("pr-issuer", vec![Scope::Issue]);

        let result = h.service.issue_record(declared_record(), &claims).await;
        match result {
            Err(WorkflowError::IllegalTransition { from, to }) => {
                assert_eq!(from, RegistrationStatus::Declared);
                assert_eq!(to, RegistrationStatus::Issued);
            }
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Register
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn local_registration_appends_number_and_notifies() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);

        let receipt = h
            .service
            .register_record(declared_record(), &registrar(), "token")
            .await
            .expect("register");

        assert_eq!(receipt.status, Some(RegistrationStatus::Registered));
        let persisted = h.store.last_update();
        assert!(persisted
            .identifier(&IdentifierKind::BirthRegistrationNumber)
            .expect("registration number")
            .starts_with("2026B"));
        assert_eq!(h.notifier.events(), ["registered"]);
    }

    #[tokio::test]
    async fn external_registration_parks_then_accepts() {
        let store = FakeStore::default();
        let mut stored = Task::new();
        stored.id = Some("task-1".into());
        stored.set_business_status_code("WAITING_VALIDATION");
        store.seed_composition_task("comp-1", stored);

        let h = harness(store, CountingNotifier::default(), true, true);

        let receipt = h
            .service
            .register_record(declared_record(), &registrar(), "token")
            .await
            .expect("register via gateway");

        assert_eq!(receipt.status, Some(RegistrationStatus::WaitingValidation));
        assert_eq!(h.notifier.events(), ["waiting-validation"]);
    }

    #[tokio::test]
    async fn failed_external_validation_compensates_with_void() {
        let store = FakeStore::default();
        let mut stored = Task::new();
        stored.id = Some("task-1".into());
        stored.set_business_status_code("WAITING_VALIDATION");
        store.seed_composition_task("comp-1", stored);

        let h = harness(store, CountingNotifier::default(), false, true);

        let receipt = h
            .service
            .register_record(declared_record(), &registrar(), "token")
            .await
            .expect("compensated register");

        assert_eq!(receipt.status, Some(RegistrationStatus::Rejected));
        let persisted = h.store.last_update();
        assert_eq!(persisted.business_status_code(), Some("REJECTED"));
        assert_eq!(
            h.notifier.events(),
            ["waiting-validation", "void"],
            "void emitted exactly once"
        );
    }

    #[tokio::test]
    async fn confirm_registration_applies_external_number() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, true);
        let mut waiting = declared_record();
        waiting
            .task_mut()
            .expect("task")
            .set_business_status_code("WAITING_VALIDATION");

        let number = RegistrationNumber::parse("2026B9999").expect("number");
        let receipt = h
            .service
            .confirm_registration(waiting, number, &registrar())
            .await
            .expect("confirm");

        assert_eq!(receipt.status, Some(RegistrationStatus::Registered));
        assert_eq!(
            h.store
                .last_update()
                .identifier(&IdentifierKind::BirthRegistrationNumber),
            Some("2026B9999")
        );
    }

    // ------------------------------------------------------------------
    // Reject / certify / issue / correction / duplicates
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn rejection_encodes_reasons_into_status_reason_and_note() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);
        let details = RejectionDetails::new(
            vec!["duplicate".into()],
            Some("same child as B8P3L5R".into()),
        );

        let receipt = h
            .service
            .reject_record(declared_record(), &registrar(), &details)
            .await
            .expect("reject");

        assert_eq!(receipt.status, Some(RegistrationStatus::Rejected));
        let persisted = h.store.last_update();
        let reason_text = persisted
            .status_reason
            .as_ref()
            .and_then(|concept| concept.text.as_deref())
            .expect("status reason");
        let parsed = RejectionDetails::parse(reason_text).expect("legacy encoding");
        assert_eq!(parsed, details);

        let note = persisted.notes.last().expect("note");
        assert_eq!(note.text, reason_text);
        assert_eq!(note.author.as_deref(), Some("Practitioner/pr-registrar"));
        assert!(persisted.last_modified.is_some());
        assert_eq!(h.notifier.events(), ["rejected"]);
    }

    #[tokio::test]
    async fn repeat_certification_succeeds() {
        let store = FakeStore::default();
        let mut persisted = Task::new();
        persisted.id = Some("task-1".into());
        persisted.set_business_status_code("CERTIFIED");
        store.seed_task(persisted);

        let h = harness(store, CountingNotifier::default(), true, false);
        let mut certified = record("birth-declaration", Some(RegistrationStatus::Certified));
        certified
            .task_mut()
            .expect("task")
            .set_identifier(IdentifierKind::BirthTrackingId, "B7N2K4Q");
        let claims = TokenClaims::new("pr-certifier", vec![Scope::Certify]);

        let receipt = h
            .service
            .certify_record(certified, &claims)
            .await
            .expect("repeat certify");
        assert_eq!(receipt.status, Some(RegistrationStatus::Certified));
    }

    #[tokio::test]
    async fn correction_request_keeps_status_and_snapshots() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);
        let registered = record("birth-declaration", Some(RegistrationStatus::Registered));

        let receipt = h
            .service
            .request_correction(registered, &registrar(), Some("wrong spelling".into()))
            .await
            .expect("correction request");

        assert_eq!(receipt.status, Some(RegistrationStatus::Registered));
        let persisted = h.store.last_update();
        assert!(matches!(
            persisted.extension(&ExtensionKind::RegPreviousStatus),
            Some(fhir::ExtensionValue::Code(code)) if code == "REGISTERED"
        ));
        assert!(persisted
            .extension(&ExtensionKind::RequestingCorrection)
            .is_some());
        assert_eq!(h.notifier.events(), ["correction-requested"]);
    }

    #[tokio::test]
    async fn duplicate_flag_round_trip() {
        let h = harness(FakeStore::default(), CountingNotifier::default(), true, false);

        h.service
            .mark_record_duplicate(declared_record(), &registrar(), Some("B8P3L5R".into()))
            .await
            .expect("flag duplicate");
        assert!(h
            .store
            .last_update()
            .extension(&ExtensionKind::MarkedAsDuplicate)
            .is_some());

        let mut flagged = declared_record();
        mark_as_duplicate(flagged.task_mut().expect("task"), Some("B8P3L5R"));
        h.service
            .mark_record_not_duplicate(flagged, &registrar())
            .await
            .expect("clear duplicate");
        assert!(h
            .store
            .last_update()
            .extension(&ExtensionKind::MarkedAsDuplicate)
            .is_none());
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_action() {
        let h = harness(FakeStore::default(), CountingNotifier::failing(), true, false);

        let receipt = h
            .service
            .validate_record(declared_record(), &registrar())
            .await
            .expect("action succeeds despite notifier failure");

        assert_eq!(receipt.status, Some(RegistrationStatus::Validated));
        assert_eq!(h.store.updates.lock().expect("lock").len(), 1);
        assert_eq!(h.notifier.events(), ["validated"]);
    }

    #[tokio::test]
    async fn event_names_cover_every_status() {
        for status in RegistrationStatus::ALL {
            assert!(!event_name(status).is_empty());
        }
    }

    #[tokio::test]
    async fn receipt_reads_tracking_id_from_task_when_composition_lacks_it() {
        let bundle = declared_record();
        let details = receipt(&bundle);
        assert_eq!(details.composition_id.as_deref(), Some("comp-1"));
        assert_eq!(details.tracking_id.as_deref(), Some("B7N2K4Q"));
        assert_eq!(details.status, Some(RegistrationStatus::Declared));
    }
}
