//! External validation gateway.
//!
//! Some jurisdictions require a third party to sign off on every registration
//! before a registration number is issued. The gateway posts the record to the
//! configured endpoint and, when the call fails, runs a compensating
//! transaction: the stored task is forced into the rejected state, provenance
//! is re-stamped, and a void event goes out. The caller learns through the
//! outcome that the original action must not be reported as a success.

use crate::collaborators::{EventNotifier, ExternalValidator, PractitionerDirectory, RecordStore};
use crate::mutator::{setup_last_reg_location, setup_last_reg_user, touch_last_modified};
use crate::rejection::RejectionDetails;
use crate::status::RegistrationStatus;
use crate::{WorkflowError, WorkflowResult};
use api_shared::TokenClaims;
use async_trait::async_trait;
use fhir::{Bundle, CodeableConcept, FhirError};
use serde_json::json;

/// Reason code written into the compensating rejection.
pub const REGISTRATION_FAILURE_REASON: &str = "registration number generation failed";

/// What the gateway call decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The record was accepted for validation; the final disposition arrives
    /// asynchronously through the confirmation action.
    Accepted,
    /// The call failed and the record has already been rolled into the
    /// rejected state server-side. The original action is not a success.
    RejectedCompensated,
}

/// Posts the record for external sign-off, compensating on failure.
///
/// On success the record is returned unchanged. On failure the task is
/// re-fetched by composition id, forced to rejected with a status reason
/// embedding the error, provenance-stamped, persisted, and a `void` event is
/// emitted (best-effort).
///
/// # Errors
///
/// The validation failure itself is consumed; only the compensating steps can
/// fail (store, directory), and those propagate.
pub async fn invoke_registration_validation(
    record: &Bundle,
    token: &str,
    claims: &TokenClaims,
    validator: &dyn ExternalValidator,
    store: &dyn RecordStore,
    directory: &dyn PractitionerDirectory,
    notifier: &dyn EventNotifier,
) -> WorkflowResult<ValidationOutcome> {
    let error = match validator.validate(record, token).await {
        Ok(()) => return Ok(ValidationOutcome::Accepted),
        Err(error) => error,
    };

    tracing::warn!(%error, "external validation failed, compensating with rejection");

    let composition = record.composition()?;
    let composition_id = composition
        .id
        .as_deref()
        .ok_or_else(|| FhirError::MalformedRecord("composition has no id".to_owned()))?;

    let mut task = store
        .get_task_by_composition(composition_id)
        .await?
        .ok_or_else(|| {
            WorkflowError::Persistence(format!("no task stored for composition {composition_id}"))
        })?;

    // Forced transition: the duplicate guard is deliberately skipped, a
    // compensation must always land.
    task.set_business_status_code(RegistrationStatus::Rejected.as_str());
    let details = RejectionDetails::new(
        vec![REGISTRATION_FAILURE_REASON.to_owned()],
        Some(error.to_string()),
    );
    task.status_reason = Some(CodeableConcept::from_text(details.encode()));

    let practitioner = directory.practitioner(&claims.subject).await?;
    setup_last_reg_location(&mut task, &practitioner, directory).await?;
    setup_last_reg_user(&mut task, &practitioner)?;
    touch_last_modified(&mut task);

    store.update_task(&task).await?;

    let payload = json!({
        "composition_id": composition_id,
        "tracking_id": composition.tracking_id,
        "reason": REGISTRATION_FAILURE_REASON,
        "error": error.to_string(),
    });
    if let Err(notify_error) = notifier.emit("void", &payload).await {
        tracing::warn!(%notify_error, "void notification emission failed");
    }

    Ok(ValidationOutcome::RejectedCompensated)
}

/// `reqwest` implementation of [`ExternalValidator`].
///
/// Posts the whole record as JSON to `<country_config_url>/event-registration`
/// with the caller's bearer token forwarded.
#[derive(Clone, Debug)]
pub struct HttpExternalValidator {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpExternalValidator {
    /// A validator for the given country-config base URL.
    pub fn new(country_config_url: &str) -> Self {
        Self {
            endpoint: format!("{country_config_url}/event-registration"),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ExternalValidator for HttpExternalValidator {
    async fn validate(&self, record: &Bundle, token: &str) -> WorkflowResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(record)
            .send()
            .await
            .map_err(|err| WorkflowError::ExternalValidation(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(WorkflowError::ExternalValidation(format!(
            "{} responded {status}: {body}",
            self.endpoint
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crvs_types::Scope;
    use fhir::{
        BundleEntry, Composition, ExtensionKind, Location, Practitioner, Resource, Task,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FakeStore {
        tasks_by_composition: Mutex<HashMap<String, Task>>,
        updated: Mutex<Vec<Task>>,
    }

    impl FakeStore {
        fn with_composition_task(composition_id: &str, task: Task) -> Self {
            let store = Self {
                tasks_by_composition: Mutex::new(HashMap::new()),
                updated: Mutex::new(Vec::new()),
            };
            store
                .tasks_by_composition
                .lock()
                .expect("lock")
                .insert(composition_id.to_owned(), task);
            store
        }

        fn last_update(&self) -> Task {
            self.updated
                .lock()
                .expect("lock")
                .last()
                .cloned()
                .expect("a task was persisted")
        }
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn get_task(&self, _task_id: &str) -> WorkflowResult<Option<Task>> {
            Ok(None)
        }

        async fn get_task_by_composition(
            &self,
            composition_id: &str,
        ) -> WorkflowResult<Option<Task>> {
            Ok(self
                .tasks_by_composition
                .lock()
                .expect("lock")
                .get(composition_id)
                .cloned())
        }

        async fn update_task(&self, task: &Task) -> WorkflowResult<()> {
            self.updated.lock().expect("lock").push(task.clone());
            Ok(())
        }

        async fn submit_record(&self, _record: &Bundle) -> WorkflowResult<()> {
            Ok(())
        }
    }

    struct FakeDirectory;

    #[async_trait]
    impl PractitionerDirectory for FakeDirectory {
        async fn practitioner(&self, practitioner_id: &str) -> WorkflowResult<Practitioner> {
            Ok(Practitioner {
                id: Some(practitioner_id.into()),
                name: Vec::new(),
            })
        }

        async fn primary_office(&self, _practitioner_id: &str) -> WorkflowResult<Location> {
            Ok(Location {
                id: Some("office-1".into()),
                name: Some("Office".into()),
                ..Location::default()
            })
        }

        async fn office_jurisdiction(&self, _office_id: &str) -> WorkflowResult<Location> {
            Ok(Location {
                id: Some("district-1".into()),
                name: Some("District".into()),
                ..Location::default()
            })
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        emitted: Mutex<Vec<String>>,
        fail: bool,
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

    struct FlakyValidator {
        succeed: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ExternalValidator for FlakyValidator {
        async fn validate(&self, _record: &Bundle, _token: &str) -> WorkflowResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err(WorkflowError::ExternalValidation(
                    "endpoint responded 500: boom".to_owned(),
                ))
            }
        }
    }

    fn waiting_record() -> Bundle {
        let composition = Composition {
            id: Some("comp-1".into()),
            tracking_id: Some("B7N2K4Q".into()),
            comp_type: CodeableConcept::from_coding(
                fhir::urls::DOC_TYPE_SYSTEM,
                "birth-declaration",
            ),
            ..Composition::default()
        };
        let mut task = Task::new();
        task.id = Some("task-1".into());
        task.set_business_status_code(RegistrationStatus::WaitingValidation.as_str());
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

    fn stored_task() -> Task {
        let mut task = Task::new();
        task.id = Some("task-1".into());
        task.set_business_status_code(RegistrationStatus::WaitingValidation.as_str());
        task
    }

    fn claims() -> TokenClaims {
        TokenClaims::new("pr-1", vec![Scope::Register])
    }

    #[tokio::test]
    async fn success_leaves_record_untouched() {
        let record = waiting_record();
        let store = FakeStore::with_composition_task("comp-1", stored_task());
        let notifier = CountingNotifier::default();
        let validator = FlakyValidator {
            succeed: true,
            calls: AtomicU32::new(0),
        };

        let outcome = invoke_registration_validation(
            &record,
            "token",
            &claims(),
            &validator,
            &store,
            &FakeDirectory,
            &notifier,
        )
        .await
        .expect("gateway call");

        assert_eq!(outcome, ValidationOutcome::Accepted);
        assert!(store.updated.lock().expect("lock").is_empty());
        assert!(notifier.emitted.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn failure_compensates_with_rejection_and_void_event() {
        let record = waiting_record();
        let store = FakeStore::with_composition_task("comp-1", stored_task());
        let notifier = CountingNotifier::default();
        let validator = FlakyValidator {
            succeed: false,
            calls: AtomicU32::new(0),
        };

        let outcome = invoke_registration_validation(
            &record,
            "token",
            &claims(),
            &validator,
            &store,
            &FakeDirectory,
            &notifier,
        )
        .await
        .expect("compensation");

        assert_eq!(outcome, ValidationOutcome::RejectedCompensated);

        let persisted = store.last_update();
        assert_eq!(persisted.business_status_code(), Some("REJECTED"));
        let reason = persisted
            .status_reason
            .as_ref()
            .and_then(|concept| concept.text.as_deref())
            .expect("status reason");
        assert!(reason.contains("boom") || reason.contains("500"), "{reason}");
        let details = RejectionDetails::parse(reason).expect("legacy encoding parses");
        assert_eq!(details.reasons, vec![REGISTRATION_FAILURE_REASON.to_owned()]);

        // provenance was re-stamped during compensation
        assert!(persisted.extension(&ExtensionKind::RegLastUser).is_some());
        assert!(persisted.extension(&ExtensionKind::RegLastOffice).is_some());

        let emitted = notifier.emitted.lock().expect("lock");
        assert_eq!(emitted.as_slice(), ["void"]);
    }

    #[tokio::test]
    async fn notification_failure_does_not_undo_compensation() {
        let record = waiting_record();
        let store = FakeStore::with_composition_task("comp-1", stored_task());
        let notifier = CountingNotifier {
            emitted: Mutex::new(Vec::new()),
            fail: true,
        };
        let validator = FlakyValidator {
            succeed: false,
            calls: AtomicU32::new(0),
        };

        let outcome = invoke_registration_validation(
            &record,
            "token",
            &claims(),
            &validator,
            &store,
            &FakeDirectory,
            &notifier,
        )
        .await
        .expect("compensation survives notifier failure");

        assert_eq!(outcome, ValidationOutcome::RejectedCompensated);
        assert_eq!(store.last_update().business_status_code(), Some("REJECTED"));
    }

    #[tokio::test]
    async fn missing_stored_task_is_a_persistence_error() {
        let record = waiting_record();
        let store = FakeStore {
            tasks_by_composition: Mutex::new(HashMap::new()),
            updated: Mutex::new(Vec::new()),
        };
        let notifier = CountingNotifier::default();
        let validator = FlakyValidator {
            succeed: false,
            calls: AtomicU32::new(0),
        };

        let result = invoke_registration_validation(
            &record,
            "token",
            &claims(),
            &validator,
            &store,
            &FakeDirectory,
            &notifier,
        )
        .await;

        assert!(matches!(result, Err(WorkflowError::Persistence(_))));
    }
}
