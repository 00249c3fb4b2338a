//! REST surface for the CRVS workflow service.
//!
//! Every workflow action is a POST carrying the record bundle as JSON plus the
//! caller's bearer token. Handlers decode the claims, hand the record to the
//! orchestrator, and map [`WorkflowError`] onto HTTP status codes; detailed
//! failures are logged rather than leaked to the caller.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use api_shared::{claims_from_bearer, HealthRes, HealthService, TokenClaims};
use crvs_core::{ActionReceipt, RejectionDetails, WorkflowError, WorkflowService};
use crvs_tracking::RegistrationNumber;

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    workflow: Arc<WorkflowService>,
}

impl AppState {
    pub fn new(workflow: Arc<WorkflowService>) -> Self {
        Self { workflow }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        declare,
        validate,
        register,
        confirm_registration,
        reject,
        certify,
        issue,
        update_declaration,
        request_correction,
        mark_duplicate,
        mark_not_duplicate,
    ),
    components(schemas(
        HealthRes,
        ActionRes,
        RecordActionReq,
        RejectReq,
        ConfirmReq,
        CorrectionReq,
        DuplicateReq,
    ))
)]
struct ApiDoc;

/// Builds the REST router for the workflow service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/records", post(declare))
        .route("/records/validate", post(validate))
        .route("/records/register", post(register))
        .route("/records/register/confirm", post(confirm_registration))
        .route("/records/reject", post(reject))
        .route("/records/certify", post(certify))
        .route("/records/issue", post(issue))
        .route("/records/update", post(update_declaration))
        .route("/records/correction", post(request_correction))
        .route("/records/duplicate", post(mark_duplicate))
        .route("/records/not-duplicate", post(mark_not_duplicate))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Request/response bodies
// ============================================================================

/// An action request carrying just the record bundle.
#[derive(Deserialize, ToSchema)]
pub struct RecordActionReq {
    /// The record bundle (composition + task + subject resources).
    #[schema(value_type = Object)]
    pub record: fhir::Bundle,
}

/// Rejection request: record plus structured reasons.
#[derive(Deserialize, ToSchema)]
pub struct RejectReq {
    #[schema(value_type = Object)]
    pub record: fhir::Bundle,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub comment: Option<String>,
}

/// Registration confirmation from the external authority.
#[derive(Deserialize, ToSchema)]
pub struct ConfirmReq {
    #[schema(value_type = Object)]
    pub record: fhir::Bundle,
    pub registration_number: String,
}

/// Correction request with optional commentary.
#[derive(Deserialize, ToSchema)]
pub struct CorrectionReq {
    #[schema(value_type = Object)]
    pub record: fhir::Bundle,
    pub comment: Option<String>,
}

/// Duplicate flagging request.
#[derive(Deserialize, ToSchema)]
pub struct DuplicateReq {
    #[schema(value_type = Object)]
    pub record: fhir::Bundle,
    /// Tracking id of the declaration this record duplicates.
    pub duplicate_of: Option<String>,
}

#[derive(Deserialize)]
struct DeclareQuery {
    #[serde(default)]
    draft: bool,
}

/// What an action did.
#[derive(Serialize, ToSchema)]
pub struct ActionRes {
    pub composition_id: Option<String>,
    pub tracking_id: Option<String>,
    pub status: Option<String>,
}

impl From<ActionReceipt> for ActionRes {
    fn from(receipt: ActionReceipt) -> Self {
        Self {
            composition_id: receipt.composition_id,
            tracking_id: receipt.tracking_id,
            status: receipt.status.map(|status| status.to_string()),
        }
    }
}

// ============================================================================
// Shared handler plumbing
// ============================================================================

type HandlerError = (StatusCode, &'static str);
type HandlerResult = Result<Json<ActionRes>, HandlerError>;

/// Decodes the caller's claims and keeps the raw token for forwarding.
fn authenticate(headers: &HeaderMap) -> Result<(TokenClaims, String), HandlerError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

    let claims = claims_from_bearer(value).map_err(|error| {
        tracing::warn!(%error, "rejected bearer token");
        (StatusCode::UNAUTHORIZED, "Invalid bearer token")
    })?;
    let token = value.trim_start_matches("Bearer ").to_owned();
    Ok((claims, token))
}

/// Maps workflow failures onto response codes, logging the detail.
fn map_error(error: WorkflowError) -> HandlerError {
    let (status, message) = match &error {
        WorkflowError::DuplicateTransition { .. } | WorkflowError::IllegalTransition { .. } => {
            (StatusCode::CONFLICT, "Conflicting registration state")
        }
        WorkflowError::Record(_) | WorkflowError::InvalidInput(_) => {
            (StatusCode::BAD_REQUEST, "Unprocessable record")
        }
        WorkflowError::MissingScope { .. } => (StatusCode::FORBIDDEN, "Insufficient scope"),
        WorkflowError::PractitionerLookup(_)
        | WorkflowError::LocationLookup(_)
        | WorkflowError::Persistence(_)
        | WorkflowError::PersistenceConflict(_)
        | WorkflowError::TrackingIdExhausted { .. }
        | WorkflowError::ExternalValidation(_) => (StatusCode::BAD_GATEWAY, "Upstream failure"),
        WorkflowError::Notification(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    };
    tracing::error!(%error, "workflow action failed");
    (status, message)
}

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/records",
    request_body = RecordActionReq,
    params(
        ("draft" = Option<bool>, Query, description = "Save as an in-progress draft")
    ),
    responses(
        (status = 200, description = "Declaration submitted", body = ActionRes),
        (status = 400, description = "Unprocessable record"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope"),
        (status = 409, description = "Conflicting registration state"),
        (status = 502, description = "Upstream failure")
    )
)]
/// Submit a new declaration.
///
/// Drafts (`?draft=true`) are stamped in-progress; complete declarations
/// derive their status from the actor's scopes. Tracking-id collisions are
/// retried with regenerated ids before giving up.
#[axum::debug_handler]
async fn declare(
    State(state): State<AppState>,
    Query(query): Query<DeclareQuery>,
    headers: HeaderMap,
    Json(req): Json<RecordActionReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    state
        .workflow
        .declare_record(req.record, &claims, query.draft)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/validate",
    request_body = RecordActionReq,
    responses(
        (status = 200, description = "Declaration validated", body = ActionRes),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope"),
        (status = 409, description = "Conflicting registration state")
    )
)]
/// Confirm a declaration is complete and consistent.
#[axum::debug_handler]
async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordActionReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    state
        .workflow
        .validate_record(req.record, &claims)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/register",
    request_body = RecordActionReq,
    responses(
        (status = 200, description = "Registered, or parked for external validation", body = ActionRes),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope"),
        (status = 409, description = "Conflicting registration state"),
        (status = 502, description = "Upstream failure")
    )
)]
/// Register the event.
///
/// Jurisdictions with external sign-off park the record as
/// waiting-validation; a failed call-out comes back with the record already
/// rejected server-side.
#[axum::debug_handler]
async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordActionReq>,
) -> HandlerResult {
    let (claims, token) = authenticate(&headers)?;
    state
        .workflow
        .register_record(req.record, &claims, &token)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/register/confirm",
    request_body = ConfirmReq,
    responses(
        (status = 200, description = "Registration number applied", body = ActionRes),
        (status = 400, description = "Unprocessable record"),
        (status = 401, description = "Missing or invalid token"),
        (status = 409, description = "Conflicting registration state")
    )
)]
/// Apply the asynchronous disposition of an external validation.
#[axum::debug_handler]
async fn confirm_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ConfirmReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    let number = RegistrationNumber::parse(&req.registration_number).map_err(|error| {
        tracing::warn!(%error, "rejected registration number");
        (StatusCode::BAD_REQUEST, "Invalid registration number")
    })?;
    state
        .workflow
        .confirm_registration(req.record, number, &claims)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/reject",
    request_body = RejectReq,
    responses(
        (status = 200, description = "Declaration rejected", body = ActionRes),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope")
    )
)]
/// Reject a declaration with structured reasons.
#[axum::debug_handler]
async fn reject(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RejectReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    let details = RejectionDetails::new(req.reasons, req.comment);
    state
        .workflow
        .reject_record(req.record, &claims, &details)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/certify",
    request_body = RecordActionReq,
    responses(
        (status = 200, description = "Certified copy recorded", body = ActionRes),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope"),
        (status = 409, description = "Conflicting registration state")
    )
)]
/// Record the production of a certified copy. Repeatable.
#[axum::debug_handler]
async fn certify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordActionReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    state
        .workflow
        .certify_record(req.record, &claims)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/issue",
    request_body = RecordActionReq,
    responses(
        (status = 200, description = "Certificate issued", body = ActionRes),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope"),
        (status = 409, description = "Conflicting registration state")
    )
)]
/// Record the hand-over of a printed certificate.
#[axum::debug_handler]
async fn issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordActionReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    state
        .workflow
        .issue_record(req.record, &claims)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/update",
    request_body = RecordActionReq,
    responses(
        (status = 200, description = "Declaration amended", body = ActionRes),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope"),
        (status = 409, description = "Conflicting registration state")
    )
)]
/// Amend a previously submitted declaration.
#[axum::debug_handler]
async fn update_declaration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordActionReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    state
        .workflow
        .update_declaration(req.record, &claims)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/correction",
    request_body = CorrectionReq,
    responses(
        (status = 200, description = "Correction request opened", body = ActionRes),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope")
    )
)]
/// Open a correction request on a registered record.
#[axum::debug_handler]
async fn request_correction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CorrectionReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    state
        .workflow
        .request_correction(req.record, &claims, req.comment)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/duplicate",
    request_body = DuplicateReq,
    responses(
        (status = 200, description = "Record flagged as duplicate", body = ActionRes),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope")
    )
)]
/// Flag the record as a duplicate of another declaration.
#[axum::debug_handler]
async fn mark_duplicate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DuplicateReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    state
        .workflow
        .mark_record_duplicate(req.record, &claims, req.duplicate_of)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[utoipa::path(
    post,
    path = "/records/not-duplicate",
    request_body = RecordActionReq,
    responses(
        (status = 200, description = "Duplicate flag cleared", body = ActionRes),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Insufficient scope")
    )
)]
/// Clear a duplicate flag after review.
#[axum::debug_handler]
async fn mark_not_duplicate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordActionReq>,
) -> HandlerResult {
    let (claims, _token) = authenticate(&headers)?;
    state
        .workflow
        .mark_record_not_duplicate(req.record, &claims)
        .await
        .map(|receipt| Json(receipt.into()))
        .map_err(map_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_transition_maps_to_conflict() {
        let (status, _) = map_error(WorkflowError::DuplicateTransition {
            status: crvs_core::RegistrationStatus::Registered,
        });
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn record_errors_map_to_bad_request() {
        let (status, _) = map_error(WorkflowError::Record(fhir::FhirError::MalformedRecord(
            "no task".into(),
        )));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_scope_maps_to_forbidden() {
        let (status, _) = map_error(WorkflowError::MissingScope { scopes: Vec::new() });
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn lookup_failures_map_to_bad_gateway() {
        let (status, _) = map_error(WorkflowError::LocationLookup("offline".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn authenticate_requires_bearer_header() {
        let headers = HeaderMap::new();
        let result = authenticate(&headers);
        assert_eq!(result.err().map(|(status, _)| status), Some(StatusCode::UNAUTHORIZED));
    }
}
