//! Main entry point for the CRVS workflow service.
//!
//! Resolves configuration from the environment once, wires the HTTP
//! collaborators (record store, directory, notification pipeline, external
//! validation endpoint) into the orchestrator, and serves the REST API.
//!
//! # Environment Variables
//! - `CRVS_REST_ADDR`: server address (default: "0.0.0.0:3000")
//! - `HEARTH_URL`: FHIR document store base URL
//! - `DIRECTORY_URL`: practitioner/location directory base URL
//! - `NOTIFICATION_URL`: notification pipeline base URL
//! - `COUNTRY_CONFIG_URL`: external validation base URL
//! - `EXTERNAL_VALIDATION`: "true" when the jurisdiction requires third-party
//!   sign-off before registration

use std::sync::Arc;

use api_rest::AppState;
use chrono::{Datelike, Utc};
use crvs_core::{
    CoreConfig, HearthStore, HttpEventNotifier, HttpExternalValidator,
    HttpPractitionerDirectory, ScopeStatusPolicy, WorkflowService,
};
use crvs_tracking::{RandomTrackingIdGenerator, SequentialRegistrationNumberGenerator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("crvs=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CRVS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    tracing::info!("++ Starting CRVS workflow service on {}", addr);

    let cfg = CoreConfig::new(
        std::env::var("HEARTH_URL").unwrap_or_else(|_| "http://localhost:3447/fhir".into()),
        std::env::var("DIRECTORY_URL").unwrap_or_else(|_| "http://localhost:4000".into()),
        std::env::var("NOTIFICATION_URL").unwrap_or_else(|_| "http://localhost:2020".into()),
        std::env::var("COUNTRY_CONFIG_URL").unwrap_or_else(|_| "http://localhost:3040".into()),
        std::env::var("EXTERNAL_VALIDATION")
            .map(|value| value == "true" || value == "1")
            .unwrap_or(false),
    )?
    .into_shared();

    if cfg.external_validation_enabled() {
        tracing::info!(
            "external validation enabled against {}",
            cfg.country_config_url()
        );
    }

    let workflow = Arc::new(WorkflowService::new(
        cfg.clone(),
        Arc::new(HearthStore::new(cfg.hearth_url())),
        Arc::new(HttpPractitionerDirectory::new(cfg.directory_url())),
        Arc::new(HttpEventNotifier::new(cfg.notification_url())),
        Arc::new(HttpExternalValidator::new(cfg.country_config_url())),
        Arc::new(RandomTrackingIdGenerator),
        Arc::new(SequentialRegistrationNumberGenerator::new(
            Utc::now().year() as u32,
        )),
        ScopeStatusPolicy::default(),
    ));

    let app = api_rest::router(AppState::new(workflow));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
