//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the workflow REST API on its own.
//!
//! ## Intended use
//! Useful for development and debugging when only the REST surface is wanted;
//! the workspace's main `crvs-run` binary is the deployable entry point.

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
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CRVS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    tracing::info!("-- Starting CRVS workflow REST API on {}", addr);

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
