//! HTTP client for the practitioner/location directory.
//!
//! The directory resolves an authenticated actor to a practitioner resource
//! and walks the office hierarchy for provenance stamping. Failures propagate
//! unmodified; retries are the caller's responsibility.

use crate::collaborators::PractitionerDirectory;
use crate::{WorkflowError, WorkflowResult};
use async_trait::async_trait;
use fhir::{Location, Practitioner};
use reqwest::StatusCode;

/// `reqwest`-backed [`PractitionerDirectory`].
#[derive(Clone, Debug)]
pub struct HttpPractitionerDirectory {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPractitionerDirectory {
    /// A directory client for the given base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        wrap: fn(String) -> WorkflowError,
    ) -> WorkflowResult<T> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| wrap(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(wrap(format!("{url} not found")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(wrap(format!("{url} responded {status}: {body}")));
        }

        response.json::<T>().await.map_err(|err| wrap(err.to_string()))
    }
}

#[async_trait]
impl PractitionerDirectory for HttpPractitionerDirectory {
    async fn practitioner(&self, practitioner_id: &str) -> WorkflowResult<Practitioner> {
        self.fetch_json(
            format!("{}/Practitioner/{practitioner_id}", self.base_url),
            WorkflowError::PractitionerLookup,
        )
        .await
    }

    async fn primary_office(&self, practitioner_id: &str) -> WorkflowResult<Location> {
        self.fetch_json(
            format!(
                "{}/Practitioner/{practitioner_id}/primary-office",
                self.base_url
            ),
            WorkflowError::LocationLookup,
        )
        .await
    }

    async fn office_jurisdiction(&self, office_id: &str) -> WorkflowResult<Location> {
        self.fetch_json(
            format!("{}/Location/{office_id}/jurisdiction", self.base_url),
            WorkflowError::LocationLookup,
        )
        .await
    }
}
