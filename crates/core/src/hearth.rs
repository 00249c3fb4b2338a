//! HTTP client for the FHIR-speaking document store ("Hearth").
//!
//! Records live in an external store reached over plain `GET
//! /<ResourceType>/<id>` and upsert calls. This module maps that contract
//! onto the [`RecordStore`] trait; conflict responses (409) become
//! [`WorkflowError::PersistenceConflict`] so the declare retry loop can react
//! to tracking-id collisions.

use crate::collaborators::RecordStore;
use crate::{WorkflowError, WorkflowResult};
use async_trait::async_trait;
use fhir::{Bundle, Resource, Task};
use reqwest::StatusCode;

/// `reqwest`-backed [`RecordStore`].
#[derive(Clone, Debug)]
pub struct HearthStore {
    base_url: String,
    client: reqwest::Client,
}

impl HearthStore {
    /// A store client for the given base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn resource_url(&self, resource_type: &str, id: &str) -> String {
        format!("{}/{resource_type}/{id}", self.base_url)
    }
}

fn transport_error(err: reqwest::Error) -> WorkflowError {
    WorkflowError::Persistence(err.to_string())
}

async fn failure(response: reqwest::Response, context: &str) -> WorkflowError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("{context} responded {status}: {body}");
    if status == StatusCode::CONFLICT {
        WorkflowError::PersistenceConflict(message)
    } else {
        WorkflowError::Persistence(message)
    }
}

#[async_trait]
impl RecordStore for HearthStore {
    async fn get_task(&self, task_id: &str) -> WorkflowResult<Option<Task>> {
        let url = self.resource_url("Task", task_id);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(failure(response, "task fetch").await);
        }

        let task = response.json::<Task>().await.map_err(transport_error)?;
        Ok(Some(task))
    }

    async fn get_task_by_composition(
        &self,
        composition_id: &str,
    ) -> WorkflowResult<Option<Task>> {
        let url = format!(
            "{}/Task?focus=Composition/{composition_id}",
            self.base_url
        );
        let response = self.client.get(&url).send().await.map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(failure(response, "task search").await);
        }

        // Searches come back as a searchset bundle; the task accessor finds
        // the entry wherever it sits.
        let results = response.json::<Bundle>().await.map_err(transport_error)?;
        Ok(results.task().ok().cloned())
    }

    async fn update_task(&self, task: &Task) -> WorkflowResult<()> {
        let task_id = task.id.as_deref().ok_or_else(|| {
            WorkflowError::InvalidInput("cannot upsert a task without an id".to_owned())
        })?;

        let url = self.resource_url("Task", task_id);
        let response = self
            .client
            .put(&url)
            .json(&Resource::Task(task.clone()))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(failure(response, "task upsert").await);
        }
        Ok(())
    }

    async fn submit_record(&self, record: &Bundle) -> WorkflowResult<()> {
        let response = self
            .client
            .post(&self.base_url)
            .json(record)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(failure(response, "record submission").await);
        }
        Ok(())
    }
}
