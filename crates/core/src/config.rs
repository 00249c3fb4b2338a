//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process
//! startup and then passed into core services. The intent is to avoid reading
//! process-wide environment variables during request handling, which can lead
//! to inconsistent behaviour in multi-threaded runtimes and test harnesses.

use crate::{WorkflowError, WorkflowResult};
use std::sync::Arc;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    hearth_url: String,
    directory_url: String,
    notification_url: String,
    country_config_url: String,
    external_validation_enabled: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// Base URLs are required and stored without a trailing slash so request
    /// paths can be joined uniformly.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidInput`] when any base URL is blank.
    pub fn new(
        hearth_url: impl Into<String>,
        directory_url: impl Into<String>,
        notification_url: impl Into<String>,
        country_config_url: impl Into<String>,
        external_validation_enabled: bool,
    ) -> WorkflowResult<Self> {
        let hearth_url = normalise_base_url("hearth_url", hearth_url.into())?;
        let directory_url = normalise_base_url("directory_url", directory_url.into())?;
        let notification_url = normalise_base_url("notification_url", notification_url.into())?;
        let country_config_url =
            normalise_base_url("country_config_url", country_config_url.into())?;

        Ok(Self {
            hearth_url,
            directory_url,
            notification_url,
            country_config_url,
            external_validation_enabled,
        })
    }

    /// Convenience for sharing the config across services.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn hearth_url(&self) -> &str {
        &self.hearth_url
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    pub fn notification_url(&self) -> &str {
        &self.notification_url
    }

    pub fn country_config_url(&self) -> &str {
        &self.country_config_url
    }

    /// Whether this jurisdiction requires third-party sign-off before a
    /// record can be registered.
    pub fn external_validation_enabled(&self) -> bool {
        self.external_validation_enabled
    }
}

fn normalise_base_url(name: &str, value: String) -> WorkflowResult<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(WorkflowError::InvalidInput(format!(
            "{name} cannot be empty"
        )));
    }
    Ok(trimmed.to_owned())
}
