//! Structured rejection details and their legacy wire encoding.
//!
//! Rejections carry a list of reason codes plus a free-text comment. The
//! structured form is what the API surfaces; stored records keep the legacy
//! query-string-style encoding (`reason=<..>&comment=<..>`) inside the task's
//! status reason and note text, so both directions are implemented here.

use crate::{WorkflowError, WorkflowResult};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// A rejection's reasons and commentary in structured form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionDetails {
    /// Reason codes, e.g. `duplicate` or `missing_supporting_doc`.
    #[serde(default)]
    pub reasons: Vec<String>,
    /// Free text from the rejecting actor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RejectionDetails {
    pub fn new(reasons: Vec<String>, comment: Option<String>) -> Self {
        Self { reasons, comment }
    }

    /// Renders the legacy `reason=<..>&comment=<..>` encoding.
    ///
    /// Reasons are comma-joined before escaping; both values are
    /// percent-encoded so commas and ampersands inside them survive.
    pub fn encode(&self) -> String {
        let reasons = self.reasons.join(",");
        let reason = utf8_percent_encode(&reasons, NON_ALPHANUMERIC);
        let comment = utf8_percent_encode(self.comment.as_deref().unwrap_or(""), NON_ALPHANUMERIC);
        format!("reason={reason}&comment={comment}")
    }

    /// Parses the legacy encoding found on stored records.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidInput`] when a pair lacks `=`, a key is
    /// unknown, or a value is not valid percent-encoded UTF-8.
    pub fn parse(encoded: &str) -> WorkflowResult<Self> {
        let mut reasons = Vec::new();
        let mut comment = None;

        for pair in encoded.split('&') {
            let (key, raw_value) = pair.split_once('=').ok_or_else(|| {
                WorkflowError::InvalidInput(format!("rejection pair '{pair}' lacks '='"))
            })?;
            let value = percent_decode_str(raw_value)
                .decode_utf8()
                .map_err(|err| {
                    WorkflowError::InvalidInput(format!(
                        "rejection value for '{key}' is not UTF-8: {err}"
                    ))
                })?
                .into_owned();

            match key {
                "reason" => {
                    reasons = value
                        .split(',')
                        .filter(|part| !part.is_empty())
                        .map(str::to_owned)
                        .collect();
                }
                "comment" => {
                    comment = (!value.is_empty()).then_some(value);
                }
                other => {
                    return Err(WorkflowError::InvalidInput(format!(
                        "unknown rejection key '{other}'"
                    )));
                }
            }
        }

        Ok(Self { reasons, comment })
    }
}
