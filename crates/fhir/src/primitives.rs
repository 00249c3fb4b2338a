//! Shared FHIR primitive shapes.
//!
//! These structs serialise directly: their JSON shape *is* the wire shape, so
//! no domain/wire translation layer is needed at this level.

use serde::{Deserialize, Serialize};

/// A single coding: a code from a named system.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    /// A coding with system and code, no display text.
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: Some(code.into()),
            display: None,
        }
    }
}

/// A concept expressed as one or more codings plus optional free text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    /// A concept holding a single coding.
    pub fn from_coding(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            coding: vec![Coding::new(system, code)],
            text: None,
        }
    }

    /// A concept holding free text only.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            coding: Vec::new(),
            text: Some(text.into()),
        }
    }

    /// Returns the code of the coding whose system matches `system`, if any.
    pub fn code_for_system(&self, system: &str) -> Option<&str> {
        self.coding
            .iter()
            .find(|c| c.system.as_deref() == Some(system))
            .and_then(|c| c.code.as_deref())
    }

    /// Sets the code for `system`, overwriting an existing coding in place.
    ///
    /// A concept holds at most one coding per system URL; this searches the
    /// coding list and only appends when no entry for `system` exists yet.
    pub fn set_code_for_system(&mut self, system: &str, code: impl Into<String>) {
        match self
            .coding
            .iter_mut()
            .find(|c| c.system.as_deref() == Some(system))
        {
            Some(existing) => existing.code = Some(code.into()),
            None => self.coding.push(Coding::new(system, code)),
        }
    }
}

/// A reference to another resource, with optional display name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    /// A relative reference of the form `<ResourceType>/<id>`.
    pub fn to(resource_type: &str, id: &str) -> Self {
        Self {
            reference: Some(format!("{resource_type}/{id}")),
            display: None,
        }
    }

    /// Attaches a display name.
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

/// A human name, given parts plus family part.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanName {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub name_use: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

impl HumanName {
    /// Flattens the name into `"<given..> <family>"` for display purposes.
    pub fn full(&self) -> String {
        let mut parts: Vec<&str> = self.given.iter().map(String::as_str).collect();
        if let Some(family) = self.family.as_deref() {
            parts.push(family);
        }
        parts.join(" ")
    }
}
