//! Shared validated primitives for the CRVS workspace.
//!
//! These types are deliberately small and dependency-light so that every other
//! crate (document model, core workflow, API surfaces) can share them without
//! pulling in workflow or transport concerns.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated primitive types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input did not name a known registration event
    #[error("Unknown event type: '{0}'")]
    UnknownEvent(String),
    /// The input did not name a known authorization scope
    #[error("Unknown scope: '{0}'")]
    UnknownScope(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one
/// non-whitespace character. The input is automatically trimmed of leading and
/// trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypeError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypeError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// The registration event a record describes.
///
/// Every record carries exactly one event type; it seeds the tracking-id
/// prefix and selects the registration-number identifier system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// Birth declaration or registration.
    Birth,
    /// Death declaration or registration.
    Death,
    /// Marriage declaration or registration.
    Marriage,
}

impl EventType {
    /// Canonical uppercase name, as carried in task `code` codings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Birth => "BIRTH",
            Self::Death => "DEATH",
            Self::Marriage => "MARRIAGE",
        }
    }

    /// Single-letter prefix used by tracking ids (`B`, `D` or `M`).
    pub fn tracking_prefix(self) -> char {
        match self {
            Self::Birth => 'B',
            Self::Death => 'D',
            Self::Marriage => 'M',
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BIRTH" => Ok(Self::Birth),
            "DEATH" => Ok(Self::Death),
            "MARRIAGE" => Ok(Self::Marriage),
            _ => Err(TypeError::UnknownEvent(s.to_owned())),
        }
    }
}

/// An authorization scope carried by an actor's token.
///
/// Scopes are granted upstream; this crate only names the ones the workflow
/// recognises. Unknown scope strings are dropped at the token boundary rather
/// than failing the whole request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Submit new declarations.
    Declare,
    /// Confirm a declaration is complete and consistent.
    Validate,
    /// Legally register an event.
    Register,
    /// Produce certified copies.
    Certify,
    /// Hand a printed certificate to the informant.
    Issue,
}

impl Scope {
    /// Lowercase token-claim spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Declare => "declare",
            Self::Validate => "validate",
            Self::Register => "register",
            Self::Certify => "certify",
            Self::Issue => "issue",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "declare" => Ok(Self::Declare),
            "validate" => Ok(Self::Validate),
            "register" => Ok(Self::Register),
            "certify" => Ok(Self::Certify),
            "issue" => Ok(Self::Issue),
            _ => Err(TypeError::UnknownScope(s.to_owned())),
        }
    }
}
