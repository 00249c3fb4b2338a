//! Tracking-id and registration-number utilities.
//!
//! A declaration gets a *tracking id* the moment it is first submitted: a short
//! code that informants and field agents can read out over the phone. Once a
//! record is legally registered it additionally receives a *registration
//! number*, the authoritative identifier printed on certificates.
//!
//! To keep these identifiers consistent across the codebase, CRVS uses a
//! *canonical* tracking-id representation:
//!
//! ## Canonical tracking-id form
//! - Length: 7
//! - First character: the event prefix letter (`B`, `D` or `M`)
//! - Remaining 6 characters: drawn from an unambiguous uppercase alphabet
//!   (no `0`/`O`, no `1`/`I`)
//! - Example: `B7N2K4Q`
//!
//! Notes:
//! - Canonical form is *required* for externally supplied tracking ids (API
//!   inputs, stored composition identifiers). Use [`TrackingId::parse`] to
//!   validate an input string.
//! - Non-canonical values (lowercase, wrong length, ambiguous characters) are
//!   rejected.
//!
//! Generation is behind the [`TrackingIdGenerator`] and
//! [`RegistrationNumberGenerator`] traits so workflow code can be exercised
//! with deterministic fakes.

mod service;

// Re-export public types
pub use service::{
    RandomTrackingIdGenerator, RegistrationNumber, RegistrationNumberGenerator,
    SequentialRegistrationNumberGenerator, TrackingId, TrackingIdGenerator, TRACKING_ID_LEN,
};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type TrackingResult<T> = Result<T, TrackingError>;
