//! # API Shared
//!
//! Shared utilities and definitions for the CRVS API surfaces.
//!
//! Contains:
//! - Bearer-token claims extraction (`auth` module)
//! - Shared services like `HealthService`
//!
//! Used by `api-rest` and the root binary for common functionality.

pub mod auth;
pub mod health;

pub use auth::{claims_from_bearer, claims_from_token, AuthError, TokenClaims};
pub use health::{HealthRes, HealthService};
