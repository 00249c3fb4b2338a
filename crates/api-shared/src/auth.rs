//! Bearer-token claims extraction.
//!
//! The workflow service sits behind an authenticating gateway that owns token
//! issuance and signature verification. This module only *reads* the claims a
//! verified token carries: the acting practitioner's id (`sub`) and the
//! authorization scopes. Unknown scope strings are dropped rather than
//! failing the request, so new scopes can roll out upstream first.

use base64::{engine::general_purpose, Engine as _};
use crvs_types::Scope;
use serde::Deserialize;

/// Errors raised while extracting claims from an Authorization header.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header is not a Bearer token")]
    NotBearer,
    #[error("malformed token: {0}")]
    MalformedToken(String),
}

/// The claims a workflow action acts on.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenClaims {
    /// The acting practitioner's resource id.
    pub subject: String,
    /// Recognised authorization scopes, in token order.
    pub scopes: Vec<Scope>,
}

impl TokenClaims {
    /// Claims with the given subject and scopes; used directly by tests and
    /// trusted internal callers.
    pub fn new(subject: impl Into<String>, scopes: Vec<Scope>) -> Self {
        Self {
            subject: subject.into(),
            scopes,
        }
    }

    /// Whether the token carries `scope`.
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

#[derive(Deserialize)]
struct ClaimsPayload {
    sub: String,
    #[serde(default)]
    scope: Vec<String>,
}

/// Extracts claims from an `Authorization` header value.
///
/// # Errors
///
/// Returns [`AuthError::NotBearer`] when the header does not carry a Bearer
/// token, or [`AuthError::MalformedToken`] when the token body cannot be
/// decoded.
pub fn claims_from_bearer(header_value: &str) -> Result<TokenClaims, AuthError> {
    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::NotBearer)?;
    claims_from_token(token)
}

/// Extracts claims from a raw JWT.
///
/// The payload segment is base64url-decoded and parsed; no signature check
/// happens here (the gateway upstream verified it already).
///
/// # Errors
///
/// Returns [`AuthError::MalformedToken`] when the token is not three
/// dot-separated segments, the payload is not base64url, or the payload JSON
/// lacks a subject.
pub fn claims_from_token(token: &str) -> Result<TokenClaims, AuthError> {
    let mut segments = token.split('.');
    let payload_segment = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(_header), Some(payload), Some(_signature), None) => payload,
        _ => {
            return Err(AuthError::MalformedToken(
                "expected three dot-separated segments".to_owned(),
            ))
        }
    };

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_segment)
        .map_err(|err| AuthError::MalformedToken(format!("payload is not base64url: {err}")))?;

    let payload: ClaimsPayload = serde_json::from_slice(&payload_bytes)
        .map_err(|err| AuthError::MalformedToken(format!("payload is not claims JSON: {err}")))?;

    let scopes = payload
        .scope
        .iter()
        .filter_map(|raw| raw.parse::<Scope>().ok())
        .collect();

    Ok(TokenClaims {
        subject: payload.sub,
        scopes,
    })
}
