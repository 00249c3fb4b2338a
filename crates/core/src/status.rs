//! The registration status registry.
//!
//! The lifecycle vocabulary is a closed enumeration shared by the mutator and
//! the orchestrator. Transition legality is an explicit (and deliberately
//! permissive) table here rather than scattered ad hoc checks: the duplicate
//! guard in the mutator protects against double submission, the table below
//! protects against nonsensical jumps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{WorkflowError, WorkflowResult};
use crvs_types::Scope;

/// Lifecycle status of a registration record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    /// Incomplete declaration saved by a field agent.
    InProgress,
    /// Complete declaration submitted for review.
    Declared,
    /// Declaration confirmed consistent by a validator.
    Validated,
    /// Awaiting third-party sign-off before registration.
    WaitingValidation,
    /// Legally registered; a registration number has been assigned.
    Registered,
    /// A certified copy has been produced.
    Certified,
    /// Declaration rejected or registration voided.
    Rejected,
    /// A previously submitted declaration has been amended.
    DeclarationUpdated,
    /// A printed certificate has been handed to the informant.
    Issued,
}

impl RegistrationStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [RegistrationStatus; 9] = [
        Self::InProgress,
        Self::Declared,
        Self::Validated,
        Self::WaitingValidation,
        Self::Registered,
        Self::Certified,
        Self::Rejected,
        Self::DeclarationUpdated,
        Self::Issued,
    ];

    /// Canonical uppercase name as stored in the reg-status coding.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Declared => "DECLARED",
            Self::Validated => "VALIDATED",
            Self::WaitingValidation => "WAITING_VALIDATION",
            Self::Registered => "REGISTERED",
            Self::Certified => "CERTIFIED",
            Self::Rejected => "REJECTED",
            Self::DeclarationUpdated => "DECLARATION_UPDATED",
            Self::Issued => "ISSUED",
        }
    }

    /// Whether writing this status over itself is allowed.
    ///
    /// Only certification repeats: a record can be certified any number of
    /// times because each copy is its own event.
    pub fn allows_repeat(self) -> bool {
        matches!(self, Self::Certified)
    }

    /// Whether a record currently in `self` may move to `next`.
    ///
    /// The table is permissive on purpose: rejected records can be amended
    /// and resubmitted, registered and certified records can re-enter
    /// registration through a correction. It exists to stop the jumps that
    /// can never make sense, like issuing a certificate for a record that was
    /// never certified.
    pub fn may_transition_to(self, next: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        match self {
            InProgress => matches!(
                next,
                DeclarationUpdated | Declared | Validated | WaitingValidation | Registered | Rejected
            ),
            Declared => matches!(
                next,
                Validated | WaitingValidation | Registered | Rejected | DeclarationUpdated
            ),
            DeclarationUpdated => {
                matches!(next, Validated | WaitingValidation | Registered | Rejected)
            }
            Validated => matches!(
                next,
                WaitingValidation | Registered | Rejected | DeclarationUpdated
            ),
            WaitingValidation => matches!(next, Registered | Rejected),
            Registered => matches!(next, Certified | Registered | Rejected),
            Certified => matches!(next, Certified | Issued | Registered),
            Issued => matches!(next, Certified | Registered),
            Rejected => matches!(next, Declared | DeclarationUpdated | Validated | Registered),
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| WorkflowError::InvalidInput(format!("unknown registration status '{s}'")))
    }
}

/// The injected scope→status table.
///
/// When a workflow stamp is invoked without an explicit target status the
/// actor's scopes decide it. The table is ordered: the first scope the token
/// carries wins, so a registrar's token (which also carries `validate`)
/// resolves to the registered status.
#[derive(Clone, Debug)]
pub struct ScopeStatusPolicy {
    mapping: Vec<(Scope, RegistrationStatus)>,
}

impl Default for ScopeStatusPolicy {
    fn default() -> Self {
        Self {
            mapping: vec![
                (Scope::Register, RegistrationStatus::Registered),
                (Scope::Validate, RegistrationStatus::Validated),
                (Scope::Declare, RegistrationStatus::Declared),
            ],
        }
    }
}

impl ScopeStatusPolicy {
    /// A policy with an explicit, ordered mapping.
    pub fn with_mapping(mapping: Vec<(Scope, RegistrationStatus)>) -> Self {
        Self { mapping }
    }

    /// Derives the stamp status for an actor's scopes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::MissingScope`] when none of the actor's
    /// scopes appear in the table.
    pub fn status_for(&self, scopes: &[Scope]) -> WorkflowResult<RegistrationStatus> {
        self.mapping
            .iter()
            .find(|(scope, _)| scopes.contains(scope))
            .map(|(_, status)| *status)
            .ok_or_else(|| WorkflowError::MissingScope {
                scopes: scopes.to_vec(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for status in RegistrationStatus::ALL {
            let parsed: RegistrationStatus = status.as_str().parse().expect("parse name");
            assert_eq!(parsed, status);
        }
        assert!("ARCHIVED".parse::<RegistrationStatus>().is_err());
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&RegistrationStatus::WaitingValidation).expect("ser");
        assert_eq!(json, "\"WAITING_VALIDATION\"");
        let back: RegistrationStatus = serde_json::from_str(&json).expect("de");
        assert_eq!(back, RegistrationStatus::WaitingValidation);
    }

    #[test]
    fn only_certification_repeats() {
        for status in RegistrationStatus::ALL {
            assert_eq!(
                status.allows_repeat(),
                status == RegistrationStatus::Certified,
                "{status}"
            );
        }
    }

    #[test]
    fn waiting_validation_admits_only_final_dispositions() {
        use RegistrationStatus::*;
        for next in RegistrationStatus::ALL {
            let allowed = WaitingValidation.may_transition_to(next);
            assert_eq!(allowed, matches!(next, Registered | Rejected), "{next}");
        }
    }

    #[test]
    fn issuance_requires_certification() {
        use RegistrationStatus::*;
        assert!(Certified.may_transition_to(Issued));
        assert!(!Registered.may_transition_to(Issued));
        assert!(!Declared.may_transition_to(Issued));
    }

    #[test]
    fn rejected_records_can_be_resubmitted() {
        use RegistrationStatus::*;
        assert!(Rejected.may_transition_to(DeclarationUpdated));
        assert!(Rejected.may_transition_to(Validated));
        assert!(!Rejected.may_transition_to(Certified));
    }

    #[test]
    fn policy_prefers_register_over_validate() {
        let policy = ScopeStatusPolicy::default();
        let status = policy
            .status_for(&[Scope::Validate, Scope::Register])
            .expect("derivable");
        assert_eq!(status, RegistrationStatus::Registered);
    }

    #[test]
    fn policy_maps_each_scope() {
        let policy = ScopeStatusPolicy::default();
        assert_eq!(
            policy.status_for(&[Scope::Declare]).expect("declare"),
            RegistrationStatus::Declared
        );
        assert_eq!(
            policy.status_for(&[Scope::Validate]).expect("validate"),
            RegistrationStatus::Validated
        );
    }

    #[test]
    fn policy_rejects_unmapped_scopes() {
        let policy = ScopeStatusPolicy::default();
        let result = policy.status_for(&[Scope::Certify]);
        assert!(matches!(result, Err(WorkflowError::MissingScope { .. })));
    }
}
