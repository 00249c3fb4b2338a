//! Well-known system and extension URLs.
//!
//! These URLs are map keys at the storage boundary: identifier and extension
//! arrays are searched by them, and a task carries at most one slot per URL
//! (registration numbers excepted, which accumulate history).

/// Base namespace for all CRVS-specific system URLs.
pub const SPEC_BASE: &str = "http://crvs.org/specs";

/// System URL for the coding that carries a task's registration status.
pub const REG_STATUS_SYSTEM: &str = "http://crvs.org/specs/reg-status";

/// System URL for the coding on `task.code` naming the event type.
pub const EVENT_TYPE_SYSTEM: &str = "http://crvs.org/specs/types";

/// System URL for composition type codings (`birth-declaration` etc).
pub const DOC_TYPE_SYSTEM: &str = "http://crvs.org/specs/document-types";

// Identifier systems, one per identifier kind.
pub const BIRTH_TRACKING_ID: &str = "http://crvs.org/specs/id/birth-tracking-id";
pub const DEATH_TRACKING_ID: &str = "http://crvs.org/specs/id/death-tracking-id";
pub const MARRIAGE_TRACKING_ID: &str = "http://crvs.org/specs/id/marriage-tracking-id";
pub const BIRTH_REGISTRATION_NUMBER: &str = "http://crvs.org/specs/id/birth-registration-number";
pub const DEATH_REGISTRATION_NUMBER: &str = "http://crvs.org/specs/id/death-registration-number";
pub const MARRIAGE_REGISTRATION_NUMBER: &str =
    "http://crvs.org/specs/id/marriage-registration-number";
pub const PAPER_FORM_ID: &str = "http://crvs.org/specs/id/paper-form-id";
pub const SYSTEM_IDENTIFIER: &str = "http://crvs.org/specs/id/system_identifier";

// Extension URLs for provenance and workflow markers.
pub const REG_LAST_USER: &str = "http://crvs.org/specs/extension/regLastUser";
pub const REG_LAST_LOCATION: &str = "http://crvs.org/specs/extension/regLastLocation";
pub const REG_LAST_OFFICE: &str = "http://crvs.org/specs/extension/regLastOffice";
pub const REQUESTING_CORRECTION: &str = "http://crvs.org/specs/extension/requestingCorrection";
pub const REG_PREVIOUS_STATUS: &str = "http://crvs.org/specs/extension/regPreviousStatus";
pub const MARKED_AS_DUPLICATE: &str = "http://crvs.org/specs/extension/markedAsDuplicate";
