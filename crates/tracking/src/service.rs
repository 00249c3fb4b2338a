//! Internal implementation of tracking-id and registration-number services.
//!
//! This module contains the implementation details for the short shareable
//! tracking ids and the authoritative registration numbers used throughout the
//! CRVS system.

use crate::{TrackingError, TrackingResult};
use crvs_types::EventType;
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Total length of a canonical tracking id (prefix letter plus 6 body characters).
pub const TRACKING_ID_LEN: usize = 7;

/// Characters allowed in the tracking-id body.
///
/// Uppercase alphanumerics with the ambiguous `0`/`O` and `1`/`I` removed, so
/// an id read out over a bad phone line survives transcription.
const TRACKING_ID_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// CRVS's canonical tracking-id representation.
///
/// This wrapper type guarantees that once constructed, the contained id is in
/// canonical form: the event prefix letter followed by six characters from the
/// unambiguous alphabet. It provides type safety for identifier operations and
/// keeps the composition identifier and the task identifier slot in agreement.
///
/// # When to use this type
/// Use this wrapper whenever you are:
/// - Accepting a tracking id from *outside* the core (API input, stored
///   composition identifier), or
/// - Writing a tracking id into a record's task and composition.
///
/// # Construction
/// - [`TrackingIdGenerator::generate`] allocates a fresh id for a new
///   declaration.
/// - [`TrackingId::parse`] validates an externally supplied identifier.
///
/// # Errors
/// [`TrackingId::parse`] returns [`TrackingError::InvalidInput`] if the input
/// is not already canonical.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrackingId(String);

impl TrackingId {
    /// Validates and parses a tracking id that must already be in canonical form.
    ///
    /// This does **not** normalise other spellings (lowercase, hyphenated).
    /// Callers must provide the canonical representation.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> TrackingResult<Self> {
        if Self::is_canonical(input) {
            return Ok(Self(input.to_owned()));
        }
        Err(TrackingError::InvalidInput(format!(
            "tracking id must be an event prefix letter followed by {} characters from the \
             unambiguous alphabet, got: '{}'",
            TRACKING_ID_LEN - 1,
            input
        )))
    }

    /// Returns true if `input` is in canonical tracking-id form.
    ///
    /// This is a purely syntactic check that validates:
    /// - Exactly 7 bytes long
    /// - First byte is `B`, `D` or `M`
    /// - Remaining bytes come from the unambiguous alphabet
    pub fn is_canonical(input: &str) -> bool {
        let bytes = input.as_bytes();
        bytes.len() == TRACKING_ID_LEN
            && matches!(bytes[0], b'B' | b'D' | b'M')
            && bytes[1..].iter().all(|b| TRACKING_ID_ALPHABET.contains(b))
    }

    /// Returns the event type this id was seeded by, derived from its prefix.
    pub fn event_type(&self) -> EventType {
        match self.0.as_bytes()[0] {
            b'B' => EventType::Birth,
            b'D' => EventType::Death,
            // is_canonical admits only B/D/M, enforced at construction
            _ => EventType::Marriage,
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TrackingId {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackingId::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for TrackingId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TrackingId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TrackingId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The authoritative number assigned once a record reaches the registered state.
///
/// The format is owned by the issuing jurisdiction, so this wrapper only
/// enforces what every jurisdiction agrees on: non-empty, uppercase
/// alphanumeric, at most 32 characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegistrationNumber(String);

impl RegistrationNumber {
    /// Validates an externally supplied registration number.
    ///
    /// # Errors
    ///
    /// Returns [`TrackingError::InvalidInput`] if `input` is empty, longer
    /// than 32 characters, or contains anything other than uppercase
    /// alphanumerics.
    pub fn parse(input: &str) -> TrackingResult<Self> {
        let ok = !input.is_empty()
            && input.len() <= 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'Z'));
        if ok {
            return Ok(Self(input.to_owned()));
        }
        Err(TrackingError::InvalidInput(format!(
            "registration number must be 1-32 uppercase alphanumeric characters, got: '{}'",
            input
        )))
    }

    /// Returns the number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RegistrationNumber {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegistrationNumber::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for RegistrationNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for RegistrationNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RegistrationNumber::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Allocates fresh tracking ids for new declarations.
///
/// Workflow code takes this as a trait object so tests can substitute a
/// deterministic implementation.
pub trait TrackingIdGenerator: Send + Sync {
    /// Generate a fresh id seeded by the record's event type.
    fn generate(&self, event: EventType) -> TrackingId;
}

/// Default generator: uniform random body characters.
///
/// Collisions are possible (the space is 32^6 per event) and are handled by
/// the submission retry loop, which regenerates on a store conflict.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTrackingIdGenerator;

impl TrackingIdGenerator for RandomTrackingIdGenerator {
    fn generate(&self, event: EventType) -> TrackingId {
        let mut rng = rand::thread_rng();
        let mut id = String::with_capacity(TRACKING_ID_LEN);
        id.push(event.tracking_prefix());
        for _ in 1..TRACKING_ID_LEN {
            let idx = rng.gen_range(0..TRACKING_ID_ALPHABET.len());
            id.push(TRACKING_ID_ALPHABET[idx] as char);
        }
        TrackingId(id)
    }
}

/// Allocates registration numbers when no external authority does it.
pub trait RegistrationNumberGenerator: Send + Sync {
    /// Generate the registration number for a newly registered event.
    fn generate(&self, event: EventType, tracking_id: &TrackingId) -> RegistrationNumber;
}

/// In-process sequential generator: `<year><event letter><8-digit sequence>`.
///
/// Suitable for deployments where the jurisdiction has not configured an
/// external registration authority. The sequence is process-local; a restart
/// resets it, so the tracking id is folded in to keep numbers distinct.
#[derive(Debug, Default)]
pub struct SequentialRegistrationNumberGenerator {
    counter: AtomicU32,
    year: u32,
}

impl SequentialRegistrationNumberGenerator {
    /// Creates a generator stamping numbers with the given four-digit year.
    pub fn new(year: u32) -> Self {
        Self {
            counter: AtomicU32::new(0),
            year,
        }
    }
}

impl RegistrationNumberGenerator for SequentialRegistrationNumberGenerator {
    fn generate(&self, event: EventType, tracking_id: &TrackingId) -> RegistrationNumber {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let raw = format!(
            "{}{}{}{:04}",
            self.year,
            event.tracking_prefix(),
            tracking_id.as_str(),
            seq
        );
        // The format above is uppercase alphanumeric within length by construction
        RegistrationNumber(raw)
    }
}
