//! Bounds checks the storage core re-applies on every write, regardless of
//! what the transport already validated.

use std::ops::RangeInclusive;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{StorageError, StorageResult};

/// Allowed claim lease durations, in seconds.
pub const CLAIM_TTL_RANGE: RangeInclusive<u32> = 60..=43_200;

/// Allowed claim grace periods, in seconds.
pub const CLAIM_GRACE_RANGE: RangeInclusive<u32> = 60..=43_200;

/// Allowed message lifetimes, in seconds (one minute to two weeks).
pub const MESSAGE_TTL_RANGE: RangeInclusive<u32> = 60..=1_209_600;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("static pattern"))
}

fn check_range(what: &str, value: u32, range: &RangeInclusive<u32>) -> StorageResult<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(StorageError::bad_request(format!(
            "{what} must be between {} and {} seconds, got {value}",
            range.start(),
            range.end()
        )))
    }
}

/// Validates a claim's lease duration.
///
/// # Errors
///
/// Returns `BadRequest` when `ttl` is outside [`CLAIM_TTL_RANGE`].
pub fn claim_ttl(ttl: u32) -> StorageResult<()> {
    check_range("claim ttl", ttl, &CLAIM_TTL_RANGE)
}

/// Validates a claim's grace period.
///
/// # Errors
///
/// Returns `BadRequest` when `grace` is outside [`CLAIM_GRACE_RANGE`].
pub fn claim_grace(grace: u32) -> StorageResult<()> {
    check_range("claim grace", grace, &CLAIM_GRACE_RANGE)
}

/// Validates a message's lifetime.
///
/// # Errors
///
/// Returns `BadRequest` when `ttl` is outside [`MESSAGE_TTL_RANGE`].
pub fn message_ttl(ttl: u32) -> StorageResult<()> {
    check_range("message ttl", ttl, &MESSAGE_TTL_RANGE)
}

/// Validates a queue or pool name.
///
/// # Errors
///
/// Returns `BadRequest` unless the name is 1-64 ASCII letters, digits,
/// underscores or hyphens.
pub fn name(kind: &str, value: &str) -> StorageResult<()> {
    if name_pattern().is_match(value) {
        Ok(())
    } else {
        Err(StorageError::bad_request(format!(
            "{kind} name {value:?} must be 1-64 characters of [a-zA-Z0-9_-]"
        )))
    }
}

/// Resolves a requested claim limit against the configured default and maximum.
///
/// # Errors
///
/// Returns `BadRequest` when the limit is zero or above `max`.
pub fn claim_limit(requested: Option<usize>, default: usize, max: usize) -> StorageResult<usize> {
    let limit = requested.unwrap_or(default);
    if limit == 0 || limit > max {
        return Err(StorageError::bad_request(format!(
            "claim limit must be between 1 and {max}, got {limit}"
        )));
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn claim_bounds_are_inclusive() {
        assert!(claim_ttl(60).is_ok());
        assert!(claim_ttl(43_200).is_ok());
        assert!(claim_grace(60).is_ok());

        for bad in [0, 59, 43_201] {
            let err = claim_ttl(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BadRequest);
            assert!(claim_grace(bad).is_err());
        }
    }

    #[test]
    fn message_ttl_allows_two_weeks() {
        assert!(message_ttl(1_209_600).is_ok());
        assert!(message_ttl(1_209_601).is_err());
        assert!(message_ttl(59).is_err());
    }

    #[test]
    fn names_follow_pattern() {
        assert!(name("queue", "fizbit").is_ok());
        assert!(name("queue", "a_b-C9").is_ok());
        assert!(name("queue", "").is_err());
        assert!(name("queue", "has space").is_err());
        assert!(name("queue", "slash/name").is_err());
        assert!(name("pool", &"x".repeat(65)).is_err());
        assert!(name("pool", &"x".repeat(64)).is_ok());
    }

    #[test]
    fn claim_limit_defaults_and_bounds() {
        assert_eq!(claim_limit(None, 10, 20).unwrap(), 10);
        assert_eq!(claim_limit(Some(20), 10, 20).unwrap(), 20);
        assert!(claim_limit(Some(21), 10, 20).is_err());
        assert!(claim_limit(Some(0), 10, 20).is_err());
    }

    proptest! {
        #[test]
        fn claim_ttl_accepts_exactly_the_range(ttl in 0u32..100_000) {
            prop_assert_eq!(claim_ttl(ttl).is_ok(), CLAIM_TTL_RANGE.contains(&ttl));
        }
    }
}
