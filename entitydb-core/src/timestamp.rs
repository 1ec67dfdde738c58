//! Nanosecond-precision timestamps.
//!
//! Every tag written to storage carries one of these. `Timestamp::now()` is
//! the only clock source the core uses; callers that need deterministic
//! tests should construct a `Timestamp` directly from a known value.

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall-clock time, nanosecond precision.
    pub fn now() -> Self {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(dur.as_nanos() as u64)
    }

    /// Construct from a raw nanosecond value.
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    /// Raw nanosecond value.
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_nonzero() {
        assert!(Timestamp::now().as_nanos() > 0);
    }

    #[test]
    fn ordering_matches_value() {
        let a = Timestamp::from_nanos(100);
        let b = Timestamp::from_nanos(200);
        assert!(a < b);
    }

    #[test]
    fn display_is_raw_integer() {
        let t = Timestamp::from_nanos(42);
        assert_eq!(t.to_string(), "42");
    }
}
