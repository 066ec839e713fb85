//! Snapshot versioning.
//!
//! Every reduction of a state that carries a `#[version]` field bumps its
//! [`Version`]. Observers compare versions to tell whether a snapshot they
//! hold is stale without diffing the state itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic snapshot version, starting at zero for a freshly created state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of a state that has never been reduced
    pub const INITIAL: Self = Self(0);

    /// Create a version from a raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The following version (saturating at `u64::MAX`)
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_initial_is_zero() {
        assert_eq!(Version::INITIAL, Version::default());
        assert_eq!(Version::INITIAL.value(), 0);
        assert_eq!(Version::new(3).to_string(), "v3");
    }

    #[test]
    fn test_next_saturates() {
        assert_eq!(Version::new(u64::MAX).next(), Version::new(u64::MAX));
    }

    proptest! {
        #[test]
        fn next_is_strictly_greater_below_max(raw in 0u64..u64::MAX) {
            let version = Version::new(raw);
            prop_assert!(version.next() > version);
        }
    }
}
