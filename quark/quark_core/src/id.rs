//! Kernel object identifiers.
//!
//! Every kernel object is assigned a koid (kernel object id) when it is
//! created. Koids are allocated monotonically per kernel instance and never
//! reused, which makes them the stable way to talk about object identity:
//! two handles name the same object exactly when the objects behind them
//! carry the same koid. Handle values come and go as authority moves between
//! processes; koids do not.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A kernel object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Koid(u64);

impl Koid {
    /// The reserved invalid koid. Never assigned to an object.
    pub const INVALID: Koid = Koid(0);

    /// Rebuild a koid from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Koid(raw)
    }

    /// The raw numeric value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Check whether this is the reserved invalid value.
    pub fn is_invalid(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Koid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Koid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Koid({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let koid = Koid::from_raw(17);
        assert_eq!(koid.raw(), 17);
        assert!(!koid.is_invalid());
    }

    #[test]
    fn test_invalid() {
        assert!(Koid::INVALID.is_invalid());
        assert_eq!(Koid::INVALID.raw(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Koid::from_raw(5).to_string(), "5");
        assert_eq!(format!("{:?}", Koid::from_raw(5)), "Koid(5)");
    }
}
