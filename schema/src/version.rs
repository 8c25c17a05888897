//! Schema version stamp.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer stamp identifying which [`ModelDescription`](crate::ModelDescription)
/// a store conforms to.
///
/// Versions are totally ordered and only ever move forward; version `n + 1`
/// is always derived from version `n`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// The first version of every registry.
    pub const INITIAL: Self = Self(0);

    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// The version immediately following this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Every version in `[self, to)` in ascending order.
    pub fn steps_to(self, to: SchemaVersion) -> impl Iterator<Item = SchemaVersion> {
        (self.0..to.0).map(SchemaVersion)
    }

    /// Little-endian encoding used for the on-disk stamp.
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

impl From<u32> for SchemaVersion {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_contiguous_and_exclusive() {
        let steps: Vec<u32> = SchemaVersion::new(1)
            .steps_to(SchemaVersion::new(4))
            .map(SchemaVersion::get)
            .collect();
        assert_eq!(steps, vec![1, 2, 3]);
    }

    #[test]
    fn no_steps_when_already_at_target() {
        let v = SchemaVersion::new(3);
        assert_eq!(v.steps_to(v).count(), 0);
        assert_eq!(v.steps_to(SchemaVersion::new(1)).count(), 0);
    }

    #[test]
    fn le_bytes_round_trip() {
        let v = SchemaVersion::new(0x0102_0304);
        assert_eq!(SchemaVersion::from_le_bytes(v.to_le_bytes()), v);
    }
}
