//! Identifiers for attempts and slots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of one execution attempt.
///
/// Stable for the attempt's lifetime; a retry always gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Generate a fresh random attempt id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for AttemptId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of an allocated slot on a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_ids_are_unique() {
        let a = AttemptId::new();
        let b = AttemptId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_attempt_id_parses_display_form() {
        let id = AttemptId::new();
        let parsed: AttemptId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_attempt_id_serializes_as_plain_string() {
        let id = AttemptId::new();
        let json = serde_json::to_value(id).unwrap();
        assert!(json.is_string());
    }

    #[test]
    fn test_slot_id_display() {
        let slot = SlotId::new("worker-1/slot-0");
        assert_eq!(slot.to_string(), "worker-1/slot-0");
        assert_eq!(slot.as_str(), "worker-1/slot-0");
    }
}
