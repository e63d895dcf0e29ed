//! Stable ID newtypes for design entities.
//!
//! All IDs are distinct newtype wrappers over `u32`, providing type safety
//! so that an `OpId` cannot be accidentally used where a `ValueId` is expected.
//! IDs are never reused within a [`Design`](crate::design::Design): an erased
//! operation leaves a hole rather than freeing its slot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Module identity within the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

/// Operation identity. Instance operations double as the edge identity of the
/// instance graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u32);

/// SSA value identity (module port or operation result).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Hierarchical anchor identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId(pub u32);

// Display implementations -- just print the inner value.

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ModuleId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl OpId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl ValueId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_id_display() {
        assert_eq!(format!("{}", ModuleId(0)), "0");
    }

    #[test]
    fn op_id_display() {
        assert_eq!(format!("{}", OpId(99)), "99");
    }

    #[test]
    fn value_id_display() {
        assert_eq!(format!("{}", ValueId(7)), "7");
    }

    #[test]
    fn ids_order_by_inner_value() {
        let mut ops = vec![OpId(3), OpId(1), OpId(2)];
        ops.sort();
        assert_eq!(ops, vec![OpId(1), OpId(2), OpId(3)]);
    }

    #[test]
    fn serde_is_transparent_number() {
        let json = serde_json::to_string(&ValueId(42)).unwrap();
        assert_eq!(json, "42");
        let back: AnchorId = serde_json::from_str("5").unwrap();
        assert_eq!(back, AnchorId(5));
    }
}
