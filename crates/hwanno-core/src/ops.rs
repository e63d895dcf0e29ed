//! Operations that make up a module body.
//!
//! The operation set is deliberately small: declarations that can carry
//! annotations (wires, registers, nodes, instances), connections, and the two
//! reference conversions used when probing a value through the hierarchy.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{ModuleId, OpId, ValueId};
use crate::types::HwType;

/// Operation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    /// Instantiation of `module`. Results mirror the child's ports in order.
    Instance { name: String, module: ModuleId },
    Wire { name: String, ty: HwType },
    Reg { name: String, ty: HwType },
    /// Named copy of `input`.
    Node { name: String, input: ValueId },
    /// Drive `dest` from `src`.
    Connect { dest: ValueId, src: ValueId },
    /// Produce a reference to `base`.
    RefSend { base: ValueId },
    /// Read the value behind a reference.
    RefResolve { reference: ValueId },
}

/// Discriminant of [`OpKind`], used by appliers that only accept some kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpTag {
    Instance,
    Wire,
    Reg,
    Node,
    Connect,
    RefSend,
    RefResolve,
}

/// An operation inside a module body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: OpId,
    /// Module whose body contains this operation.
    pub parent: ModuleId,
    pub kind: OpKind,
    pub results: SmallVec<[ValueId; 2]>,
}

impl OpKind {
    pub fn tag(&self) -> OpTag {
        match self {
            OpKind::Instance { .. } => OpTag::Instance,
            OpKind::Wire { .. } => OpTag::Wire,
            OpKind::Reg { .. } => OpTag::Reg,
            OpKind::Node { .. } => OpTag::Node,
            OpKind::Connect { .. } => OpTag::Connect,
            OpKind::RefSend { .. } => OpTag::RefSend,
            OpKind::RefResolve { .. } => OpTag::RefResolve,
        }
    }

    /// Declared name, for operations that have one.
    pub fn name(&self) -> Option<&str> {
        match self {
            OpKind::Instance { name, .. }
            | OpKind::Wire { name, .. }
            | OpKind::Reg { name, .. }
            | OpKind::Node { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn operands(&self) -> SmallVec<[ValueId; 2]> {
        match *self {
            OpKind::Node { input, .. } => SmallVec::from_slice(&[input]),
            OpKind::Connect { dest, src } => SmallVec::from_slice(&[dest, src]),
            OpKind::RefSend { base } => SmallVec::from_slice(&[base]),
            OpKind::RefResolve { reference } => SmallVec::from_slice(&[reference]),
            _ => SmallVec::new(),
        }
    }

    pub fn operands_mut(&mut self) -> SmallVec<[&mut ValueId; 2]> {
        let mut out = SmallVec::new();
        match self {
            OpKind::Node { input, .. } => out.push(input),
            OpKind::Connect { dest, src } => {
                out.push(dest);
                out.push(src);
            }
            OpKind::RefSend { base } => out.push(base),
            OpKind::RefResolve { reference } => out.push(reference),
            _ => {}
        }
        out
    }
}

impl Operation {
    pub fn name(&self) -> Option<&str> {
        self.kind.name()
    }

    /// For instance operations, the instantiated module.
    pub fn instance_target(&self) -> Option<ModuleId> {
        match self.kind {
            OpKind::Instance { module, .. } => Some(module),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_only_for_declarations() {
        let wire = OpKind::Wire {
            name: "w".into(),
            ty: HwType::uint(1),
        };
        assert_eq!(wire.name(), Some("w"));
        assert_eq!(wire.tag(), OpTag::Wire);

        let connect = OpKind::Connect {
            dest: ValueId(0),
            src: ValueId(1),
        };
        assert_eq!(connect.name(), None);
        assert_eq!(connect.operands().as_slice(), &[ValueId(0), ValueId(1)]);
    }

    #[test]
    fn operands_mut_rewrites_in_place() {
        let mut kind = OpKind::Connect {
            dest: ValueId(3),
            src: ValueId(4),
        };
        for operand in kind.operands_mut() {
            if *operand == ValueId(4) {
                *operand = ValueId(9);
            }
        }
        assert_eq!(
            kind,
            OpKind::Connect {
                dest: ValueId(3),
                src: ValueId(9)
            }
        );
    }

    #[test]
    fn instance_target() {
        let op = Operation {
            id: OpId(0),
            parent: ModuleId(0),
            kind: OpKind::Instance {
                name: "a1".into(),
                module: ModuleId(1),
            },
            results: SmallVec::new(),
        };
        assert_eq!(op.instance_target(), Some(ModuleId(1)));
        assert_eq!(op.name(), Some("a1"));
    }
}
