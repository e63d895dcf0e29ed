//! Module definitions.
//!
//! [`ModuleDef`] represents one hardware module: a unique name, an ordered port
//! list and a body of operations. Ports are only ever appended, so a port's
//! index is stable for the lifetime of the module.

use serde::{Deserialize, Serialize};

use crate::id::{ModuleId, OpId, ValueId};
use crate::types::{Direction, HwType};

/// Whether a module has a body or is an external (black-box) declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    Module,
    External,
}

/// Signature information for a port, without its backing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub name: String,
    pub ty: HwType,
    pub direction: Direction,
}

impl PortInfo {
    pub fn new(name: impl Into<String>, ty: HwType, direction: Direction) -> Self {
        PortInfo {
            name: name.into(),
            ty,
            direction,
        }
    }
}

/// A module port together with the value it defines inside the module body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub ty: HwType,
    pub direction: Direction,
    /// The block-argument-like value of this port inside the module.
    pub value: ValueId,
}

impl Port {
    pub fn info(&self) -> PortInfo {
        PortInfo::new(self.name.clone(), self.ty.clone(), self.direction)
    }
}

/// A module definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDef {
    /// Unique identity for this module.
    pub id: ModuleId,
    /// Module name, unique within the design.
    pub name: String,
    pub kind: ModuleKind,
    /// Ordered port list.
    pub ports: Vec<Port>,
    /// Operations in program order.
    pub body: Vec<OpId>,
}

impl ModuleDef {
    pub(crate) fn new(id: ModuleId, name: String, kind: ModuleKind) -> Self {
        ModuleDef {
            id,
            name,
            kind,
            ports: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn num_ports(&self) -> usize {
        self.ports.len()
    }

    /// Returns the index of the port with the given name.
    pub fn port_index(&self, name: &str) -> Option<usize> {
        self.ports.iter().position(|p| p.name == name)
    }

    pub fn is_external(&self) -> bool {
        self.kind == ModuleKind::External
    }
}
