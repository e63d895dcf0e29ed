//! Hierarchical anchors.
//!
//! A [`HierPath`] names one specific chain of instantiations from the top
//! module down to a leaf module. Non-local annotations refer to their anchor
//! by name instead of carrying a raw path. Anchors reference instances by
//! (parent module name, instance name) so they survive an instance being
//! re-issued under the same name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::AnchorId;

/// Reference to a named entity inside a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InnerRef {
    pub module: String,
    pub name: String,
}

/// An immutable, named instance path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierPath {
    pub id: AnchorId,
    /// Symbol name, unique in the design's circuit namespace.
    pub name: String,
    /// One entry per instance, outermost first.
    pub namepath: Vec<InnerRef>,
    /// Module at the end of the path.
    pub leaf: String,
}

impl fmt::Display for HierPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        for inner in &self.namepath {
            write!(f, "{}/{}:", inner.module, inner.name)?;
        }
        f.write_str(&self.leaf)
    }
}
