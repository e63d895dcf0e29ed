//! Core error types for hwanno-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the design model, the instance graph and the path cache.

use crate::id::{ModuleId, OpId, ValueId};
use thiserror::Error;

/// Core errors produced by the hwanno-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// No module with this name exists.
    #[error("module not found: '{name}'")]
    ModuleNotFound { name: String },

    /// A ModuleId does not refer to a module of this design.
    #[error("module not found: ModuleId({id})", id = id.0)]
    ModuleIdNotFound { id: ModuleId },

    /// An OpId refers to an erased or unknown operation.
    #[error("operation not found: OpId({id})", id = id.0)]
    OpNotFound { id: OpId },

    /// A ValueId does not refer to a value of this design.
    #[error("value not found: ValueId({id})", id = id.0)]
    ValueNotFound { id: ValueId },

    /// The operation exists but is not an instance.
    #[error("operation OpId({id}) is not an instance", id = id.0)]
    NotAnInstance { id: OpId },

    /// The instance is not an edge of the instance graph.
    #[error("instance OpId({id}) is not recorded in the instance graph", id = id.0)]
    InstanceNotFound { id: OpId },

    /// A module transitively instantiates itself.
    #[error("instance cycle through module '{module}'")]
    InstanceCycle { module: String },

    /// A structural invariant of the design was violated.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },
}
