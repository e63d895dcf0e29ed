pub mod annotation;
pub mod design;
pub mod error;
pub mod hierpath;
pub mod id;
pub mod instance_graph;
pub mod module;
pub mod namespace;
pub mod ops;
pub mod path_cache;
pub mod types;

// Re-export commonly used types
pub use annotation::{AnnoTarget, Annotation, AnnotationTable, PortOwner};
pub use design::{Design, ValueDef, ValueInfo};
pub use error::CoreError;
pub use hierpath::{HierPath, InnerRef};
pub use id::{AnchorId, ModuleId, OpId, ValueId};
pub use instance_graph::{InstanceGraph, InstanceUse};
pub use module::{ModuleDef, ModuleKind, Port, PortInfo};
pub use namespace::Namespace;
pub use ops::{OpKind, OpTag, Operation};
pub use path_cache::{InstancePath, InstancePathCache};
pub use types::{BundleField, Direction, HwType};
