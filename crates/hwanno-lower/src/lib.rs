//! Lowering of raw annotations onto a hardware design.
//!
//! The [`LowerAnnotationsPass`] drains the design's raw annotation list
//! through a class-keyed [`AnnoRegistry`], attaching each annotation to the
//! entity its target path names. Appliers may also request cross-module
//! connections; those are planned by [`wiring`] and materialized by
//! [`rewrite`] once every annotation has been processed.

pub mod anchor;
pub mod apply;
pub mod error;
pub mod options;
pub mod pass;
pub mod registry;
pub mod rewrite;
pub mod target;
pub mod wiring;

pub use anchor::AnchorInterner;
pub use apply::ApplyState;
pub use error::{Diagnostic, LowerError, PassFailure};
pub use options::LowerAnnotationsOptions;
pub use pass::{LowerAnnotationsPass, LowerReport, PassStatistics};
pub use registry::{AnnoRecord, AnnoRegistry};
pub use target::ResolvedTarget;
pub use wiring::WiringProblem;
