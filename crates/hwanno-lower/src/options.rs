//! Configuration for the annotation lowering pass.

use serde::{Deserialize, Serialize};

/// Class used when an annotation has no handler and unhandled annotations
/// are tolerated.
pub const DEFAULT_FALLBACK_CLASS: &str = "circt.missing";

/// Options controlling how tolerant the pass is of unknown input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LowerAnnotationsOptions {
    /// Lower annotations with an unknown class through the fallback handler
    /// instead of failing. They are still counted as unhandled.
    pub ignore_unhandled: bool,
    /// Treat annotations without a `class` as if they had the fallback class.
    pub ignore_classless: bool,
    /// Class whose handler is used by both tolerant modes.
    pub fallback_class: String,
}

impl Default for LowerAnnotationsOptions {
    fn default() -> Self {
        LowerAnnotationsOptions {
            ignore_unhandled: false,
            ignore_classless: false,
            fallback_class: DEFAULT_FALLBACK_CLASS.to_string(),
        }
    }
}
