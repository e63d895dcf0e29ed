//! Target path tokenization and resolution.

pub mod resolve;
pub mod tokenize;

pub use resolve::{
    no_resolve, resolve_entities, std_resolve, target_module, target_type, target_value,
    try_resolve, ResolvedTarget, TargetCaches,
};
pub use tokenize::{canonicalize_target, tokenize_path, TargetToken, TokenAnnoTarget};
