//! Splitting target paths into tokens.
//!
//! Targets follow the shape
//! `~Circuit|Top/inst:Mod/inst:Mod>name.field[index]`: an optional chain of
//! `module/instance:` hops, the module holding the target, then an optional
//! named entity and aggregate sub-accesses. Legacy dotted targets are
//! canonicalized first.

use crate::error::LowerError;

/// One aggregate access after the target name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetToken {
    /// `.name`: a bundle field, or an instance port.
    Field(String),
    /// `[n]`: a vector element.
    Index(u32),
}

/// A tokenized target path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenAnnoTarget {
    pub circuit: String,
    /// Module holding the target. `None` for a circuit-only target.
    pub module: Option<String>,
    /// `(parent module, instance name)` hops, outermost first.
    pub instances: Vec<(String, String)>,
    /// Named entity inside `module`. `None` targets the module itself.
    pub name: Option<String>,
    pub component: Vec<TargetToken>,
}

/// Rewrites a legacy `Circuit.Module.name` target into `~Circuit|Module>name`.
/// Targets starting with `~` are returned unchanged.
pub fn canonicalize_target(target: &str) -> String {
    if target.is_empty() || target.starts_with('~') {
        return target.to_string();
    }
    let mut canonical = format!("~{}", target);
    if let Some(pos) = canonical.find('.') {
        canonical.replace_range(pos..=pos, "|");
    }
    if let Some(pos) = canonical.find('.') {
        canonical.replace_range(pos..=pos, ">");
    }
    canonical
}

/// Splits a canonical target path into its tokens.
pub fn tokenize_path(path: &str) -> Result<TokenAnnoTarget, LowerError> {
    let invalid = || LowerError::Tokenize {
        path: path.to_string(),
    };
    if path.is_empty() {
        return Err(invalid());
    }

    let (circuit, mut rest) = path.split_once('|').unwrap_or((path, ""));
    let mut tokens = TokenAnnoTarget {
        circuit: circuit.strip_prefix('~').unwrap_or(circuit).to_string(),
        ..TokenAnnoTarget::default()
    };

    while let Some((hop, tail)) = rest.split_once(':') {
        let (module, instance) = hop.split_once('/').ok_or_else(invalid)?;
        if module.is_empty() || instance.is_empty() {
            return Err(invalid());
        }
        tokens
            .instances
            .push((module.to_string(), instance.to_string()));
        rest = tail;
    }

    let base_len = rest.find(['.', '[']).unwrap_or(rest.len());
    let (base, mut aggregate) = rest.split_at(base_len);
    let (module, name) = match base.split_once('>') {
        Some((module, name)) => (module, Some(name)),
        None => (base, None),
    };
    if !module.is_empty() {
        tokens.module = Some(module.to_string());
    }
    match name {
        Some("") => return Err(invalid()),
        Some(name) => tokens.name = Some(name.to_string()),
        None => {}
    }
    if tokens.module.is_none() && (tokens.name.is_some() || !tokens.instances.is_empty()) {
        return Err(invalid());
    }

    while !aggregate.is_empty() {
        if let Some(tail) = aggregate.strip_prefix('.') {
            let end = tail.find(['.', '[']).unwrap_or(tail.len());
            if end == 0 {
                return Err(invalid());
            }
            tokens
                .component
                .push(TargetToken::Field(tail[..end].to_string()));
            aggregate = &tail[end..];
        } else if let Some(tail) = aggregate.strip_prefix('[') {
            let end = tail.find(']').ok_or_else(invalid)?;
            let index = tail[..end].parse::<u32>().map_err(|_| invalid())?;
            tokens.component.push(TargetToken::Index(index));
            aggregate = &tail[end + 1..];
        } else {
            return Err(invalid());
        }
    }
    if tokens.name.is_none() && !tokens.component.is_empty() {
        return Err(invalid());
    }
    Ok(tokens)
}
