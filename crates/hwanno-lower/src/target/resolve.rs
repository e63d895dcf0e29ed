//! Resolving tokenized paths to annotated entities.

use std::collections::HashMap;

use hwanno_core::{
    AnnoTarget, Annotation, CoreError, Design, HwType, InstanceGraph, ModuleId, OpId, OpKind,
    PortOwner, ValueId,
};
use hwanno_core::annotation::TARGET_FIELD;

use super::tokenize::{canonicalize_target, tokenize_path, TargetToken, TokenAnnoTarget};
use crate::apply::ApplyState;
use crate::error::LowerError;

/// An entity selected by a target path, together with the instances used to
/// reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub target: AnnoTarget,
    /// Sub-element of an aggregate, 0 for the whole entity.
    pub field_id: u32,
    /// Instance hops of a non-local path, outermost first.
    pub instances: Vec<OpId>,
}

impl ResolvedTarget {
    pub fn local(target: AnnoTarget) -> Self {
        ResolvedTarget {
            target,
            field_id: 0,
            instances: Vec::new(),
        }
    }

    pub fn circuit() -> Self {
        ResolvedTarget::local(AnnoTarget::Circuit)
    }

    /// A target is local when no instance path was needed to reach it.
    pub fn is_local(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Per-module name tables, built lazily on first lookup.
#[derive(Debug, Default)]
pub struct TargetCaches {
    modules: HashMap<ModuleId, HashMap<String, AnnoTarget>>,
}

impl TargetCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the port or named operation `name` inside `module`. Ports shadow
    /// operations of the same name.
    pub fn lookup(
        &mut self,
        design: &Design,
        module: ModuleId,
        name: &str,
    ) -> Result<Option<AnnoTarget>, CoreError> {
        if !self.modules.contains_key(&module) {
            let table = Self::build(design, module)?;
            self.modules.insert(module, table);
        }
        Ok(self
            .modules
            .get(&module)
            .and_then(|table| table.get(name))
            .copied())
    }

    fn build(design: &Design, module: ModuleId) -> Result<HashMap<String, AnnoTarget>, CoreError> {
        let def = design.module(module)?;
        let mut table = HashMap::new();
        for (index, port) in def.ports.iter().enumerate() {
            table.entry(port.name.clone()).or_insert(AnnoTarget::Port {
                owner: PortOwner::Module(module),
                index,
            });
        }
        for op in design.ops_in(module) {
            if let Some(name) = op.name() {
                table
                    .entry(name.to_string())
                    .or_insert(AnnoTarget::Op(op.id));
            }
        }
        Ok(table)
    }
}

/// Walks the tokens against the design, producing the annotated entity and
/// the instance path used to reach it.
pub fn resolve_entities(
    tokens: &TokenAnnoTarget,
    path: &str,
    design: &Design,
    graph: &InstanceGraph,
    caches: &mut TargetCaches,
) -> Result<ResolvedTarget, LowerError> {
    let fail = |reason: String| LowerError::Resolution {
        path: path.to_string(),
        reason,
    };

    if !tokens.circuit.is_empty() && tokens.circuit != design.name() {
        return Err(fail(format!(
            "circuit '{}' does not match design '{}'",
            tokens.circuit,
            design.name()
        )));
    }
    let Some(module_name) = &tokens.module else {
        return Ok(ResolvedTarget::circuit());
    };

    let mut instances = Vec::with_capacity(tokens.instances.len());
    let mut expected: Option<ModuleId> = None;
    for (parent_name, instance_name) in &tokens.instances {
        let parent = graph
            .lookup(parent_name)
            .map_err(|_| fail(format!("module '{}' does not exist", parent_name)))?;
        if let Some(expected) = expected {
            if expected != parent {
                return Err(fail(format!(
                    "instance path enters '{}' but the previous instance is of '{}'",
                    parent_name,
                    design.module(expected)?.name
                )));
            }
        }
        let Some(AnnoTarget::Op(op)) = caches.lookup(design, parent, instance_name)? else {
            return Err(fail(format!(
                "cannot find instance '{}' in module '{}'",
                instance_name, parent_name
            )));
        };
        let child = design
            .op(op)?
            .instance_target()
            .ok_or_else(|| fail(format!("'{}' in '{}' is not an instance", instance_name, parent_name)))?;
        instances.push(op);
        expected = Some(child);
    }

    let module = graph
        .lookup(module_name)
        .map_err(|_| fail(format!("module '{}' does not exist", module_name)))?;
    if let Some(expected) = expected {
        if expected != module {
            return Err(fail(format!(
                "last instance is of '{}', not '{}'",
                design.module(expected)?.name,
                module_name
            )));
        }
    }

    let mut component = tokens.component.as_slice();
    let mut target = match &tokens.name {
        None => AnnoTarget::Module(module),
        Some(name) => caches
            .lookup(design, module, name)?
            .ok_or_else(|| fail(format!("cannot find '{}' in module '{}'", name, module_name)))?,
    };

    if let AnnoTarget::Op(op) = target {
        if let (OpKind::Instance { module: child, .. }, Some(first)) =
            (&design.op(op)?.kind, component.first())
        {
            let TargetToken::Field(port) = first else {
                return Err(fail("an instance cannot be indexed".to_string()));
            };
            let index = design
                .module(*child)?
                .port_index(port)
                .ok_or_else(|| fail(format!("instance has no port '{}'", port)))?;
            target = AnnoTarget::Port {
                owner: PortOwner::Instance(op),
                index,
            };
            component = &component[1..];
        }
    }

    let mut field_id = 0;
    if !component.is_empty() {
        let ty = target_type(design, &target)?
            .ok_or_else(|| fail("component specified for a target without a type".to_string()))?;
        field_id = field_id_of(&ty, component).ok_or_else(|| fail("no such sub-element".to_string()))?;
    }

    Ok(ResolvedTarget {
        target,
        field_id,
        instances,
    })
}

/// Computes the field ID of a chain of aggregate accesses.
fn field_id_of(ty: &HwType, component: &[TargetToken]) -> Option<u32> {
    let mut current = ty.base();
    let mut field_id = 0;
    for token in component {
        let (offset, sub) = match token {
            TargetToken::Field(name) => current.field_by_name(name)?,
            TargetToken::Index(index) => current.element_at(*index)?,
        };
        field_id += offset;
        current = sub.base();
    }
    Some(field_id)
}

/// Type carried by a target, if it has one.
pub fn target_type(design: &Design, target: &AnnoTarget) -> Result<Option<HwType>, CoreError> {
    Ok(match target_value(design, target)? {
        Some(value) => Some(design.value_type(value)?.clone()),
        None => None,
    })
}

/// The value behind a port, wire, register or node target.
pub fn target_value(design: &Design, target: &AnnoTarget) -> Result<Option<ValueId>, CoreError> {
    Ok(match *target {
        AnnoTarget::Port {
            owner: PortOwner::Module(module),
            index,
        } => design.module(module)?.ports.get(index).map(|p| p.value),
        AnnoTarget::Port {
            owner: PortOwner::Instance(op),
            index,
        } => design.op(op)?.results.get(index).copied(),
        AnnoTarget::Op(op) => {
            let op = design.op(op)?;
            match op.kind {
                OpKind::Wire { .. } | OpKind::Reg { .. } | OpKind::Node { .. } => {
                    op.results.first().copied()
                }
                _ => None,
            }
        }
        AnnoTarget::Circuit | AnnoTarget::Module(_) => None,
    })
}

/// The module an annotated entity belongs to. The circuit belongs to the top.
pub fn target_module(design: &Design, target: &AnnoTarget) -> Result<ModuleId, CoreError> {
    Ok(match *target {
        AnnoTarget::Circuit => design.top(),
        AnnoTarget::Module(module)
        | AnnoTarget::Port {
            owner: PortOwner::Module(module),
            ..
        } => module,
        AnnoTarget::Op(op)
        | AnnoTarget::Port {
            owner: PortOwner::Instance(op),
            ..
        } => design.op(op)?.parent,
    })
}

fn resolve_path(raw: &str, state: &mut ApplyState<'_>) -> Result<ResolvedTarget, LowerError> {
    let path = canonicalize_target(raw);
    let tokens = tokenize_path(&path).map_err(|_| LowerError::Tokenize {
        path: raw.to_string(),
    })?;
    resolve_entities(
        &tokens,
        &path,
        state.design,
        state.path_cache.graph(),
        &mut state.target_caches,
    )
}

/// Resolves the mandatory string `target` field.
pub fn std_resolve(anno: &Annotation, state: &mut ApplyState<'_>) -> Result<ResolvedTarget, LowerError> {
    let raw = anno
        .get_str(TARGET_FIELD)
        .ok_or_else(|| LowerError::Resolution {
            path: String::new(),
            reason: "annotation has no string 'target' field".to_string(),
        })?;
    resolve_path(raw, state)
}

/// Resolves `target` if present, otherwise the circuit.
pub fn try_resolve(anno: &Annotation, state: &mut ApplyState<'_>) -> Result<ResolvedTarget, LowerError> {
    match anno.get(TARGET_FIELD) {
        Some(_) => std_resolve(anno, state),
        None => Ok(ResolvedTarget::circuit()),
    }
}

/// Always resolves to the circuit.
pub fn no_resolve(_anno: &Annotation, _state: &mut ApplyState<'_>) -> Result<ResolvedTarget, LowerError> {
    Ok(ResolvedTarget::circuit())
}
