//! Appliers and the state they mutate.
//!
//! An applier receives a resolved target and the raw annotation. It either
//! attaches the annotation to the target's side-table list, records a wiring
//! problem, or discards the annotation.

use hwanno_core::annotation::{FIELD_ID_FIELD, NONLOCAL_FIELD, TARGET_FIELD};
use hwanno_core::{
    AnnoTarget, Annotation, CoreError, Design, InstancePathCache, OpTag, ValueId,
};
use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::anchor::AnchorInterner;
use crate::error::LowerError;
use crate::registry::{applier, Applier};
use crate::target::{target_module, target_value, ResolvedTarget, TargetCaches};
use crate::wiring::WiringProblem;

/// Field naming the pin that pairs wiring sources with sinks.
pub const PIN_FIELD: &str = "pin";

/// Sources and sinks collected for one wiring pin.
#[derive(Debug, Clone, Default)]
pub(crate) struct PinState {
    pub source: Option<ValueId>,
    pub sinks: Vec<ValueId>,
}

/// Mutable state shared by resolvers and appliers during one pass run.
pub struct ApplyState<'a> {
    pub design: &'a mut Design,
    pub path_cache: InstancePathCache<'a>,
    pub(crate) target_caches: TargetCaches,
    pub(crate) anchors: AnchorInterner,
    pub(crate) wiring_problems: Vec<WiringProblem>,
    pub(crate) pins: IndexMap<String, PinState>,
    spawned: Vec<Annotation>,
    num_added: usize,
}

impl<'a> ApplyState<'a> {
    pub fn new(design: &'a mut Design, path_cache: InstancePathCache<'a>) -> Self {
        ApplyState {
            design,
            path_cache,
            target_caches: TargetCaches::new(),
            anchors: AnchorInterner::new(),
            wiring_problems: Vec::new(),
            pins: IndexMap::new(),
            spawned: Vec::new(),
            num_added: 0,
        }
    }

    /// Queues a synthesized annotation. It is processed right after the
    /// annotation currently being applied, before anything queued earlier.
    pub fn add_to_worklist(&mut self, annotation: Annotation) {
        self.num_added += 1;
        self.spawned.push(annotation);
    }

    /// Records a deferred connection and returns its problem index.
    pub fn add_wiring_problem(&mut self, problem: WiringProblem) -> usize {
        self.wiring_problems.push(problem);
        self.wiring_problems.len() - 1
    }

    pub fn wiring_problems(&self) -> &[WiringProblem] {
        &self.wiring_problems
    }

    /// Number of annotations synthesized so far.
    pub fn num_added(&self) -> usize {
        self.num_added
    }

    pub(crate) fn take_spawned(&mut self) -> Vec<Annotation> {
        std::mem::take(&mut self.spawned)
    }
}

/// Coarse kind of an annotated entity, used to restrict appliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Circuit,
    Module,
    ExtModule,
    Op(OpTag),
    Port,
}

pub fn target_kind(design: &Design, target: &AnnoTarget) -> Result<TargetKind, CoreError> {
    Ok(match *target {
        AnnoTarget::Circuit => TargetKind::Circuit,
        AnnoTarget::Module(module) if design.module(module)?.is_external() => {
            TargetKind::ExtModule
        }
        AnnoTarget::Module(_) => TargetKind::Module,
        AnnoTarget::Op(op) => TargetKind::Op(design.op(op)?.kind.tag()),
        AnnoTarget::Port { .. } => TargetKind::Port,
    })
}

fn class_of(anno: &Annotation) -> String {
    anno.class().unwrap_or_default().to_string()
}

/// Attaches `anno` without its `target` field to the resolved entity.
///
/// A non-local target gets its path replaced by a reference to an interned
/// anchor; local-only callers reject non-local targets first.
pub fn apply_without_target_impl(
    target: &ResolvedTarget,
    anno: &Annotation,
    state: &mut ApplyState<'_>,
    allow_non_local: bool,
) -> Result<(), LowerError> {
    if !allow_non_local && !target.is_local() {
        return Err(LowerError::NonLocalNotAllowed {
            class: class_of(anno),
            target: anno.get_str(TARGET_FIELD).unwrap_or_default().to_string(),
        });
    }

    let mut attached = Annotation::new();
    for (key, value) in anno.fields() {
        if key != TARGET_FIELD {
            attached.insert(key, value.clone());
        } else if !target.is_local() {
            let leaf = target_module(state.design, &target.target)?;
            let anchor = state
                .anchors
                .intern_path(state.design, &target.instances, leaf)?;
            let name = state
                .design
                .hier_path(anchor)
                .map(|path| path.name.clone())
                .ok_or_else(|| CoreError::GraphInconsistency {
                    reason: format!("anchor {} was not registered", anchor),
                })?;
            attached.insert(NONLOCAL_FIELD, Json::String(name));
        }
    }
    if target.field_id != 0 {
        attached.insert(FIELD_ID_FIELD, Json::from(target.field_id));
    }
    state.design.annotations.append(target.target, attached);
    Ok(())
}

/// Applier attaching to any target kind.
pub fn apply_without_target(allow_non_local: bool) -> Applier {
    applier(move |target, anno, state| {
        apply_without_target_impl(target, anno, state, allow_non_local)
    })
}

/// Applier attaching only to the listed target kinds, and to ports when
/// `allow_ports` is set.
pub fn apply_without_target_to(
    allow_non_local: bool,
    allow_ports: bool,
    kinds: &'static [TargetKind],
) -> Applier {
    applier(move |target, anno, state| {
        let kind = target_kind(state.design, &target.target)?;
        let accepted = match kind {
            TargetKind::Port => allow_ports,
            other => kinds.contains(&other),
        };
        if !accepted {
            return Err(LowerError::Apply {
                class: class_of(anno),
                reason: format!("cannot be applied to a target of kind {:?}", kind),
            });
        }
        apply_without_target_impl(target, anno, state, allow_non_local)
    })
}

/// Discards the annotation.
pub fn drop_annotation(
    _target: &ResolvedTarget,
    _anno: &Annotation,
    _state: &mut ApplyState<'_>,
) -> Result<(), LowerError> {
    Ok(())
}

fn wiring_endpoint(
    target: &ResolvedTarget,
    anno: &Annotation,
    state: &ApplyState<'_>,
) -> Result<(String, ValueId), LowerError> {
    let class = class_of(anno);
    if !target.is_local() {
        return Err(LowerError::NonLocalNotAllowed {
            class,
            target: anno.get_str(TARGET_FIELD).unwrap_or_default().to_string(),
        });
    }
    let pin = anno.get_str(PIN_FIELD).ok_or_else(|| LowerError::Apply {
        class: class.clone(),
        reason: "missing string 'pin' field".to_string(),
    })?;
    if target.field_id != 0 {
        return Err(LowerError::Apply {
            class,
            reason: "cannot wire a sub-element of an aggregate".to_string(),
        });
    }
    let value = target_value(state.design, &target.target)?.ok_or_else(|| LowerError::Apply {
        class,
        reason: "target does not carry a value".to_string(),
    })?;
    Ok((pin.to_string(), value))
}

/// Registers the driving end of a wiring pin.
pub fn apply_wiring_source(
    target: &ResolvedTarget,
    anno: &Annotation,
    state: &mut ApplyState<'_>,
) -> Result<(), LowerError> {
    let (pin, value) = wiring_endpoint(target, anno, state)?;
    let entry = state.pins.entry(pin.clone()).or_default();
    if entry.source.is_some() {
        return Err(LowerError::Apply {
            class: class_of(anno),
            reason: format!("pin '{}' already has a source", pin),
        });
    }
    entry.source = Some(value);
    Ok(())
}

/// Registers one driven end of a wiring pin.
pub fn apply_wiring_sink(
    target: &ResolvedTarget,
    anno: &Annotation,
    state: &mut ApplyState<'_>,
) -> Result<(), LowerError> {
    let (pin, value) = wiring_endpoint(target, anno, state)?;
    state.pins.entry(pin).or_default().sinks.push(value);
    Ok(())
}
