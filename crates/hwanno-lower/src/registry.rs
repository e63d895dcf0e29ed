//! Class-keyed table of annotation handlers.
//!
//! Each record pairs a resolver, turning the raw annotation into a
//! [`ResolvedTarget`], with an applier acting on that target.

use std::collections::HashMap;

use hwanno_core::{Annotation, OpTag};

use crate::apply::{
    apply_wiring_sink, apply_wiring_source, apply_without_target, apply_without_target_to,
    drop_annotation, ApplyState, TargetKind,
};
use crate::error::LowerError;
use crate::target::{no_resolve, std_resolve, try_resolve, ResolvedTarget};

pub const TEST_CLASS: &str = "circt.test";
pub const TEST_LOCAL_ONLY_CLASS: &str = "circt.testLocalOnly";
pub const TEST_NO_TARGET_CLASS: &str = "circt.testNT";
pub const MISSING_CLASS: &str = "circt.missing";
pub const DONT_TOUCH_CLASS: &str = "firrtl.transforms.DontTouchAnnotation";
pub const INLINE_CLASS: &str = "firrtl.passes.InlineAnnotation";
pub const FLATTEN_CLASS: &str = "firrtl.transforms.FlattenAnnotation";
pub const NO_DEDUP_CLASS: &str = "firrtl.transforms.NoDedupAnnotation";
pub const DUT_CLASS: &str = "sifive.enterprise.firrtl.MarkDUTAnnotation";
pub const RUN_FIRRTL_TRANSFORM_CLASS: &str = "firrtl.stage.RunFIRRTLTransformAnnotation";
pub const BLACK_BOX_TARGET_DIR_CLASS: &str = "firrtl.transforms.BlackBoxTargetDirAnno";
pub const WIRING_SOURCE_CLASS: &str = "firrtl.passes.wiring.SourceAnnotation";
pub const WIRING_SINK_CLASS: &str = "firrtl.passes.wiring.SinkAnnotation";

pub type Resolver =
    Box<dyn Fn(&Annotation, &mut ApplyState<'_>) -> Result<ResolvedTarget, LowerError>>;
pub type Applier =
    Box<dyn Fn(&ResolvedTarget, &Annotation, &mut ApplyState<'_>) -> Result<(), LowerError>>;

/// Boxes a resolver function or closure.
pub fn resolver<F>(f: F) -> Resolver
where
    F: Fn(&Annotation, &mut ApplyState<'_>) -> Result<ResolvedTarget, LowerError> + 'static,
{
    Box::new(f)
}

/// Boxes an applier function or closure.
pub fn applier<F>(f: F) -> Applier
where
    F: Fn(&ResolvedTarget, &Annotation, &mut ApplyState<'_>) -> Result<(), LowerError> + 'static,
{
    Box::new(f)
}

/// A (resolver, applier) pair.
pub struct AnnoRecord {
    pub resolver: Resolver,
    pub applier: Applier,
}

impl AnnoRecord {
    pub fn new(resolver: Resolver, applier: Applier) -> Self {
        AnnoRecord { resolver, applier }
    }

    /// Record for annotations that configure the compiler rather than
    /// annotate anything. They are attached to the circuit.
    pub fn no_target() -> Self {
        AnnoRecord::new(
            resolver(no_resolve),
            apply_without_target_to(false, false, &[TargetKind::Circuit]),
        )
    }
}

/// Handler table keyed by annotation class.
#[derive(Default)]
pub struct AnnoRegistry {
    records: HashMap<String, AnnoRecord>,
}

impl AnnoRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in class.
    pub fn with_defaults() -> Self {
        const MODULE: &[TargetKind] = &[TargetKind::Module];
        const ANY_MODULE: &[TargetKind] = &[TargetKind::Module, TargetKind::ExtModule];
        const DECLARATIONS: &[TargetKind] = &[
            TargetKind::Op(OpTag::Wire),
            TargetKind::Op(OpTag::Node),
            TargetKind::Op(OpTag::Reg),
            TargetKind::Op(OpTag::Instance),
        ];

        let mut registry = AnnoRegistry::new();
        let targeted = |apply: Applier| AnnoRecord::new(resolver(std_resolve), apply);

        registry.register(TEST_CLASS, targeted(apply_without_target(true)));
        registry.register(TEST_LOCAL_ONLY_CLASS, targeted(apply_without_target(false)));
        registry.register(
            TEST_NO_TARGET_CLASS,
            AnnoRecord::new(resolver(no_resolve), apply_without_target(false)),
        );
        registry.register(
            MISSING_CLASS,
            AnnoRecord::new(resolver(try_resolve), apply_without_target(true)),
        );
        registry.register(
            DONT_TOUCH_CLASS,
            targeted(apply_without_target_to(true, true, DECLARATIONS)),
        );
        registry.register(INLINE_CLASS, targeted(apply_without_target_to(false, false, MODULE)));
        registry.register(FLATTEN_CLASS, targeted(apply_without_target_to(false, false, MODULE)));
        registry.register(
            NO_DEDUP_CLASS,
            targeted(apply_without_target_to(false, false, ANY_MODULE)),
        );
        registry.register(DUT_CLASS, targeted(apply_without_target_to(false, false, MODULE)));
        registry.register(
            RUN_FIRRTL_TRANSFORM_CLASS,
            AnnoRecord::new(resolver(no_resolve), applier(drop_annotation)),
        );
        registry.register(BLACK_BOX_TARGET_DIR_CLASS, AnnoRecord::no_target());
        registry.register(WIRING_SOURCE_CLASS, targeted(applier(apply_wiring_source)));
        registry.register(WIRING_SINK_CLASS, targeted(applier(apply_wiring_sink)));
        registry
    }

    /// Adds or replaces the handler for `class`, returning the previous one.
    pub fn register(&mut self, class: impl Into<String>, record: AnnoRecord) -> Option<AnnoRecord> {
        self.records.insert(class.into(), record)
    }

    pub fn lookup(&self, class: &str) -> Option<&AnnoRecord> {
        self.records.get(class)
    }

    /// Returns `true` if annotations of this class are handled by the pass.
    pub fn is_class_lowered(&self, class: &str) -> bool {
        self.records.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
