//! The annotation lowering pass driver.

use bumpalo::Bump;
use hwanno_core::{Annotation, Design, InstanceGraph, InstancePathCache};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::apply::ApplyState;
use crate::error::{Diagnostic, LowerError, PassFailure};
use crate::options::LowerAnnotationsOptions;
use crate::registry::{AnnoRegistry, WIRING_SINK_CLASS};
use crate::rewrite::rewrite_hierarchy;
use crate::wiring::{module_name, resolve_wiring_problems, WiringProblem};

/// Counters reported by one pass run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassStatistics {
    /// Annotations taken from the design's raw list.
    pub raw_annotations: usize,
    /// Annotations synthesized by appliers.
    pub added_annotations: usize,
    /// Raw plus synthesized.
    pub total_annotations: usize,
    /// Non-local targets that reused an existing anchor.
    pub reused_hier_paths: usize,
    /// Annotations whose class had no handler.
    pub unhandled_annotations: usize,
    pub wiring_problems: usize,
    pub ports_added: usize,
    pub instances_replaced: usize,
    pub failures: usize,
}

/// Statistics and every diagnostic recorded during a run.
#[derive(Debug, Clone, Default)]
pub struct LowerReport {
    pub statistics: PassStatistics,
    pub diagnostics: Vec<Diagnostic>,
}

impl LowerReport {
    pub fn succeeded(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn record(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

/// Lowers a design's raw annotations and resolves the wiring they request.
pub struct LowerAnnotationsPass {
    options: LowerAnnotationsOptions,
    registry: AnnoRegistry,
}

impl LowerAnnotationsPass {
    pub fn new(options: LowerAnnotationsOptions) -> Self {
        Self::with_registry(options, AnnoRegistry::with_defaults())
    }

    pub fn with_registry(options: LowerAnnotationsOptions, registry: AnnoRegistry) -> Self {
        LowerAnnotationsPass { options, registry }
    }

    pub fn options(&self) -> &LowerAnnotationsOptions {
        &self.options
    }

    pub fn registry(&self) -> &AnnoRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AnnoRegistry {
        &mut self.registry
    }

    /// Runs the pass over `design`.
    ///
    /// The raw annotation list is consumed. Every annotation and every wiring
    /// problem is attempted even after failures; on failure the returned
    /// report lists all diagnostics and the design keeps every successful
    /// change.
    pub fn run(&self, design: &mut Design) -> Result<LowerReport, PassFailure> {
        let mut report = LowerReport::default();
        let raw = std::mem::take(&mut design.raw_annotations);
        if raw.is_empty() {
            debug!("no raw annotations to lower");
            return Ok(report);
        }
        report.statistics.raw_annotations = raw.len();
        info!(annotations = raw.len(), circuit = design.name(), "lowering annotations");

        let graph = match InstanceGraph::new(design) {
            Ok(graph) => graph,
            Err(error) => {
                report.record(Diagnostic::new(error.into()));
                report.statistics.failures = report.diagnostics.len();
                return Err(PassFailure { report });
            }
        };
        let arena = Bump::new();
        let mut state = ApplyState::new(design, InstancePathCache::new(graph, &arena));

        // Reversed so that popping yields input order.
        let mut worklist: Vec<Annotation> = raw.into_iter().rev().collect();
        while let Some(annotation) = worklist.pop() {
            if let Err(error) = self.apply_annotation(&annotation, &mut state, &mut report) {
                report.record(Diagnostic::with_annotation(error, &annotation));
            }
            worklist.extend(state.take_spawned().into_iter().rev());
        }
        collect_pin_problems(&mut state, &mut report);

        report.statistics.added_annotations = state.num_added();
        report.statistics.total_annotations =
            report.statistics.raw_annotations + report.statistics.added_annotations;
        report.statistics.reused_hier_paths = state.anchors.reused();
        report.statistics.wiring_problems = state.wiring_problems.len();

        let ApplyState {
            design,
            mut path_cache,
            wiring_problems,
            ..
        } = state;
        for (index, problem) in wiring_problems.iter().enumerate() {
            debug!(
                problem = index,
                source = %problem.source,
                sink = %problem.sink,
                source_module = value_module_name(design, problem),
                is_ref_type = problem.is_ref_type,
                name_hint = %problem.name_hint,
                "wiring problem"
            );
        }

        let (plan, errors) = resolve_wiring_problems(design, &mut path_cache, &wiring_problems);
        for error in errors {
            report.record(Diagnostic::new(error));
        }
        let (stats, errors) = rewrite_hierarchy(design, &mut path_cache, plan);
        report.statistics.ports_added = stats.ports_added;
        report.statistics.instances_replaced = stats.instances_replaced;
        for error in errors {
            report.record(Diagnostic::new(error));
        }

        report.statistics.failures = report.diagnostics.len();
        info!(
            raw = report.statistics.raw_annotations,
            added = report.statistics.added_annotations,
            reused_hier_paths = report.statistics.reused_hier_paths,
            unhandled = report.statistics.unhandled_annotations,
            wiring_problems = report.statistics.wiring_problems,
            failures = report.statistics.failures,
            "annotation lowering finished"
        );
        if report.succeeded() {
            Ok(report)
        } else {
            Err(PassFailure { report })
        }
    }

    fn apply_annotation(
        &self,
        annotation: &Annotation,
        state: &mut ApplyState<'_>,
        report: &mut LowerReport,
    ) -> Result<(), LowerError> {
        debug!(annotation = %annotation, "applying");

        let class = match annotation.class() {
            Some(class) => class,
            None if self.options.ignore_classless => self.options.fallback_class.as_str(),
            None => return Err(LowerError::Classless),
        };

        let record = match self.registry.lookup(class) {
            Some(record) => record,
            None => {
                report.statistics.unhandled_annotations += 1;
                if !self.options.ignore_unhandled {
                    return Err(LowerError::UnhandledClass {
                        class: class.to_string(),
                    });
                }
                self.registry
                    .lookup(&self.options.fallback_class)
                    .ok_or_else(|| LowerError::UnhandledClass {
                        class: self.options.fallback_class.clone(),
                    })?
            }
        };

        let target = (record.resolver)(annotation, state)?;
        (record.applier)(&target, annotation, state)
    }
}

fn value_module_name<'d>(design: &'d Design, problem: &WiringProblem) -> &'d str {
    match design.value_module(problem.source) {
        Ok(module) => module_name(design, module),
        Err(_) => "<unknown>",
    }
}

/// Turns every pin with a source into one wiring problem per sink.
fn collect_pin_problems(state: &mut ApplyState<'_>, report: &mut LowerReport) {
    let pins = std::mem::take(&mut state.pins);
    for (pin, endpoints) in pins {
        match endpoints.source {
            Some(source) => {
                for sink in endpoints.sinks {
                    state.add_wiring_problem(WiringProblem {
                        source,
                        sink,
                        is_ref_type: false,
                        name_hint: pin.clone(),
                    });
                }
            }
            None if !endpoints.sinks.is_empty() => {
                report.record(Diagnostic::new(LowerError::Apply {
                    class: WIRING_SINK_CLASS.to_string(),
                    reason: format!("pin '{}' has sinks but no source", pin),
                }));
            }
            None => {}
        }
    }
}
