//! Planning the ports and connections that satisfy wiring problems.
//!
//! A wiring problem asks for a source value to drive a sink value that may
//! live in a different module. The planner finds the lowest common ancestor
//! (LCA) of both endpoint modules and records, for every module strictly below
//! the LCA on either side, a port to add. Nothing is mutated here; the
//! [`rewrite`](crate::rewrite) step materializes the plan.

use std::collections::HashMap;

use hwanno_core::{
    CoreError, Design, Direction, InstanceGraph, InstancePathCache, ModuleId, Namespace, OpId,
    PortInfo, ValueId,
};
use indexmap::IndexMap;
use tracing::debug;

use crate::error::LowerError;

/// A deferred request to connect `source` to `sink` across the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringProblem {
    pub source: ValueId,
    pub sink: ValueId,
    /// Carry the value through the hierarchy as a reference (probe).
    pub is_ref_type: bool,
    /// Base name for the ports created for this problem.
    pub name_hint: String,
}

/// Whether a value provides the wired data or must be driven by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Source,
    Sink,
}

/// A value standing for one end of a problem inside a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEnd {
    pub value: ValueId,
    pub flow: Flow,
}

/// A port to append to a module on behalf of a problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPort {
    pub port: PortInfo,
    pub problem: usize,
}

/// Everything that has to change in one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleModifications {
    /// Ports to append, in planning order. Only grows.
    pub ports_to_add: Vec<PendingPort>,
    /// Problem index to the value representing it in this module.
    pub connection_map: IndexMap<usize, ConnectionEnd>,
    /// Second ends of problems closed in this module.
    pub uturns: Vec<(ConnectionEnd, usize)>,
}

impl ModuleModifications {
    pub fn is_empty(&self) -> bool {
        self.ports_to_add.is_empty() && self.connection_map.is_empty() && self.uturns.is_empty()
    }

    /// Records `end` for `problem`. The first end becomes the module's
    /// connection value; a second end closes the problem with a u-turn.
    pub fn record(&mut self, problem: usize, end: ConnectionEnd) {
        if self.connection_map.contains_key(&problem) {
            self.uturns.push((end, problem));
        } else {
            self.connection_map.insert(problem, end);
        }
    }
}

/// Per-module modifications for every resolvable wiring problem.
#[derive(Debug, Default)]
pub struct WiringPlan {
    pub modules: IndexMap<ModuleId, ModuleModifications>,
    namespaces: HashMap<ModuleId, Namespace>,
}

impl WiringPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module_mut(&mut self, module: ModuleId) -> &mut ModuleModifications {
        self.modules.entry(module).or_default()
    }

    pub fn get(&self, module: ModuleId) -> Option<&ModuleModifications> {
        self.modules.get(&module)
    }

    /// Reserves a fresh port name in `module`.
    fn port_name(&mut self, design: &Design, module: ModuleId, hint: &str) -> Result<String, CoreError> {
        if !self.namespaces.contains_key(&module) {
            let namespace = design.module_namespace(module)?;
            self.namespaces.insert(module, namespace);
        }
        Ok(self
            .namespaces
            .entry(module)
            .or_default()
            .new_name(hint))
    }
}

/// Length of the shared prefix of two instance paths. Stops as soon as either
/// path is exhausted or the front instances differ.
pub fn common_prefix_len(source: &[OpId], sink: &[OpId]) -> usize {
    source
        .iter()
        .zip(sink.iter())
        .take_while(|(a, b)| a == b)
        .count()
}

/// The lowest common ancestor of two absolute paths and the remainder of each
/// path below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lca<'p> {
    pub module: ModuleId,
    pub sources: &'p [OpId],
    pub sinks: &'p [OpId],
}

pub fn lowest_common_ancestor<'p>(
    graph: &InstanceGraph,
    source: &'p [OpId],
    sink: &'p [OpId],
) -> Result<Lca<'p>, CoreError> {
    let shared = common_prefix_len(source, sink);
    let module = match shared {
        0 => graph.top_level_node(),
        n => graph.child_of(source[n - 1])?,
    };
    Ok(Lca {
        module,
        sources: &source[shared..],
        sinks: &sink[shared..],
    })
}

/// Groups every problem into per-module modifications. Problems that cannot
/// be planned are reported and left out of the plan.
pub fn resolve_wiring_problems(
    design: &Design,
    path_cache: &mut InstancePathCache<'_>,
    problems: &[WiringProblem],
) -> (WiringPlan, Vec<LowerError>) {
    let mut plan = WiringPlan::new();
    let mut errors = Vec::new();
    for (index, problem) in problems.iter().enumerate() {
        if let Err(error) = plan_problem(design, path_cache, &mut plan, index, problem) {
            errors.push(error);
        }
    }
    (plan, errors)
}

pub(crate) fn module_name(design: &Design, module: ModuleId) -> &str {
    design
        .module(module)
        .map(|def| def.name.as_str())
        .unwrap_or("<unknown>")
}

fn single_path<'a>(
    design: &Design,
    path_cache: &mut InstancePathCache<'a>,
    problem: usize,
    module: ModuleId,
) -> Result<&'a [OpId], LowerError> {
    let paths = path_cache.absolute_paths(module)?;
    match paths {
        [path] => Ok(*path),
        _ => Err(LowerError::AmbiguousPath {
            problem,
            module: design.module(module)?.name.clone(),
            count: paths.len(),
        }),
    }
}

fn plan_problem(
    design: &Design,
    path_cache: &mut InstancePathCache<'_>,
    plan: &mut WiringPlan,
    index: usize,
    problem: &WiringProblem,
) -> Result<(), LowerError> {
    let source_module = design.value_module(problem.source)?;
    let sink_module = design.value_module(problem.sink)?;
    let source_path = single_path(design, path_cache, index, source_module)?;
    let sink_path = single_path(design, path_cache, index, sink_module)?;

    let lca = lowest_common_ancestor(path_cache.graph(), source_path, sink_path)?;
    debug!(
        problem = index,
        source_module = module_name(design, source_module),
        sink_module = module_name(design, sink_module),
        lca = module_name(design, lca.module),
        "planning wiring problem"
    );

    let sink_type = design.value_type(problem.sink)?;
    let port_type = if problem.is_ref_type {
        sink_type.reference()
    } else {
        sink_type.clone()
    };

    plan.module_mut(source_module).record(
        index,
        ConnectionEnd {
            value: problem.source,
            flow: Flow::Source,
        },
    );
    plan.module_mut(sink_module).record(
        index,
        ConnectionEnd {
            value: problem.sink,
            flow: Flow::Sink,
        },
    );

    let sides = [(lca.sources, Direction::Out), (lca.sinks, Direction::In)];
    for (instances, direction) in sides {
        for &instance in instances {
            let module = path_cache.graph().child_of(instance)?;
            let name = plan.port_name(design, module, &problem.name_hint)?;
            debug!(
                problem = index,
                module = module_name(design, module),
                port = %name,
                ?direction,
                "adding port"
            );
            plan.module_mut(module).ports_to_add.push(PendingPort {
                port: PortInfo::new(name, port_type.clone(), direction),
                problem: index,
            });
        }
    }
    Ok(())
}
