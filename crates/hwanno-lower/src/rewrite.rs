//! Materializing a wiring plan, leaves first.
//!
//! Modules are visited in a post-order fixed before the first mutation. Each
//! visited module gets its pending ports, connects them to the values standing
//! for their problems, and then has every instantiation site replaced by a
//! clone carrying the new ports. The clone's new results are handed to the
//! enclosing module, which is visited later.
//!
//! Results of a replaced instance are erased with it. Plan entries recorded
//! before the replacement may still name them, so every value read from the
//! plan is first mapped through the renames collected so far. Failures are
//! collected per module, per problem and per instantiation site; the walk
//! always visits every module.

use std::collections::HashMap;

use hwanno_core::{
    CoreError, Design, Direction, InstancePathCache, InstanceUse, ModuleId, PortInfo, ValueId,
};
use tracing::debug;

use crate::error::LowerError;
use crate::wiring::{module_name, ConnectionEnd, Flow, ModuleModifications, WiringPlan};

/// Counts of structural changes made by [`rewrite_hierarchy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub ports_added: usize,
    pub instances_replaced: usize,
    pub connects_added: usize,
}

/// Connects `dest` from `src` inside `module`, converting between reference
/// and plain values when exactly one side is a reference.
pub fn emit_connect(
    design: &mut Design,
    module: ModuleId,
    dest: ValueId,
    src: ValueId,
) -> Result<(), CoreError> {
    let dest_is_ref = design.value_type(dest)?.is_ref();
    let src_is_ref = design.value_type(src)?.is_ref();
    let src = match (dest_is_ref, src_is_ref) {
        (true, false) => design.add_ref_send(module, src)?,
        (false, true) => design.add_ref_resolve(module, src)?,
        _ => src,
    };
    design.add_connect(module, dest, src)?;
    Ok(())
}

struct Rewriter<'r, 'a> {
    design: &'r mut Design,
    path_cache: &'r mut InstancePathCache<'a>,
    /// Result of an erased instance to the matching result of its clone.
    renames: HashMap<ValueId, ValueId>,
    stats: RewriteStats,
    errors: Vec<LowerError>,
}

impl Rewriter<'_, '_> {
    /// The live value standing for `value`, following replacements.
    fn current(&self, mut value: ValueId) -> ValueId {
        while let Some(&next) = self.renames.get(&value) {
            value = next;
        }
        value
    }

    fn connection(
        &self,
        modifications: &ModuleModifications,
        module: ModuleId,
        problem: usize,
    ) -> Result<ConnectionEnd, CoreError> {
        let end = modifications
            .connection_map
            .get(&problem)
            .copied()
            .ok_or_else(|| CoreError::GraphInconsistency {
                reason: format!(
                    "no value for wiring problem {} in module '{}'",
                    problem,
                    module_name(self.design, module)
                ),
            })?;
        Ok(ConnectionEnd {
            value: self.current(end.value),
            flow: end.flow,
        })
    }

    fn rewrite_module(
        &mut self,
        plan: &mut WiringPlan,
        module: ModuleId,
        modifications: &ModuleModifications,
    ) -> Result<(), LowerError> {
        let new_ports: Vec<PortInfo> = modifications
            .ports_to_add
            .iter()
            .map(|pending| pending.port.clone())
            .collect();
        let port_values = self.design.append_ports(module, &new_ports)?;
        self.stats.ports_added += port_values.len();

        for (pending, &port) in modifications.ports_to_add.iter().zip(&port_values) {
            let connected = self
                .connection(modifications, module, pending.problem)
                .and_then(|end| match pending.port.direction {
                    Direction::Out => emit_connect(self.design, module, port, end.value),
                    Direction::In => emit_connect(self.design, module, end.value, port),
                });
            match connected {
                Ok(()) => self.stats.connects_added += 1,
                Err(error) => self.errors.push(error.into()),
            }
        }

        for &(end, problem) in &modifications.uturns {
            let end = ConnectionEnd {
                value: self.current(end.value),
                flow: end.flow,
            };
            let closed = self
                .connection(modifications, module, problem)
                .and_then(|existing| close_uturn(self.design, module, end, existing));
            match closed {
                Ok(()) => self.stats.connects_added += 1,
                Err(error) => self.errors.push(error.into()),
            }
        }

        if new_ports.is_empty() {
            return Ok(());
        }
        for site in self.path_cache.graph().uses(module) {
            if let Err(error) = self.reissue(plan, site, modifications, &new_ports) {
                self.errors.push(error);
            }
        }
        Ok(())
    }

    /// Replaces one instantiation of a grown module by a clone with the new
    /// ports, and hands the new results to the enclosing module.
    fn reissue(
        &mut self,
        plan: &mut WiringPlan,
        site: InstanceUse,
        modifications: &ModuleModifications,
        new_ports: &[PortInfo],
    ) -> Result<(), LowerError> {
        let old_results = self.design.op(site.instance)?.results.clone();
        let clone = self.design.clone_instance_with_ports(site.instance, new_ports)?;
        let new_results = self.design.op(clone)?.results.clone();
        for (&old, &new) in old_results.iter().zip(new_results.iter()) {
            self.design.replace_all_uses(old, new)?;
            self.renames.insert(old, new);
        }
        self.design.annotations.rekey_instance(site.instance, clone);
        self.design.erase_op(site.instance)?;
        self.path_cache.replace_instance(site.instance, clone)?;
        self.stats.instances_replaced += 1;
        debug!(
            parent = module_name(self.design, site.parent),
            old = %site.instance,
            new = %clone,
            "replaced instance"
        );

        let enclosing = plan.module_mut(site.parent);
        for (offset, pending) in modifications.ports_to_add.iter().enumerate() {
            let value = new_results[old_results.len() + offset];
            let flow = match pending.port.direction {
                Direction::Out => Flow::Source,
                Direction::In => Flow::Sink,
            };
            enclosing.record(pending.problem, ConnectionEnd { value, flow });
        }
        Ok(())
    }
}

/// Connects the sink side of a problem from its source side.
fn close_uturn(
    design: &mut Design,
    module: ModuleId,
    end: ConnectionEnd,
    existing: ConnectionEnd,
) -> Result<(), CoreError> {
    let (dest, src) = match end.flow {
        Flow::Sink => (end.value, existing.value),
        Flow::Source => (existing.value, end.value),
    };
    emit_connect(design, module, dest, src)
}

/// Applies `plan` to the design, keeping `path_cache` coherent with every
/// replaced instance.
///
/// Every module of the plan is visited even when some of its work fails; the
/// returned errors list each failed module, connection or instance site.
pub fn rewrite_hierarchy(
    design: &mut Design,
    path_cache: &mut InstancePathCache<'_>,
    mut plan: WiringPlan,
) -> (RewriteStats, Vec<LowerError>) {
    let order = path_cache.graph().post_order();
    let mut rewriter = Rewriter {
        design,
        path_cache,
        renames: HashMap::new(),
        stats: RewriteStats::default(),
        errors: Vec::new(),
    };

    for module in order {
        let Some(modifications) = plan.modules.shift_remove(&module) else {
            continue;
        };
        if modifications.is_empty() {
            continue;
        }
        debug!(
            module = module_name(rewriter.design, module),
            ports = modifications.ports_to_add.len(),
            uturns = modifications.uturns.len(),
            "rewriting module"
        );
        if let Err(error) = rewriter.rewrite_module(&mut plan, module, &modifications) {
            rewriter.errors.push(error);
        }
    }
    (rewriter.stats, rewriter.errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;
    use hwanno_core::{HwType, InstanceGraph, OpKind};

    fn connects(design: &Design, module: ModuleId) -> Vec<(ValueId, ValueId)> {
        design
            .ops_in(module)
            .filter_map(|op| match op.kind {
                OpKind::Connect { dest, src } => Some((dest, src)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn failed_problem_does_not_stop_the_others() {
        let mut design = Design::new("Top");
        let top = design.top();
        let (_, a) = design.add_wire(top, "a", HwType::uint(8)).unwrap();
        let (_, b) = design.add_wire(top, "b", HwType::uint(8)).unwrap();
        let (_, d) = design.add_wire(top, "d", HwType::uint(8)).unwrap();
        let arena = Bump::new();
        let mut cache = InstancePathCache::new(InstanceGraph::new(&design).unwrap(), &arena);

        let mut plan = WiringPlan::new();
        let mods = plan.module_mut(top);
        let missing = ValueId(999);
        mods.record(1, ConnectionEnd { value: missing, flow: Flow::Source });
        mods.record(1, ConnectionEnd { value: d, flow: Flow::Sink });
        mods.record(0, ConnectionEnd { value: a, flow: Flow::Source });
        mods.record(0, ConnectionEnd { value: b, flow: Flow::Sink });

        let (stats, errors) = rewrite_hierarchy(&mut design, &mut cache, plan);
        assert_eq!(
            errors,
            vec![LowerError::Core(CoreError::ValueNotFound { id: missing })]
        );
        assert_eq!(stats.connects_added, 1);
        assert_eq!(connects(&design, top), vec![(b, a)]);
    }

    #[test]
    fn current_follows_chained_renames() {
        let mut design = Design::new("Top");
        let arena = Bump::new();
        let mut cache = InstancePathCache::new(InstanceGraph::new(&design).unwrap(), &arena);
        let mut rewriter = Rewriter {
            design: &mut design,
            path_cache: &mut cache,
            renames: HashMap::new(),
            stats: RewriteStats::default(),
            errors: Vec::new(),
        };
        rewriter.renames.insert(ValueId(1), ValueId(4));
        rewriter.renames.insert(ValueId(4), ValueId(9));
        assert_eq!(rewriter.current(ValueId(1)), ValueId(9));
        assert_eq!(rewriter.current(ValueId(4)), ValueId(9));
        assert_eq!(rewriter.current(ValueId(2)), ValueId(2));
    }
}
