//! The module instantiation graph.
//!
//! One node per module, one edge per instance operation, pointing from the
//! instantiating (parent) module to the instantiated (child) module. A module
//! instantiated twice by the same parent has two parallel edges.
//!
//! Edges are kept in a `StableGraph` so that an instance can be swapped for its
//! replacement without disturbing any other edge index. Edges are added module
//! by module in design order, each module's instances in body order, and
//! neighbour iteration is always sorted by edge index.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{DfsPostOrder, EdgeRef};
use petgraph::Directed;
use petgraph::Direction::{Incoming, Outgoing};

use crate::design::Design;
use crate::error::CoreError;
use crate::id::{ModuleId, OpId};

/// Edge weight: the instance operation realizing the instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRecord {
    pub instance: OpId,
}

/// An instantiation site seen from either end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceUse {
    pub instance: OpId,
    pub parent: ModuleId,
    pub child: ModuleId,
}

/// Acyclic multigraph of module instantiations.
#[derive(Debug, Clone)]
pub struct InstanceGraph {
    graph: StableGraph<ModuleId, InstanceRecord, Directed, u32>,
    nodes: HashMap<ModuleId, NodeIndex<u32>>,
    names: HashMap<String, ModuleId>,
    edges: HashMap<OpId, EdgeIndex<u32>>,
    top: ModuleId,
}

impl InstanceGraph {
    /// Builds the graph from every live instance of the design.
    ///
    /// Fails with [`CoreError::InstanceCycle`] if a module (transitively)
    /// instantiates itself.
    pub fn new(design: &Design) -> Result<Self, CoreError> {
        let mut graph = StableGraph::<ModuleId, InstanceRecord, Directed, u32>::new();
        let mut nodes = HashMap::new();
        let mut names = HashMap::new();
        for module in design.modules() {
            nodes.insert(module.id, graph.add_node(module.id));
            names.insert(module.name.clone(), module.id);
        }

        let mut edges = HashMap::new();
        for module in design.modules() {
            for op in design.instances_in(module.id) {
                let Some(child) = op.instance_target() else {
                    continue;
                };
                let (Some(&from), Some(&to)) = (nodes.get(&module.id), nodes.get(&child)) else {
                    return Err(CoreError::ModuleIdNotFound { id: child });
                };
                let edge = graph.add_edge(from, to, InstanceRecord { instance: op.id });
                edges.insert(op.id, edge);
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            let module = graph[cycle.node_id()];
            return Err(CoreError::InstanceCycle {
                module: design.module(module)?.name.clone(),
            });
        }

        Ok(InstanceGraph {
            graph,
            nodes,
            names,
            edges,
            top: design.top(),
        })
    }

    /// The designated root of the hierarchy.
    pub fn top_level_node(&self) -> ModuleId {
        self.top
    }

    pub fn lookup(&self, name: &str) -> Result<ModuleId, CoreError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::ModuleNotFound {
                name: name.to_string(),
            })
    }

    pub fn num_instances(&self) -> usize {
        self.graph.edge_count()
    }

    /// Instances inside `module`, in body order.
    pub fn instances(&self, module: ModuleId) -> Vec<InstanceUse> {
        self.sorted_edges(module, Outgoing)
    }

    /// Instances of `module` anywhere in the design, ordered by parent module
    /// in design order and then by position in the parent body.
    pub fn uses(&self, module: ModuleId) -> Vec<InstanceUse> {
        self.sorted_edges(module, Incoming)
    }

    /// Returns `true` if nothing instantiates `module`.
    pub fn no_uses(&self, module: ModuleId) -> bool {
        match self.nodes.get(&module) {
            Some(&node) => self.graph.edges_directed(node, Incoming).next().is_none(),
            None => true,
        }
    }

    /// Looks up the instantiation recorded for an instance operation.
    pub fn instance(&self, op: OpId) -> Result<InstanceUse, CoreError> {
        let edge = *self
            .edges
            .get(&op)
            .ok_or(CoreError::InstanceNotFound { id: op })?;
        let (from, to) = self
            .graph
            .edge_endpoints(edge)
            .ok_or(CoreError::InstanceNotFound { id: op })?;
        Ok(InstanceUse {
            instance: op,
            parent: self.graph[from],
            child: self.graph[to],
        })
    }

    /// The module instantiated by `op`.
    pub fn child_of(&self, op: OpId) -> Result<ModuleId, CoreError> {
        Ok(self.instance(op)?.child)
    }

    /// The module whose body contains `op`.
    pub fn parent_of(&self, op: OpId) -> Result<ModuleId, CoreError> {
        Ok(self.instance(op)?.parent)
    }

    /// Swaps the instance operation behind one edge. Parent, child and the
    /// position of every other edge are unchanged.
    pub fn replace_instance(&mut self, old: OpId, new: OpId) -> Result<(), CoreError> {
        let edge = self
            .edges
            .remove(&old)
            .ok_or(CoreError::InstanceNotFound { id: old })?;
        let record = self
            .graph
            .edge_weight_mut(edge)
            .ok_or(CoreError::InstanceNotFound { id: old })?;
        record.instance = new;
        self.edges.insert(new, edge);
        Ok(())
    }

    /// Returns `true` if every instance in `instances` is, through all of its
    /// chains of uses, located underneath `top`.
    ///
    /// Walks parent modules upwards; reaching a module that is neither `top`
    /// nor instantiated anywhere proves the contrary.
    pub fn all_under(&self, instances: &[OpId], top: ModuleId) -> bool {
        let mut work: Vec<OpId> = instances.to_vec();
        let mut seen = HashSet::new();
        while let Some(op) = work.pop() {
            if !seen.insert(op) {
                continue;
            }
            let Ok(parent) = self.parent_of(op) else {
                return false;
            };
            if parent == top {
                continue;
            }
            if self.no_uses(parent) {
                return false;
            }
            work.extend(self.uses(parent).into_iter().map(|u| u.instance));
        }
        true
    }

    /// Every module, children before parents. Modules reachable from the top
    /// come first; unreachable ones follow in module order.
    pub fn post_order(&self) -> Vec<ModuleId> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let Some(&start) = self.nodes.get(&self.top) else {
            return order;
        };
        let mut dfs = DfsPostOrder::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            order.push(self.graph[node]);
        }
        let mut remaining: Vec<NodeIndex<u32>> = self.graph.node_indices().collect();
        remaining.sort();
        for node in remaining {
            if dfs.discovered.contains(node.index()) {
                continue;
            }
            dfs.move_to(node);
            while let Some(next) = dfs.next(&self.graph) {
                order.push(self.graph[next]);
            }
        }
        order
    }

    fn sorted_edges(&self, module: ModuleId, direction: petgraph::Direction) -> Vec<InstanceUse> {
        let Some(&node) = self.nodes.get(&module) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges_directed(node, direction).collect();
        edges.sort_by_key(|e| e.id());
        edges
            .into_iter()
            .map(|e| InstanceUse {
                instance: e.weight().instance,
                parent: self.graph[e.source()],
                child: self.graph[e.target()],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleKind;

    /// Top instantiates A twice (a1, a2) and B once; both A and B instantiate Leaf.
    fn diamond() -> (Design, [ModuleId; 4], [OpId; 5]) {
        let mut design = Design::new("Top");
        let top = design.top();
        let a = design.add_module("A", ModuleKind::Module).unwrap();
        let b = design.add_module("B", ModuleKind::Module).unwrap();
        let leaf = design.add_module("Leaf", ModuleKind::Module).unwrap();
        let al = design.add_instance(a, "l", leaf).unwrap();
        let bl = design.add_instance(b, "l", leaf).unwrap();
        let a1 = design.add_instance(top, "a1", a).unwrap();
        let a2 = design.add_instance(top, "a2", a).unwrap();
        let b1 = design.add_instance(top, "b1", b).unwrap();
        (design, [top, a, b, leaf], [a1, a2, b1, al, bl])
    }

    #[test]
    fn lookup_by_name() {
        let (design, [_, a, _, _], _) = diamond();
        let graph = InstanceGraph::new(&design).unwrap();
        assert_eq!(graph.lookup("A").unwrap(), a);
        assert_eq!(
            graph.lookup("Nope"),
            Err(CoreError::ModuleNotFound {
                name: "Nope".into()
            })
        );
        assert_eq!(graph.top_level_node(), design.top());
    }

    #[test]
    fn uses_and_instances_keep_creation_order() {
        let (design, [top, a, _, leaf], [a1, a2, b1, al, bl]) = diamond();
        let graph = InstanceGraph::new(&design).unwrap();
        let top_insts: Vec<OpId> = graph.instances(top).iter().map(|u| u.instance).collect();
        assert_eq!(top_insts, vec![a1, a2, b1]);
        let a_uses: Vec<OpId> = graph.uses(a).iter().map(|u| u.instance).collect();
        assert_eq!(a_uses, vec![a1, a2]);
        let leaf_uses: Vec<OpId> = graph.uses(leaf).iter().map(|u| u.instance).collect();
        assert_eq!(leaf_uses, vec![al, bl]);
        assert!(graph.no_uses(top));
        assert_eq!(graph.num_instances(), 5);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut design = Design::new("Top");
        let a = design.add_module("A", ModuleKind::Module).unwrap();
        let b = design.add_module("B", ModuleKind::Module).unwrap();
        design.add_instance(design.top(), "a", a).unwrap();
        design.add_instance(a, "b", b).unwrap();
        design.add_instance(b, "a", a).unwrap();
        let err = InstanceGraph::new(&design).unwrap_err();
        assert!(matches!(err, CoreError::InstanceCycle { .. }));
    }

    #[test]
    fn replace_instance_preserves_edge_order() {
        let (mut design, [top, a, _, _], [a1, a2, b1, _, _]) = diamond();
        let mut graph = InstanceGraph::new(&design).unwrap();
        let clone = design.clone_instance_with_ports(a1, &[]).unwrap();
        graph.replace_instance(a1, clone).unwrap();

        let top_insts: Vec<OpId> = graph.instances(top).iter().map(|u| u.instance).collect();
        assert_eq!(top_insts, vec![clone, a2, b1]);
        assert_eq!(graph.child_of(clone).unwrap(), a);
        assert_eq!(graph.parent_of(clone).unwrap(), top);
        assert_eq!(
            graph.child_of(a1),
            Err(CoreError::InstanceNotFound { id: a1 })
        );
        assert!(graph.replace_instance(a1, clone).is_err());
    }

    #[test]
    fn all_under_follows_every_chain() {
        let (mut design, [top, a, b, leaf], [_, _, _, al, bl]) = diamond();
        let graph = InstanceGraph::new(&design).unwrap();
        assert!(graph.all_under(&[al, bl], top));
        assert!(graph.all_under(&[al], a));
        assert!(!graph.all_under(&[al, bl], a));

        // A second root instantiating B makes B's leaf no longer under Top only.
        let other = design.add_module("Other", ModuleKind::Module).unwrap();
        design.add_instance(other, "b", b).unwrap();
        let graph = InstanceGraph::new(&design).unwrap();
        assert!(!graph.all_under(&[bl], top));
        assert!(graph.all_under(&[al], top));
        assert!(!graph.no_uses(leaf));
    }

    #[test]
    fn post_order_visits_children_first() {
        let (mut design, [top, a, b, leaf], _) = diamond();
        let orphan = design.add_module("Orphan", ModuleKind::External).unwrap();
        let graph = InstanceGraph::new(&design).unwrap();
        let order = graph.post_order();
        let pos = |m: ModuleId| order.iter().position(|&x| x == m).unwrap();
        assert_eq!(order.len(), 5);
        assert!(pos(leaf) < pos(a));
        assert!(pos(leaf) < pos(b));
        assert!(pos(a) < pos(top));
        assert!(pos(b) < pos(top));
        assert_eq!(*order.last().unwrap(), orphan);
    }
}
