//! Memoized absolute instance paths.
//!
//! An instance path is the sequence of instance operations leading from the
//! top module's body down to one occurrence of a module. Every path array lives
//! in a caller-provided [`Bump`] arena and is never mutated once handed out;
//! updates allocate fresh arrays and swap the cached slice.

use std::collections::HashMap;

use bumpalo::Bump;

use crate::design::Design;
use crate::error::CoreError;
use crate::id::{ModuleId, OpId};
use crate::instance_graph::InstanceGraph;

/// Instances from the top body downwards. Empty for the top module itself.
pub type InstancePath<'a> = &'a [OpId];

const TOP_PATHS: &[InstancePath<'static>] = &[&[]];

/// Arena-backed cache of every absolute path of every module.
pub struct InstancePathCache<'a> {
    graph: InstanceGraph,
    arena: &'a Bump,
    absolute_paths: HashMap<ModuleId, &'a [InstancePath<'a>]>,
}

impl<'a> InstancePathCache<'a> {
    pub fn new(graph: InstanceGraph, arena: &'a Bump) -> Self {
        InstancePathCache {
            graph,
            arena,
            absolute_paths: HashMap::new(),
        }
    }

    pub fn graph(&self) -> &InstanceGraph {
        &self.graph
    }

    /// Returns every absolute path of `module`.
    ///
    /// The top module has exactly one, empty, path. Any other module gets the
    /// paths of each instantiating parent extended by that instance, in
    /// instance creation order. Modules not reachable from the top have none.
    pub fn absolute_paths(&mut self, module: ModuleId) -> Result<&'a [InstancePath<'a>], CoreError> {
        if module == self.graph.top_level_node() {
            return Ok(TOP_PATHS);
        }
        if let Some(&paths) = self.absolute_paths.get(&module) {
            return Ok(paths);
        }

        let mut collected: Vec<InstancePath<'a>> = Vec::new();
        for site in self.graph.uses(module) {
            let parent_paths = self.absolute_paths(site.parent)?;
            for &path in parent_paths {
                collected.push(self.append_instance(path, site.instance));
            }
        }

        let arena = self.arena;
        let paths: &'a [InstancePath<'a>] = arena.alloc_slice_copy(&collected);
        self.absolute_paths.insert(module, paths);
        Ok(paths)
    }

    /// Allocates `path` extended by `instance`.
    pub fn append_instance(&self, path: InstancePath<'_>, instance: OpId) -> InstancePath<'a> {
        let arena = self.arena;
        let extended = arena.alloc_slice_fill_copy(path.len() + 1, instance);
        extended[..path.len()].copy_from_slice(path);
        extended
    }

    /// Replaces instance `old` by `new` in the graph and in every cached path.
    ///
    /// Only paths containing `old` are re-allocated; modules without such a
    /// path keep their cached slice untouched.
    pub fn replace_instance(&mut self, old: OpId, new: OpId) -> Result<(), CoreError> {
        self.graph.replace_instance(old, new)?;

        let arena = self.arena;
        for paths in self.absolute_paths.values_mut() {
            if !paths.iter().any(|path| path.contains(&old)) {
                continue;
            }
            let rewritten: Vec<InstancePath<'a>> = paths
                .iter()
                .map(|&path| {
                    if !path.contains(&old) {
                        return path;
                    }
                    let fresh = arena.alloc_slice_copy(path);
                    for op in fresh.iter_mut().filter(|op| **op == old) {
                        *op = new;
                    }
                    &*fresh
                })
                .collect();
            *paths = arena.alloc_slice_copy(&rewritten);
        }
        Ok(())
    }
}

/// Renders a path as `Top/inst:Module/inst:Module`.
pub fn display_path(design: &Design, path: InstancePath<'_>) -> Result<String, CoreError> {
    let mut out = design.module(design.top())?.name.clone();
    for &op in path {
        let instance = design.op(op)?;
        let child = instance
            .instance_target()
            .ok_or(CoreError::NotAnInstance { id: op })?;
        out.push('/');
        out.push_str(instance.name().unwrap_or_default());
        out.push(':');
        out.push_str(&design.module(child)?.name);
    }
    Ok(out)
}
