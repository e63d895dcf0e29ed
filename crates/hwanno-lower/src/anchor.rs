//! Interning of non-local instance paths into named hierarchical anchors.

use std::collections::HashMap;

use hwanno_core::{AnchorId, CoreError, Design, InnerRef, ModuleId, OpId};
use smallvec::SmallVec;

type AnchorKey = (SmallVec<[OpId; 4]>, ModuleId);

/// Deduplicates instance paths so that every distinct path gets exactly one
/// anchor in the design.
#[derive(Debug, Default)]
pub struct AnchorInterner {
    anchors: HashMap<AnchorKey, AnchorId>,
    reused: usize,
}

impl AnchorInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the anchor for `instances` ending in `leaf`, creating it on
    /// first use.
    pub fn intern_path(
        &mut self,
        design: &mut Design,
        instances: &[OpId],
        leaf: ModuleId,
    ) -> Result<AnchorId, CoreError> {
        let key: AnchorKey = (SmallVec::from_slice(instances), leaf);
        if let Some(&anchor) = self.anchors.get(&key) {
            self.reused += 1;
            return Ok(anchor);
        }

        let mut namepath = Vec::with_capacity(instances.len());
        for &instance in instances {
            let op = design.op(instance)?;
            namepath.push(InnerRef {
                module: design.module(op.parent)?.name.clone(),
                name: op.name().unwrap_or_default().to_string(),
            });
        }
        let leaf_name = design.module(leaf)?.name.clone();
        let anchor = design.add_hier_path("nla", namepath, leaf_name);
        self.anchors.insert(key, anchor);
        Ok(anchor)
    }

    /// How many lookups returned an existing anchor.
    pub fn reused(&self) -> usize {
        self.reused
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
