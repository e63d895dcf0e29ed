//! Design: the container tying together modules, operations and values.
//!
//! [`Design`] is the single entry point for constructing and mutating a
//! hardware design. Modules, operations and values live in dense, id-indexed
//! tables; erased operations leave a hole so ids are never reused.
//!
//! Besides the structural IR the design owns:
//! - the raw annotation list waiting to be lowered,
//! - the annotation side-table ([`AnnotationTable`]),
//! - the hierarchical anchors and the circuit-level namespace they are named in.
//!
//! The top module always shares the design's (circuit's) name.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::annotation::{Annotation, AnnotationTable};
use crate::error::CoreError;
use crate::hierpath::{HierPath, InnerRef};
use crate::id::{AnchorId, ModuleId, OpId, ValueId};
use crate::module::{ModuleDef, ModuleKind, Port, PortInfo};
use crate::namespace::Namespace;
use crate::ops::{OpKind, Operation};
use crate::types::HwType;

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueDef {
    /// A port of `module`.
    Port { module: ModuleId, index: usize },
    /// The `index`-th result of `op`.
    Result { op: OpId, index: usize },
}

/// Type and definition site of a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueInfo {
    pub ty: HwType,
    pub def: ValueDef,
}

/// A hardware design (circuit).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "DesignFields")]
pub struct Design {
    name: String,
    top: ModuleId,
    modules: Vec<ModuleDef>,
    ops: Vec<Option<Operation>>,
    values: Vec<ValueInfo>,
    /// Annotations not yet lowered onto their targets.
    #[serde(default)]
    pub raw_annotations: Vec<Annotation>,
    /// Lowered annotations, keyed by annotated entity.
    #[serde(default)]
    pub annotations: AnnotationTable,
    #[serde(default)]
    hier_paths: Vec<HierPath>,
    /// Circuit-level symbol names (modules and anchors).
    #[serde(default)]
    symbols: Namespace,
}

/// Serialized form of [`Design`]. Module and anchor names are re-registered
/// in the circuit namespace on load, so a file without `symbols` (or with a
/// stale one) never hands out an existing name.
#[derive(Deserialize)]
struct DesignFields {
    name: String,
    top: ModuleId,
    modules: Vec<ModuleDef>,
    ops: Vec<Option<Operation>>,
    values: Vec<ValueInfo>,
    #[serde(default)]
    raw_annotations: Vec<Annotation>,
    #[serde(default)]
    annotations: AnnotationTable,
    #[serde(default)]
    hier_paths: Vec<HierPath>,
    #[serde(default)]
    symbols: Namespace,
}

impl From<DesignFields> for Design {
    fn from(fields: DesignFields) -> Self {
        let mut symbols = fields.symbols;
        symbols.add(fields.name.as_str());
        for module in &fields.modules {
            symbols.add(module.name.as_str());
        }
        for path in &fields.hier_paths {
            symbols.add(path.name.as_str());
        }
        Design {
            name: fields.name,
            top: fields.top,
            modules: fields.modules,
            ops: fields.ops,
            values: fields.values,
            raw_annotations: fields.raw_annotations,
            annotations: fields.annotations,
            hier_paths: fields.hier_paths,
            symbols,
        }
    }
}

impl Design {
    /// Creates a design whose top module is named after the circuit.
    pub fn new(name: &str) -> Self {
        let top = ModuleId(0);
        let mut symbols = Namespace::new();
        symbols.add(name);
        Design {
            name: name.to_string(),
            top,
            modules: vec![ModuleDef::new(top, name.to_string(), ModuleKind::Module)],
            ops: Vec::new(),
            values: Vec::new(),
            raw_annotations: Vec::new(),
            annotations: AnnotationTable::new(),
            hier_paths: Vec::new(),
            symbols,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// The circuit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The designated top module.
    pub fn top(&self) -> ModuleId {
        self.top
    }

    pub fn module(&self, id: ModuleId) -> Result<&ModuleDef, CoreError> {
        self.modules
            .get(id.index())
            .ok_or(CoreError::ModuleIdNotFound { id })
    }

    fn module_mut(&mut self, id: ModuleId) -> Result<&mut ModuleDef, CoreError> {
        self.modules
            .get_mut(id.index())
            .ok_or(CoreError::ModuleIdNotFound { id })
    }

    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.modules.iter().find(|m| m.name == name).map(|m| m.id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleDef> {
        self.modules.iter()
    }

    pub fn op(&self, id: OpId) -> Result<&Operation, CoreError> {
        self.ops
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(CoreError::OpNotFound { id })
    }

    /// Returns `true` if the operation exists and has not been erased.
    pub fn contains_op(&self, id: OpId) -> bool {
        self.op(id).is_ok()
    }

    /// Operations of a module body, in program order.
    pub fn ops_in(&self, module: ModuleId) -> impl Iterator<Item = &Operation> + '_ {
        let body: &[OpId] = self
            .modules
            .get(module.index())
            .map(|m| m.body.as_slice())
            .unwrap_or(&[]);
        body.iter().filter_map(move |&id| self.op(id).ok())
    }

    /// Instance operations of a module body, in program order.
    pub fn instances_in(&self, module: ModuleId) -> impl Iterator<Item = &Operation> + '_ {
        self.ops_in(module)
            .filter(|op| matches!(op.kind, OpKind::Instance { .. }))
    }

    /// Every live operation in the design.
    pub fn all_ops(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter().flatten()
    }

    pub fn value(&self, id: ValueId) -> Result<&ValueInfo, CoreError> {
        self.values
            .get(id.index())
            .ok_or(CoreError::ValueNotFound { id })
    }

    pub fn value_type(&self, id: ValueId) -> Result<&HwType, CoreError> {
        Ok(&self.value(id)?.ty)
    }

    /// The module whose body can refer to this value.
    pub fn value_module(&self, id: ValueId) -> Result<ModuleId, CoreError> {
        match self.value(id)?.def {
            ValueDef::Port { module, .. } => Ok(module),
            ValueDef::Result { op, .. } => Ok(self.op(op)?.parent),
        }
    }

    pub fn hier_paths(&self) -> &[HierPath] {
        &self.hier_paths
    }

    pub fn hier_path(&self, id: AnchorId) -> Option<&HierPath> {
        self.hier_paths.get(id.0 as usize)
    }

    pub fn hier_path_by_name(&self, name: &str) -> Option<&HierPath> {
        self.hier_paths.iter().find(|p| p.name == name)
    }

    /// Builds a fresh namespace containing every port and op name of a module.
    pub fn module_namespace(&self, module: ModuleId) -> Result<Namespace, CoreError> {
        let def = self.module(module)?;
        let mut ns: Namespace = def.ports.iter().map(|p| p.name.clone()).collect();
        for op in self.ops_in(module) {
            if let Some(name) = op.name() {
                ns.add(name);
            }
        }
        Ok(ns)
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Adds a new, empty module.
    pub fn add_module(&mut self, name: &str, kind: ModuleKind) -> Result<ModuleId, CoreError> {
        if self.module_by_name(name).is_some() {
            return Err(CoreError::GraphInconsistency {
                reason: format!("duplicate module name '{}'", name),
            });
        }
        let id = ModuleId(self.modules.len() as u32);
        self.modules
            .push(ModuleDef::new(id, name.to_string(), kind));
        self.symbols.add(name);
        Ok(id)
    }

    /// Adds a port to a module that is not instantiated yet.
    ///
    /// Use [`append_ports`](Self::append_ports) together with
    /// [`clone_instance_with_ports`](Self::clone_instance_with_ports) to grow
    /// the signature of an instantiated module.
    pub fn add_port(&mut self, module: ModuleId, port: PortInfo) -> Result<ValueId, CoreError> {
        if self
            .all_ops()
            .any(|op| op.instance_target() == Some(module))
        {
            return Err(CoreError::GraphInconsistency {
                reason: format!(
                    "cannot add port '{}' to already instantiated module '{}'",
                    port.name,
                    self.module(module)?.name
                ),
            });
        }
        let values = self.append_ports(module, std::slice::from_ref(&port))?;
        Ok(values[0])
    }

    /// Appends ports to the module's port list and returns their values.
    /// New ports are numbered after the existing ones.
    pub fn append_ports(
        &mut self,
        module: ModuleId,
        ports: &[PortInfo],
    ) -> Result<Vec<ValueId>, CoreError> {
        let base = self.module(module)?.num_ports();
        let mut values = Vec::with_capacity(ports.len());
        for (offset, info) in ports.iter().enumerate() {
            let value = self.new_value(
                info.ty.clone(),
                ValueDef::Port {
                    module,
                    index: base + offset,
                },
            );
            self.module_mut(module)?.ports.push(Port {
                name: info.name.clone(),
                ty: info.ty.clone(),
                direction: info.direction,
                value,
            });
            values.push(value);
        }
        Ok(values)
    }

    pub fn add_wire(
        &mut self,
        module: ModuleId,
        name: &str,
        ty: HwType,
    ) -> Result<(OpId, ValueId), CoreError> {
        let op = self.push_op(
            module,
            OpKind::Wire {
                name: name.to_string(),
                ty: ty.clone(),
            },
            &[ty],
        )?;
        Ok((op, self.op(op)?.results[0]))
    }

    pub fn add_reg(
        &mut self,
        module: ModuleId,
        name: &str,
        ty: HwType,
    ) -> Result<(OpId, ValueId), CoreError> {
        let op = self.push_op(
            module,
            OpKind::Reg {
                name: name.to_string(),
                ty: ty.clone(),
            },
            &[ty],
        )?;
        Ok((op, self.op(op)?.results[0]))
    }

    pub fn add_node(
        &mut self,
        module: ModuleId,
        name: &str,
        input: ValueId,
    ) -> Result<(OpId, ValueId), CoreError> {
        self.check_value_in(module, input)?;
        let ty = self.value_type(input)?.clone();
        let op = self.push_op(
            module,
            OpKind::Node {
                name: name.to_string(),
                input,
            },
            &[ty],
        )?;
        Ok((op, self.op(op)?.results[0]))
    }

    /// Instantiates `child` inside `parent`. One result per child port.
    pub fn add_instance(
        &mut self,
        parent: ModuleId,
        name: &str,
        child: ModuleId,
    ) -> Result<OpId, CoreError> {
        let result_types: Vec<HwType> = self
            .module(child)?
            .ports
            .iter()
            .map(|p| p.ty.clone())
            .collect();
        self.push_op(
            parent,
            OpKind::Instance {
                name: name.to_string(),
                module: child,
            },
            &result_types,
        )
    }

    /// Drives `dest` from `src`. Both values must be visible in `module`.
    pub fn add_connect(
        &mut self,
        module: ModuleId,
        dest: ValueId,
        src: ValueId,
    ) -> Result<OpId, CoreError> {
        self.check_value_in(module, dest)?;
        self.check_value_in(module, src)?;
        self.push_op(module, OpKind::Connect { dest, src }, &[])
    }

    /// Produces a reference to `base`.
    pub fn add_ref_send(&mut self, module: ModuleId, base: ValueId) -> Result<ValueId, CoreError> {
        self.check_value_in(module, base)?;
        let ty = self.value_type(base)?.reference();
        let op = self.push_op(module, OpKind::RefSend { base }, &[ty])?;
        Ok(self.op(op)?.results[0])
    }

    /// Reads the value behind `reference`.
    pub fn add_ref_resolve(
        &mut self,
        module: ModuleId,
        reference: ValueId,
    ) -> Result<ValueId, CoreError> {
        self.check_value_in(module, reference)?;
        let ty = self.value_type(reference)?.base().clone();
        let op = self.push_op(module, OpKind::RefResolve { reference }, &[ty])?;
        Ok(self.op(op)?.results[0])
    }

    /// Registers a new hierarchical anchor under a fresh circuit-level name
    /// derived from `hint`.
    pub fn add_hier_path(&mut self, hint: &str, namepath: Vec<InnerRef>, leaf: String) -> AnchorId {
        let id = AnchorId(self.hier_paths.len() as u32);
        let name = self.symbols.new_name(hint);
        self.hier_paths.push(HierPath {
            id,
            name,
            namepath,
            leaf,
        });
        id
    }

    // -----------------------------------------------------------------------
    // Mutation of existing structure
    // -----------------------------------------------------------------------

    /// Clones an instance with `new_ports` appended to its results.
    ///
    /// The clone is inserted right after the original in the parent body and
    /// receives fresh result values; the original is left untouched. Callers
    /// redirect uses with [`replace_all_uses`](Self::replace_all_uses) and then
    /// [`erase_op`](Self::erase_op) the original.
    pub fn clone_instance_with_ports(
        &mut self,
        instance: OpId,
        new_ports: &[PortInfo],
    ) -> Result<OpId, CoreError> {
        let old = self.op(instance)?;
        if !matches!(old.kind, OpKind::Instance { .. }) {
            return Err(CoreError::NotAnInstance { id: instance });
        }
        let parent = old.parent;
        let kind = old.kind.clone();
        self.module(parent)?;
        let mut result_types = Vec::with_capacity(old.results.len() + new_ports.len());
        for &result in &old.results {
            result_types.push(self.value_type(result)?.clone());
        }
        result_types.extend(new_ports.iter().map(|p| p.ty.clone()));

        let id = OpId(self.ops.len() as u32);
        let results = self.new_results(id, &result_types);
        self.ops.push(Some(Operation {
            id,
            parent,
            kind,
            results,
        }));

        let body = &mut self.module_mut(parent)?.body;
        let position = body
            .iter()
            .position(|&op| op == instance)
            .map_or(body.len(), |p| p + 1);
        body.insert(position, id);
        Ok(id)
    }

    /// Rewrites every operand equal to `old` into `new` within the module that
    /// owns `old`. Returns the number of rewritten operands.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> Result<usize, CoreError> {
        let module = self.value_module(old)?;
        let body = self.module(module)?.body.clone();
        let mut replaced = 0;
        for id in body {
            let Some(Some(op)) = self.ops.get_mut(id.index()) else {
                continue;
            };
            for operand in op.kind.operands_mut() {
                if *operand == old {
                    *operand = new;
                    replaced += 1;
                }
            }
        }
        Ok(replaced)
    }

    /// Removes an operation from its parent body and drops its annotations.
    pub fn erase_op(&mut self, id: OpId) -> Result<Operation, CoreError> {
        let parent = self.op(id)?.parent;
        self.module(parent)?;
        let op = self
            .ops
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(CoreError::OpNotFound { id })?;
        self.module_mut(parent)?.body.retain(|&o| o != id);
        self.annotations.remove_op(id);
        Ok(op)
    }

    // -----------------------------------------------------------------------
    // Consistency
    // -----------------------------------------------------------------------

    /// Checks the structural invariants of the design:
    /// operands are live values visible in the using module, and every
    /// instance has exactly one result per port of its child.
    pub fn verify(&self) -> Result<(), CoreError> {
        for module in &self.modules {
            for &id in &module.body {
                let op = self.op(id)?;
                if op.parent != module.id {
                    return Err(CoreError::GraphInconsistency {
                        reason: format!("op {} listed in wrong body '{}'", id, module.name),
                    });
                }
                for operand in op.kind.operands() {
                    self.check_value_in(module.id, operand)?;
                }
                if let OpKind::Instance { module: child, .. } = op.kind {
                    let ports = self.module(child)?.num_ports();
                    if ports != op.results.len() {
                        return Err(CoreError::GraphInconsistency {
                            reason: format!(
                                "instance op {} has {} results but '{}' has {} ports",
                                id,
                                op.results.len(),
                                self.module(child)?.name,
                                ports
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn new_value(&mut self, ty: HwType, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueInfo { ty, def });
        id
    }

    fn new_results(&mut self, op: OpId, types: &[HwType]) -> SmallVec<[ValueId; 2]> {
        types
            .iter()
            .enumerate()
            .map(|(index, ty)| self.new_value(ty.clone(), ValueDef::Result { op, index }))
            .collect()
    }

    fn push_op(
        &mut self,
        module: ModuleId,
        kind: OpKind,
        result_types: &[HwType],
    ) -> Result<OpId, CoreError> {
        self.module(module)?;
        let id = OpId(self.ops.len() as u32);
        let results = self.new_results(id, result_types);
        self.ops.push(Some(Operation {
            id,
            parent: module,
            kind,
            results,
        }));
        self.module_mut(module)?.body.push(id);
        Ok(id)
    }

    fn check_value_in(&self, module: ModuleId, value: ValueId) -> Result<(), CoreError> {
        let owner = self.value_module(value)?;
        if owner != module {
            return Err(CoreError::GraphInconsistency {
                reason: format!(
                    "value {} belongs to '{}' but is used in '{}'",
                    value,
                    self.module(owner)?.name,
                    self.module(module)?.name
                ),
            });
        }
        Ok(())
    }
}
