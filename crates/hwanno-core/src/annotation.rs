//! Annotations and the per-entity annotation side-table.
//!
//! An [`Annotation`] is an insertion-ordered mapping of named JSON fields,
//! minimally carrying a `class`. Annotations are stored out-of-line in an
//! [`AnnotationTable`] keyed by the stable identity of what they annotate
//! ([`AnnoTarget`]), and each target's list is append-only.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::id::{ModuleId, OpId};

/// Field holding the annotation class.
pub const CLASS_FIELD: &str = "class";
/// Field holding the raw target path.
pub const TARGET_FIELD: &str = "target";
/// Field added when an annotation targets an aggregate sub-element.
pub const FIELD_ID_FIELD: &str = "circt.fieldID";
/// Field referencing the hierarchical anchor of a non-local annotation.
pub const NONLOCAL_FIELD: &str = "circt.nonlocal";

/// An ordered mapping of named annotation fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotation(IndexMap<String, Json>);

impl Annotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an annotation carrying only a class.
    pub fn with_class(class: &str) -> Self {
        let mut anno = Annotation::new();
        anno.insert(CLASS_FIELD, Json::String(class.to_string()));
        anno
    }

    /// Builds an annotation with a class and a string target.
    pub fn targeted(class: &str, target: &str) -> Self {
        let mut anno = Annotation::with_class(class);
        anno.insert(TARGET_FIELD, Json::String(target.to_string()));
        anno
    }

    /// Builds an annotation from a JSON object, rejecting anything else.
    pub fn from_json(value: Json) -> Option<Self> {
        match value {
            Json::Object(map) => Some(Annotation(map.into_iter().collect())),
            _ => None,
        }
    }

    /// The `class` field, if present and string-typed.
    pub fn class(&self) -> Option<&str> {
        self.0.get(CLASS_FIELD).and_then(Json::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Json> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Json::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Inserts or replaces a field. New fields are appended at the end.
    pub fn insert(&mut self, name: impl Into<String>, value: Json) {
        self.0.insert(name.into(), value);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Json)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

/// Owner of an annotated port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortOwner {
    /// A port of the module definition.
    Module(ModuleId),
    /// The result of an instance corresponding to one of the child's ports.
    Instance(OpId),
}

/// The entity an annotation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnoTarget {
    /// The design root.
    Circuit,
    Module(ModuleId),
    Op(OpId),
    Port { owner: PortOwner, index: usize },
}

impl AnnoTarget {
    /// The operation behind an op target or an instance-port target.
    pub fn op(&self) -> Option<OpId> {
        match *self {
            AnnoTarget::Op(op) => Some(op),
            AnnoTarget::Port {
                owner: PortOwner::Instance(op),
                ..
            } => Some(op),
            _ => None,
        }
    }
}

/// One serialized entry of the side-table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationEntry {
    pub target: AnnoTarget,
    pub annotations: Vec<Annotation>,
}

/// Side-table from annotated entity to its ordered annotation list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<AnnotationEntry>", into = "Vec<AnnotationEntry>")]
pub struct AnnotationTable {
    entries: IndexMap<AnnoTarget, Vec<Annotation>>,
}

impl AnnotationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an annotation to the target's list.
    pub fn append(&mut self, target: AnnoTarget, annotation: Annotation) {
        self.entries.entry(target).or_default().push(annotation);
    }

    /// Returns the target's annotations in attachment order.
    pub fn get(&self, target: &AnnoTarget) -> &[Annotation] {
        self.entries
            .get(target)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Moves the annotations of instance `old` (the op and its ports) onto `new`.
    pub fn rekey_instance(&mut self, old: OpId, new: OpId) {
        let moved: Vec<AnnoTarget> = self
            .entries
            .keys()
            .filter(|target| target.op() == Some(old))
            .copied()
            .collect();
        for target in moved {
            let Some(annotations) = self.entries.shift_remove(&target) else {
                continue;
            };
            let rekeyed = match target {
                AnnoTarget::Op(_) => AnnoTarget::Op(new),
                AnnoTarget::Port { index, .. } => AnnoTarget::Port {
                    owner: PortOwner::Instance(new),
                    index,
                },
                other => other,
            };
            self.entries.entry(rekeyed).or_default().extend(annotations);
        }
    }

    /// Drops every annotation attached to an erased operation.
    pub fn remove_op(&mut self, op: OpId) {
        self.entries.retain(|target, _| target.op() != Some(op));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnnoTarget, &[Annotation])> {
        self.entries.iter().map(|(t, v)| (t, v.as_slice()))
    }

    /// Total number of attached annotations.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<AnnotationEntry>> for AnnotationTable {
    fn from(entries: Vec<AnnotationEntry>) -> Self {
        AnnotationTable {
            entries: entries
                .into_iter()
                .map(|e| (e.target, e.annotations))
                .collect(),
        }
    }
}

impl From<AnnotationTable> for Vec<AnnotationEntry> {
    fn from(table: AnnotationTable) -> Self {
        table
            .entries
            .into_iter()
            .map(|(target, annotations)| AnnotationEntry {
                target,
                annotations,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn class_and_target_accessors() {
        let anno = Annotation::targeted("circt.test", "~Top|Top>w");
        assert_eq!(anno.class(), Some("circt.test"));
        assert_eq!(anno.get_str(TARGET_FIELD), Some("~Top|Top>w"));
        assert_eq!(anno.len(), 2);
    }

    #[test]
    fn from_json_preserves_field_order() {
        let anno = Annotation::from_json(json!({
            "class": "c",
            "target": "~T|T",
            "b": 2,
            "a": 1
        }))
        .unwrap();
        let keys: Vec<&str> = anno.fields().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["class", "target", "b", "a"]);
        assert!(anno.contains(TARGET_FIELD));
    }

    #[test]
    fn nested_payload_order_survives_serde() {
        let text = r#"{"class":"c","payload":{"z":1,"y":{"k":true,"b":false}},"a":0}"#;
        let anno: Annotation = serde_json::from_str(text).unwrap();
        assert_eq!(serde_json::to_string(&anno).unwrap(), text);
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(Annotation::from_json(json!([1, 2])).is_none());
        assert!(Annotation::from_json(json!({"x": 1})).unwrap().class().is_none());
    }

    #[test]
    fn table_appends_in_order() {
        let mut table = AnnotationTable::new();
        let target = AnnoTarget::Op(OpId(3));
        table.append(target, Annotation::with_class("first"));
        table.append(target, Annotation::with_class("second"));
        let classes: Vec<_> = table.get(&target).iter().map(|a| a.class()).collect();
        assert_eq!(classes, vec![Some("first"), Some("second")]);
        assert!(table.get(&AnnoTarget::Circuit).is_empty());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn rekey_moves_op_and_port_entries() {
        let mut table = AnnotationTable::new();
        table.append(AnnoTarget::Op(OpId(1)), Annotation::with_class("op"));
        table.append(
            AnnoTarget::Port {
                owner: PortOwner::Instance(OpId(1)),
                index: 2,
            },
            Annotation::with_class("port"),
        );
        table.append(AnnoTarget::Op(OpId(5)), Annotation::with_class("other"));

        table.rekey_instance(OpId(1), OpId(9));

        assert!(table.get(&AnnoTarget::Op(OpId(1))).is_empty());
        assert_eq!(table.get(&AnnoTarget::Op(OpId(9))).len(), 1);
        assert_eq!(
            table
                .get(&AnnoTarget::Port {
                    owner: PortOwner::Instance(OpId(9)),
                    index: 2
                })
                .len(),
            1
        );
        assert_eq!(table.get(&AnnoTarget::Op(OpId(5))).len(), 1);
    }

    #[test]
    fn serde_roundtrip_table() {
        let mut table = AnnotationTable::new();
        table.append(AnnoTarget::Module(ModuleId(2)), Annotation::with_class("m"));
        let json = serde_json::to_string(&table).unwrap();
        let back: AnnotationTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&AnnoTarget::Module(ModuleId(2))).len(), 1);
    }
}
