//! The hardware type system.
//!
//! Provides the set of types carried by ports and values: ground types
//! (UInt, SInt, Clock, resets), aggregates (bundles and vectors) and
//! reference types used to probe a value across the hierarchy.
//!
//! Aggregates are addressed by *field IDs*, a pre-order numbering of every
//! sub-element: the aggregate itself is field 0, the first sub-element is
//! field 1, and each sub-element reserves `1 + max_field_id(sub)` IDs.

use serde::{Deserialize, Serialize};

/// A hardware type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HwType {
    /// Unsigned integer. `None` width means the width is still to be inferred.
    UInt { width: Option<u32> },
    /// Signed integer.
    SInt { width: Option<u32> },
    Clock,
    Reset,
    AsyncReset,
    /// Ordered, named fields.
    Bundle(Vec<BundleField>),
    /// Fixed-length homogeneous vector.
    Vector { element: Box<HwType>, length: u32 },
    /// Reference (probe) to a value of the base type.
    Ref(Box<HwType>),
}

/// A single field within a bundle type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleField {
    pub name: String,
    /// Flipped fields flow against the bundle's direction.
    pub flip: bool,
    pub ty: HwType,
}

/// Port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn flip(self) -> Direction {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }
}

impl HwType {
    /// Convenience constructor for a sized unsigned integer.
    pub fn uint(width: u32) -> HwType {
        HwType::UInt { width: Some(width) }
    }

    /// Convenience constructor for a sized signed integer.
    pub fn sint(width: u32) -> HwType {
        HwType::SInt { width: Some(width) }
    }

    /// Convenience constructor for a vector type.
    pub fn vector(element: HwType, length: u32) -> HwType {
        HwType::Vector {
            element: Box::new(element),
            length,
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, HwType::Ref(_))
    }

    pub fn is_ground(&self) -> bool {
        !matches!(
            self,
            HwType::Bundle(_) | HwType::Vector { .. } | HwType::Ref(_)
        )
    }

    /// Returns a reference type to this type. Reference types are not nested:
    /// referencing a reference yields the reference itself.
    pub fn reference(&self) -> HwType {
        match self {
            HwType::Ref(_) => self.clone(),
            other => HwType::Ref(Box::new(other.clone())),
        }
    }

    /// Strips one level of reference, if any.
    pub fn base(&self) -> &HwType {
        match self {
            HwType::Ref(base) => base,
            other => other,
        }
    }

    /// Highest field ID used by this type's sub-elements (0 for ground types).
    pub fn max_field_id(&self) -> u32 {
        match self {
            HwType::Bundle(fields) => fields.iter().map(|f| 1 + f.ty.max_field_id()).sum(),
            HwType::Vector { element, length } => length * (1 + element.max_field_id()),
            HwType::Ref(base) => base.max_field_id(),
            _ => 0,
        }
    }

    /// Looks up a bundle field by name, returning its field ID offset relative
    /// to this type and the field's type.
    pub fn field_by_name(&self, name: &str) -> Option<(u32, &HwType)> {
        let HwType::Bundle(fields) = self else {
            return None;
        };
        let mut offset = 1;
        for field in fields {
            if field.name == name {
                return Some((offset, &field.ty));
            }
            offset += 1 + field.ty.max_field_id();
        }
        None
    }

    /// Looks up a vector element, returning its field ID offset relative to
    /// this type and the element type.
    pub fn element_at(&self, index: u32) -> Option<(u32, &HwType)> {
        let HwType::Vector { element, length } = self else {
            return None;
        };
        if index >= *length {
            return None;
        }
        Some((1 + index * (1 + element.max_field_id()), element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(fields: Vec<(&str, HwType)>) -> HwType {
        HwType::Bundle(
            fields
                .into_iter()
                .map(|(name, ty)| BundleField {
                    name: name.to_string(),
                    flip: false,
                    ty,
                })
                .collect(),
        )
    }

    #[test]
    fn ground_types_have_no_field_ids() {
        assert_eq!(HwType::uint(8).max_field_id(), 0);
        assert_eq!(HwType::Clock.max_field_id(), 0);
        assert!(HwType::AsyncReset.is_ground());
    }

    #[test]
    fn bundle_field_ids_are_preorder() {
        // { a: UInt<1>, b: { c: UInt<1>, d: UInt<1> }, e: UInt<1> }
        let inner = bundle(vec![("c", HwType::uint(1)), ("d", HwType::uint(1))]);
        let ty = bundle(vec![
            ("a", HwType::uint(1)),
            ("b", inner),
            ("e", HwType::uint(1)),
        ]);
        assert_eq!(ty.max_field_id(), 5);
        assert_eq!(ty.field_by_name("a").unwrap().0, 1);
        assert_eq!(ty.field_by_name("b").unwrap().0, 2);
        assert_eq!(ty.field_by_name("e").unwrap().0, 5);

        let (b_offset, b_ty) = ty.field_by_name("b").unwrap();
        let (d_offset, _) = b_ty.field_by_name("d").unwrap();
        assert_eq!(b_offset + d_offset, 4);
        assert!(ty.field_by_name("missing").is_none());
    }

    #[test]
    fn vector_element_ids() {
        let ty = HwType::vector(bundle(vec![("x", HwType::uint(2))]), 3);
        assert_eq!(ty.max_field_id(), 6);
        assert_eq!(ty.element_at(0).unwrap().0, 1);
        assert_eq!(ty.element_at(2).unwrap().0, 5);
        assert!(ty.element_at(3).is_none());
        assert!(HwType::uint(4).element_at(0).is_none());
    }

    #[test]
    fn reference_does_not_nest() {
        let r = HwType::uint(4).reference();
        assert!(r.is_ref());
        assert_eq!(r.reference(), r);
        assert_eq!(r.base(), &HwType::uint(4));
    }

    #[test]
    fn direction_flip() {
        assert_eq!(Direction::In.flip(), Direction::Out);
        assert_eq!(Direction::Out.flip(), Direction::In);
    }
}
