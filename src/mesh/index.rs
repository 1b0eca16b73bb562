//! Index types for mesh elements.
//!
//! Vertices, edges and triangles are addressed by recyclable integer ids.
//! Each id is a type-safe wrapper around a `u32`, with `u32::MAX` reserved as
//! the "none" sentinel (returned instead of a null reference, e.g. for the
//! missing second triangle of a boundary edge).

use std::fmt::{self, Debug};

/// Raw sentinel value shared by all id types.
pub const INVALID_INDEX: u32 = u32::MAX;

/// A type-safe vertex index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VertexId(u32);

/// A type-safe edge index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct EdgeId(u32);

/// A type-safe triangle index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct TriangleId(u32);

macro_rules! impl_index_type {
    ($name:ident, $display:literal) => {
        impl $name {
            /// The "none" sentinel.
            pub const INVALID: Self = Self(INVALID_INDEX);

            /// Create a new index from a raw value.
            #[inline]
            pub fn new(index: usize) -> Self {
                debug_assert!(index < INVALID_INDEX as usize, "index {} too large", index);
                Self(index as u32)
            }

            /// Create an invalid/null index.
            #[inline]
            pub fn invalid() -> Self {
                Self::INVALID
            }

            /// Get the raw index value.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Get the raw value of the underlying type.
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }

            /// Check if this is a valid (non-null) index.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0 != INVALID_INDEX
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $display, self.index())
                } else {
                    write!(f, "{}(INVALID)", $display)
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Debug::fmt(self, f)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

impl_index_type!(VertexId, "V");
impl_index_type!(EdgeId, "E");
impl_index_type!(TriangleId, "T");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_id() {
        let v = VertexId::new(42);
        assert_eq!(v.index(), 42);
        assert!(v.is_valid());

        let invalid = VertexId::invalid();
        assert!(!invalid.is_valid());
        assert_eq!(VertexId::default(), VertexId::INVALID);
    }

    #[test]
    fn test_type_safety() {
        let v = VertexId::new(0);
        let e = EdgeId::new(0);
        let t = TriangleId::new(0);

        assert_eq!(v.index(), e.index());
        assert_eq!(e.index(), t.index());
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", VertexId::new(42)), "V(42)");
        assert_eq!(format!("{:?}", EdgeId::invalid()), "E(INVALID)");
        assert_eq!(format!("{}", TriangleId::new(7)), "T(7)");
    }
}
