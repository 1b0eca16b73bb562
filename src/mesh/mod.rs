//! Core mesh data structures.
//!
//! This module provides the dynamic indexed triangle mesh and the local
//! edit operations that keep its adjacency consistent.
//!
//! # Overview
//!
//! The primary type is [`DynamicMesh`], which stores vertex, edge and
//! triangle rows in dense tables addressed by recyclable ids. Adjacency
//! (vertex to edges, edge to triangles, triangle to edges) is updated in
//! place by every edit, so queries stay O(valence).
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`EdgeId`] - Identifies an edge
//! - [`TriangleId`] - Identifies a triangle
//!
//! Freed ids are recycled by later insertions. `INVALID` marks "none", for
//! instance the missing second triangle of a boundary edge.
//!
//! # Construction
//!
//! ```
//! use dynmesh::mesh::{build_from_triangles, DynamicMesh};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2], [0, 2, 3]];
//!
//! let mut mesh: DynamicMesh = build_from_triangles(&vertices, &faces).unwrap();
//! let diagonal = mesh.find_edge(0.into(), 2.into()).unwrap();
//! let split = mesh.split_edge(diagonal).unwrap();
//! assert_eq!(mesh.valence(split.new_vertex), 4);
//! assert_eq!(mesh.triangle_count(), 4);
//! ```

mod builder;
mod dynamic;
mod edit;
mod index;
mod refcount;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::{
    build_from_quads, build_from_triangles, build_from_triangles_with_groups, to_face_vertex,
};
pub use dynamic::{DynamicMesh, Edge, UnsafeInsertScope, VertexInfo};
pub use edit::{EdgeCollapseInfo, EdgeFlipInfo, EdgeSplitInfo};
pub use index::{EdgeId, TriangleId, VertexId, INVALID_INDEX};
pub use refcount::RefCountVector;
