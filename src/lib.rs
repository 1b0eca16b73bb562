//! # dynmesh
//!
//! An editable triangle mesh with recyclable element ids, and
//! constraint-aware local remeshing on top of it.
//!
//! [`DynamicMesh`](mesh::DynamicMesh) keeps vertices, edges and triangles
//! in reference-counted tables. Triangles can be appended, inserted at a
//! chosen id, or removed, and edges can be split, flipped and collapsed in
//! place; every edit keeps the adjacency consistent or leaves the mesh
//! untouched.
//!
//! ## Features
//!
//! - **Stable ids**: freed ids are recycled; removals can be reverted with the original ids
//! - **Local edits**: split, flip and collapse with topological safety checks
//! - **Constraints**: pin vertices, forbid edits on edges, slide vertices along projection targets
//! - **Remeshing**: whole-surface or edge-loop-restricted, with pluggable strategies and observers
//! - **Queries**: boundary loops, connected components, parallel submesh extraction
//!
//! ## Quick Start
//!
//! ```
//! use dynmesh::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//!
//! let faces = vec![
//!     [0, 2, 1],  // bottom
//!     [0, 1, 3],  // front
//!     [1, 2, 3],  // right
//!     [2, 0, 3],  // left
//! ];
//!
//! let mut mesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert_eq!(mesh.vertex_count(), 4);
//! assert_eq!(mesh.edge_count(), 6);
//!
//! let options = RemeshOptions::with_target_length(0.3).with_passes(3);
//! isotropic_remesh(&mut mesh, &options).unwrap();
//! assert!(mesh.is_valid());
//! ```
//!
//! ## Boundaries and Components
//!
//! ```
//! use dynmesh::prelude::*;
//! use nalgebra::Point3;
//!
//! # let vertices = vec![
//! #     Point3::new(0.0, 0.0, 0.0),
//! #     Point3::new(1.0, 0.0, 0.0),
//! #     Point3::new(1.0, 1.0, 0.0),
//! #     Point3::new(0.0, 1.0, 0.0),
//! # ];
//! let mesh = build_from_triangles(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap();
//!
//! let loops = boundary_loops(&mesh).unwrap();
//! assert_eq!(loops.len(), 1);
//! assert_eq!(loops[0].vertex_count(), 4);
//!
//! let components = ConnectedComponents::find(&mesh);
//! assert_eq!(components.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use dynmesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::components::ConnectedComponents;
    pub use crate::algo::constraints::{
        EdgeConstraint, MeshConstraints, ProjectionTarget, TargetRef, VertexConstraint,
    };
    pub use crate::algo::loops::{boundary_loops, EdgeLoop, EdgeSpan};
    pub use crate::algo::remesh::{
        isotropic_remesh, remesh_loop, RemeshOptions, RemeshStats, Remesher, TopologyObserver,
    };
    pub use crate::algo::removal::TriangleRemoval;
    pub use crate::algo::submesh::{build_submeshes, Submesh};
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_triangles, to_face_vertex, DynamicMesh, EdgeId, TriangleId, VertexId, VertexInfo,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
