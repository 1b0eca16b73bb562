//! Algorithms on top of [`DynamicMesh`](crate::mesh::DynamicMesh).
//!
//! - **Constraints**: per-edge and per-vertex edit restrictions and projection targets
//! - **Remeshing**: constraint-aware split/collapse/flip/smooth passes, whole-surface or along a loop
//! - **Loops**: boundary loop extraction, edge loops and spans
//! - **Components**: connected components over triangle adjacency
//! - **Submeshes**: induced submeshes with base correspondence, extracted in parallel
//! - **Removal**: reversible bulk triangle removal

pub mod components;
pub mod constraints;
pub mod loops;
pub mod remesh;
pub mod removal;
pub mod submesh;
