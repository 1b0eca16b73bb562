//! Mesh construction utilities.
//!
//! This module provides functions for building dynamic meshes from
//! face-vertex lists, as commonly found in mesh file formats, and for
//! exporting them back.

use nalgebra::Point3;

use super::dynamic::{DynamicMesh, VertexInfo};
use super::index::VertexId;
use crate::error::{MeshError, Result};

/// Build a dynamic mesh from vertices and triangle faces.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of triangle faces, each as [v0, v1, v2] indices
///
/// # Returns
/// A mesh whose vertex and triangle ids equal the input indices, or an error
/// if the input is invalid or non-manifold.
///
/// # Example
/// ```
/// use dynmesh::mesh::build_from_triangles;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.vertex_count(), 3);
/// assert_eq!(mesh.triangle_count(), 1);
/// ```
pub fn build_from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<DynamicMesh> {
    build_from_triangles_with_groups(vertices, faces, &[])
}

/// Build a dynamic mesh with per-face group tags.
///
/// `groups` may be empty (every triangle gets group 0); otherwise it must
/// have one entry per face.
pub fn build_from_triangles_with_groups(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    groups: &[i32],
) -> Result<DynamicMesh> {
    if faces.is_empty() {
        return Err(MeshError::EmptyMesh);
    }
    if !groups.is_empty() && groups.len() != faces.len() {
        return Err(MeshError::invalid_param(
            "groups",
            groups.len(),
            "must be empty or match the face count",
        ));
    }

    // Validate vertex indices
    for (fi, face) in faces.iter().enumerate() {
        for &vi in face {
            if vi >= vertices.len() {
                return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
            }
        }
    }

    let mut mesh = DynamicMesh::with_capacity(vertices.len(), faces.len());
    for &pos in vertices {
        mesh.append_vertex(VertexInfo::new(pos));
    }
    for (fi, face) in faces.iter().enumerate() {
        let tri = face.map(VertexId::new);
        let group = groups.get(fi).copied().unwrap_or(0);
        mesh.append_triangle_with_group(tri, group)?;
    }

    // Unreferenced input vertices stay live with a zero reference count.
    Ok(mesh)
}

/// Build a dynamic mesh from quads, splitting each along its `v0-v2` diagonal.
pub fn build_from_quads(vertices: &[Point3<f64>], faces: &[[usize; 4]]) -> Result<DynamicMesh> {
    let triangles: Vec<[usize; 3]> = faces
        .iter()
        .flat_map(|q| [[q[0], q[1], q[2]], [q[0], q[2], q[3]]])
        .collect();
    build_from_triangles(vertices, &triangles)
}

/// Convert a dynamic mesh back to a compact face-vertex representation.
///
/// Live ids are renumbered densely in increasing order. Returns
/// (vertices, faces) tuple.
pub fn to_face_vertex(mesh: &DynamicMesh) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut remap = vec![usize::MAX; mesh.max_vertex_id()];
    let mut vertices = Vec::with_capacity(mesh.vertex_count());
    for v in mesh.vertex_ids() {
        remap[v.index()] = vertices.len();
        vertices.push(*mesh.position(v));
    }

    let faces = mesh
        .triangle_ids()
        .map(|t| mesh.triangle(t).map(|v| remap[v.index()]))
        .collect();

    (vertices, faces)
}
