//! Isotropic remeshing of a whole surface.
//!
//! Runs the [`Remesher`] with the default whole-surface strategy. With
//! `preserve_boundary` set (the default) boundary edges and vertices are
//! pinned; otherwise they take part in splits and collapses like any other
//! edge.

use crate::algo::constraints::MeshConstraints;
use crate::error::{MeshError, Result};
use crate::mesh::DynamicMesh;

use super::{RemeshOptions, RemeshStats, Remesher};

/// Perform isotropic remeshing in place.
///
/// # Arguments
/// * `mesh` - The mesh to remesh
/// * `options` - Remeshing options
///
/// # Returns
/// Counters for the edits made.
///
/// # Example
/// ```
/// use dynmesh::algo::remesh::{isotropic_remesh, average_edge_length, RemeshOptions};
/// use dynmesh::mesh::build_from_triangles;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(2.0, 0.0, 0.0),
///     Point3::new(1.0, 2.0, 0.0),
/// ];
/// let mut mesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
/// let options = RemeshOptions::with_target_length(0.5).with_preserve_boundary(false);
/// isotropic_remesh(&mut mesh, &options).unwrap();
/// assert!(average_edge_length(&mesh) < 1.0);
/// ```
pub fn isotropic_remesh(mesh: &mut DynamicMesh, options: &RemeshOptions) -> Result<RemeshStats> {
    isotropic_remesh_constrained(mesh, options, MeshConstraints::new())
}

/// Perform isotropic remeshing with caller-supplied constraints.
pub fn isotropic_remesh_constrained(
    mesh: &mut DynamicMesh,
    options: &RemeshOptions,
    constraints: MeshConstraints,
) -> Result<RemeshStats> {
    if mesh.triangle_count() == 0 {
        return Err(MeshError::EmptyMesh);
    }
    let stats = Remesher::new(mesh, options.clone())
        .with_constraints(constraints)
        .run()?;
    log::debug!(
        "isotropic remesh: {} passes, {} vertices, {} triangles",
        stats.passes,
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(stats)
}

/// Compute the average edge length of a mesh (0 for a mesh without edges).
pub fn average_edge_length(mesh: &DynamicMesh) -> f64 {
    let count = mesh.edge_count();
    if count == 0 {
        return 0.0;
    }
    let total: f64 = mesh.edge_ids().map(|e| mesh.edge_length(e)).sum();
    total / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{create_grid_mesh, uv_sphere};

    #[test]
    fn test_isotropic_remesh_preserves_topology() {
        let mut mesh = uv_sphere(8, 16);
        let options = RemeshOptions::with_target_length(0.4).with_passes(3);
        isotropic_remesh(&mut mesh, &options).unwrap();

        let euler = mesh.vertex_count() as i64 - mesh.edge_count() as i64 + mesh.triangle_count() as i64;
        assert_eq!(euler, 2);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_isotropic_remesh_changes_edge_lengths() {
        let mut mesh = create_grid_mesh(4);
        let before = average_edge_length(&mesh);
        let options = RemeshOptions::with_target_length(0.4)
            .with_passes(4)
            .with_preserve_boundary(false);
        isotropic_remesh(&mut mesh, &options).unwrap();
        let after = average_edge_length(&mesh);
        assert!(after < before, "average edge length {} not below {}", after, before);
    }

    #[test]
    fn test_zero_iterations_no_change() {
        let mut mesh = create_grid_mesh(2);
        let vertices = mesh.vertex_count();
        let triangles = mesh.triangle_count();
        let options = RemeshOptions::with_target_length(0.1).with_passes(0);
        let stats = isotropic_remesh(&mut mesh, &options).unwrap();
        assert_eq!(stats.passes, 0);
        assert_eq!(mesh.vertex_count(), vertices);
        assert_eq!(mesh.triangle_count(), triangles);
    }

    #[test]
    fn test_sequential_matches_parallel_counts() {
        let options = RemeshOptions::with_target_length(0.5).with_passes(2);
        let mut a = create_grid_mesh(3);
        let mut b = create_grid_mesh(3);
        let sa = isotropic_remesh(&mut a, &options).unwrap();
        let sb = isotropic_remesh(&mut b, &options.clone().sequential()).unwrap();
        assert_eq!(sa, sb);
        for v in a.vertex_ids() {
            assert!((a.position(v) - b.position(v)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let mut mesh = DynamicMesh::new();
        let err = isotropic_remesh(&mut mesh, &RemeshOptions::default()).unwrap_err();
        assert_eq!(err, MeshError::EmptyMesh);
    }

    #[test]
    fn test_average_edge_length_grid() {
        let mesh = create_grid_mesh(1);
        let expected = (4.0 + 2f64.sqrt()) / 5.0;
        assert!((average_edge_length(&mesh) - expected).abs() < 1e-12);
        assert_eq!(average_edge_length(&DynamicMesh::new()), 0.0);
    }
}
