//! Reversible bulk triangle removal.
//!
//! [`TriangleRemoval`] snapshots a set of triangles before they are
//! deleted, together with the vertices that the deletion will free, so the
//! removal can be undone with the original ids. Edge ids are not part of
//! the record: after a revert the restored edges may carry different ids.

use std::collections::{HashMap, HashSet};

use crate::error::{MeshError, Result};
use crate::mesh::{DynamicMesh, TriangleId, VertexId, VertexInfo};

/// A recorded triangle row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTriangle {
    /// Original id.
    pub id: TriangleId,
    /// Vertex triple.
    pub vertices: [VertexId; 3],
    /// Group tag.
    pub group: i32,
}

/// A recorded vertex row.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedVertex {
    /// Original id.
    pub id: VertexId,
    /// Full attribute bundle.
    pub info: VertexInfo,
}

/// Snapshot of a triangle set that can be removed and restored.
#[derive(Debug, Clone, Default)]
pub struct TriangleRemoval {
    triangles: Vec<RemovedTriangle>,
    vertices: Vec<RemovedVertex>,
}

impl TriangleRemoval {
    /// Record `triangles` and every vertex whose incident triangles all
    /// belong to the set. Repeated ids are recorded once.
    pub fn capture(mesh: &DynamicMesh, triangles: &[TriangleId]) -> Result<Self> {
        let mut recorded = Vec::with_capacity(triangles.len());
        let mut seen = vec![false; mesh.max_triangle_id()];
        let mut uses = vec![0u32; mesh.max_vertex_id()];
        let mut order = Vec::new();

        for &t in triangles {
            if !mesh.is_triangle(t) {
                return Err(MeshError::InvalidTriangle(t));
            }
            if std::mem::replace(&mut seen[t.index()], true) {
                continue;
            }
            let vertices = mesh.triangle(t);
            for v in vertices {
                if uses[v.index()] == 0 {
                    order.push(v);
                }
                uses[v.index()] += 1;
            }
            recorded.push(RemovedTriangle {
                id: t,
                vertices,
                group: mesh.triangle_group(t),
            });
        }

        let vertices = order
            .into_iter()
            .filter(|&v| uses[v.index()] == mesh.vertex_ref_count(v))
            .map(|v| RemovedVertex {
                id: v,
                info: mesh.vertex_info(v).clone(),
            })
            .collect();

        Ok(Self {
            triangles: recorded,
            vertices,
        })
    }

    /// Capture and immediately apply.
    pub fn remove(mesh: &mut DynamicMesh, triangles: &[TriangleId]) -> Result<Self> {
        let removal = Self::capture(mesh, triangles)?;
        removal.apply(mesh)?;
        Ok(removal)
    }

    /// Recorded triangles, in capture order.
    pub fn removed_triangles(&self) -> &[RemovedTriangle] {
        &self.triangles
    }

    /// Vertices the removal frees, in capture order.
    pub fn removed_vertices(&self) -> &[RemovedVertex] {
        &self.vertices
    }

    /// Delete the recorded triangles.
    ///
    /// Every recorded triangle must still be live with its recorded
    /// vertices; otherwise nothing is removed and
    /// [`MeshError::RecordedTriangleMismatch`] is returned.
    pub fn apply(&self, mesh: &mut DynamicMesh) -> Result<()> {
        for rt in &self.triangles {
            if !mesh.is_triangle(rt.id) || mesh.triangle(rt.id) != rt.vertices {
                return Err(MeshError::RecordedTriangleMismatch(rt.id));
            }
        }
        for rt in &self.triangles {
            mesh.remove_triangle(rt.id, false)?;
        }
        log::trace!(
            "removed {} triangles and {} vertices",
            self.triangles.len(),
            self.vertices.len()
        );
        Ok(())
    }

    /// Restore the recorded vertices, then triangles, with their original ids.
    ///
    /// Every slot is checked before anything is inserted: a reused vertex id
    /// fails with [`MeshError::RecordedVertexMismatch`], a reused triangle id
    /// or an edge that can no longer take the triangle with
    /// [`MeshError::RecordedTriangleMismatch`]. On error the mesh is unchanged.
    pub fn revert(&self, mesh: &mut DynamicMesh) -> Result<()> {
        self.check_revert(mesh)?;

        let mut scope = mesh.begin_unsafe_insert();
        for rv in &self.vertices {
            scope.insert_vertex(rv.id, rv.info.clone())?;
        }
        for rt in &self.triangles {
            scope.insert_triangle(rt.id, rt.vertices, rt.group)?;
        }
        scope.finish();
        log::trace!(
            "restored {} triangles and {} vertices",
            self.triangles.len(),
            self.vertices.len()
        );
        Ok(())
    }

    fn check_revert(&self, mesh: &DynamicMesh) -> Result<()> {
        let restored: HashSet<VertexId> = self.vertices.iter().map(|rv| rv.id).collect();
        for rv in &self.vertices {
            if mesh.is_vertex(rv.id) {
                return Err(MeshError::RecordedVertexMismatch(rv.id));
            }
        }

        // triangles per undirected edge once the restore is done
        let mut edge_use: HashMap<(VertexId, VertexId), usize> = HashMap::new();
        for rt in &self.triangles {
            if mesh.is_triangle(rt.id) {
                return Err(MeshError::RecordedTriangleMismatch(rt.id));
            }
            for &v in &rt.vertices {
                if !restored.contains(&v) && !mesh.is_vertex(v) {
                    return Err(MeshError::RecordedTriangleMismatch(rt.id));
                }
            }
            for j in 0..3 {
                let (a, b) = (rt.vertices[j], rt.vertices[(j + 1) % 3]);
                let key = (a.min(b), a.max(b));
                let count = edge_use.entry(key).or_insert_with(|| {
                    mesh.find_edge(a, b)
                        .map_or(0, |e| if mesh.is_boundary_edge(e) { 1 } else { 2 })
                });
                *count += 1;
                if *count > 2 {
                    return Err(MeshError::RecordedTriangleMismatch(rt.id));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{create_grid_mesh, quad};
    use nalgebra::{Vector2, Vector3};

    fn snapshot(mesh: &DynamicMesh) -> (Vec<(VertexId, VertexInfo)>, Vec<(TriangleId, [VertexId; 3], i32)>) {
        let vertices = mesh.vertex_ids().map(|v| (v, mesh.vertex_info(v).clone())).collect();
        let triangles = mesh
            .triangle_ids()
            .map(|t| (t, mesh.triangle(t), mesh.triangle_group(t)))
            .collect();
        (vertices, triangles)
    }

    #[test]
    fn test_capture_records_freed_vertices() {
        let mesh = quad();
        let removal = TriangleRemoval::capture(&mesh, &[TriangleId::new(0)]).unwrap();
        assert_eq!(removal.removed_triangles().len(), 1);
        // only vertex 1 is used by triangle 0 alone
        let ids: Vec<VertexId> = removal.removed_vertices().iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![VertexId::new(1)]);

        let all = TriangleRemoval::capture(&mesh, &[TriangleId::new(0), TriangleId::new(1)]).unwrap();
        assert_eq!(all.removed_vertices().len(), 4);
    }

    #[test]
    fn test_remove_then_revert_restores_ids_and_attributes() {
        let mut mesh = create_grid_mesh(4);
        mesh.set_vertex_uv(VertexId::new(6), Some(Vector2::new(0.25, 0.5)));
        mesh.set_vertex_normal(VertexId::new(7), Some(Vector3::new(0.0, 0.0, 1.0)));
        mesh.set_triangle_group(TriangleId::new(10), 4);
        let before = snapshot(&mesh);
        let edges_before = mesh.edge_count();

        let picked: Vec<TriangleId> = [8, 9, 10, 11, 16, 17].map(TriangleId::new).to_vec();
        let removal = TriangleRemoval::remove(&mut mesh, &picked).unwrap();
        assert_eq!(mesh.triangle_count(), 32 - 6);
        for rv in removal.removed_vertices() {
            assert!(!mesh.is_vertex(rv.id));
        }

        removal.revert(&mut mesh).unwrap();
        assert_eq!(snapshot(&mesh), before);
        assert_eq!(mesh.edge_count(), edges_before);
        assert!(!mesh.in_unsafe_insert());
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_reapply_after_revert() {
        let mut mesh = create_grid_mesh(2);
        let removal = TriangleRemoval::remove(&mut mesh, &[TriangleId::new(0)]).unwrap();
        removal.revert(&mut mesh).unwrap();
        removal.apply(&mut mesh).unwrap();
        assert_eq!(mesh.triangle_count(), 7);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_apply_twice_fails_loudly() {
        let mut mesh = create_grid_mesh(2);
        let removal = TriangleRemoval::remove(&mut mesh, &[TriangleId::new(0), TriangleId::new(1)]).unwrap();
        let count = mesh.triangle_count();
        let err = removal.apply(&mut mesh).unwrap_err();
        assert_eq!(err, MeshError::RecordedTriangleMismatch(TriangleId::new(0)));
        assert!(err.is_fatal());
        assert_eq!(mesh.triangle_count(), count);
    }

    #[test]
    fn test_apply_detects_changed_triangle() {
        let mut mesh = quad();
        let removal = TriangleRemoval::capture(&mesh, &[TriangleId::new(1)]).unwrap();
        let diagonal = mesh.find_edge(VertexId::new(0), VertexId::new(2)).unwrap();
        mesh.flip_edge(diagonal).unwrap();
        let err = removal.apply(&mut mesh).unwrap_err();
        assert_eq!(err, MeshError::RecordedTriangleMismatch(TriangleId::new(1)));
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_quad_remove_both_then_revert() {
        let mut mesh = quad();
        let before = snapshot(&mesh);
        let removal = TriangleRemoval::remove(&mut mesh, &[TriangleId::new(0), TriangleId::new(1)]).unwrap();
        assert_eq!(mesh.vertex_count(), 0);
        assert_eq!(mesh.triangle_count(), 0);
        assert_eq!(mesh.edge_count(), 0);

        removal.revert(&mut mesh).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.edge_count(), 5);
        assert_eq!(snapshot(&mesh), before);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_revert_after_vertex_reuse_leaves_mesh_untouched() {
        let mut mesh = create_grid_mesh(2);
        let picked: Vec<TriangleId> = (0..4).map(TriangleId::new).collect();
        let removal = TriangleRemoval::remove(&mut mesh, &picked).unwrap();
        let recorded: Vec<VertexId> = removal.removed_vertices().iter().map(|rv| rv.id).collect();
        assert_eq!(recorded, vec![VertexId::new(0), VertexId::new(1), VertexId::new(2)]);

        // a freed slot is handed out again
        let reused = mesh.append_vertex(VertexInfo::default());
        assert!(recorded.contains(&reused));
        let vertices = mesh.vertex_count();
        let triangles = mesh.triangle_count();

        let err = removal.revert(&mut mesh).unwrap_err();
        assert_eq!(err, MeshError::RecordedVertexMismatch(reused));
        assert!(err.is_fatal());
        assert_eq!(mesh.vertex_count(), vertices);
        assert_eq!(mesh.triangle_count(), triangles);
        for &v in recorded.iter().filter(|&&v| v != reused) {
            assert!(!mesh.is_vertex(v));
        }
        assert!(!mesh.in_unsafe_insert());
    }

    #[test]
    fn test_revert_after_triangle_reuse_fails() {
        let mut mesh = create_grid_mesh(2);
        let removal = TriangleRemoval::remove(&mut mesh, &[TriangleId::new(3)]).unwrap();
        assert!(removal.removed_vertices().is_empty());
        let t = mesh
            .append_triangle([VertexId::new(5), VertexId::new(4), VertexId::new(1)])
            .unwrap();
        assert_eq!(t, TriangleId::new(3));
        let count = mesh.triangle_count();
        let err = removal.revert(&mut mesh).unwrap_err();
        assert_eq!(err, MeshError::RecordedTriangleMismatch(TriangleId::new(3)));
        assert_eq!(mesh.triangle_count(), count);
    }

    #[test]
    fn test_capture_dead_triangle() {
        let mesh = quad();
        assert!(TriangleRemoval::capture(&mesh, &[TriangleId::new(9)]).is_err());
    }
}
