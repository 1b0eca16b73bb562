//! Induced submeshes with base-mesh correspondence.
//!
//! A [`Submesh`] copies a subset of a base mesh's triangles (with their
//! vertex attributes and groups) into a fresh [`DynamicMesh`] and keeps
//! bidirectional vertex and edge id maps back to the base. Its boundary
//! edges are split into two classes:
//!
//! - **true boundary**: already a boundary edge of the base mesh
//! - **cut boundary**: interior in the base, exposed by the selection
//!
//! [`build_submeshes`] extracts one submesh per key in parallel. Each task
//! only reads the base mesh; the shared result map is locked just for the
//! final insert.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::{MeshError, Result};
use crate::mesh::{DynamicMesh, EdgeId, TriangleId, VertexId};

/// A submesh and its correspondence to the base mesh it was cut from.
#[derive(Debug, Clone)]
pub struct Submesh {
    mesh: DynamicMesh,
    sub_to_base_v: Vec<VertexId>,
    base_to_sub_v: HashMap<VertexId, VertexId>,
    sub_to_base_e: Vec<EdgeId>,
    base_to_sub_e: HashMap<EdgeId, EdgeId>,
    base_triangles: Vec<TriangleId>,
    true_boundary: Vec<EdgeId>,
    cut_boundary: Vec<EdgeId>,
}

impl Submesh {
    /// Extract the submesh induced by `triangles`.
    ///
    /// Repeated triangle ids are ignored. Fails if a triangle is not live.
    pub fn new(base: &DynamicMesh, triangles: &[TriangleId]) -> Result<Self> {
        let mut mesh = DynamicMesh::new();
        let mut sub_to_base_v = Vec::new();
        let mut base_to_sub_v: HashMap<VertexId, VertexId> = HashMap::new();
        let mut base_triangles = Vec::with_capacity(triangles.len());
        let mut seen = vec![false; base.max_triangle_id()];

        for &t in triangles {
            if !base.is_triangle(t) {
                return Err(MeshError::InvalidTriangle(t));
            }
            if std::mem::replace(&mut seen[t.index()], true) {
                continue;
            }
            let tri = base.triangle(t).map(|bv| {
                *base_to_sub_v.entry(bv).or_insert_with(|| {
                    sub_to_base_v.push(bv);
                    mesh.append_vertex(base.vertex_info(bv).clone())
                })
            });
            let st = mesh.append_triangle_with_group(tri, base.triangle_group(t))?;
            debug_assert_eq!(st.index(), base_triangles.len());
            base_triangles.push(t);
        }

        let mut sub_to_base_e = vec![EdgeId::INVALID; mesh.max_edge_id()];
        let mut base_to_sub_e = HashMap::with_capacity(mesh.edge_count());
        let mut true_boundary = Vec::new();
        let mut cut_boundary = Vec::new();

        for e in mesh.edge_ids() {
            let [a, b] = mesh.edge_vertices(e).map(|v| sub_to_base_v[v.index()]);
            let be = base.find_edge(a, b).ok_or(MeshError::MissingEdge { v0: a, v1: b })?;
            sub_to_base_e[e.index()] = be;
            base_to_sub_e.insert(be, e);
            if mesh.is_boundary_edge(e) {
                if base.is_boundary_edge(be) {
                    true_boundary.push(be);
                } else {
                    cut_boundary.push(be);
                }
            }
        }

        Ok(Self {
            mesh,
            sub_to_base_v,
            base_to_sub_v,
            sub_to_base_e,
            base_to_sub_e,
            base_triangles,
            true_boundary,
            cut_boundary,
        })
    }

    /// The extracted mesh.
    pub fn mesh(&self) -> &DynamicMesh {
        &self.mesh
    }

    /// Mutable access to the extracted mesh.
    ///
    /// Editing it invalidates the correspondence for the touched elements.
    pub fn mesh_mut(&mut self) -> &mut DynamicMesh {
        &mut self.mesh
    }

    /// Take the extracted mesh, dropping the correspondence.
    pub fn into_mesh(self) -> DynamicMesh {
        self.mesh
    }

    /// Base vertex for a submesh vertex.
    pub fn base_vertex(&self, v: VertexId) -> Option<VertexId> {
        self.sub_to_base_v.get(v.index()).copied()
    }

    /// Submesh vertex for a base vertex.
    pub fn sub_vertex(&self, v: VertexId) -> Option<VertexId> {
        self.base_to_sub_v.get(&v).copied()
    }

    /// Base edge for a submesh edge.
    pub fn base_edge(&self, e: EdgeId) -> Option<EdgeId> {
        self.sub_to_base_e.get(e.index()).copied().filter(|e| e.is_valid())
    }

    /// Submesh edge for a base edge.
    pub fn sub_edge(&self, e: EdgeId) -> Option<EdgeId> {
        self.base_to_sub_e.get(&e).copied()
    }

    /// Base triangle for a submesh triangle.
    pub fn base_triangle(&self, t: TriangleId) -> Option<TriangleId> {
        self.base_triangles.get(t.index()).copied()
    }

    /// Submesh boundary edges that are boundary in the base too (base ids).
    pub fn true_boundary_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.true_boundary.iter().copied()
    }

    /// Submesh boundary edges introduced by the selection (base ids).
    pub fn cut_boundary_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.cut_boundary.iter().copied()
    }

    /// True if the submesh edge lies on the cut.
    pub fn is_cut_edge(&self, e: EdgeId) -> bool {
        self.base_edge(e)
            .map_or(false, |be| self.cut_boundary.contains(&be))
    }
}

/// Extract one submesh per key, in parallel.
///
/// `select` maps a key to its triangle subset. The first failing key aborts
/// the whole build.
pub fn build_submeshes<K, F>(base: &DynamicMesh, keys: &[K], select: F) -> Result<HashMap<K, Submesh>>
where
    K: Eq + Hash + Clone + Send + Sync,
    F: Fn(&K) -> Vec<TriangleId> + Sync,
{
    let results = Mutex::new(HashMap::with_capacity(keys.len()));

    keys.par_iter().try_for_each(|key| {
        let triangles = select(key);
        let submesh = Submesh::new(base, &triangles)?;
        results.lock().insert(key.clone(), submesh);
        Ok::<(), MeshError>(())
    })?;

    let results = results.into_inner();
    log::debug!("built {} submeshes", results.len());
    Ok(results)
}
