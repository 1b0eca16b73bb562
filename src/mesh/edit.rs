//! Local topology edits: edge split, flip and collapse.
//!
//! Naming used throughout: the edge `(a, b)` is oriented as in its first
//! triangle `t0 = (a, b, c)`; the second triangle, if any, is
//! `t1 = (b, a, d)`.
//!
//! ```text
//!        c                    c
//!       / \                 / | \
//!      / t0\               /t0|t2\
//!     a-----b     split   a---f---b
//!      \ t1/     ----->    \t1|t3/
//!       \ /                 \ | /
//!        d                    d
//! ```
//!
//! All three edits either succeed completely or return an error without
//! touching the mesh. Constraint checks are the caller's job.

use super::dynamic::{DynamicMesh, VertexInfo};
use super::index::{EdgeId, TriangleId, VertexId};
use crate::error::{MeshError, Result};

/// Result of [`DynamicMesh::split_edge`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSplitInfo {
    /// The edge that was split. It now joins `vertices[0]` and the new vertex.
    pub edge: EdgeId,
    /// Original oriented endpoints `[a, b]`.
    pub vertices: [VertexId; 2],
    /// Opposite vertices `[c, d]` (`d` invalid on boundary edges).
    pub opposite: [VertexId; 2],
    /// The inserted vertex `f`.
    pub new_vertex: VertexId,
    /// The new edge `(f, b)`.
    pub new_edge: EdgeId,
    /// The new edges `(f, c)` and `(f, d)` (second invalid on boundary edges).
    pub new_cross_edges: [EdgeId; 2],
    /// The new triangles `t2` and `t3` (second invalid on boundary edges).
    pub new_triangles: [TriangleId; 2],
    /// Interpolation parameter from `a` towards `b`.
    pub split_t: f64,
}

/// Result of [`DynamicMesh::flip_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFlipInfo {
    /// The flipped edge; it now joins the former opposite vertices.
    pub edge: EdgeId,
    /// Former endpoints `[a, b]`.
    pub original_vertices: [VertexId; 2],
    /// New endpoints `[c, d]`.
    pub opposite_vertices: [VertexId; 2],
    /// The two triangles, rewritten in place.
    pub triangles: [TriangleId; 2],
}

/// Result of [`DynamicMesh::collapse_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeCollapseInfo {
    /// The surviving endpoint.
    pub kept_vertex: VertexId,
    /// The endpoint merged away (now free).
    pub removed_vertex: VertexId,
    /// The collapsed edge (now free).
    pub collapsed_edge: EdgeId,
    /// Edges `(b, c)` and `(b, d)` merged into their `a` counterparts (now free).
    pub removed_edges: [EdgeId; 2],
    /// Edges `(a, c)` and `(a, d)` that absorbed them.
    pub kept_edges: [EdgeId; 2],
    /// The triangles that became degenerate (now free).
    pub removed_triangles: [TriangleId; 2],
    /// Opposite vertices `[c, d]`.
    pub opposite: [VertexId; 2],
}

/// Corner-rotated view of a triangle: `verts[0] -> verts[1]` is the edge `edges[0]`.
struct Rotated {
    verts: [VertexId; 3],
    edges: [EdgeId; 3],
}

impl DynamicMesh {
    fn rotated(&self, t: TriangleId, first: VertexId) -> Option<Rotated> {
        let j = self.triangle_corner(t, first)?;
        let tri = self.triangle(t);
        let te = self.triangle_edges(t);
        Some(Rotated {
            verts: [tri[j], tri[(j + 1) % 3], tri[(j + 2) % 3]],
            edges: [te[j], te[(j + 1) % 3], te[(j + 2) % 3]],
        })
    }

    fn broken(&self, e: EdgeId) -> MeshError {
        MeshError::InvalidState(format!("edge {e} is inconsistent with its triangles"))
    }

    /// Split an edge at its midpoint.
    pub fn split_edge(&mut self, e: EdgeId) -> Result<EdgeSplitInfo> {
        self.split_edge_at(e, 0.5)
    }

    /// Split an edge at parameter `t` from its oriented start `a` towards `b`.
    ///
    /// The two incident triangles become four; new triangles inherit the
    /// group of the triangle they were cut from, and the new vertex
    /// interpolates the endpoint attributes.
    pub fn split_edge_at(&mut self, e: EdgeId, t: f64) -> Result<EdgeSplitInfo> {
        if !self.is_edge(e) {
            return Err(MeshError::InvalidEdge(e));
        }
        if !(0.0..=1.0).contains(&t) {
            return Err(MeshError::invalid_param("t", t, "must be in [0, 1]"));
        }
        let [a, b] = self.oriented_edge_vertices(e);
        let [t0, t1] = self.edge_triangles(e);
        let r0 = self.rotated(t0, a).ok_or_else(|| self.broken(e))?;
        let c = r0.verts[2];
        let (bc, ca) = (r0.edges[1], r0.edges[2]);

        let r1 = if t1.is_valid() {
            let r1 = self.rotated(t1, b).ok_or_else(|| self.broken(e))?;
            if r1.verts[1] != a {
                return Err(self.broken(e));
            }
            Some(r1)
        } else {
            None
        };

        let info = VertexInfo::lerp(self.vertex_info(a), self.vertex_info(b), t);
        let f = self.append_vertex(info);

        // t0 = (a, f, c), t2 = (f, b, c)
        let g0 = self.triangle_group(t0);
        let t2 = self.new_triangle_raw([f, b, c], [EdgeId::INVALID; 3], g0);
        self.replace_edge_vertex(e, b, f);
        let fb = self.add_edge(f, b, t2, TriangleId::INVALID);
        let fc = self.add_edge(f, c, t0, t2);
        self.replace_edge_triangle(bc, t0, t2);
        self.set_triangle_raw(t0, [a, f, c], [e, fc, ca]);
        self.set_triangle_raw(t2, [f, b, c], [fb, bc, fc]);
        self.add_vertex_ref(f);
        self.add_vertex_ref(f);
        self.add_vertex_ref(c);

        let (d, fd, t3) = match r1 {
            Some(r1) => {
                // t1 = (f, a, d), t3 = (b, f, d)
                let d = r1.verts[2];
                let (ad, db) = (r1.edges[1], r1.edges[2]);
                let g1 = self.triangle_group(t1);
                let t3 = self.new_triangle_raw([b, f, d], [EdgeId::INVALID; 3], g1);
                self.edges[fb.index()].triangles[1] = t3;
                let fd = self.add_edge(f, d, t1, t3);
                self.replace_edge_triangle(db, t1, t3);
                self.set_triangle_raw(t1, [f, a, d], [e, ad, fd]);
                self.set_triangle_raw(t3, [b, f, d], [fb, fd, db]);
                self.add_vertex_ref(f);
                self.add_vertex_ref(f);
                self.add_vertex_ref(d);
                (d, fd, t3)
            }
            None => (VertexId::INVALID, EdgeId::INVALID, TriangleId::INVALID),
        };

        self.bump_timestamp();
        Ok(EdgeSplitInfo {
            edge: e,
            vertices: [a, b],
            opposite: [c, d],
            new_vertex: f,
            new_edge: fb,
            new_cross_edges: [fc, fd],
            new_triangles: [t2, t3],
            split_t: t,
        })
    }

    /// Flip an interior edge to the other diagonal of its quad.
    ///
    /// Refused on boundary edges and when the new diagonal already exists.
    pub fn flip_edge(&mut self, e: EdgeId) -> Result<EdgeFlipInfo> {
        if !self.is_edge(e) {
            return Err(MeshError::InvalidEdge(e));
        }
        if self.is_boundary_edge(e) {
            return Err(MeshError::BoundaryEdge(e));
        }
        let [a, b] = self.oriented_edge_vertices(e);
        let [t0, t1] = self.edge_triangles(e);
        let r0 = self.rotated(t0, a).ok_or_else(|| self.broken(e))?;
        let r1 = self.rotated(t1, b).ok_or_else(|| self.broken(e))?;
        if r1.verts[1] != a {
            return Err(self.broken(e));
        }
        let (c, d) = (r0.verts[2], r1.verts[2]);
        if c == d || self.find_edge(c, d).is_some() {
            return Err(MeshError::FlipEdgeExists { edge: e, v0: c, v1: d });
        }
        let (bc, ca) = (r0.edges[1], r0.edges[2]);
        let (ad, db) = (r1.edges[1], r1.edges[2]);

        // t0 = (c, d, b), t1 = (d, c, a)
        self.set_triangle_raw(t0, [c, d, b], [e, db, bc]);
        self.set_triangle_raw(t1, [d, c, a], [e, ca, ad]);
        self.replace_edge_triangle(db, t1, t0);
        self.replace_edge_triangle(ca, t0, t1);
        self.replace_edge_vertex(e, a, c);
        self.replace_edge_vertex(e, b, d);

        self.add_vertex_ref(c);
        self.add_vertex_ref(d);
        self.release_vertex_ref(a);
        self.release_vertex_ref(b);

        self.bump_timestamp();
        Ok(EdgeFlipInfo {
            edge: e,
            original_vertices: [a, b],
            opposite_vertices: [c, d],
            triangles: [t0, t1],
        })
    }

    /// Collapse an edge, merging the other endpoint into `keep`.
    ///
    /// `keep` retains its position and attributes. The collapse is refused
    /// if it fails the link condition, would join two boundary vertices
    /// through the interior, would duplicate a triangle, or would leave a
    /// vertex without triangles.
    pub fn collapse_edge(&mut self, e: EdgeId, keep: VertexId) -> Result<EdgeCollapseInfo> {
        if !self.is_edge(e) {
            return Err(MeshError::InvalidEdge(e));
        }
        if !self.edge(e).has_vertex(keep) {
            return Err(MeshError::invalid_param("keep", keep, "is not an endpoint of the edge"));
        }
        let a = keep;
        let b = self.edge(e).other_vertex(a);
        let [t0, t1] = self.edge_triangles(e);
        let is_boundary = !t1.is_valid();

        // rotate each triangle so it starts at the removed vertex
        let r0 = self.rotated(t0, b).ok_or_else(|| self.broken(e))?;
        let r1 = if is_boundary {
            None
        } else {
            Some(self.rotated(t1, b).ok_or_else(|| self.broken(e))?)
        };
        let refuse = |reason| MeshError::CollapseNonManifold { edge: e, reason };

        // the wing edges (b, x) and (a, x) for the opposite vertex x of a triangle
        let wings = |r: &Rotated| -> (VertexId, EdgeId, EdgeId) {
            if r.verts[1] == a {
                // (b, a, x)
                (r.verts[2], r.edges[2], r.edges[1])
            } else {
                // (b, x, a)
                (r.verts[1], r.edges[0], r.edges[1])
            }
        };
        let (c, bc, ac) = wings(&r0);
        let (d, bd, ad) = match &r1 {
            Some(r) => wings(r),
            None => (VertexId::INVALID, EdgeId::INVALID, EdgeId::INVALID),
        };

        // link condition
        let a_ring: Vec<VertexId> = self.vertex_neighbors(a).collect();
        for x in self.vertex_neighbors(b) {
            if x != a && a_ring.contains(&x) && x != c && x != d {
                return Err(refuse("link condition"));
            }
        }
        if !is_boundary && self.is_boundary_vertex(a) && self.is_boundary_vertex(b) {
            return Err(refuse("interior edge joins two boundary vertices"));
        }

        for (x, bx, ax) in [(c, bc, ac), (d, bd, ad)] {
            if !x.is_valid() {
                continue;
            }
            if self.vertex_ref_count(x) <= 1 {
                return Err(MeshError::CollapseWouldIsolate { edge: e, vertex: x });
            }
            if self.is_boundary_edge(bx) && self.is_boundary_edge(ax) {
                return Err(refuse("would pinch a triangle tip"));
            }
        }
        let removed = if is_boundary { 1 } else { 2 };
        if self.vertex_ref_count(a) + self.vertex_ref_count(b) <= 2 * removed {
            return Err(MeshError::CollapseWouldIsolate { edge: e, vertex: a });
        }

        let b_triangles: Vec<TriangleId> = self
            .vertex_triangles(b)
            .into_iter()
            .filter(|&t| t != t0 && t != t1)
            .collect();
        for &t in &b_triangles {
            let tri = self.triangle(t);
            let mut others = tri.iter().copied().filter(|&v| v != b);
            let (Some(x), Some(y)) = (others.next(), others.next()) else {
                return Err(self.broken(e));
            };
            if x == a || y == a {
                return Err(refuse("link condition"));
            }
            if let Some(xy) = self.find_edge(x, y) {
                let dup = self
                    .edge_triangles(xy)
                    .iter()
                    .any(|&s| s.is_valid() && self.triangle_corner(s, a).is_some());
                if dup {
                    return Err(refuse("would duplicate a triangle"));
                }
            }
        }

        // --- commit ---

        // merge (b, x) into (a, x) across each removed triangle
        for (t, bx, ax) in [(t0, bc, ac), (t1, bd, ad)] {
            if !t.is_valid() {
                continue;
            }
            let across = self.edge(bx).other_triangle(t);
            self.replace_edge_triangle(ax, t, across);
            let edge = &mut self.edges[ax.index()];
            if !edge.triangles[0].is_valid() {
                edge.triangles.swap(0, 1);
            }
            if across.is_valid() {
                let slots = &mut self.triangle_edges[across.index()];
                for slot in slots.iter_mut() {
                    if *slot == bx {
                        *slot = ax;
                    }
                }
            }
            self.free_edge(bx);
        }

        self.free_edge(e);
        let remaining: Vec<EdgeId> = self.vertex_edges(b).to_vec();
        for be in remaining {
            self.replace_edge_vertex(be, b, a);
        }

        for &t in &b_triangles {
            if let Some(j) = self.triangle_corner(t, b) {
                self.triangles[t.index()][j] = a;
                self.add_vertex_ref(a);
            }
        }

        for t in [t0, t1] {
            if !t.is_valid() {
                continue;
            }
            let tri = self.triangle(t);
            self.free_triangle_raw(t);
            for v in tri {
                if v != b {
                    self.release_vertex_ref(v);
                }
            }
        }

        let count = self.vertex_refs.ref_count(b.index());
        self.vertex_refs.decrement(b.index(), count);
        self.vertex_edges[b.index()].clear();

        self.bump_timestamp();
        Ok(EdgeCollapseInfo {
            kept_vertex: a,
            removed_vertex: b,
            collapsed_edge: e,
            removed_edges: [bc, bd],
            kept_edges: [ac, ad],
            removed_triangles: [t0, t1],
            opposite: [c, d],
        })
    }
}
