//! Dynamic indexed triangle mesh.
//!
//! [`DynamicMesh`] stores vertices, edges and triangles in dense row tables
//! addressed by recyclable ids. Adjacency is kept live under editing:
//!
//! - each triangle stores its three vertices and its three edges
//!   (edge `j` joins corner `j` and corner `(j + 1) % 3`)
//! - each edge stores its two vertices (ascending) and one or two triangles;
//!   the second triangle is [`TriangleId::INVALID`] on boundary edges
//! - each vertex stores the list of its incident edges
//!
//! Vertex rows are reference counted by the triangles naming them and are
//! freed when the last such triangle goes away. Every mutation bumps the
//! mesh [`timestamp`](DynamicMesh::timestamp).

use std::ops::{Deref, DerefMut};

use nalgebra::{Point3, Vector2, Vector3};

use super::index::{EdgeId, TriangleId, VertexId};
use super::refcount::RefCountVector;
use crate::error::{MeshError, Result};

/// Per-vertex attribute bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexInfo {
    /// The 3D position of this vertex.
    pub position: Point3<f64>,
    /// Optional vertex normal.
    pub normal: Option<Vector3<f64>>,
    /// Optional RGB color.
    pub color: Option<Vector3<f64>>,
    /// Optional texture coordinate.
    pub uv: Option<Vector2<f64>>,
}

impl VertexInfo {
    /// Create a vertex at the given position with no optional attributes.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
            color: None,
            uv: None,
        }
    }

    /// Create a vertex from coordinates.
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Attach a normal.
    pub fn with_normal(mut self, normal: Vector3<f64>) -> Self {
        self.normal = Some(normal);
        self
    }

    /// Attach a color.
    pub fn with_color(mut self, color: Vector3<f64>) -> Self {
        self.color = Some(color);
        self
    }

    /// Attach a texture coordinate.
    pub fn with_uv(mut self, uv: Vector2<f64>) -> Self {
        self.uv = Some(uv);
        self
    }

    /// Interpolate two bundles. An optional attribute survives only if both
    /// inputs carry it.
    pub fn lerp(a: &VertexInfo, b: &VertexInfo, t: f64) -> VertexInfo {
        let s = 1.0 - t;
        VertexInfo {
            position: Point3::from(a.position.coords * s + b.position.coords * t),
            normal: match (a.normal, b.normal) {
                (Some(na), Some(nb)) => {
                    let n = na * s + nb * t;
                    let len = n.norm();
                    Some(if len > 1e-12 { n / len } else { na })
                }
                _ => None,
            },
            color: match (a.color, b.color) {
                (Some(ca), Some(cb)) => Some(ca * s + cb * t),
                _ => None,
            },
            uv: match (a.uv, b.uv) {
                (Some(ua), Some(ub)) => Some(ua * s + ub * t),
                _ => None,
            },
        }
    }
}

impl Default for VertexInfo {
    fn default() -> Self {
        Self::new(Point3::origin())
    }
}

/// An edge record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// The two endpoints, in ascending id order.
    pub vertices: [VertexId; 2],
    /// Incident triangles; the second is invalid on boundary edges.
    pub triangles: [TriangleId; 2],
}

impl Edge {
    fn invalid() -> Self {
        Self {
            vertices: [VertexId::INVALID; 2],
            triangles: [TriangleId::INVALID; 2],
        }
    }

    /// True if the edge has exactly one incident triangle.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        !self.triangles[1].is_valid()
    }

    /// The endpoint that is not `v`.
    #[inline]
    pub fn other_vertex(&self, v: VertexId) -> VertexId {
        if self.vertices[0] == v {
            self.vertices[1]
        } else {
            self.vertices[0]
        }
    }

    /// The incident triangle that is not `t` (invalid on boundary edges).
    #[inline]
    pub fn other_triangle(&self, t: TriangleId) -> TriangleId {
        if self.triangles[0] == t {
            self.triangles[1]
        } else {
            self.triangles[0]
        }
    }

    /// True if `v` is one of the endpoints.
    #[inline]
    pub fn has_vertex(&self, v: VertexId) -> bool {
        self.vertices[0] == v || self.vertices[1] == v
    }
}

#[inline]
pub(crate) fn sorted_pair(a: VertexId, b: VertexId) -> [VertexId; 2] {
    if a < b {
        [a, b]
    } else {
        [b, a]
    }
}

/// A dynamic triangle mesh with recyclable ids and live adjacency.
#[derive(Debug, Clone, Default)]
pub struct DynamicMesh {
    pub(crate) vertices: Vec<VertexInfo>,
    pub(crate) vertex_refs: RefCountVector,
    pub(crate) vertex_edges: Vec<Vec<EdgeId>>,

    pub(crate) edges: Vec<Edge>,
    pub(crate) edge_refs: RefCountVector,

    pub(crate) triangles: Vec<[VertexId; 3]>,
    pub(crate) triangle_edges: Vec<[EdgeId; 3]>,
    pub(crate) triangle_groups: Vec<i32>,
    pub(crate) triangle_refs: RefCountVector,

    timestamp: u64,
    unsafe_insert: bool,
}

impl DynamicMesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_triangles: usize) -> Self {
        // Closed mesh: E = 3F/2. Leave slack for boundaries.
        let num_edges = num_triangles * 3 / 2 + num_triangles / 4;
        Self {
            vertices: Vec::with_capacity(num_vertices),
            vertex_edges: Vec::with_capacity(num_vertices),
            edges: Vec::with_capacity(num_edges),
            triangles: Vec::with_capacity(num_triangles),
            triangle_edges: Vec::with_capacity(num_triangles),
            triangle_groups: Vec::with_capacity(num_triangles),
            ..Self::default()
        }
    }

    // ==================== Counts ====================

    /// Number of live vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_refs.len()
    }

    /// Number of live edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edge_refs.len()
    }

    /// Number of live triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangle_refs.len()
    }

    /// One past the largest vertex id ever used.
    #[inline]
    pub fn max_vertex_id(&self) -> usize {
        self.vertex_refs.max_index()
    }

    /// One past the largest edge id ever used.
    #[inline]
    pub fn max_edge_id(&self) -> usize {
        self.edge_refs.max_index()
    }

    /// One past the largest triangle id ever used.
    #[inline]
    pub fn max_triangle_id(&self) -> usize {
        self.triangle_refs.max_index()
    }

    /// Change counter, bumped on every topology, position or attribute edit.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[inline]
    pub(crate) fn bump_timestamp(&mut self) {
        self.timestamp += 1;
    }

    // ==================== Liveness ====================

    /// True if `v` names a live vertex.
    #[inline]
    pub fn is_vertex(&self, v: VertexId) -> bool {
        v.is_valid() && self.vertex_refs.is_valid(v.index())
    }

    /// True if `e` names a live edge.
    #[inline]
    pub fn is_edge(&self, e: EdgeId) -> bool {
        e.is_valid() && self.edge_refs.is_valid(e.index())
    }

    /// True if `t` names a live triangle.
    #[inline]
    pub fn is_triangle(&self, t: TriangleId) -> bool {
        t.is_valid() && self.triangle_refs.is_valid(t.index())
    }

    // ==================== Iteration ====================

    /// Iterate over live vertex ids.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertex_refs.iter().map(VertexId::new)
    }

    /// Iterate over live edge ids.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edge_refs.iter().map(EdgeId::new)
    }

    /// Iterate over live triangle ids.
    pub fn triangle_ids(&self) -> impl Iterator<Item = TriangleId> + '_ {
        self.triangle_refs.iter().map(TriangleId::new)
    }

    /// Iterate over live boundary edge ids.
    pub fn boundary_edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edge_ids().filter(|&e| self.is_boundary_edge(e))
    }

    // ==================== Vertex access ====================

    /// Full attribute bundle of a vertex.
    #[inline]
    pub fn vertex_info(&self, v: VertexId) -> &VertexInfo {
        &self.vertices[v.index()]
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId) -> &Point3<f64> {
        &self.vertices[v.index()].position
    }

    /// Set the position of a vertex.
    #[inline]
    pub fn set_position(&mut self, v: VertexId, pos: Point3<f64>) {
        self.vertices[v.index()].position = pos;
        self.bump_timestamp();
    }

    /// Set (or clear) the normal of a vertex.
    pub fn set_vertex_normal(&mut self, v: VertexId, normal: Option<Vector3<f64>>) {
        self.vertices[v.index()].normal = normal;
        self.bump_timestamp();
    }

    /// Set (or clear) the color of a vertex.
    pub fn set_vertex_color(&mut self, v: VertexId, color: Option<Vector3<f64>>) {
        self.vertices[v.index()].color = color;
        self.bump_timestamp();
    }

    /// Set (or clear) the texture coordinate of a vertex.
    pub fn set_vertex_uv(&mut self, v: VertexId, uv: Option<Vector2<f64>>) {
        self.vertices[v.index()].uv = uv;
        self.bump_timestamp();
    }

    /// Replace the whole attribute bundle of a vertex.
    pub fn set_vertex_info(&mut self, v: VertexId, info: VertexInfo) {
        self.vertices[v.index()] = info;
        self.bump_timestamp();
    }

    /// Number of triangle corners naming `v`.
    #[inline]
    pub fn vertex_ref_count(&self, v: VertexId) -> u32 {
        self.vertex_refs.ref_count(v.index()).saturating_sub(1)
    }

    /// Edges incident to `v`.
    #[inline]
    pub fn vertex_edges(&self, v: VertexId) -> &[EdgeId] {
        &self.vertex_edges[v.index()]
    }

    /// Iterate over vertices adjacent to `v`.
    pub fn vertex_neighbors(&self, v: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.vertex_edges[v.index()]
            .iter()
            .map(move |&e| self.edges[e.index()].other_vertex(v))
    }

    /// Triangles incident to `v`, sorted by id.
    pub fn vertex_triangles(&self, v: VertexId) -> Vec<TriangleId> {
        let mut tris: Vec<TriangleId> = self.vertex_edges[v.index()]
            .iter()
            .flat_map(|&e| self.edges[e.index()].triangles)
            .filter(|t| t.is_valid())
            .collect();
        tris.sort_unstable();
        tris.dedup();
        tris
    }

    /// Number of edges incident to `v`.
    #[inline]
    pub fn valence(&self, v: VertexId) -> usize {
        self.vertex_edges[v.index()].len()
    }

    /// True if `v` has an incident boundary edge.
    pub fn is_boundary_vertex(&self, v: VertexId) -> bool {
        self.vertex_edges[v.index()]
            .iter()
            .any(|&e| self.edges[e.index()].is_boundary())
    }

    // ==================== Edge access ====================

    /// Get an edge record.
    #[inline]
    pub fn edge(&self, e: EdgeId) -> &Edge {
        &self.edges[e.index()]
    }

    /// The two endpoints of an edge (ascending ids).
    #[inline]
    pub fn edge_vertices(&self, e: EdgeId) -> [VertexId; 2] {
        self.edges[e.index()].vertices
    }

    /// The incident triangles of an edge.
    #[inline]
    pub fn edge_triangles(&self, e: EdgeId) -> [TriangleId; 2] {
        self.edges[e.index()].triangles
    }

    /// True if the edge has exactly one incident triangle.
    #[inline]
    pub fn is_boundary_edge(&self, e: EdgeId) -> bool {
        self.edges[e.index()].is_boundary()
    }

    /// Endpoints of `e` in the order they appear in its first triangle.
    pub fn oriented_edge_vertices(&self, e: EdgeId) -> [VertexId; 2] {
        let edge = &self.edges[e.index()];
        let [a, b] = edge.vertices;
        let tri = self.triangles[edge.triangles[0].index()];
        for j in 0..3 {
            if tri[j] == a && tri[(j + 1) % 3] == b {
                return [a, b];
            }
        }
        [b, a]
    }

    /// The vertices opposite `e` in its first and second triangle.
    ///
    /// The second entry is invalid on boundary edges.
    pub fn edge_opposite_vertices(&self, e: EdgeId) -> [VertexId; 2] {
        let edge = &self.edges[e.index()];
        let opposite = |t: TriangleId| {
            if !t.is_valid() {
                return VertexId::INVALID;
            }
            self.triangles[t.index()]
                .iter()
                .copied()
                .find(|&v| !edge.has_vertex(v))
                .unwrap_or(VertexId::INVALID)
        };
        [opposite(edge.triangles[0]), opposite(edge.triangles[1])]
    }

    /// Find the edge joining `a` and `b`, if any.
    pub fn find_edge(&self, a: VertexId, b: VertexId) -> Option<EdgeId> {
        if !self.is_vertex(a) || !self.is_vertex(b) {
            return None;
        }
        // scan the shorter incidence list
        let (from, to) = if self.vertex_edges[a.index()].len() <= self.vertex_edges[b.index()].len() {
            (a, b)
        } else {
            (b, a)
        };
        self.vertex_edges[from.index()]
            .iter()
            .copied()
            .find(|&e| self.edges[e.index()].other_vertex(from) == to)
    }

    // ==================== Triangle access ====================

    /// The three vertices of a triangle.
    #[inline]
    pub fn triangle(&self, t: TriangleId) -> [VertexId; 3] {
        self.triangles[t.index()]
    }

    /// The three edges of a triangle; edge `j` joins corners `j` and `j + 1`.
    #[inline]
    pub fn triangle_edges(&self, t: TriangleId) -> [EdgeId; 3] {
        self.triangle_edges[t.index()]
    }

    /// Group tag of a triangle.
    #[inline]
    pub fn triangle_group(&self, t: TriangleId) -> i32 {
        self.triangle_groups[t.index()]
    }

    /// Set the group tag of a triangle.
    pub fn set_triangle_group(&mut self, t: TriangleId, group: i32) {
        self.triangle_groups[t.index()] = group;
        self.bump_timestamp();
    }

    /// The triangles across each edge of `t` (invalid across boundary edges).
    pub fn triangle_neighbors(&self, t: TriangleId) -> [TriangleId; 3] {
        let te = self.triangle_edges[t.index()];
        [0, 1, 2].map(|j| self.edges[te[j].index()].other_triangle(t))
    }

    /// Corner index of `v` in triangle `t`.
    #[inline]
    pub fn triangle_corner(&self, t: TriangleId, v: VertexId) -> Option<usize> {
        self.triangles[t.index()].iter().position(|&x| x == v)
    }

    /// The positions of the three vertices of a triangle.
    pub fn triangle_positions(&self, t: TriangleId) -> [Point3<f64>; 3] {
        self.triangles[t.index()].map(|v| self.vertices[v.index()].position)
    }

    // ==================== Geometry ====================

    /// Unit normal of a triangle (zero for degenerate triangles).
    pub fn triangle_normal(&self, t: TriangleId) -> Vector3<f64> {
        let [p0, p1, p2] = self.triangle_positions(t);
        let n = (p1 - p0).cross(&(p2 - p0));
        let len = n.norm();
        if len > 1e-12 {
            n / len
        } else {
            Vector3::zeros()
        }
    }

    /// Area of a triangle.
    pub fn triangle_area(&self, t: TriangleId) -> f64 {
        let [p0, p1, p2] = self.triangle_positions(t);
        0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
    }

    /// Centroid of a triangle.
    pub fn triangle_centroid(&self, t: TriangleId) -> Point3<f64> {
        let [p0, p1, p2] = self.triangle_positions(t);
        Point3::from((p0.coords + p1.coords + p2.coords) / 3.0)
    }

    /// Length of an edge.
    pub fn edge_length(&self, e: EdgeId) -> f64 {
        let [a, b] = self.edges[e.index()].vertices;
        (self.position(b) - self.position(a)).norm()
    }

    /// Midpoint of an edge.
    pub fn edge_midpoint(&self, e: EdgeId) -> Point3<f64> {
        let [a, b] = self.edges[e.index()].vertices;
        Point3::from((self.position(a).coords + self.position(b).coords) * 0.5)
    }

    /// Area-weighted vertex normal (zero for isolated vertices).
    pub fn vertex_normal(&self, v: VertexId) -> Vector3<f64> {
        let mut normal = Vector3::zeros();
        for t in self.vertex_triangles(v) {
            let [p0, p1, p2] = self.triangle_positions(t);
            normal += (p1 - p0).cross(&(p2 - p0));
        }
        let len = normal.norm();
        if len > 1e-12 {
            normal / len
        } else {
            normal
        }
    }

    /// Axis-aligned bounds of the live vertices.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut ids = self.vertex_ids();
        let first = *self.position(ids.next()?);
        let (mut min, mut max) = (first, first);
        for v in ids {
            let p = self.position(v);
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some((min, max))
    }

    // ==================== Construction ====================

    /// Append a new vertex and return its id.
    pub fn append_vertex(&mut self, info: VertexInfo) -> VertexId {
        let index = self.vertex_refs.allocate();
        self.store_vertex(index, info);
        self.bump_timestamp();
        VertexId::new(index)
    }

    /// Insert a vertex with an explicit id.
    ///
    /// Fails with [`MeshError::VertexAlreadyExists`] if the id is live.
    pub fn insert_vertex(&mut self, v: VertexId, info: VertexInfo) -> Result<()> {
        if !v.is_valid() {
            return Err(MeshError::InvalidVertex(v));
        }
        if !self.vertex_refs.allocate_at(v.index(), self.unsafe_insert) {
            return Err(MeshError::VertexAlreadyExists(v));
        }
        self.store_vertex(v.index(), info);
        self.bump_timestamp();
        Ok(())
    }

    fn store_vertex(&mut self, index: usize, info: VertexInfo) {
        if index >= self.vertices.len() {
            self.vertices.resize(index + 1, VertexInfo::default());
            self.vertex_edges.resize(index + 1, Vec::new());
        }
        self.vertices[index] = info;
        self.vertex_edges[index].clear();
    }

    /// Append a triangle in group 0.
    pub fn append_triangle(&mut self, tri: [VertexId; 3]) -> Result<TriangleId> {
        self.append_triangle_with_group(tri, 0)
    }

    /// Append a triangle with a group tag.
    ///
    /// Fails without mutating if a vertex is not live, the triangle repeats a
    /// vertex, or one of its edges already has two triangles.
    pub fn append_triangle_with_group(
        &mut self,
        tri: [VertexId; 3],
        group: i32,
    ) -> Result<TriangleId> {
        let existing = self.check_new_triangle(tri)?;
        let t = TriangleId::new(self.triangle_refs.allocate());
        self.attach_triangle(t, tri, group, existing);
        Ok(t)
    }

    /// Insert a triangle with an explicit id.
    pub fn insert_triangle(&mut self, t: TriangleId, tri: [VertexId; 3], group: i32) -> Result<()> {
        if !t.is_valid() {
            return Err(MeshError::InvalidTriangle(t));
        }
        if self.is_triangle(t) {
            return Err(MeshError::TriangleAlreadyExists(t));
        }
        let existing = self.check_new_triangle(tri)?;
        self.triangle_refs.allocate_at(t.index(), self.unsafe_insert);
        self.attach_triangle(t, tri, group, existing);
        Ok(())
    }

    fn check_new_triangle(&self, tri: [VertexId; 3]) -> Result<[Option<EdgeId>; 3]> {
        for &v in &tri {
            if !self.is_vertex(v) {
                return Err(MeshError::InvalidVertex(v));
            }
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return Err(MeshError::DegenerateTriangle(tri));
        }
        let mut existing = [None; 3];
        for j in 0..3 {
            let (a, b) = (tri[j], tri[(j + 1) % 3]);
            if let Some(e) = self.find_edge(a, b) {
                if !self.edges[e.index()].is_boundary() {
                    return Err(MeshError::NonManifoldEdge { v0: a, v1: b });
                }
                existing[j] = Some(e);
            }
        }
        Ok(existing)
    }

    fn attach_triangle(
        &mut self,
        t: TriangleId,
        tri: [VertexId; 3],
        group: i32,
        existing: [Option<EdgeId>; 3],
    ) {
        let index = t.index();
        if index >= self.triangles.len() {
            self.triangles.resize(index + 1, [VertexId::INVALID; 3]);
            self.triangle_edges.resize(index + 1, [EdgeId::INVALID; 3]);
            self.triangle_groups.resize(index + 1, 0);
        }
        self.triangles[index] = tri;
        self.triangle_groups[index] = group;

        for &v in &tri {
            self.vertex_refs.increment(v.index(), 1);
        }

        let mut te = [EdgeId::INVALID; 3];
        for j in 0..3 {
            te[j] = match existing[j] {
                Some(e) => {
                    self.edges[e.index()].triangles[1] = t;
                    e
                }
                None => self.add_edge(tri[j], tri[(j + 1) % 3], t, TriangleId::INVALID),
            };
        }
        self.triangle_edges[index] = te;
        self.bump_timestamp();
    }

    // ==================== Removal ====================

    /// Remove a triangle, freeing edges and vertices it was the last user of.
    ///
    /// With `preserve_manifold`, refuses (recoverably) to remove a triangle
    /// from the middle of a boundary vertex's fan, which would leave a bowtie.
    pub fn remove_triangle(&mut self, t: TriangleId, preserve_manifold: bool) -> Result<()> {
        if !self.is_triangle(t) {
            return Err(MeshError::InvalidTriangle(t));
        }
        let tri = self.triangles[t.index()];
        let te = self.triangle_edges[t.index()];

        if preserve_manifold {
            for j in 0..3 {
                let v = tri[j];
                if !self.is_boundary_vertex(v) {
                    continue;
                }
                let outgoing = te[j];
                let incoming = te[(j + 2) % 3];
                if !self.edges[outgoing.index()].is_boundary()
                    && !self.edges[incoming.index()].is_boundary()
                {
                    return Err(MeshError::WouldCreateBowtie { triangle: t, vertex: v });
                }
            }
        }

        for &e in &te {
            self.detach_edge_triangle(e, t);
        }

        self.triangle_refs.decrement(t.index(), 1);
        self.triangle_edges[t.index()] = [EdgeId::INVALID; 3];

        for &v in &tri {
            self.release_vertex_ref(v);
        }
        self.bump_timestamp();
        Ok(())
    }

    /// Remove several triangles, stopping at the first failure.
    pub fn remove_triangles(&mut self, triangles: &[TriangleId], preserve_manifold: bool) -> Result<()> {
        for &t in triangles {
            self.remove_triangle(t, preserve_manifold)?;
        }
        Ok(())
    }

    // ==================== Unsafe insertion ====================

    /// Open a scope for batch explicit-id insertion.
    ///
    /// While the returned guard lives, [`insert_vertex`] and
    /// [`insert_triangle`] skip free-list maintenance. Dropping the guard
    /// rebuilds the free lists so every invariant holds again.
    ///
    /// [`insert_vertex`]: Self::insert_vertex
    /// [`insert_triangle`]: Self::insert_triangle
    pub fn begin_unsafe_insert(&mut self) -> UnsafeInsertScope<'_> {
        self.unsafe_insert = true;
        UnsafeInsertScope { mesh: self }
    }

    /// True while an unsafe insertion scope is open.
    #[inline]
    pub fn in_unsafe_insert(&self) -> bool {
        self.unsafe_insert
    }

    fn end_unsafe_insert(&mut self) {
        self.unsafe_insert = false;
        self.vertex_refs.rebuild_free_list();
        self.triangle_refs.rebuild_free_list();
    }

    // ==================== Internal adjacency editing ====================

    pub(crate) fn add_edge(
        &mut self,
        a: VertexId,
        b: VertexId,
        t0: TriangleId,
        t1: TriangleId,
    ) -> EdgeId {
        let index = self.edge_refs.allocate();
        let edge = Edge {
            vertices: sorted_pair(a, b),
            triangles: [t0, t1],
        };
        if index >= self.edges.len() {
            self.edges.resize(index + 1, Edge::invalid());
        }
        self.edges[index] = edge;
        let e = EdgeId::new(index);
        self.vertex_edges[a.index()].push(e);
        self.vertex_edges[b.index()].push(e);
        e
    }

    pub(crate) fn free_edge(&mut self, e: EdgeId) {
        let [a, b] = self.edges[e.index()].vertices;
        remove_from(&mut self.vertex_edges[a.index()], e);
        remove_from(&mut self.vertex_edges[b.index()], e);
        self.edge_refs.decrement(e.index(), 1);
        self.edges[e.index()] = Edge::invalid();
    }

    /// Drop `t` from the triangle slots of `e`, freeing `e` if it empties.
    pub(crate) fn detach_edge_triangle(&mut self, e: EdgeId, t: TriangleId) {
        let edge = &mut self.edges[e.index()];
        if edge.triangles[0] == t {
            edge.triangles[0] = edge.triangles[1];
            edge.triangles[1] = TriangleId::INVALID;
        } else if edge.triangles[1] == t {
            edge.triangles[1] = TriangleId::INVALID;
        }
        if !edge.triangles[0].is_valid() {
            self.free_edge(e);
        }
    }

    pub(crate) fn replace_edge_triangle(&mut self, e: EdgeId, old: TriangleId, new: TriangleId) {
        let edge = &mut self.edges[e.index()];
        if edge.triangles[0] == old {
            edge.triangles[0] = new;
        } else if edge.triangles[1] == old {
            edge.triangles[1] = new;
        }
    }

    /// Re-point endpoint `old` of `e` at `new`, moving the incidence entry.
    pub(crate) fn replace_edge_vertex(&mut self, e: EdgeId, old: VertexId, new: VertexId) {
        let other = self.edges[e.index()].other_vertex(old);
        self.edges[e.index()].vertices = sorted_pair(other, new);
        remove_from(&mut self.vertex_edges[old.index()], e);
        self.vertex_edges[new.index()].push(e);
    }

    pub(crate) fn set_triangle_raw(&mut self, t: TriangleId, tri: [VertexId; 3], te: [EdgeId; 3]) {
        self.triangles[t.index()] = tri;
        self.triangle_edges[t.index()] = te;
    }

    /// Allocate a triangle row without touching vertex counts or edges.
    pub(crate) fn new_triangle_raw(&mut self, tri: [VertexId; 3], te: [EdgeId; 3], group: i32) -> TriangleId {
        let index = self.triangle_refs.allocate();
        if index >= self.triangles.len() {
            self.triangles.resize(index + 1, [VertexId::INVALID; 3]);
            self.triangle_edges.resize(index + 1, [EdgeId::INVALID; 3]);
            self.triangle_groups.resize(index + 1, 0);
        }
        self.triangles[index] = tri;
        self.triangle_edges[index] = te;
        self.triangle_groups[index] = group;
        TriangleId::new(index)
    }

    pub(crate) fn free_triangle_raw(&mut self, t: TriangleId) {
        self.triangle_refs.decrement(t.index(), 1);
        self.triangle_edges[t.index()] = [EdgeId::INVALID; 3];
    }

    #[inline]
    pub(crate) fn add_vertex_ref(&mut self, v: VertexId) {
        self.vertex_refs.increment(v.index(), 1);
    }

    /// Drop one triangle reference, freeing the vertex when none remain.
    pub(crate) fn release_vertex_ref(&mut self, v: VertexId) {
        if self.vertex_refs.decrement(v.index(), 1) == 1 {
            debug_assert!(self.vertex_edges[v.index()].is_empty());
            self.vertex_refs.decrement(v.index(), 1);
            self.vertex_edges[v.index()].clear();
        }
    }

    // ==================== Validation ====================

    /// Audit every adjacency invariant, reporting the first violation.
    pub fn check_validity(&self) -> Result<()> {
        let fail = |msg: String| Err(MeshError::InvalidState(msg));
        let mut corner_counts = vec![0u32; self.max_vertex_id()];

        for t in self.triangle_ids() {
            let tri = self.triangle(t);
            let te = self.triangle_edges(t);
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                return fail(format!("{t} repeats a vertex: {tri:?}"));
            }
            for j in 0..3 {
                let v = tri[j];
                if !self.is_vertex(v) {
                    return fail(format!("{t} references dead vertex {v}"));
                }
                corner_counts[v.index()] += 1;
                let e = te[j];
                if !self.is_edge(e) {
                    return fail(format!("{t} references dead edge {e}"));
                }
                let edge = self.edge(e);
                if edge.vertices != sorted_pair(v, tri[(j + 1) % 3]) {
                    return fail(format!("{t} edge slot {j} is {e} with vertices {:?}", edge.vertices));
                }
                if edge.triangles[0] != t && edge.triangles[1] != t {
                    return fail(format!("{e} does not list incident {t}"));
                }
            }
        }

        for e in self.edge_ids() {
            let edge = self.edge(e);
            let [a, b] = edge.vertices;
            if !self.is_vertex(a) || !self.is_vertex(b) || a >= b {
                return fail(format!("{e} has bad vertices {:?}", edge.vertices));
            }
            if !self.is_triangle(edge.triangles[0]) {
                return fail(format!("{e} has no live first triangle"));
            }
            let t1 = edge.triangles[1];
            if t1.is_valid() && (!self.is_triangle(t1) || t1 == edge.triangles[0]) {
                return fail(format!("{e} has bad second triangle {t1}"));
            }
            for &t in edge.triangles.iter().filter(|t| t.is_valid()) {
                if !self.triangle_edges(t).contains(&e) {
                    return fail(format!("{t} does not list incident {e}"));
                }
            }
            if !self.vertex_edges(a).contains(&e) || !self.vertex_edges(b).contains(&e) {
                return fail(format!("{e} missing from an endpoint's edge list"));
            }
        }

        for v in self.vertex_ids() {
            if self.vertex_ref_count(v) != corner_counts[v.index()] {
                return fail(format!(
                    "{v} has reference count {} but {} corners",
                    self.vertex_ref_count(v),
                    corner_counts[v.index()]
                ));
            }
            let mut seen = Vec::with_capacity(self.valence(v));
            for &e in self.vertex_edges(v) {
                if !self.is_edge(e) || !self.edge(e).has_vertex(v) {
                    return fail(format!("{v} lists foreign edge {e}"));
                }
                let other = self.edge(e).other_vertex(v);
                if seen.contains(&other) {
                    return fail(format!("{v} has duplicate edges to {other}"));
                }
                seen.push(other);
            }
        }

        Ok(())
    }

    /// True if [`check_validity`](Self::check_validity) passes.
    pub fn is_valid(&self) -> bool {
        self.check_validity().is_ok()
    }
}

fn remove_from(list: &mut Vec<EdgeId>, e: EdgeId) {
    if let Some(pos) = list.iter().position(|&x| x == e) {
        list.swap_remove(pos);
    }
}

/// Guard returned by [`DynamicMesh::begin_unsafe_insert`].
///
/// Dereferences to the mesh. Free lists are rebuilt when it is dropped.
pub struct UnsafeInsertScope<'a> {
    mesh: &'a mut DynamicMesh,
}

impl UnsafeInsertScope<'_> {
    /// Close the scope explicitly.
    pub fn finish(self) {}
}

impl Deref for UnsafeInsertScope<'_> {
    type Target = DynamicMesh;

    fn deref(&self) -> &DynamicMesh {
        self.mesh
    }
}

impl DerefMut for UnsafeInsertScope<'_> {
    fn deref_mut(&mut self) -> &mut DynamicMesh {
        self.mesh
    }
}

impl Drop for UnsafeInsertScope<'_> {
    fn drop(&mut self) {
        self.mesh.end_unsafe_insert();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{quad, tetrahedron};

    #[test]
    fn test_empty_mesh() {
        let mesh = DynamicMesh::new();
        assert_eq!(mesh.vertex_count(), 0);
        assert_eq!(mesh.edge_count(), 0);
        assert_eq!(mesh.triangle_count(), 0);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_append_vertex_and_triangle() {
        let mut mesh = DynamicMesh::new();
        let v0 = mesh.append_vertex(VertexInfo::from_coords(0.0, 0.0, 0.0));
        let v1 = mesh.append_vertex(VertexInfo::from_coords(1.0, 0.0, 0.0));
        let v2 = mesh.append_vertex(VertexInfo::from_coords(0.0, 1.0, 0.0));
        assert_eq!(mesh.vertex_ref_count(v0), 0);

        let t = mesh.append_triangle([v0, v1, v2]).unwrap();
        assert_eq!(t.index(), 0);
        assert_eq!(mesh.edge_count(), 3);
        assert_eq!(mesh.vertex_ref_count(v0), 1);
        assert!(mesh.boundary_edge_ids().count() == 3);
        assert_eq!(mesh.triangle_neighbors(t), [TriangleId::INVALID; 3]);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_degenerate_and_dead_vertex_rejected() {
        let mut mesh = DynamicMesh::new();
        let v0 = mesh.append_vertex(VertexInfo::default());
        let v1 = mesh.append_vertex(VertexInfo::default());
        let before = mesh.timestamp();

        let err = mesh.append_triangle([v0, v0, v1]).unwrap_err();
        assert!(matches!(err, MeshError::DegenerateTriangle(_)));
        assert!(err.is_recoverable());

        let err = mesh.append_triangle([v0, v1, VertexId::new(9)]).unwrap_err();
        assert_eq!(err, MeshError::InvalidVertex(VertexId::new(9)));
        assert_eq!(mesh.timestamp(), before);
    }

    #[test]
    fn test_non_manifold_edge_rejected() {
        let mut mesh = quad();
        let extra = mesh.append_vertex(VertexInfo::from_coords(0.5, 0.5, 1.0));
        // edge (0, 2) is the shared diagonal and already has two triangles
        let err = mesh
            .append_triangle([VertexId::new(0), VertexId::new(2), extra])
            .unwrap_err();
        assert!(matches!(err, MeshError::NonManifoldEdge { .. }));
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_neighbors_and_boundary() {
        let mesh = quad();
        let t0 = TriangleId::new(0);
        let t1 = TriangleId::new(1);
        assert!(mesh.triangle_neighbors(t0).contains(&t1));
        let diagonal = mesh.find_edge(VertexId::new(0), VertexId::new(2)).unwrap();
        assert!(!mesh.is_boundary_edge(diagonal));
        assert_eq!(mesh.boundary_edge_ids().count(), 4);
        assert!(mesh.is_boundary_vertex(VertexId::new(0)));
    }

    #[test]
    fn test_remove_triangle_frees_vertices_and_ids_recycle() {
        let mut mesh = quad();
        mesh.remove_triangle(TriangleId::new(0), false).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        // vertex 1 was only used by triangle 0
        assert!(!mesh.is_vertex(VertexId::new(1)));
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.edge_count(), 3);
        assert!(mesh.is_valid());

        let v = mesh.append_vertex(VertexInfo::from_coords(2.0, 0.0, 0.0));
        assert_eq!(v, VertexId::new(1));
        let t = mesh
            .append_triangle([VertexId::new(0), v, VertexId::new(2)])
            .unwrap();
        assert_eq!(t, TriangleId::new(0));
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_remove_dead_triangle_is_fatal() {
        let mut mesh = quad();
        let err = mesh.remove_triangle(TriangleId::new(5), false).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_remove_triangle_preserve_manifold() {
        // fan of three triangles around vertex 0, open on one side
        let mut mesh = DynamicMesh::new();
        let c = mesh.append_vertex(VertexInfo::from_coords(0.0, 0.0, 0.0));
        let ring: Vec<VertexId> = (0..4)
            .map(|i| {
                let a = i as f64 * 0.5;
                mesh.append_vertex(VertexInfo::from_coords(a.cos(), a.sin(), 0.0))
            })
            .collect();
        for i in 0..3 {
            mesh.append_triangle([c, ring[i], ring[i + 1]]).unwrap();
        }
        let middle = TriangleId::new(1);
        let err = mesh.remove_triangle(middle, true).unwrap_err();
        assert!(matches!(err, MeshError::WouldCreateBowtie { .. }));
        assert_eq!(mesh.triangle_count(), 3);

        mesh.remove_triangle(TriangleId::new(0), true).unwrap();
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_explicit_insert() {
        let mut mesh = quad();
        let info = mesh.vertex_info(VertexId::new(1)).clone();
        mesh.remove_triangle(TriangleId::new(0), false).unwrap();

        let err = mesh.insert_vertex(VertexId::new(0), VertexInfo::default()).unwrap_err();
        assert_eq!(err, MeshError::VertexAlreadyExists(VertexId::new(0)));

        mesh.insert_vertex(VertexId::new(1), info).unwrap();
        mesh.insert_triangle(
            TriangleId::new(0),
            [VertexId::new(0), VertexId::new(1), VertexId::new(2)],
            0,
        )
        .unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_unsafe_insert_scope_rebuilds_free_lists() {
        let mut mesh = DynamicMesh::new();
        {
            let mut scope = mesh.begin_unsafe_insert();
            for i in [4usize, 2, 7] {
                scope
                    .insert_vertex(VertexId::new(i), VertexInfo::from_coords(i as f64, 0.0, 0.0))
                    .unwrap();
            }
            scope
                .insert_triangle(TriangleId::new(3), [VertexId::new(4), VertexId::new(2), VertexId::new(7)], 5)
                .unwrap();
            assert!(scope.in_unsafe_insert());
        }
        assert!(!mesh.in_unsafe_insert());
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_group(TriangleId::new(3)), 5);
        assert!(mesh.is_valid());

        // the gaps are reusable, lowest first
        let v = mesh.append_vertex(VertexInfo::default());
        assert_eq!(v, VertexId::new(0));
        let mut ids: Vec<usize> = (0..5).map(|_| mesh.append_vertex(VertexInfo::default()).index()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3, 5, 6, 8]);
    }

    #[test]
    fn test_timestamp_changes_on_every_mutation() {
        let mut mesh = tetrahedron();
        let mut last = mesh.timestamp();
        mesh.set_position(VertexId::new(0), Point3::new(0.0, 0.0, -0.1));
        assert!(mesh.timestamp() > last);
        last = mesh.timestamp();
        mesh.set_triangle_group(TriangleId::new(0), 3);
        assert!(mesh.timestamp() > last);
        last = mesh.timestamp();
        mesh.set_vertex_color(VertexId::new(1), Some(Vector3::new(1.0, 0.0, 0.0)));
        assert!(mesh.timestamp() > last);
    }

    #[test]
    fn test_oriented_edge_and_opposites() {
        let mesh = quad();
        let diagonal = mesh.find_edge(VertexId::new(0), VertexId::new(2)).unwrap();
        let [a, b] = mesh.oriented_edge_vertices(diagonal);
        let t0 = mesh.edge_triangles(diagonal)[0];
        let tri = mesh.triangle(t0);
        let j = tri.iter().position(|&v| v == a).unwrap();
        assert_eq!(tri[(j + 1) % 3], b);

        let [c, d] = mesh.edge_opposite_vertices(diagonal);
        let mut opp = vec![c, d];
        opp.sort();
        assert_eq!(opp, vec![VertexId::new(1), VertexId::new(3)]);
    }

    #[test]
    fn test_vertex_info_lerp() {
        let a = VertexInfo::from_coords(0.0, 0.0, 0.0).with_uv(Vector2::new(0.0, 0.0));
        let b = VertexInfo::from_coords(2.0, 0.0, 0.0)
            .with_uv(Vector2::new(1.0, 1.0))
            .with_color(Vector3::new(1.0, 1.0, 1.0));
        let m = VertexInfo::lerp(&a, &b, 0.5);
        assert_eq!(m.position, Point3::new(1.0, 0.0, 0.0));
        assert_eq!(m.uv, Some(Vector2::new(0.5, 0.5)));
        assert_eq!(m.color, None);
    }
}
