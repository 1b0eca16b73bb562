//! Edge and vertex constraints for remeshing.
//!
//! A [`MeshConstraints`] table is a sparse overlay on a mesh: edges and
//! vertices without an entry are unconstrained. Edge constraints veto
//! individual split/flip/collapse operations; vertex constraints pin a
//! vertex in place or tie it to a [`ProjectionTarget`] that the remesher
//! snaps it back onto after every smoothing pass.
//!
//! # Example
//!
//! ```
//! use dynmesh::algo::constraints::{fix_all_boundary, MeshConstraints};
//! use dynmesh::mesh::build_from_triangles;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let mesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
//!
//! let mut constraints = MeshConstraints::new();
//! fix_all_boundary(&mesh, &mut constraints);
//! assert!(constraints.is_fixed(0.into()));
//! assert!(!constraints.can_split(0.into()));
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use nalgebra::{Point3, Unit, Vector3};

use crate::algo::loops::{boundary_loops, EdgeLoop};
use crate::algo::submesh::Submesh;
use crate::error::Result;
use crate::mesh::{DynamicMesh, EdgeId, VertexId};

/// A geometric target that vertices can be projected onto.
pub trait ProjectionTarget: Debug + Send + Sync {
    /// The point on the target nearest to `point`.
    fn project(&self, point: &Point3<f64>) -> Point3<f64>;
}

/// Shared handle to a projection target.
pub type TargetRef = Arc<dyn ProjectionTarget>;

/// Per-edge operation vetoes.
#[derive(Debug, Clone, Default)]
pub struct EdgeConstraint {
    /// Forbid flipping this edge.
    pub no_flip: bool,
    /// Forbid splitting this edge.
    pub no_split: bool,
    /// Forbid collapsing this edge.
    pub no_collapse: bool,
    /// Curve or surface the edge should stay on. Inherited by split children.
    pub target: Option<TargetRef>,
}

impl EdgeConstraint {
    /// No restrictions.
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Forbid every operation.
    pub fn fully_constrained() -> Self {
        Self {
            no_flip: true,
            no_split: true,
            no_collapse: true,
            target: None,
        }
    }

    /// Forbid only flips.
    pub fn no_flips() -> Self {
        Self {
            no_flip: true,
            ..Self::default()
        }
    }

    /// Attach a projection target.
    pub fn with_target(mut self, target: TargetRef) -> Self {
        self.target = Some(target);
        self
    }

    /// True if no flag is set and no target is attached.
    pub fn is_unconstrained(&self) -> bool {
        !self.no_flip && !self.no_split && !self.no_collapse && self.target.is_none()
    }
}

/// Per-vertex pinning and projection.
#[derive(Debug, Clone, Default)]
pub struct VertexConstraint {
    /// The vertex must not move.
    pub fixed: bool,
    /// Fixed vertices sharing the same set id may be merged by collapse.
    pub fixed_set_id: Option<i32>,
    /// Where the vertex is projected after smoothing.
    pub target: Option<TargetRef>,
}

impl VertexConstraint {
    /// No restrictions.
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Pinned in place, mergeable with nothing.
    pub fn pinned() -> Self {
        Self {
            fixed: true,
            ..Self::default()
        }
    }

    /// Pinned in place, mergeable with other vertices of set `id`.
    pub fn pinned_in_set(id: i32) -> Self {
        Self {
            fixed: true,
            fixed_set_id: Some(id),
            target: None,
        }
    }

    /// Free to move but projected onto `target`.
    pub fn sliding(target: TargetRef) -> Self {
        Self {
            fixed: false,
            fixed_set_id: None,
            target: Some(target),
        }
    }

    /// True if not fixed and no target is attached.
    pub fn is_unconstrained(&self) -> bool {
        !self.fixed && self.target.is_none()
    }
}

/// Sparse constraint tables keyed by mesh ids.
#[derive(Debug, Clone, Default)]
pub struct MeshConstraints {
    edges: HashMap<EdgeId, EdgeConstraint>,
    vertices: HashMap<VertexId, VertexConstraint>,
}

impl MeshConstraints {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing is constrained.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.vertices.is_empty()
    }

    /// Number of constrained edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of constrained vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Set (or, for an unconstrained value, clear) the constraint of an edge.
    pub fn set_edge_constraint(&mut self, e: EdgeId, constraint: EdgeConstraint) {
        if constraint.is_unconstrained() {
            self.edges.remove(&e);
        } else {
            self.edges.insert(e, constraint);
        }
    }

    /// Set (or, for an unconstrained value, clear) the constraint of a vertex.
    pub fn set_vertex_constraint(&mut self, v: VertexId, constraint: VertexConstraint) {
        if constraint.is_unconstrained() {
            self.vertices.remove(&v);
        } else {
            self.vertices.insert(v, constraint);
        }
    }

    /// Remove and return the constraint of an edge.
    pub fn clear_edge(&mut self, e: EdgeId) -> Option<EdgeConstraint> {
        self.edges.remove(&e)
    }

    /// Remove and return the constraint of a vertex.
    pub fn clear_vertex(&mut self, v: VertexId) -> Option<VertexConstraint> {
        self.vertices.remove(&v)
    }

    /// Constraint of an edge, if any.
    pub fn edge_constraint(&self, e: EdgeId) -> Option<&EdgeConstraint> {
        self.edges.get(&e)
    }

    /// Constraint of a vertex, if any.
    pub fn vertex_constraint(&self, v: VertexId) -> Option<&VertexConstraint> {
        self.vertices.get(&v)
    }

    /// True if the edge may be flipped.
    pub fn can_flip(&self, e: EdgeId) -> bool {
        self.edges.get(&e).map_or(true, |c| !c.no_flip)
    }

    /// True if the edge may be split.
    pub fn can_split(&self, e: EdgeId) -> bool {
        self.edges.get(&e).map_or(true, |c| !c.no_split)
    }

    /// True if the vertex is pinned.
    pub fn is_fixed(&self, v: VertexId) -> bool {
        self.vertices.get(&v).map_or(false, |c| c.fixed)
    }

    /// True if the vertex is pinned or has a projection target.
    pub fn is_constrained(&self, v: VertexId) -> bool {
        self.vertices.contains_key(&v)
    }

    /// Projection target of a vertex.
    pub fn vertex_target(&self, v: VertexId) -> Option<&TargetRef> {
        self.vertices.get(&v).and_then(|c| c.target.as_ref())
    }

    /// True if edge `e = (a, b)` may be collapsed.
    ///
    /// Beyond the edge's own flag, a collapse touching a fixed vertex is
    /// allowed only when both endpoints are fixed and share a set id.
    pub fn can_collapse(&self, e: EdgeId, a: VertexId, b: VertexId) -> bool {
        if self.edges.get(&e).map_or(false, |c| c.no_collapse) {
            return false;
        }
        let ca = self.vertices.get(&a);
        let cb = self.vertices.get(&b);
        let fixed_a = ca.map_or(false, |c| c.fixed);
        let fixed_b = cb.map_or(false, |c| c.fixed);
        if !fixed_a && !fixed_b {
            return true;
        }
        match (ca, cb) {
            (Some(ca), Some(cb)) if ca.fixed && cb.fixed => {
                ca.fixed_set_id.is_some() && ca.fixed_set_id == cb.fixed_set_id
            }
            _ => false,
        }
    }

    /// Iterate over constrained edges.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeConstraint)> {
        self.edges.iter().map(|(&e, c)| (e, c))
    }

    /// Iterate over constrained vertices.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &VertexConstraint)> {
        self.vertices.iter().map(|(&v, c)| (v, c))
    }

    /// Drop entries that no longer name live elements.
    pub fn retain_live(&mut self, mesh: &DynamicMesh) {
        self.edges.retain(|&e, _| mesh.is_edge(e));
        self.vertices.retain(|&v, _| mesh.is_vertex(v));
    }
}

// ==================== Builders ====================

/// Fully constrain every boundary edge and pin its endpoints.
///
/// Returns the number of constrained edges.
pub fn fix_all_boundary(mesh: &DynamicMesh, constraints: &mut MeshConstraints) -> usize {
    let mut count = 0;
    for e in mesh.boundary_edge_ids() {
        pin_edge(mesh, constraints, e);
        count += 1;
    }
    count
}

/// Fully constrain the cut boundary of a submesh, in submesh ids.
///
/// Edges on the base mesh's own boundary are left alone. Returns the number
/// of constrained edges.
pub fn fix_submesh_boundary(submesh: &Submesh, constraints: &mut MeshConstraints) -> usize {
    let mut count = 0;
    for base_edge in submesh.cut_boundary_edges() {
        if let Some(e) = submesh.sub_edge(base_edge) {
            pin_edge(submesh.mesh(), constraints, e);
            count += 1;
        }
    }
    count
}

fn pin_edge(mesh: &DynamicMesh, constraints: &mut MeshConstraints, e: EdgeId) {
    constraints.set_edge_constraint(e, EdgeConstraint::fully_constrained());
    for v in mesh.edge_vertices(e) {
        constraints.set_vertex_constraint(v, VertexConstraint::pinned());
    }
}

/// Tie every vertex of a loop to `target` and forbid flipping its edges.
///
/// Loop edges carry the target too, so edges created by splitting them and
/// the vertices those splits insert stay on the target.
pub fn constrain_loop_to_target(
    constraints: &mut MeshConstraints,
    edge_loop: &EdgeLoop,
    target: TargetRef,
) {
    for &v in &edge_loop.vertices {
        constraints.set_vertex_constraint(v, VertexConstraint::sliding(target.clone()));
    }
    for &e in &edge_loop.edges {
        constraints.set_edge_constraint(e, EdgeConstraint::no_flips().with_target(target.clone()));
    }
}

/// Tie each boundary loop to a closed polyline through its current positions.
///
/// Returns the number of loops constrained.
pub fn preserve_boundary_loops(mesh: &DynamicMesh, constraints: &mut MeshConstraints) -> Result<usize> {
    let loops = boundary_loops(mesh)?;
    for edge_loop in &loops {
        let target: TargetRef = Arc::new(PolylineTarget::new(edge_loop.positions(mesh), true));
        constrain_loop_to_target(constraints, edge_loop, target);
    }
    Ok(loops.len())
}

// ==================== Targets ====================

/// An open or closed polyline.
#[derive(Debug, Clone)]
pub struct PolylineTarget {
    points: Vec<Point3<f64>>,
    closed: bool,
}

impl PolylineTarget {
    /// Create a polyline through `points`; `closed` adds the last-to-first segment.
    pub fn new(points: Vec<Point3<f64>>, closed: bool) -> Self {
        Self { points, closed }
    }

    /// Closed polyline through the current positions of a loop.
    pub fn from_loop(mesh: &DynamicMesh, edge_loop: &EdgeLoop) -> Self {
        Self::new(edge_loop.positions(mesh), true)
    }

    /// The polyline vertices.
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }
}

impl ProjectionTarget for PolylineTarget {
    fn project(&self, point: &Point3<f64>) -> Point3<f64> {
        let n = self.points.len();
        match n {
            0 => *point,
            1 => self.points[0],
            _ => {
                let segments = if self.closed { n } else { n - 1 };
                let mut best = self.points[0];
                let mut best_dist = f64::INFINITY;
                for i in 0..segments {
                    let c = closest_point_on_segment(point, &self.points[i], &self.points[(i + 1) % n]);
                    let d = (c - point).norm_squared();
                    if d < best_dist {
                        best_dist = d;
                        best = c;
                    }
                }
                best
            }
        }
    }
}

/// A snapshot of a surface as a triangle soup.
#[derive(Debug, Clone)]
pub struct TriangleSoupTarget {
    triangles: Vec<[Point3<f64>; 3]>,
}

impl TriangleSoupTarget {
    /// Snapshot the live triangles of a mesh.
    pub fn from_mesh(mesh: &DynamicMesh) -> Self {
        Self {
            triangles: mesh.triangle_ids().map(|t| mesh.triangle_positions(t)).collect(),
        }
    }

    /// Number of triangles in the snapshot.
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// True if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

impl ProjectionTarget for TriangleSoupTarget {
    fn project(&self, point: &Point3<f64>) -> Point3<f64> {
        let mut best = *point;
        let mut best_dist = f64::INFINITY;
        for [p0, p1, p2] in &self.triangles {
            let c = project_point_to_triangle(point, p0, p1, p2);
            let d = (c - point).norm_squared();
            if d < best_dist {
                best_dist = d;
                best = c;
            }
        }
        best
    }
}

/// An infinite plane.
#[derive(Debug, Clone)]
pub struct PlaneTarget {
    origin: Point3<f64>,
    normal: Unit<Vector3<f64>>,
}

impl PlaneTarget {
    /// Plane through `origin` with the given normal (normalized here).
    pub fn new(origin: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            origin,
            normal: Unit::new_normalize(normal),
        }
    }
}

impl ProjectionTarget for PlaneTarget {
    fn project(&self, point: &Point3<f64>) -> Point3<f64> {
        let dist = (point - self.origin).dot(&self.normal);
        point - self.normal.into_inner() * dist
    }
}

/// Project a point onto a triangle (closest point on triangle).
pub(crate) fn project_point_to_triangle(
    point: &Point3<f64>,
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
) -> Point3<f64> {
    let e1 = p1 - p0;
    let e2 = p2 - p0;
    let normal = e1.cross(&e2);
    let area2 = normal.norm();

    if area2 < 1e-12 {
        return Point3::from((p0.coords + p1.coords + p2.coords) / 3.0);
    }

    let n = normal / area2;
    let proj = point - n * (point - p0).dot(&n);

    let v0 = p2 - p0;
    let v1 = p1 - p0;
    let v2 = proj - p0;

    let dot00 = v0.dot(&v0);
    let dot01 = v0.dot(&v1);
    let dot02 = v0.dot(&v2);
    let dot11 = v1.dot(&v1);
    let dot12 = v1.dot(&v2);

    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() < 1e-12 {
        return Point3::from((p0.coords + p1.coords + p2.coords) / 3.0);
    }

    let u = (dot11 * dot02 - dot01 * dot12) / denom;
    let v = (dot00 * dot12 - dot01 * dot02) / denom;

    if u >= 0.0 && v >= 0.0 && u + v <= 1.0 {
        return proj;
    }

    [
        closest_point_on_segment(point, p0, p1),
        closest_point_on_segment(point, p1, p2),
        closest_point_on_segment(point, p2, p0),
    ]
    .into_iter()
    .min_by(|a, b| (a - point).norm_squared().total_cmp(&(b - point).norm_squared()))
    .unwrap_or(proj)
}

/// Find the closest point on a line segment.
pub(crate) fn closest_point_on_segment(
    point: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let len2 = ab.norm_squared();

    if len2 < 1e-12 {
        return *a;
    }

    let t = ((point - a).dot(&ab) / len2).clamp(0.0, 1.0);
    Point3::from(a.coords + ab * t)
}
