//! Constraint-aware local remeshing.
//!
//! [`Remesher`] drives a mesh towards a target edge length by repeating a
//! fixed pipeline of passes:
//!
//! 1. **Precompute**: unit vertex normals are cached for tangential
//!    smoothing (in parallel when enabled) and kept current through the
//!    edge pass; the strategy caches whatever else it needs
//! 2. **Edge pass**: each candidate edge is collapsed if shorter than
//!    `min_edge_length`, else split if longer than `max_edge_length`, else
//!    flipped if that brings vertex valences closer to 6 (4 on the boundary)
//! 3. **Smooth**: free vertices move a step `α` towards a neighbor centroid,
//!    optionally restricted to the tangent plane
//! 4. **Project**: vertices with a projection target are snapped onto it
//! 5. **End-of-pass hook**
//!
//! Every edit is checked against the [`MeshConstraints`] first. Edits the
//! mesh refuses (link condition, would-be non-manifold edge, ...) are
//! skipped; a structurally inconsistent mesh aborts the run.
//!
//! The per-pass policy (which edges, which vertices, which centroid) comes
//! from a [`RemeshStrategy`]. [`DefaultStrategy`] remeshes the whole
//! surface; [`EdgeLoopStrategy`] remeshes only a tracked edge loop. After
//! each committed split, collapse or flip the strategy and then every
//! registered [`TopologyObserver`] is notified before the next candidate
//! is processed. A strategy that finds its own bookkeeping inconsistent
//! while handling a notification reports it through
//! [`RemeshStrategy::take_error`] and the pass aborts.
//!
//! # Example
//!
//! ```
//! use dynmesh::algo::remesh::{Remesher, RemeshOptions};
//! use dynmesh::mesh::build_from_triangles;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(4.0, 0.0, 0.0),
//!     Point3::new(4.0, 4.0, 0.0),
//!     Point3::new(0.0, 4.0, 0.0),
//! ];
//! let mut mesh = build_from_triangles(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap();
//!
//! let options = RemeshOptions::with_target_length(1.0).with_passes(5);
//! let stats = Remesher::new(&mut mesh, options).run().unwrap();
//! assert!(stats.splits > 0);
//! assert!(mesh.is_valid());
//! ```
//!
//! # References
//!
//! - Botsch, M., & Kobbelt, L. (2004). "A remeshing approach to multiresolution modeling."
//!   Symposium on Geometry Processing.

mod edge_loop;
mod isotropic;

pub use edge_loop::{remesh_loop, EdgeLoopStrategy};
pub use isotropic::{average_edge_length, isotropic_remesh, isotropic_remesh_constrained};

use std::ops::AddAssign;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::algo::constraints::{fix_all_boundary, MeshConstraints, TargetRef, VertexConstraint};
use crate::error::{MeshError, Result};
use crate::mesh::{
    DynamicMesh, EdgeCollapseInfo, EdgeFlipInfo, EdgeId, EdgeSplitInfo, TriangleId, VertexId,
    VertexInfo,
};

/// Prime stride used to permute edge visiting order.
pub const EDGE_ORDER_PRIME: usize = 31337;

/// Options for remeshing.
#[derive(Debug, Clone)]
pub struct RemeshOptions {
    /// Edges shorter than this are collapsed.
    pub min_edge_length: f64,

    /// Edges longer than this are split.
    pub max_edge_length: f64,

    /// Number of passes.
    pub passes: usize,

    /// Smoothing step `α` in `[0, 1]`.
    pub smooth_step: f64,

    /// Whether long edges are split.
    pub enable_splits: bool,

    /// Whether short edges are collapsed.
    pub enable_collapses: bool,

    /// Whether edges are flipped to improve valence.
    pub enable_flips: bool,

    /// Whether the smoothing pass runs.
    pub enable_smoothing: bool,

    /// Remove the normal component of smoothing displacements.
    pub tangential_smoothing: bool,

    /// Reject collapses and flips that would invert a triangle.
    pub prevent_normal_flips: bool,

    /// Pin every boundary edge and vertex before running.
    pub preserve_boundary: bool,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl RemeshOptions {
    /// Create options for the target edge length `L`: edges are collapsed
    /// below `4/5 L` and split above `4/3 L`.
    pub fn with_target_length(target_length: f64) -> Self {
        Self {
            min_edge_length: target_length * 4.0 / 5.0,
            max_edge_length: target_length * 4.0 / 3.0,
            passes: 5,
            smooth_step: 0.5,
            enable_splits: true,
            enable_collapses: true,
            enable_flips: true,
            enable_smoothing: true,
            tangential_smoothing: true,
            prevent_normal_flips: true,
            preserve_boundary: true,
            parallel: true,
        }
    }

    /// Set explicit collapse and split thresholds.
    pub fn with_edge_lengths(mut self, min: f64, max: f64) -> Self {
        self.min_edge_length = min;
        self.max_edge_length = max;
        self
    }

    /// Set the number of passes.
    pub fn with_passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }

    /// Set the smoothing step.
    pub fn with_smooth_step(mut self, step: f64) -> Self {
        self.smooth_step = step;
        self
    }

    /// Enable or disable splits.
    pub fn with_splits(mut self, enable: bool) -> Self {
        self.enable_splits = enable;
        self
    }

    /// Enable or disable collapses.
    pub fn with_collapses(mut self, enable: bool) -> Self {
        self.enable_collapses = enable;
        self
    }

    /// Enable or disable flips.
    pub fn with_flips(mut self, enable: bool) -> Self {
        self.enable_flips = enable;
        self
    }

    /// Enable or disable the smoothing pass.
    pub fn with_smoothing(mut self, enable: bool) -> Self {
        self.enable_smoothing = enable;
        self
    }

    /// Enable or disable tangential smoothing.
    pub fn with_tangential_smoothing(mut self, enable: bool) -> Self {
        self.tangential_smoothing = enable;
        self
    }

    /// Enable or disable the normal-flip check.
    pub fn with_prevent_normal_flips(mut self, enable: bool) -> Self {
        self.prevent_normal_flips = enable;
        self
    }

    /// Set whether to pin the boundary.
    pub fn with_preserve_boundary(mut self, preserve: bool) -> Self {
        self.preserve_boundary = preserve;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Check that the thresholds and step are usable.
    pub fn validate(&self) -> Result<()> {
        if !self.min_edge_length.is_finite() || self.min_edge_length < 0.0 {
            return Err(MeshError::invalid_param(
                "min_edge_length",
                self.min_edge_length,
                "must be finite and non-negative",
            ));
        }
        if !self.max_edge_length.is_finite() || self.max_edge_length <= self.min_edge_length {
            return Err(MeshError::invalid_param(
                "max_edge_length",
                self.max_edge_length,
                "must be finite and greater than min_edge_length",
            ));
        }
        if !(0.0..=1.0).contains(&self.smooth_step) {
            return Err(MeshError::invalid_param("smooth_step", self.smooth_step, "must be in [0, 1]"));
        }
        Ok(())
    }
}

impl Default for RemeshOptions {
    fn default() -> Self {
        Self::with_target_length(1.0)
    }
}

/// Counters accumulated by a remeshing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemeshStats {
    /// Passes completed.
    pub passes: usize,
    /// Edges split.
    pub splits: usize,
    /// Edges collapsed.
    pub collapses: usize,
    /// Edges flipped.
    pub flips: usize,
    /// Vertex moves made by smoothing.
    pub smoothed: usize,
    /// Vertex moves made by projection.
    pub projected: usize,
}

impl AddAssign for RemeshStats {
    fn add_assign(&mut self, other: Self) {
        self.passes += other.passes;
        self.splits += other.splits;
        self.collapses += other.collapses;
        self.flips += other.flips;
        self.smoothed += other.smoothed;
        self.projected += other.projected;
    }
}

/// Receives synchronous notifications of committed topology edits.
///
/// Notifications arrive after the mesh has been updated and before the
/// next edit is attempted.
pub trait TopologyObserver {
    /// An edge was split.
    fn on_split(&mut self, _mesh: &DynamicMesh, _info: &EdgeSplitInfo) {}

    /// An edge was collapsed.
    fn on_collapse(&mut self, _mesh: &DynamicMesh, _info: &EdgeCollapseInfo) {}

    /// An edge was flipped.
    fn on_flip(&mut self, _mesh: &DynamicMesh, _info: &EdgeFlipInfo) {}
}

/// Per-pass remeshing policy plugged into [`Remesher`].
pub trait RemeshStrategy: TopologyObserver + Sync {
    /// Called at the start of each pass.
    fn precompute(&mut self, _mesh: &DynamicMesh) {}

    /// Edges to visit this pass, in order.
    fn edge_candidates(&mut self, mesh: &DynamicMesh) -> Vec<EdgeId> {
        prime_order_edges(mesh)
    }

    /// Re-checked right before a candidate is processed; ids freed and
    /// reused earlier in the same pass can be filtered out here.
    fn is_candidate(&self, _mesh: &DynamicMesh, _e: EdgeId) -> bool {
        true
    }

    /// Length measure compared against the thresholds.
    fn edge_length(&self, mesh: &DynamicMesh, e: EdgeId) -> f64 {
        mesh.edge_length(e)
    }

    /// Whether flips are attempted at all.
    fn allow_flips(&self) -> bool {
        true
    }

    /// Extra veto on a collapse that merges `removed` into `keep`.
    fn allow_collapse(&self, _mesh: &DynamicMesh, _e: EdgeId, _keep: VertexId, _removed: VertexId) -> bool {
        true
    }

    /// Vertices the smoothing pass may move.
    fn smooth_candidates(&mut self, mesh: &DynamicMesh) -> Vec<VertexId> {
        mesh.vertex_ids().collect()
    }

    /// The point a vertex is pulled towards, or `None` to leave it.
    fn smoothing_target(&self, mesh: &DynamicMesh, v: VertexId) -> Option<Point3<f64>> {
        one_ring_centroid(mesh, v)
    }

    /// Called at the end of each pass.
    fn end_pass(&mut self, _mesh: &DynamicMesh) {}

    /// A fatal error raised while handling the last notification.
    ///
    /// Polled after every committed edit; `Some` aborts the pass.
    fn take_error(&mut self) -> Option<MeshError> {
        None
    }
}

/// Whole-surface remeshing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl TopologyObserver for DefaultStrategy {}

impl RemeshStrategy for DefaultStrategy {}

/// Live edges visited by stepping through the id range with a prime stride.
///
/// The stride spreads consecutive edits over the surface. If the prime
/// divides the id range the stride falls back to 1.
pub fn prime_order_edges(mesh: &DynamicMesh) -> Vec<EdgeId> {
    let n = mesh.max_edge_id();
    if n == 0 {
        return Vec::new();
    }
    let step = if n % EDGE_ORDER_PRIME == 0 || EDGE_ORDER_PRIME % n == 0 {
        1
    } else {
        EDGE_ORDER_PRIME % n
    };
    let mut order = Vec::with_capacity(mesh.edge_count());
    let mut cur = 0;
    for _ in 0..n {
        let e = EdgeId::new(cur);
        if mesh.is_edge(e) {
            order.push(e);
        }
        cur = (cur + step) % n;
    }
    order
}

/// Uniform average of the neighbor positions.
pub fn one_ring_centroid(mesh: &DynamicMesh, v: VertexId) -> Option<Point3<f64>> {
    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for n in mesh.vertex_neighbors(v) {
        sum += mesh.position(n).coords;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(Point3::from(sum / count as f64))
    }
}

/// Move `pos` a step towards `target`, dropping the component along `normal`.
fn smoothed_position(
    pos: &Point3<f64>,
    target: &Point3<f64>,
    step: f64,
    normal: Option<&Vector3<f64>>,
) -> Point3<f64> {
    let mut displacement = target - pos;
    if let Some(normal) = normal {
        displacement -= normal * normal.dot(&displacement);
    }
    pos + displacement * step
}

/// Unit normals of every vertex slot; dead slots get zero.
fn compute_vertex_normals(mesh: &DynamicMesh, parallel: bool) -> Vec<Vector3<f64>> {
    let normal = |i: usize| {
        let v = VertexId::new(i);
        if mesh.is_vertex(v) {
            mesh.vertex_normal(v)
        } else {
            Vector3::zeros()
        }
    };
    if parallel {
        (0..mesh.max_vertex_id()).into_par_iter().map(normal).collect()
    } else {
        (0..mesh.max_vertex_id()).map(normal).collect()
    }
}

/// Check if a quad is convex.
fn is_convex_quad(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> bool {
    let v01 = p1 - p0;
    let v12 = p2 - p1;
    let v23 = p3 - p2;
    let v30 = p0 - p3;

    let n0 = v01.cross(&(-v30));
    let n1 = v12.cross(&(-v01));
    let n2 = v23.cross(&(-v12));
    let n3 = v30.cross(&(-v23));

    n0.dot(&n1) > 0.0 && n1.dot(&n2) > 0.0 && n2.dot(&n3) > 0.0
}

#[inline]
fn target_valence(mesh: &DynamicMesh, v: VertexId) -> i32 {
    if mesh.is_boundary_vertex(v) {
        4
    } else {
        6
    }
}

/// True if flipping `(a, b)` to `(c, d)` lowers the total valence deviation.
fn flip_improves_valence(mesh: &DynamicMesh, a: VertexId, b: VertexId, c: VertexId, d: VertexId) -> bool {
    let val = |v: VertexId| mesh.valence(v) as i32;
    let dev = |v: VertexId, delta: i32| (val(v) + delta - target_valence(mesh, v)).abs();

    let before = dev(a, 0) + dev(b, 0) + dev(c, 0) + dev(d, 0);
    let after = dev(a, -1) + dev(b, -1) + dev(c, 1) + dev(d, 1);
    after < before
}

fn normal_of(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Vector3<f64> {
    (p1 - p0).cross(&(p2 - p0))
}

/// True if moving `keep` and `removed` to `pos` inverts or flattens a surviving triangle.
fn collapse_flips_normals(mesh: &DynamicMesh, keep: VertexId, removed: VertexId, pos: &Point3<f64>) -> bool {
    let mut triangles: Vec<TriangleId> = mesh.vertex_triangles(keep);
    triangles.extend(mesh.vertex_triangles(removed));
    triangles.sort_unstable();
    triangles.dedup();

    for t in triangles {
        let tri = mesh.triangle(t);
        if tri.contains(&keep) && tri.contains(&removed) {
            continue;
        }
        let before = mesh.triangle_positions(t);
        let after = tri.map(|v| if v == keep || v == removed { *pos } else { *mesh.position(v) });
        let n0 = normal_of(&before[0], &before[1], &before[2]);
        let n1 = normal_of(&after[0], &after[1], &after[2]);
        if n1.norm_squared() < 1e-24 || n0.dot(&n1) <= 0.0 {
            return true;
        }
    }
    false
}

/// True if the flipped pair `(c, d, b)`, `(d, c, a)` faces away from the original pair.
fn flip_flips_normals(mesh: &DynamicMesh, e: EdgeId, a: VertexId, b: VertexId, c: VertexId, d: VertexId) -> bool {
    let [t0, t1] = mesh.edge_triangles(e);
    let before = mesh.triangle_normal(t0) + mesh.triangle_normal(t1);
    let p = |v: VertexId| *mesh.position(v);
    let n0 = normal_of(&p(c), &p(d), &p(b));
    let n1 = normal_of(&p(d), &p(c), &p(a));
    n0.norm_squared() < 1e-24 || n1.norm_squared() < 1e-24 || n0.dot(&before) <= 0.0 || n1.dot(&before) <= 0.0
}

/// Importance of keeping a vertex in place during a collapse.
fn anchor_rank(mesh: &DynamicMesh, constraints: &MeshConstraints, v: VertexId) -> u8 {
    match constraints.vertex_constraint(v) {
        Some(c) if c.fixed => 3,
        Some(c) if c.target.is_some() => 2,
        _ if mesh.is_boundary_vertex(v) => 1,
        _ => 0,
    }
}

/// Local remeshing driver.
///
/// See the [module documentation](self) for the pass pipeline.
pub struct Remesher<'a, S: RemeshStrategy = DefaultStrategy> {
    mesh: &'a mut DynamicMesh,
    options: RemeshOptions,
    constraints: MeshConstraints,
    strategy: S,
    projection: Option<TargetRef>,
    observers: Vec<Box<dyn TopologyObserver + 'a>>,
    normals: Vec<Vector3<f64>>,
}

impl<'a> Remesher<'a, DefaultStrategy> {
    /// Remesh the whole surface.
    pub fn new(mesh: &'a mut DynamicMesh, options: RemeshOptions) -> Self {
        Self::with_strategy(mesh, options, DefaultStrategy)
    }
}

impl<'a, S: RemeshStrategy> Remesher<'a, S> {
    /// Remesh with a custom strategy.
    pub fn with_strategy(mesh: &'a mut DynamicMesh, options: RemeshOptions, strategy: S) -> Self {
        Self {
            mesh,
            options,
            constraints: MeshConstraints::new(),
            strategy,
            projection: None,
            observers: Vec::new(),
            normals: Vec::new(),
        }
    }

    /// Use the given constraint table.
    pub fn with_constraints(mut self, constraints: MeshConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Project every unconstrained vertex onto `target` after smoothing.
    pub fn with_projection_target(mut self, target: TargetRef) -> Self {
        self.projection = Some(target);
        self
    }

    /// Register an observer; observers are notified in registration order.
    pub fn add_observer(&mut self, observer: Box<dyn TopologyObserver + 'a>) {
        self.observers.push(observer);
    }

    /// The mesh being remeshed.
    pub fn mesh(&self) -> &DynamicMesh {
        self.mesh
    }

    /// The options in use.
    pub fn options(&self) -> &RemeshOptions {
        &self.options
    }

    /// The constraint table, kept in sync with edits.
    pub fn constraints(&self) -> &MeshConstraints {
        &self.constraints
    }

    /// Mutable access to the constraint table.
    pub fn constraints_mut(&mut self) -> &mut MeshConstraints {
        &mut self.constraints
    }

    /// The strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Release the strategy and constraint table.
    pub fn into_parts(self) -> (S, MeshConstraints) {
        (self.strategy, self.constraints)
    }

    /// Run all configured passes.
    pub fn run(&mut self) -> Result<RemeshStats> {
        self.options.validate()?;
        if self.options.preserve_boundary {
            fix_all_boundary(self.mesh, &mut self.constraints);
        }

        let mut stats = RemeshStats::default();
        for pass in 0..self.options.passes {
            let pass_stats = self.run_pass()?;
            log::debug!(
                "remesh pass {}: {} splits, {} collapses, {} flips, {} smoothed, {} projected",
                pass,
                pass_stats.splits,
                pass_stats.collapses,
                pass_stats.flips,
                pass_stats.smoothed,
                pass_stats.projected
            );
            stats += pass_stats;
        }
        Ok(stats)
    }

    /// Run a single pass.
    pub fn run_pass(&mut self) -> Result<RemeshStats> {
        let mut stats = RemeshStats {
            passes: 1,
            ..RemeshStats::default()
        };

        self.precompute();
        self.strategy.precompute(self.mesh);

        if let Err(err) = self.edge_pass(&mut stats) {
            log::warn!("remesh pass aborted: {}", err);
            return Err(err);
        }

        if self.options.enable_smoothing && self.options.smooth_step > 0.0 {
            stats.smoothed = self.smooth_pass();
        }
        stats.projected = self.project_pass();

        self.strategy.end_pass(self.mesh);
        Ok(stats)
    }

    fn tracks_normals(&self) -> bool {
        self.options.enable_smoothing && self.options.tangential_smoothing
    }

    fn precompute(&mut self) {
        if self.tracks_normals() {
            self.normals = compute_vertex_normals(self.mesh, self.options.parallel);
        } else {
            self.normals.clear();
        }
    }

    /// Recompute cached normals of vertices whose incident triangles changed.
    fn refresh_normals(&mut self, vertices: &[VertexId]) {
        if !self.tracks_normals() {
            return;
        }
        let mesh: &DynamicMesh = &*self.mesh;
        if self.normals.len() < mesh.max_vertex_id() {
            self.normals.resize(mesh.max_vertex_id(), Vector3::zeros());
        }
        for &v in vertices {
            self.normals[v.index()] = mesh.vertex_normal(v);
        }
    }

    /// `center` and its one-ring.
    fn ring(&self, center: VertexId) -> Vec<VertexId> {
        let mut ring = vec![center];
        ring.extend(self.mesh.vertex_neighbors(center));
        ring
    }

    fn strategy_error(&mut self) -> Result<()> {
        match self.strategy.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn edge_pass(&mut self, stats: &mut RemeshStats) -> Result<()> {
        let candidates = self.strategy.edge_candidates(self.mesh);
        let flips = self.options.enable_flips && self.strategy.allow_flips();

        for e in candidates {
            if !self.mesh.is_edge(e) || !self.strategy.is_candidate(self.mesh, e) {
                continue;
            }
            let length = self.strategy.edge_length(self.mesh, e);
            let attempt = if self.options.enable_collapses && length < self.options.min_edge_length {
                self.try_collapse(e).map(|done| {
                    stats.collapses += done as usize;
                })
            } else if self.options.enable_splits && length > self.options.max_edge_length {
                self.try_split(e).map(|done| {
                    stats.splits += done as usize;
                })
            } else if flips {
                self.try_flip(e).map(|done| {
                    stats.flips += done as usize;
                })
            } else {
                Ok(())
            };

            match attempt {
                Ok(()) => {}
                Err(err) if !err.is_fatal() => log::trace!("skipped {}: {}", e, err),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn try_collapse(&mut self, e: EdgeId) -> Result<bool> {
        let [a, b] = self.mesh.edge_vertices(e);
        if !self.constraints.can_collapse(e, a, b) {
            return Ok(false);
        }

        let rank_a = anchor_rank(self.mesh, &self.constraints, a);
        let rank_b = anchor_rank(self.mesh, &self.constraints, b);
        let (keep, removed) = if rank_b > rank_a { (b, a) } else { (a, b) };
        // equal ranks meet halfway, attributes included
        let merged = if rank_a != rank_b || rank_a == 3 {
            None
        } else {
            Some(VertexInfo::lerp(
                self.mesh.vertex_info(keep),
                self.mesh.vertex_info(removed),
                0.5,
            ))
        };
        let pos = merged
            .as_ref()
            .map_or(*self.mesh.position(keep), |info| info.position);

        if !self.strategy.allow_collapse(self.mesh, e, keep, removed) {
            return Ok(false);
        }

        // no resulting edge may exceed the split threshold
        let max = self.options.max_edge_length;
        let too_long = self
            .mesh
            .vertex_neighbors(keep)
            .chain(self.mesh.vertex_neighbors(removed))
            .filter(|&n| n != keep && n != removed)
            .any(|n| (self.mesh.position(n) - pos).norm() > max);
        if too_long {
            return Ok(false);
        }

        // a constrained wing edge would be merged away
        for x in self.mesh.edge_opposite_vertices(e) {
            if !x.is_valid() {
                continue;
            }
            let lost = self.mesh.find_edge(removed, x);
            let kept = self.mesh.find_edge(keep, x);
            let lost_constrained = lost.map_or(false, |w| self.constraints.edge_constraint(w).is_some());
            let kept_constrained = kept.map_or(false, |w| self.constraints.edge_constraint(w).is_some());
            if lost_constrained && !kept_constrained {
                return Ok(false);
            }
        }

        if self.options.prevent_normal_flips && collapse_flips_normals(self.mesh, keep, removed, &pos) {
            return Ok(false);
        }

        let info = self.mesh.collapse_edge(e, keep)?;
        if let Some(merged) = merged {
            self.mesh.set_vertex_info(keep, merged);
        }
        let ring = self.ring(keep);
        self.refresh_normals(&ring);

        self.constraints.clear_vertex(info.removed_vertex);
        self.constraints.clear_edge(info.collapsed_edge);
        for w in info.removed_edges {
            if w.is_valid() {
                self.constraints.clear_edge(w);
            }
        }

        self.strategy.on_collapse(self.mesh, &info);
        for observer in &mut self.observers {
            observer.on_collapse(self.mesh, &info);
        }
        self.strategy_error()?;
        Ok(true)
    }

    fn try_split(&mut self, e: EdgeId) -> Result<bool> {
        if !self.constraints.can_split(e) {
            return Ok(false);
        }

        let info = self.mesh.split_edge(e)?;

        if let Some(constraint) = self.constraints.edge_constraint(e).cloned() {
            if let Some(target) = constraint.target.clone() {
                self.constraints
                    .set_vertex_constraint(info.new_vertex, VertexConstraint::sliding(target));
            }
            self.constraints.set_edge_constraint(info.new_edge, constraint);
        }
        let ring = self.ring(info.new_vertex);
        self.refresh_normals(&ring);

        self.strategy.on_split(self.mesh, &info);
        for observer in &mut self.observers {
            observer.on_split(self.mesh, &info);
        }
        self.strategy_error()?;
        Ok(true)
    }

    fn try_flip(&mut self, e: EdgeId) -> Result<bool> {
        if !self.constraints.can_flip(e) || self.mesh.is_boundary_edge(e) {
            return Ok(false);
        }
        let [a, b] = self.mesh.edge_vertices(e);
        let [c, d] = self.mesh.edge_opposite_vertices(e);
        if !c.is_valid() || !d.is_valid() || self.mesh.find_edge(c, d).is_some() {
            return Ok(false);
        }
        if !flip_improves_valence(self.mesh, a, b, c, d) {
            return Ok(false);
        }
        let p = |v: VertexId| self.mesh.position(v);
        if !is_convex_quad(p(a), p(c), p(b), p(d)) {
            return Ok(false);
        }
        if self.options.prevent_normal_flips {
            let [oa, ob] = self.mesh.oriented_edge_vertices(e);
            let [oc, od] = self.mesh.edge_opposite_vertices(e);
            if flip_flips_normals(self.mesh, e, oa, ob, oc, od) {
                return Ok(false);
            }
        }

        let info = self.mesh.flip_edge(e)?;
        self.refresh_normals(&[a, b, c, d]);
        self.strategy.on_flip(self.mesh, &info);
        for observer in &mut self.observers {
            observer.on_flip(self.mesh, &info);
        }
        self.strategy_error()?;
        Ok(true)
    }

    fn smooth_pass(&mut self) -> usize {
        let candidates: Vec<VertexId> = self
            .strategy
            .smooth_candidates(self.mesh)
            .into_iter()
            .filter(|&v| {
                self.mesh.is_vertex(v)
                    && !self.constraints.is_fixed(v)
                    && (!self.mesh.is_boundary_vertex(v) || self.constraints.vertex_target(v).is_some())
            })
            .collect();

        let mesh: &DynamicMesh = &*self.mesh;
        let strategy = &self.strategy;
        let step = self.options.smooth_step;
        let normals = self.tracks_normals().then_some(&self.normals);
        let compute = |&v: &VertexId| {
            strategy.smoothing_target(mesh, v).map(|target| {
                let normal = normals.and_then(|n| n.get(v.index()));
                (v, smoothed_position(mesh.position(v), &target, step, normal))
            })
        };

        let moves: Vec<(VertexId, Point3<f64>)> = if self.options.parallel {
            candidates.par_iter().filter_map(compute).collect()
        } else {
            candidates.iter().filter_map(compute).collect()
        };

        for &(v, pos) in &moves {
            self.mesh.set_position(v, pos);
        }
        moves.len()
    }

    fn project_pass(&mut self) -> usize {
        let mut moves: Vec<(VertexId, Point3<f64>)> = self
            .constraints
            .vertices()
            .filter(|(v, c)| !c.fixed && self.mesh.is_vertex(*v))
            .filter_map(|(v, c)| c.target.as_ref().map(|t| (v, t.project(self.mesh.position(v)))))
            .collect();

        if let Some(target) = &self.projection {
            let mesh: &DynamicMesh = &*self.mesh;
            let constraints = &self.constraints;
            let free = |v: VertexId| !constraints.is_constrained(v);
            let global: Vec<(VertexId, Point3<f64>)> = if self.options.parallel {
                mesh.vertex_ids()
                    .collect::<Vec<_>>()
                    .into_par_iter()
                    .filter(|&v| free(v))
                    .map(|v| (v, target.project(mesh.position(v))))
                    .collect()
            } else {
                mesh.vertex_ids()
                    .filter(|&v| free(v))
                    .map(|v| (v, target.project(mesh.position(v))))
                    .collect()
            };
            moves.extend(global);
        }

        for &(v, pos) in &moves {
            self.mesh.set_position(v, pos);
        }
        moves.len()
    }
}
