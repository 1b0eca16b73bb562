//! Remeshing restricted to a single edge loop.
//!
//! [`EdgeLoopStrategy`] only visits the edges of a tracked [`EdgeLoop`] and
//! never flips. Loop vertices are smoothed towards the midpoint of their
//! loop neighbors; a band of `band_rings` vertex rings around the loop is
//! smoothed with the ordinary one-ring centroid so the surrounding
//! triangles follow.
//!
//! The loop is kept current from split and collapse notifications. Edits
//! in the middle of the loop are patched locally; an edit touching the
//! closing edge (`vertices[n - 1] -> vertices[0]`) rebuilds the whole edge
//! list from the vertex cycle. A loop edge that cannot be found again is
//! reported as [`MeshError::MissingEdge`] and aborts the pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use nalgebra::Point3;

use crate::algo::constraints::{constrain_loop_to_target, MeshConstraints, PolylineTarget, TargetRef};
use crate::algo::loops::EdgeLoop;
use crate::error::{MeshError, Result};
use crate::mesh::{DynamicMesh, EdgeCollapseInfo, EdgeId, EdgeSplitInfo, VertexId};

use super::{one_ring_centroid, RemeshOptions, RemeshStats, RemeshStrategy, Remesher, TopologyObserver};

/// Strategy that remeshes one edge loop and a band around it.
#[derive(Debug, Clone)]
pub struct EdgeLoopStrategy {
    edge_loop: EdgeLoop,
    band_rings: usize,
    band: Vec<VertexId>,
    loop_index: HashMap<VertexId, usize>,
    loop_edges: HashSet<EdgeId>,
    error: Option<MeshError>,
}

impl EdgeLoopStrategy {
    /// Track `edge_loop`, smoothing `band_rings` rings around it.
    pub fn new(edge_loop: EdgeLoop, band_rings: usize) -> Self {
        let loop_edges = edge_loop.edges.iter().copied().collect();
        Self {
            edge_loop,
            band_rings,
            band: Vec::new(),
            loop_index: HashMap::new(),
            loop_edges,
            error: None,
        }
    }

    /// The loop as currently tracked.
    pub fn edge_loop(&self) -> &EdgeLoop {
        &self.edge_loop
    }

    /// Take the tracked loop.
    pub fn into_loop(self) -> EdgeLoop {
        self.edge_loop
    }

    /// Band vertices found by the last smoothing pass.
    pub fn band(&self) -> &[VertexId] {
        &self.band
    }

    /// Look up the edge joining `a` and `b`, recording a missing one.
    fn resolve(&mut self, mesh: &DynamicMesh, a: VertexId, b: VertexId) -> EdgeId {
        match mesh.find_edge(a, b) {
            Some(e) => e,
            None => {
                log::warn!("loop lost edge between {} and {}", a, b);
                self.error.get_or_insert(MeshError::MissingEdge { v0: a, v1: b });
                EdgeId::INVALID
            }
        }
    }

    fn rebuild_edges(&mut self, mesh: &DynamicMesh) {
        let n = self.edge_loop.vertices.len();
        let mut edges = Vec::with_capacity(n);
        for i in 0..n {
            let (a, b) = (self.edge_loop.vertices[i], self.edge_loop.vertices[(i + 1) % n]);
            edges.push(self.resolve(mesh, a, b));
        }
        self.loop_edges = edges.iter().copied().filter(|e| e.is_valid()).collect();
        self.edge_loop.edges = edges;
    }

    /// Re-resolve the two loop edges incident to `vertices[idx]`.
    fn repair_around(&mut self, mesh: &DynamicMesh, idx: usize) {
        let n = self.edge_loop.vertices.len();
        let prev = (idx + n - 1) % n;
        if prev == n - 1 || idx == n - 1 {
            self.rebuild_edges(mesh);
            return;
        }
        for k in [prev, idx] {
            let (a, b) = (self.edge_loop.vertices[k], self.edge_loop.vertices[k + 1]);
            let e = self.resolve(mesh, a, b);
            let old = std::mem::replace(&mut self.edge_loop.edges[k], e);
            self.loop_edges.remove(&old);
            if e.is_valid() {
                self.loop_edges.insert(e);
            }
        }
    }

    fn collect_band(&mut self, mesh: &DynamicMesh) {
        let mut visited: HashSet<VertexId> = self.edge_loop.vertices.iter().copied().collect();
        let mut frontier = self.edge_loop.vertices.clone();
        self.band.clear();

        for _ in 0..self.band_rings {
            let mut next = Vec::new();
            for &v in &frontier {
                for n in mesh.vertex_neighbors(v) {
                    if visited.insert(n) {
                        next.push(n);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            self.band.extend_from_slice(&next);
            frontier = next;
        }
    }
}

impl TopologyObserver for EdgeLoopStrategy {
    fn on_split(&mut self, mesh: &DynamicMesh, info: &EdgeSplitInfo) {
        if !self.loop_edges.contains(&info.edge) {
            return;
        }
        let i = match self.edge_loop.edges.iter().position(|&e| e == info.edge) {
            Some(i) => i,
            None => return,
        };
        let n = self.edge_loop.vertices.len();
        let f = info.new_vertex;

        if i == n - 1 {
            self.edge_loop.vertices.push(f);
            self.rebuild_edges(mesh);
            return;
        }

        // `info.edge` keeps the first oriented endpoint
        let (left, right) = if self.edge_loop.vertices[i] == info.vertices[0] {
            (info.edge, info.new_edge)
        } else {
            (info.new_edge, info.edge)
        };
        self.edge_loop.vertices.insert(i + 1, f);
        self.edge_loop.edges[i] = left;
        self.edge_loop.edges.insert(i + 1, right);
        self.loop_edges.insert(info.new_edge);
    }

    fn on_collapse(&mut self, mesh: &DynamicMesh, info: &EdgeCollapseInfo) {
        let removed = match self.edge_loop.vertices.iter().position(|&v| v == info.removed_vertex) {
            Some(i) => i,
            None => return,
        };

        match self.edge_loop.edges.iter().position(|&e| e == info.collapsed_edge) {
            Some(i) => {
                let n = self.edge_loop.vertices.len();
                self.edge_loop.vertices.remove(removed);
                if i == n - 1 {
                    self.rebuild_edges(mesh);
                    return;
                }
                self.edge_loop.edges.remove(i);
                self.loop_edges.remove(&info.collapsed_edge);
                if let Some(kept) = self.edge_loop.vertices.iter().position(|&v| v == info.kept_vertex) {
                    self.repair_around(mesh, kept);
                }
            }
            None => {
                // a loop vertex merged into an off-loop vertex
                self.edge_loop.vertices[removed] = info.kept_vertex;
                self.repair_around(mesh, removed);
            }
        }
    }
}

impl RemeshStrategy for EdgeLoopStrategy {
    fn edge_candidates(&mut self, mesh: &DynamicMesh) -> Vec<EdgeId> {
        self.edge_loop
            .edges
            .iter()
            .copied()
            .filter(|&e| mesh.is_edge(e))
            .collect()
    }

    fn is_candidate(&self, _mesh: &DynamicMesh, e: EdgeId) -> bool {
        self.loop_edges.contains(&e)
    }

    fn allow_flips(&self) -> bool {
        false
    }

    fn allow_collapse(&self, _mesh: &DynamicMesh, e: EdgeId, keep: VertexId, removed: VertexId) -> bool {
        let on_loop = self.loop_edges.contains(&e);
        if on_loop && self.edge_loop.vertex_count() <= 3 {
            return false;
        }
        // a chord between two loop vertices would pinch the loop
        on_loop || !(self.edge_loop.contains_vertex(keep) && self.edge_loop.contains_vertex(removed))
    }

    fn smooth_candidates(&mut self, mesh: &DynamicMesh) -> Vec<VertexId> {
        self.loop_index = self
            .edge_loop
            .vertices
            .iter()
            .enumerate()
            .map(|(i, &v)| (v, i))
            .collect();
        self.collect_band(mesh);

        let mut candidates = self.edge_loop.vertices.clone();
        candidates.extend_from_slice(&self.band);
        candidates
    }

    fn smoothing_target(&self, mesh: &DynamicMesh, v: VertexId) -> Option<Point3<f64>> {
        match self.loop_index.get(&v) {
            Some(&i) => {
                let vertices = &self.edge_loop.vertices;
                let n = vertices.len();
                let prev = mesh.position(vertices[(i + n - 1) % n]);
                let next = mesh.position(vertices[(i + 1) % n]);
                Some(nalgebra::center(prev, next))
            }
            None => one_ring_centroid(mesh, v),
        }
    }

    fn take_error(&mut self) -> Option<MeshError> {
        self.error.take()
    }

    fn end_pass(&mut self, _mesh: &DynamicMesh) {
        log::trace!(
            "loop now has {} vertices, band {}",
            self.edge_loop.vertex_count(),
            self.band.len()
        );
    }
}

/// Remesh the edges of `edge_loop` towards the target length in `options`.
///
/// Loop vertices, and vertices inserted on the loop, are projected onto
/// `target`, or onto a closed polyline through the loop's current
/// positions when no target is given. Flips are never attempted and the
/// boundary is not pinned. Returns the updated loop.
pub fn remesh_loop(
    mesh: &mut DynamicMesh,
    edge_loop: EdgeLoop,
    options: &RemeshOptions,
    band_rings: usize,
    target: Option<TargetRef>,
) -> Result<(EdgeLoop, RemeshStats)> {
    edge_loop.check_validity(mesh)?;
    let target: TargetRef = match target {
        Some(target) => target,
        None => Arc::new(PolylineTarget::from_loop(mesh, &edge_loop)),
    };

    let mut constraints = MeshConstraints::new();
    constrain_loop_to_target(&mut constraints, &edge_loop, target);

    let options = options.clone().with_preserve_boundary(false);
    let strategy = EdgeLoopStrategy::new(edge_loop, band_rings);
    let mut remesher = Remesher::with_strategy(mesh, options, strategy).with_constraints(constraints);
    let stats = remesher.run()?;
    let (strategy, _) = remesher.into_parts();

    let edge_loop = strategy.into_loop();
    edge_loop.check_validity(mesh)?;
    Ok((edge_loop, stats))
}
