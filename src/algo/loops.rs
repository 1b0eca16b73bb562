//! Boundary loop extraction and edge loop/span containers.
//!
//! Boundary loops are traced along oriented boundary edges, so each loop
//! runs in the winding direction of its adjacent triangles (for
//! counter-clockwise faces the surface lies to the left of the walk).
//!
//! A boundary vertex must have exactly two boundary edges. One boundary
//! edge means the adjacency is corrupt and tracing fails with
//! [`MeshError::BrokenBoundary`]; more than two is a bowtie vertex, which
//! is not handled and yields [`MeshError::Unsupported`].

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::{DynamicMesh, EdgeId, VertexId};

/// A closed cycle of vertices; `edges[i]` joins `vertices[i]` and `vertices[i + 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeLoop {
    /// Ordered loop vertices.
    pub vertices: Vec<VertexId>,
    /// Loop edges, the last one closing the cycle.
    pub edges: Vec<EdgeId>,
}

impl EdgeLoop {
    /// Wrap existing vertex and edge sequences.
    pub fn new(vertices: Vec<VertexId>, edges: Vec<EdgeId>) -> Self {
        Self { vertices, edges }
    }

    /// Build a loop from its vertex cycle, looking up each edge.
    pub fn from_vertices(mesh: &DynamicMesh, vertices: Vec<VertexId>) -> Result<Self> {
        let edges = cycle_edges(mesh, &vertices, true)?;
        Ok(Self { vertices, edges })
    }

    /// Number of loop vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of loop edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// True if every loop edge is a boundary edge.
    pub fn is_boundary_loop(&self, mesh: &DynamicMesh) -> bool {
        self.edges.iter().all(|&e| mesh.is_edge(e) && mesh.is_boundary_edge(e))
    }

    /// True if `v` is on the loop.
    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.vertices.contains(&v)
    }

    /// True if `e` is on the loop.
    pub fn contains_edge(&self, e: EdgeId) -> bool {
        self.edges.contains(&e)
    }

    /// Reverse the walking direction.
    pub fn reverse(&mut self) {
        self.vertices.reverse();
        self.edges.reverse();
        if !self.edges.is_empty() {
            self.edges.rotate_left(1);
        }
    }

    /// Current positions of the loop vertices.
    pub fn positions(&self, mesh: &DynamicMesh) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|&v| *mesh.position(v)).collect()
    }

    /// Verify that every edge is live and joins consecutive vertices.
    pub fn check_validity(&self, mesh: &DynamicMesh) -> Result<()> {
        check_chain(mesh, &self.vertices, &self.edges, true)
    }

    /// Position-based comparison with a loop that may live in another mesh.
    ///
    /// An anchor is the first vertex of `self` with exactly one
    /// within-`tolerance` match in `other`. From the anchors both loops are
    /// walked in step (and, with `check_reversed`, with `other` walked
    /// backwards); every aligned pair must match.
    pub fn is_same_loop(
        &self,
        mesh: &DynamicMesh,
        other: &EdgeLoop,
        other_mesh: &DynamicMesh,
        check_reversed: bool,
        tolerance: f64,
    ) -> bool {
        let n = self.vertices.len();
        if n != other.vertices.len() {
            return false;
        }
        if n == 0 {
            return true;
        }
        let ours = self.positions(mesh);
        let theirs = other.positions(other_mesh);
        let close = |p: &Point3<f64>, q: &Point3<f64>| (p - q).norm() <= tolerance;

        let anchor = ours.iter().enumerate().find_map(|(i, p)| {
            let mut matches = theirs.iter().enumerate().filter(|(_, q)| close(p, q));
            match (matches.next(), matches.next()) {
                (Some((j, _)), None) => Some((i, j)),
                _ => None,
            }
        });
        let Some((i, j)) = anchor else {
            return false;
        };

        let forward = (0..n).all(|k| close(&ours[(i + k) % n], &theirs[(j + k) % n]));
        if forward || !check_reversed {
            return forward;
        }
        (0..n).all(|k| close(&ours[(i + k) % n], &theirs[(j + n - k) % n]))
    }
}

/// An open chain of vertices; `edges[i]` joins `vertices[i]` and `vertices[i + 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSpan {
    /// Ordered span vertices.
    pub vertices: Vec<VertexId>,
    /// Span edges, one fewer than the vertices.
    pub edges: Vec<EdgeId>,
}

impl EdgeSpan {
    /// Build a span from its vertex chain, looking up each edge.
    pub fn from_vertices(mesh: &DynamicMesh, vertices: Vec<VertexId>) -> Result<Self> {
        let edges = cycle_edges(mesh, &vertices, false)?;
        Ok(Self { vertices, edges })
    }

    /// Number of span vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of span edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// True if every span edge is a boundary edge.
    pub fn is_boundary_span(&self, mesh: &DynamicMesh) -> bool {
        self.edges.iter().all(|&e| mesh.is_edge(e) && mesh.is_boundary_edge(e))
    }

    /// Reverse the walking direction.
    pub fn reverse(&mut self) {
        self.vertices.reverse();
        self.edges.reverse();
    }

    /// Current positions of the span vertices.
    pub fn positions(&self, mesh: &DynamicMesh) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|&v| *mesh.position(v)).collect()
    }

    /// Verify that every edge is live and joins consecutive vertices.
    pub fn check_validity(&self, mesh: &DynamicMesh) -> Result<()> {
        check_chain(mesh, &self.vertices, &self.edges, false)
    }

    /// Positional span comparison is not implemented.
    pub fn is_same_span(
        &self,
        _mesh: &DynamicMesh,
        _other: &EdgeSpan,
        _other_mesh: &DynamicMesh,
        _check_reversed: bool,
        _tolerance: f64,
    ) -> Result<bool> {
        Err(MeshError::Unsupported("positional edge span comparison"))
    }
}

fn cycle_edges(mesh: &DynamicMesh, vertices: &[VertexId], closed: bool) -> Result<Vec<EdgeId>> {
    let n = vertices.len();
    let count = if closed { n } else { n.saturating_sub(1) };
    (0..count)
        .map(|i| {
            let (a, b) = (vertices[i], vertices[(i + 1) % n]);
            mesh.find_edge(a, b).ok_or(MeshError::MissingEdge { v0: a, v1: b })
        })
        .collect()
}

fn check_chain(mesh: &DynamicMesh, vertices: &[VertexId], edges: &[EdgeId], closed: bool) -> Result<()> {
    let n = vertices.len();
    let expected = if closed { n } else { n.saturating_sub(1) };
    if edges.len() != expected {
        return Err(MeshError::InvalidState(format!(
            "{} vertices but {} edges",
            n,
            edges.len()
        )));
    }
    for (i, &e) in edges.iter().enumerate() {
        let (a, b) = (vertices[i], vertices[(i + 1) % n]);
        if !mesh.is_edge(e) {
            return Err(MeshError::InvalidEdge(e));
        }
        let edge = mesh.edge(e);
        if !edge.has_vertex(a) || !edge.has_vertex(b) {
            return Err(MeshError::MissingEdge { v0: a, v1: b });
        }
    }
    Ok(())
}

/// Trace every boundary loop of the mesh.
///
/// The loops are disjoint and together cover every boundary edge exactly
/// once.
pub fn boundary_loops(mesh: &DynamicMesh) -> Result<Vec<EdgeLoop>> {
    let boundary: Vec<EdgeId> = mesh.boundary_edge_ids().collect();
    if boundary.is_empty() {
        return Ok(Vec::new());
    }

    // every boundary vertex needs exactly two boundary edges
    let mut counts = vec![0usize; mesh.max_vertex_id()];
    for &e in &boundary {
        for v in mesh.edge_vertices(e) {
            counts[v.index()] += 1;
        }
    }
    for (i, &count) in counts.iter().enumerate() {
        match count {
            0 | 2 => {}
            1 => {
                return Err(MeshError::BrokenBoundary {
                    vertex: VertexId::new(i),
                    boundary_edges: count,
                })
            }
            _ => return Err(MeshError::Unsupported("bowtie boundary vertex")),
        }
    }

    let mut visited = vec![false; mesh.max_edge_id()];
    let mut loops = Vec::new();

    for &seed in &boundary {
        if visited[seed.index()] {
            continue;
        }
        let mut vertices = Vec::new();
        let mut edges = Vec::new();
        let mut e = seed;

        loop {
            if edges.len() > boundary.len() {
                return Err(MeshError::InvalidState(format!(
                    "boundary walk from {seed} did not close"
                )));
            }
            visited[e.index()] = true;
            let [v0, v1] = mesh.oriented_edge_vertices(e);
            vertices.push(v0);
            edges.push(e);

            let next = next_boundary_edge(mesh, v1, e)?;
            if next == seed {
                break;
            }
            if visited[next.index()] {
                return Err(MeshError::InvalidState(format!(
                    "boundary walk from {seed} re-entered {next}"
                )));
            }
            if mesh.oriented_edge_vertices(next)[0] != v1 {
                return Err(MeshError::InvalidState(format!(
                    "boundary edge {next} is wound against {e}"
                )));
            }
            e = next;
        }

        log::trace!("traced boundary loop of {} edges", edges.len());
        loops.push(EdgeLoop { vertices, edges });
    }

    Ok(loops)
}

/// The boundary edge at `v` other than `from`.
fn next_boundary_edge(mesh: &DynamicMesh, v: VertexId, from: EdgeId) -> Result<EdgeId> {
    let mut candidates = mesh
        .vertex_edges(v)
        .iter()
        .copied()
        .filter(|&e| e != from && mesh.is_boundary_edge(e));
    match (candidates.next(), candidates.next()) {
        (Some(e), None) => Ok(e),
        (None, _) => Err(MeshError::BrokenBoundary {
            vertex: v,
            boundary_edges: 1,
        }),
        (Some(_), Some(_)) => Err(MeshError::Unsupported("bowtie boundary vertex")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::{create_grid_mesh, hemisphere, quad, uv_sphere};
    use crate::mesh::{build_from_triangles, TriangleId};
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_closed_mesh_has_no_loops() {
        let mesh = uv_sphere(4, 8);
        assert!(boundary_loops(&mesh).unwrap().is_empty());
    }

    #[test]
    fn test_grid_single_loop() {
        let mesh = create_grid_mesh(4);
        let loops = boundary_loops(&mesh).unwrap();
        assert_eq!(loops.len(), 1);
        let l = &loops[0];
        assert_eq!(l.vertex_count(), 16);
        assert_eq!(l.edge_count(), 16);
        assert!(l.is_boundary_loop(&mesh));
        l.check_validity(&mesh).unwrap();
    }

    #[test]
    fn test_hemisphere_equator_loop() {
        let (rings, segments) = (4, 10);
        let mesh = hemisphere(rings, segments);
        let loops = boundary_loops(&mesh).unwrap();
        assert_eq!(loops.len(), 1);
        let l = &loops[0];
        assert_eq!(l.vertex_count(), segments);
        assert_eq!(l.edge_count(), segments);
        assert!(l.is_boundary_loop(&mesh));

        let first = 1 + (rings - 1) * segments;
        let mut ids: Vec<usize> = l.vertices.iter().map(|v| v.index()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (first..first + segments).collect::<Vec<_>>());
        for p in l.positions(&mesh) {
            assert!(p.z.abs() < 1e-12);
        }
    }

    #[test]
    fn test_loop_follows_winding() {
        let mesh = quad();
        let loops = boundary_loops(&mesh).unwrap();
        let l = &loops[0];
        // counter-clockwise faces give a counter-clockwise boundary
        let p = l.positions(&mesh);
        let mut area = 0.0;
        for i in 0..p.len() {
            let q = p[(i + 1) % p.len()];
            area += p[i].x * q.y - q.x * p[i].y;
        }
        assert!(area > 0.0);
        for (i, &e) in l.edges.iter().enumerate() {
            assert_eq!(mesh.oriented_edge_vertices(e)[0], l.vertices[i]);
        }
    }

    #[test]
    fn test_two_loops_on_annulus() {
        // 3x3 grid with the center cell removed
        let mut mesh = create_grid_mesh(3);
        mesh.remove_triangle(TriangleId::new(8), false).unwrap();
        mesh.remove_triangle(TriangleId::new(9), false).unwrap();
        let loops = boundary_loops(&mesh).unwrap();
        assert_eq!(loops.len(), 2);
        let total: usize = loops.iter().map(|l| l.edge_count()).sum();
        assert_eq!(total, mesh.boundary_edge_ids().count());
        let mut lengths: Vec<usize> = loops.iter().map(|l| l.edge_count()).collect();
        lengths.sort_unstable();
        assert_eq!(lengths, vec![4, 12]);
    }

    #[test]
    fn test_bowtie_is_unsupported() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.0),
            Point3::new(-1.0, -1.0, 0.0),
        ];
        let mesh = build_from_triangles(&vertices, &[[0, 1, 2], [0, 3, 4]]).unwrap();
        let err = boundary_loops(&mesh).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_reverse_keeps_edges_aligned() {
        let mesh = create_grid_mesh(2);
        let mut l = boundary_loops(&mesh).unwrap().remove(0);
        l.reverse();
        l.check_validity(&mesh).unwrap();
        assert_eq!(l.edge_count(), 8);
    }

    #[test]
    fn test_from_vertices_missing_edge() {
        let mesh = create_grid_mesh(2);
        let err = EdgeLoop::from_vertices(&mesh, vec![VertexId::new(0), VertexId::new(8), VertexId::new(2)])
            .unwrap_err();
        assert!(matches!(err, MeshError::MissingEdge { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_is_same_loop_across_meshes() {
        let a = hemisphere(2, 10);
        let mut b = hemisphere(3, 10);
        let la = boundary_loops(&a).unwrap().remove(0);
        let lb = boundary_loops(&b).unwrap().remove(0);
        assert!(la.is_same_loop(&a, &lb, &b, false, 1e-9));

        let mut reversed = lb.clone();
        reversed.reverse();
        assert!(!la.is_same_loop(&a, &reversed, &b, false, 1e-9));
        assert!(la.is_same_loop(&a, &reversed, &b, true, 1e-9));

        // move one vertex of the second loop away
        let v = lb.vertices[3];
        let p = *b.position(v) + Vector3::new(0.0, 0.0, 0.5);
        b.set_position(v, p);
        assert!(!la.is_same_loop(&a, &lb, &b, true, 1e-9));
    }

    #[test]
    fn test_is_same_loop_length_mismatch() {
        let a = hemisphere(2, 10);
        let b = hemisphere(2, 12);
        let la = boundary_loops(&a).unwrap().remove(0);
        let lb = boundary_loops(&b).unwrap().remove(0);
        assert!(!la.is_same_loop(&a, &lb, &b, true, 1e-9));
    }

    #[test]
    fn test_span_equality_unsupported() {
        let mesh = create_grid_mesh(2);
        let span = EdgeSpan::from_vertices(&mesh, vec![VertexId::new(0), VertexId::new(1), VertexId::new(2)]).unwrap();
        assert_eq!(span.edge_count(), 2);
        assert!(span.is_boundary_span(&mesh));
        let err = span.is_same_span(&mesh, &span, &mesh, true, 1e-6).unwrap_err();
        assert!(err.is_unsupported());
    }
}
