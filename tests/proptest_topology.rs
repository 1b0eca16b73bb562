//! Property-based tests for topology edits and queries.
//!
//! Run with: cargo test --test proptest_topology

use std::collections::HashSet;

use dynmesh::algo::constraints::fix_all_boundary;
use dynmesh::prelude::*;
use nalgebra::Point3;
use proptest::prelude::*;

// =============================================================================
// Helpers
// =============================================================================

fn grid(n: usize) -> DynamicMesh {
    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    for j in 0..=n {
        for i in 0..=n {
            vertices.push(Point3::new(i as f64, j as f64, 0.0));
        }
    }
    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + n + 1;
            let v11 = v01 + 1;
            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }
    build_from_triangles(&vertices, &faces).unwrap()
}

fn triangle_set(mesh: &DynamicMesh) -> Vec<[VertexId; 3]> {
    let mut triangles: Vec<[VertexId; 3]> = mesh
        .triangle_ids()
        .map(|t| {
            let mut tri = mesh.triangle(t);
            tri.sort_unstable();
            tri
        })
        .collect();
    triangles.sort_unstable();
    triangles
}

fn euler(mesh: &DynamicMesh) -> i64 {
    mesh.vertex_count() as i64 - mesh.edge_count() as i64 + mesh.triangle_count() as i64
}

/// A grid size and a mask picking triangles of it.
fn arb_grid_selection() -> impl Strategy<Value = (usize, Vec<bool>)> {
    (2usize..7).prop_flat_map(|n| (Just(n), prop::collection::vec(any::<bool>(), 2 * n * n)))
}

fn picked(mask: &[bool]) -> Vec<TriangleId> {
    mask.iter()
        .enumerate()
        .filter(|(_, &keep)| keep)
        .map(|(i, _)| TriangleId::new(i))
        .collect()
}

// =============================================================================
// Property Tests: Queries
// =============================================================================

proptest! {
    /// Components partition the live triangles, and neighbors share a component.
    #[test]
    fn components_partition_triangles((n, mask) in arb_grid_selection()) {
        let mut mesh = grid(n);
        mesh.remove_triangles(&picked(&mask), false).unwrap();

        let cc = ConnectedComponents::find(&mesh);
        let total: usize = cc.iter().map(|c| c.len()).sum();
        prop_assert_eq!(total, mesh.triangle_count());

        let mut seen = HashSet::new();
        for (i, component) in cc.components().iter().enumerate() {
            for &t in &component.triangles {
                prop_assert!(seen.insert(t));
                prop_assert_eq!(cc.component_of(t), Some(i));
                for nb in mesh.triangle_neighbors(t) {
                    if nb.is_valid() {
                        prop_assert_eq!(cc.component_of(nb), Some(i));
                    }
                }
            }
        }
    }

    /// Traced loops cover exactly the boundary edges; bowties are reported, never mis-traced.
    #[test]
    fn loops_cover_boundary((n, mask) in arb_grid_selection()) {
        let mut mesh = grid(n);
        mesh.remove_triangles(&picked(&mask), false).unwrap();

        match boundary_loops(&mesh) {
            Ok(loops) => {
                let mut traced = HashSet::new();
                for edge_loop in &loops {
                    prop_assert!(edge_loop.check_validity(&mesh).is_ok());
                    for &e in &edge_loop.edges {
                        prop_assert!(traced.insert(e));
                    }
                }
                let boundary: HashSet<EdgeId> = mesh.boundary_edge_ids().collect();
                prop_assert_eq!(traced, boundary);
            }
            Err(err) => prop_assert!(err.is_unsupported(), "unexpected error {}", err),
        }
    }
}

// =============================================================================
// Property Tests: Edits
// =============================================================================

proptest! {
    /// Removing any triangle set and reverting restores ids, attributes and groups.
    #[test]
    fn remove_then_revert_restores((n, mask) in arb_grid_selection()) {
        let mut mesh = grid(n);
        for t in mesh.triangle_ids().collect::<Vec<_>>() {
            mesh.set_triangle_group(t, (t.index() % 3) as i32);
        }
        let vertices: Vec<(VertexId, VertexInfo)> =
            mesh.vertex_ids().map(|v| (v, mesh.vertex_info(v).clone())).collect();
        let triangles: Vec<(TriangleId, [VertexId; 3], i32)> = mesh
            .triangle_ids()
            .map(|t| (t, mesh.triangle(t), mesh.triangle_group(t)))
            .collect();

        let removal = TriangleRemoval::remove(&mut mesh, &picked(&mask)).unwrap();
        removal.revert(&mut mesh).unwrap();

        let vertices_after: Vec<(VertexId, VertexInfo)> =
            mesh.vertex_ids().map(|v| (v, mesh.vertex_info(v).clone())).collect();
        let triangles_after: Vec<(TriangleId, [VertexId; 3], i32)> = mesh
            .triangle_ids()
            .map(|t| (t, mesh.triangle(t), mesh.triangle_group(t)))
            .collect();
        prop_assert_eq!(vertices_after, vertices);
        prop_assert_eq!(triangles_after, triangles);
        prop_assert!(mesh.is_valid());
    }

    /// Splitting an interior edge and collapsing the new vertex away restores the triangles.
    #[test]
    fn split_then_collapse_restores(n in 2usize..6, pick in any::<prop::sample::Index>()) {
        let mut mesh = grid(n);
        let interior: Vec<EdgeId> = mesh.edge_ids().filter(|&e| !mesh.is_boundary_edge(e)).collect();
        let e = interior[pick.index(interior.len())];
        let before = triangle_set(&mesh);
        let counts = (mesh.vertex_count(), mesh.edge_count(), mesh.triangle_count());

        let split = mesh.split_edge(e).unwrap();
        prop_assert!(mesh.is_valid());
        prop_assert_eq!(mesh.valence(split.new_vertex), 4);

        let collapse = mesh.collapse_edge(split.edge, split.vertices[0]).unwrap();
        prop_assert_eq!(collapse.removed_vertex, split.new_vertex);
        prop_assert_eq!((mesh.vertex_count(), mesh.edge_count(), mesh.triangle_count()), counts);
        prop_assert_eq!(triangle_set(&mesh), before);
        prop_assert!(mesh.is_valid());
    }

    /// Any sequence of accepted flips and splits keeps the mesh valid and its Euler characteristic.
    #[test]
    fn random_edits_keep_validity(
        n in 2usize..6,
        ops in prop::collection::vec((any::<bool>(), any::<prop::sample::Index>()), 1..40),
    ) {
        let mut mesh = grid(n);
        for (flip, pick) in ops {
            let edges: Vec<EdgeId> = mesh.edge_ids().collect();
            let e = edges[pick.index(edges.len())];
            if flip {
                match mesh.flip_edge(e) {
                    Ok(_) => {}
                    Err(err) => prop_assert!(err.is_recoverable(), "flip failed with {}", err),
                }
            } else {
                mesh.split_edge(e).unwrap();
            }
            prop_assert!(mesh.is_valid());
            prop_assert_eq!(euler(&mesh), 1);
        }
    }
}

// =============================================================================
// Property Tests: Remeshing
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Pinned boundary vertices and fully constrained boundary edges survive remeshing untouched.
    #[test]
    fn constrained_boundary_survives(n in 2usize..5, target in 0.3f64..1.5, passes in 1usize..4) {
        let mut mesh = grid(n);
        let mut constraints = MeshConstraints::new();
        fix_all_boundary(&mesh, &mut constraints);

        let pinned: Vec<(VertexId, Point3<f64>)> =
            constraints.vertices().map(|(v, _)| (v, *mesh.position(v))).collect();
        let edges: Vec<(EdgeId, [VertexId; 2])> =
            constraints.edges().map(|(e, _)| (e, mesh.edge_vertices(e))).collect();

        let options = RemeshOptions::with_target_length(target)
            .with_passes(passes)
            .with_preserve_boundary(false);
        Remesher::new(&mut mesh, options)
            .with_constraints(constraints)
            .run()
            .unwrap();

        prop_assert!(mesh.is_valid());
        prop_assert_eq!(euler(&mesh), 1);
        for (v, p) in pinned {
            prop_assert!(mesh.is_vertex(v));
            prop_assert_eq!(*mesh.position(v), p);
        }
        for (e, verts) in edges {
            prop_assert!(mesh.is_edge(e));
            prop_assert_eq!(mesh.edge_vertices(e), verts);
        }
    }
}
