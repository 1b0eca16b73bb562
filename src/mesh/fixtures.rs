//! Shared test meshes.

use std::f64::consts::PI;

use nalgebra::Point3;

use super::builder::build_from_triangles;
use super::dynamic::DynamicMesh;

/// Unit square split along the `0-2` diagonal.
pub fn quad() -> DynamicMesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    build_from_triangles(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap()
}

pub fn tetrahedron() -> DynamicMesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.5, 1.0, 0.0),
        Point3::new(0.5, 0.5, 1.0),
    ];
    let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
    build_from_triangles(&vertices, &faces).unwrap()
}

/// `n x n` grid of unit cells in the XY plane, two triangles per cell.
pub fn create_grid_mesh(n: usize) -> DynamicMesh {
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
            let v10 = j * (n + 1) + i + 1;
            let v01 = (j + 1) * (n + 1) + i;
            let v11 = (j + 1) * (n + 1) + i + 1;

            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }

    build_from_triangles(&vertices, &faces).unwrap()
}

fn ring_point(theta: f64, phi: f64) -> Point3<f64> {
    Point3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
}

/// Pushes `rings` rings of `segments` vertices and the band triangles between them.
fn push_bands(
    vertices: &mut Vec<Point3<f64>>,
    faces: &mut Vec<[usize; 3]>,
    rings: usize,
    segments: usize,
    theta: impl Fn(usize) -> f64,
) {
    for r in 1..=rings {
        for s in 0..segments {
            let phi = 2.0 * PI * s as f64 / segments as f64;
            vertices.push(ring_point(theta(r), phi));
        }
    }
    let ring = |r: usize, s: usize| 1 + (r - 1) * segments + s % segments;
    for s in 0..segments {
        faces.push([0, ring(1, s), ring(1, s + 1)]);
    }
    for r in 1..rings {
        for s in 0..segments {
            faces.push([ring(r, s), ring(r + 1, s), ring(r + 1, s + 1)]);
            faces.push([ring(r, s), ring(r + 1, s + 1), ring(r, s + 1)]);
        }
    }
}

/// Closed unit sphere: north pole, `rings` latitude rings, south pole.
pub fn uv_sphere(rings: usize, segments: usize) -> DynamicMesh {
    let mut vertices = vec![Point3::new(0.0, 0.0, 1.0)];
    let mut faces = Vec::new();
    push_bands(&mut vertices, &mut faces, rings, segments, |r| {
        PI * r as f64 / (rings + 1) as f64
    });
    let south = vertices.len();
    vertices.push(Point3::new(0.0, 0.0, -1.0));
    let last = 1 + (rings - 1) * segments;
    for s in 0..segments {
        faces.push([south, last + (s + 1) % segments, last + s]);
    }
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Open upper unit hemisphere; its boundary is the equator ring of `segments` vertices.
pub fn hemisphere(rings: usize, segments: usize) -> DynamicMesh {
    let mut vertices = vec![Point3::new(0.0, 0.0, 1.0)];
    let mut faces = Vec::new();
    push_bands(&mut vertices, &mut faces, rings, segments, |r| {
        0.5 * PI * r as f64 / rings as f64
    });
    build_from_triangles(&vertices, &faces).unwrap()
}
