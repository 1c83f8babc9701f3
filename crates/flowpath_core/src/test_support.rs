//! Mesh fixtures shared by the unit tests.

use crate::tet_mesh::TetMesh;

/// Permutations of the axes; each one is a monotone path from corner 000 to
/// corner 111 and therefore one tetrahedron of the Kuhn subdivision.
const KUHN_PATHS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Conforming tetrahedral mesh of the box `origin + [0, n*h]^3`, six tets per
/// cube. Point ids are x-fastest.
pub(crate) fn box_mesh(n: usize, h: f64, origin: [f64; 3]) -> TetMesh {
    let np = n + 1;
    let mut points = Vec::with_capacity(np * np * np);
    for k in 0..np {
        for j in 0..np {
            for i in 0..np {
                points.push([
                    origin[0] + i as f64 * h,
                    origin[1] + j as f64 * h,
                    origin[2] + k as f64 * h,
                ]);
            }
        }
    }

    let id = |c: [usize; 3]| c[0] + np * (c[1] + np * c[2]);
    let mut tets = Vec::with_capacity(6 * n * n * n);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                for path in KUHN_PATHS {
                    let mut corner = [i, j, k];
                    let mut tet = [id(corner), 0, 0, 0];
                    for (step, axis) in path.iter().enumerate() {
                        corner[*axis] += 1;
                        tet[step + 1] = id(corner);
                    }
                    tets.push(tet);
                }
            }
        }
    }

    TetMesh::new(points, tets).expect("box mesh should build")
}

/// Box mesh carrying the affine field `v(x) = A x + b` as "velocity".
pub(crate) fn affine_box(n: usize, h: f64, origin: [f64; 3]) -> TetMesh {
    let mut mesh = box_mesh(n, h, origin);
    let vectors = mesh.points().iter().map(affine_velocity).collect();
    mesh.add_vectors("velocity", vectors)
        .expect("vectors should attach");
    mesh
}

pub(crate) fn affine_velocity(p: &[f64; 3]) -> [f64; 3] {
    [
        1.0 + 0.5 * p[0] - 0.25 * p[1],
        -2.0 + 0.1 * p[2],
        0.3 * p[0] + 0.2 * p[1] + 0.7 * p[2],
    ]
}

/// The single unit tetrahedron with samples e_x, e_y, e_z and zero.
pub(crate) fn unit_tetra_mesh() -> TetMesh {
    let mut mesh = TetMesh::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ],
        vec![[0, 1, 2, 3]],
    )
    .expect("tetra should build");
    mesh.add_vectors(
        "velocity",
        vec![
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
        ],
    )
    .expect("vectors should attach");
    mesh
}

pub(crate) fn assert_close(actual: [f64; 3], expected: [f64; 3], tol: f64) {
    for axis in 0..3 {
        assert!(
            (actual[axis] - expected[axis]).abs() <= tol,
            "expected {expected:?}, got {actual:?}"
        );
    }
}
