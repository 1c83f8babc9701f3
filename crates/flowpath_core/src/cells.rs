//! Concrete cell types: linear tetrahedra and axis-aligned voxels.

use crate::dataset::{Cell, CellId, Position};
use crate::error::{FieldError, FieldResult};
use nalgebra::{Matrix3, Vector3};

/// Slack on the parametric inside test.
pub const PARAMETRIC_TOLERANCE: f64 = 1e-10;

/// Relative volume below which a tetrahedron counts as flat.
const DEGENERATE_TOLERANCE: f64 = 1e-12;

/// Linear tetrahedron. Parametric coordinates `(r, s, t)` satisfy
/// `x = p0 + r (p1 - p0) + s (p2 - p0) + t (p3 - p0)`.
#[derive(Debug, Clone, Copy)]
pub struct Tetra {
    id: CellId,
    point_ids: [usize; 4],
    points: [[f64; 3]; 4],
}

impl Tetra {
    pub fn new(id: CellId, point_ids: [usize; 4], points: [[f64; 3]; 4]) -> Self {
        Self {
            id,
            point_ids,
            points,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn points(&self) -> &[[f64; 3]; 4] {
        &self.points
    }

    /// Signed volume; positive for right-handed vertex order.
    pub fn signed_volume(&self) -> f64 {
        self.edge_matrix().determinant() / 6.0
    }

    pub fn is_degenerate(&self) -> bool {
        let m = self.edge_matrix();
        let scale = (0..3).map(|c| m.column(c).norm()).fold(0.0, f64::max);
        let det = m.determinant();
        det.is_nan() || det.abs() <= DEGENERATE_TOLERANCE * scale.powi(3)
    }

    /// Point ids of the face opposite local vertex `f`.
    pub fn face(&self, f: usize) -> [usize; 3] {
        match f {
            0 => [self.point_ids[1], self.point_ids[2], self.point_ids[3]],
            1 => [self.point_ids[0], self.point_ids[2], self.point_ids[3]],
            2 => [self.point_ids[0], self.point_ids[1], self.point_ids[3]],
            _ => [self.point_ids[0], self.point_ids[1], self.point_ids[2]],
        }
    }

    fn edge_matrix(&self) -> Matrix3<f64> {
        let p0 = Vector3::from(self.points[0]);
        Matrix3::from_columns(&[
            Vector3::from(self.points[1]) - p0,
            Vector3::from(self.points[2]) - p0,
            Vector3::from(self.points[3]) - p0,
        ])
    }

    fn shape_functions(pcoords: &[f64; 3], weights: &mut [f64]) {
        weights[0] = 1.0 - pcoords[0] - pcoords[1] - pcoords[2];
        weights[1] = pcoords[0];
        weights[2] = pcoords[1];
        weights[3] = pcoords[2];
    }
}

impl Cell for Tetra {
    fn point_ids(&self) -> &[usize] {
        &self.point_ids
    }

    fn evaluate_position(
        &self,
        x: &[f64; 3],
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Position> {
        if self.is_degenerate() {
            return Err(FieldError::DegenerateCell { cell: self.id });
        }
        let rhs = Vector3::from(*x) - Vector3::from(self.points[0]);
        let rst = self
            .edge_matrix()
            .lu()
            .solve(&rhs)
            .ok_or(FieldError::DegenerateCell { cell: self.id })?;
        *pcoords = [rst[0], rst[1], rst[2]];
        Self::shape_functions(pcoords, weights);

        if weights[..4].iter().all(|w| *w >= -PARAMETRIC_TOLERANCE) {
            return Ok(Position::Inside);
        }

        let mut clamped = *pcoords;
        self.clamp_pcoords(&mut clamped);
        let mut scratch = [0.0; 4];
        let closest = self.evaluate_location(&clamped, &mut scratch);
        Ok(Position::Outside {
            closest,
            dist2: distance2(x, &closest),
        })
    }

    fn evaluate_location(&self, pcoords: &[f64; 3], weights: &mut [f64]) -> [f64; 3] {
        Self::shape_functions(pcoords, weights);
        let mut x = [0.0; 3];
        for (w, p) in weights[..4].iter().zip(self.points.iter()) {
            for axis in 0..3 {
                x[axis] += w * p[axis];
            }
        }
        x
    }

    fn clamp_pcoords(&self, pcoords: &mut [f64; 3]) {
        project_onto_simplex(pcoords);
    }
}

/// Euclidean projection onto `{ r, s, t >= 0, r + s + t <= 1 }`.
///
/// If clipping to the positive octant already satisfies the sum constraint
/// that is the answer; otherwise the sum constraint is active and the point
/// is projected onto the unit simplex `r + s + t = 1`.
fn project_onto_simplex(p: &mut [f64; 3]) {
    let clipped = [p[0].max(0.0), p[1].max(0.0), p[2].max(0.0)];
    if clipped.iter().sum::<f64>() <= 1.0 {
        *p = clipped;
        return;
    }

    let mut sorted = *p;
    sorted.sort_by(|a, b| b.total_cmp(a));
    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (j, u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (j as f64 + 1.0);
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }
    for v in p.iter_mut() {
        *v = (*v - theta).max(0.0);
    }
}

/// Axis-aligned hexahedron of an image grid, with VTK voxel vertex order
/// (x varies fastest, then y, then z) and trilinear shape functions.
#[derive(Debug, Clone, Copy)]
pub struct Voxel {
    id: CellId,
    point_ids: [usize; 8],
    origin: [f64; 3],
    spacing: [f64; 3],
}

impl Voxel {
    pub fn new(id: CellId, point_ids: [usize; 8], origin: [f64; 3], spacing: [f64; 3]) -> Self {
        Self {
            id,
            point_ids,
            origin,
            spacing,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    fn shape_functions(pcoords: &[f64; 3], weights: &mut [f64]) {
        let [r, s, t] = *pcoords;
        let (rm, sm, tm) = (1.0 - r, 1.0 - s, 1.0 - t);
        weights[0] = rm * sm * tm;
        weights[1] = r * sm * tm;
        weights[2] = rm * s * tm;
        weights[3] = r * s * tm;
        weights[4] = rm * sm * t;
        weights[5] = r * sm * t;
        weights[6] = rm * s * t;
        weights[7] = r * s * t;
    }
}

impl Cell for Voxel {
    fn point_ids(&self) -> &[usize] {
        &self.point_ids
    }

    fn evaluate_position(
        &self,
        x: &[f64; 3],
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Position> {
        if self.spacing.iter().any(|h| h.is_nan() || *h <= 0.0) {
            return Err(FieldError::DegenerateCell { cell: self.id });
        }
        for axis in 0..3 {
            pcoords[axis] = (x[axis] - self.origin[axis]) / self.spacing[axis];
        }
        Self::shape_functions(pcoords, weights);

        let inside = pcoords
            .iter()
            .all(|p| *p >= -PARAMETRIC_TOLERANCE && *p <= 1.0 + PARAMETRIC_TOLERANCE);
        if inside {
            return Ok(Position::Inside);
        }

        let mut clamped = *pcoords;
        self.clamp_pcoords(&mut clamped);
        let mut scratch = [0.0; 8];
        let closest = self.evaluate_location(&clamped, &mut scratch);
        Ok(Position::Outside {
            closest,
            dist2: distance2(x, &closest),
        })
    }

    fn evaluate_location(&self, pcoords: &[f64; 3], weights: &mut [f64]) -> [f64; 3] {
        Self::shape_functions(pcoords, weights);
        let mut x = [0.0; 3];
        for axis in 0..3 {
            x[axis] = self.origin[axis] + pcoords[axis] * self.spacing[axis];
        }
        x
    }

    fn clamp_pcoords(&self, pcoords: &mut [f64; 3]) {
        for p in pcoords.iter_mut() {
            *p = p.clamp(0.0, 1.0);
        }
    }
}

pub(crate) fn distance2(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|axis| (a[axis] - b[axis]).powi(2)).sum()
}
