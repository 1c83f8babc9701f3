//! Contracts between the velocity field and the meshes it samples.
//!
//! The evaluator never looks inside a mesh. It asks a [`DataSet`] to find
//! cells and hands it back parametric buffers to fill, and it asks a
//! [`Cell`] whether a point is inside and what its interpolation weights are.

use crate::error::FieldResult;
use crate::point_data::PointData;
use serde::{Deserialize, Serialize};

/// Index of a cell within its data set.
pub type CellId = usize;

/// Result of testing a point against a single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    Inside,
    /// `closest` is the parametric projection of the point onto the cell,
    /// mapped back to physical space; `dist2` its squared distance.
    Outside { closest: [f64; 3], dist2: f64 },
}

impl Position {
    pub fn is_inside(&self) -> bool {
        matches!(self, Position::Inside)
    }

    /// Inside, or outside but no further than `sqrt(tol2)` from the cell.
    pub fn within(&self, tol2: f64) -> bool {
        match *self {
            Position::Inside => true,
            Position::Outside { dist2, .. } => dist2 <= tol2,
        }
    }
}

/// Geometric operations of one mesh element.
pub trait Cell {
    /// Mesh point ids of the cell's vertices, in the cell's canonical order.
    fn point_ids(&self) -> &[usize];

    fn number_of_points(&self) -> usize {
        self.point_ids().len()
    }

    /// Computes the parametric coordinates of `x` and the interpolation
    /// weights of every vertex (written to the first `number_of_points()`
    /// entries of `weights`). Fails only for degenerate geometry.
    fn evaluate_position(
        &self,
        x: &[f64; 3],
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Position>;

    /// Maps parametric coordinates back to physical space, filling `weights`
    /// with the shape functions evaluated at `pcoords`.
    fn evaluate_location(&self, pcoords: &[f64; 3], weights: &mut [f64]) -> [f64; 3];

    /// Projects parametric coordinates onto the cell's parametric domain.
    fn clamp_pcoords(&self, pcoords: &mut [f64; 3]);
}

/// A mesh carrying per-point data that the evaluator can locate points in.
///
/// Implementations are only read through `&self`; sharing one between
/// several evaluators is sound whenever the type is `Sync`.
pub trait DataSet {
    type Cell: Cell;

    fn number_of_points(&self) -> usize;

    fn number_of_cells(&self) -> usize;

    /// Largest vertex count of any cell; sizes the weight buffers.
    fn max_cell_size(&self) -> usize;

    fn cell(&self, id: CellId) -> Option<Self::Cell>;

    fn bounds(&self) -> Bounds;

    /// Diagonal of the bounding box.
    fn length(&self) -> f64 {
        self.bounds().length()
    }

    fn point_data(&self) -> &PointData;

    /// Locates `x` using `previous` as a locality hint.
    fn find_cell_seeded(
        &self,
        x: &[f64; 3],
        previous: CellId,
        tol2: f64,
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Option<CellId>>;

    /// Locates `x` without any hint.
    fn find_cell_global(
        &self,
        x: &[f64; 3],
        tol2: f64,
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Option<CellId>>;
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    pub fn from_points(points: &[[f64; 3]]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Bounds {
            min: *first,
            max: *first,
        };
        for p in &points[1..] {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(p[axis]);
                bounds.max[axis] = bounds.max[axis].max(p[axis]);
            }
        }
        Some(bounds)
    }

    pub fn length(&self) -> f64 {
        (0..3)
            .map(|axis| {
                let d = self.max[axis] - self.min[axis];
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Containment test with the box grown by `pad` on every side.
    pub fn contains(&self, x: &[f64; 3], pad: f64) -> bool {
        (0..3).all(|axis| x[axis] >= self.min[axis] - pad && x[axis] <= self.max[axis] + pad)
    }
}

#[cfg(test)]
mod tests {
    use super::{Bounds, Position};

    #[test]
    fn bounds_cover_all_points() {
        let bounds = Bounds::from_points(&[[0.0, 1.0, 2.0], [-1.0, 3.0, 0.5], [2.0, 0.0, 1.0]])
            .expect("bounds");
        assert_eq!(bounds.min, [-1.0, 0.0, 0.5]);
        assert_eq!(bounds.max, [2.0, 3.0, 2.0]);
        assert!(bounds.contains(&[0.0, 0.0, 0.5], 0.0));
        assert!(!bounds.contains(&[0.0, -0.1, 0.5], 0.0));
        assert!(bounds.contains(&[0.0, -0.1, 0.5], 0.2));
    }

    #[test]
    fn bounds_of_empty_set_is_none() {
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn unit_cube_length_is_sqrt_three() {
        let bounds = Bounds {
            min: [0.0; 3],
            max: [1.0; 3],
        };
        assert!((bounds.length() - 3.0_f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn outside_position_within_tolerance() {
        let near = Position::Outside {
            closest: [0.0; 3],
            dist2: 1e-12,
        };
        assert!(!near.is_inside());
        assert!(near.within(1e-10));
        assert!(!near.within(1e-14));
        assert!(Position::Inside.within(0.0));
    }
}
