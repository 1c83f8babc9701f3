//! Regular axis-aligned grid of voxels.

use crate::cells::Voxel;
use crate::dataset::{Bounds, Cell, CellId, DataSet};
use crate::error::FieldResult;
use crate::point_data::PointData;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Grid geometry; point `(i, j, k)` sits at `origin + (i, j, k) * spacing`
/// and has id `i + nx * (j + ny * k)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    pub dims: [usize; 3],
}

#[derive(Debug, Clone)]
pub struct ImageGrid {
    geometry: GridGeometry,
    bounds: Bounds,
    point_data: PointData,
}

impl ImageGrid {
    pub fn new(geometry: GridGeometry) -> Result<Self> {
        let GridGeometry {
            origin,
            spacing,
            dims,
        } = geometry;
        if origin.iter().any(|c| !c.is_finite()) {
            bail!("Grid origin must be finite.");
        }
        if spacing.iter().any(|h| !h.is_finite() || *h <= 0.0) {
            bail!("Grid spacing must be finite and positive.");
        }
        if dims.iter().any(|n| *n < 2) {
            bail!("Each grid axis needs at least 2 points.");
        }

        let mut max = [0.0; 3];
        for axis in 0..3 {
            max[axis] = origin[axis] + (dims[axis] - 1) as f64 * spacing[axis];
        }
        Ok(Self {
            geometry,
            bounds: Bounds { min: origin, max },
            point_data: PointData::default(),
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn point(&self, id: usize) -> [f64; 3] {
        let [nx, ny, _] = self.geometry.dims;
        let ijk = [id % nx, (id / nx) % ny, id / (nx * ny)];
        let mut p = [0.0; 3];
        for axis in 0..3 {
            p[axis] = self.geometry.origin[axis] + ijk[axis] as f64 * self.geometry.spacing[axis];
        }
        p
    }

    /// Samples `f` at every grid point and attaches the result.
    pub fn add_vectors_from(&mut self, name: &str, f: impl Fn(&[f64; 3]) -> [f64; 3]) {
        let data = (0..self.number_of_points())
            .map(|id| f(&self.point(id)))
            .collect();
        self.point_data.insert_vectors(name, data);
    }

    pub fn add_vectors(&mut self, name: &str, data: Vec<[f64; 3]>) -> Result<()> {
        if data.len() != self.number_of_points() {
            bail!(
                "Vector array '{}' has {} entries but the grid has {} points.",
                name,
                data.len(),
                self.number_of_points()
            );
        }
        self.point_data.insert_vectors(name, data);
        Ok(())
    }

    pub fn add_scalars(&mut self, name: &str, data: Vec<f64>) -> Result<()> {
        if data.len() != self.number_of_points() {
            bail!(
                "Scalar array '{}' has {} entries but the grid has {} points.",
                name,
                data.len(),
                self.number_of_points()
            );
        }
        self.point_data.insert_scalars(name, data);
        Ok(())
    }

    fn cell_dims(&self) -> [usize; 3] {
        self.geometry.dims.map(|n| n - 1)
    }

    fn voxel(&self, ijk: [usize; 3]) -> Voxel {
        let [nx, ny, _] = self.geometry.dims;
        let [cx, cy, _] = self.cell_dims();
        let base = ijk[0] + nx * (ijk[1] + ny * ijk[2]);
        let ids = [
            base,
            base + 1,
            base + nx,
            base + nx + 1,
            base + nx * ny,
            base + nx * ny + 1,
            base + nx * ny + nx,
            base + nx * ny + nx + 1,
        ];
        let mut origin = [0.0; 3];
        for axis in 0..3 {
            origin[axis] = self.geometry.origin[axis] + ijk[axis] as f64 * self.geometry.spacing[axis];
        }
        let id = ijk[0] + cx * (ijk[1] + cy * ijk[2]);
        Voxel::new(id, ids, origin, self.geometry.spacing)
    }
}

impl DataSet for ImageGrid {
    type Cell = Voxel;

    fn number_of_points(&self) -> usize {
        self.geometry.dims.iter().product()
    }

    fn number_of_cells(&self) -> usize {
        self.cell_dims().iter().product()
    }

    fn max_cell_size(&self) -> usize {
        8
    }

    fn cell(&self, id: CellId) -> Option<Voxel> {
        if id >= self.number_of_cells() {
            return None;
        }
        let [cx, cy, _] = self.cell_dims();
        Some(self.voxel([id % cx, (id / cx) % cy, id / (cx * cy)]))
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn point_data(&self) -> &PointData {
        &self.point_data
    }

    /// Location is a direct index computation, so the hint is not needed.
    fn find_cell_seeded(
        &self,
        x: &[f64; 3],
        _previous: CellId,
        tol2: f64,
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Option<CellId>> {
        self.find_cell_global(x, tol2, pcoords, weights)
    }

    fn find_cell_global(
        &self,
        x: &[f64; 3],
        tol2: f64,
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Option<CellId>> {
        if !self.bounds.contains(x, tol2.sqrt()) {
            return Ok(None);
        }
        let cell_dims = self.cell_dims();
        let mut ijk = [0; 3];
        for axis in 0..3 {
            let offset = (x[axis] - self.geometry.origin[axis]) / self.geometry.spacing[axis];
            ijk[axis] = if offset <= 0.0 {
                0
            } else {
                (offset.floor() as usize).min(cell_dims[axis] - 1)
            };
        }
        let voxel = self.voxel(ijk);
        if voxel.evaluate_position(x, pcoords, weights)?.within(tol2) {
            Ok(Some(voxel.id()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GridGeometry, ImageGrid};
    use crate::dataset::{Cell, DataSet};

    fn grid() -> ImageGrid {
        ImageGrid::new(GridGeometry {
            origin: [1.0, 0.0, -1.0],
            spacing: [0.5, 1.0, 2.0],
            dims: [5, 3, 2],
        })
        .expect("grid")
    }

    #[test]
    fn new_rejects_bad_geometry() {
        let bad_spacing = ImageGrid::new(GridGeometry {
            origin: [0.0; 3],
            spacing: [1.0, 0.0, 1.0],
            dims: [2, 2, 2],
        });
        assert!(bad_spacing
            .expect_err("spacing")
            .to_string()
            .contains("spacing"));

        let bad_dims = ImageGrid::new(GridGeometry {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            dims: [2, 1, 2],
        });
        assert!(bad_dims.expect_err("dims").to_string().contains("at least 2"));
    }

    #[test]
    fn counts_and_bounds() {
        let grid = grid();
        assert_eq!(grid.number_of_points(), 30);
        assert_eq!(grid.number_of_cells(), 8);
        assert_eq!(grid.bounds().max, [3.0, 2.0, 1.0]);
        assert_eq!(grid.point(29), [3.0, 2.0, 1.0]);
        assert!(grid.cell(8).is_none());
    }

    #[test]
    fn locates_points_including_upper_boundary() {
        let grid = grid();
        let mut pcoords = [0.0; 3];
        let mut weights = [0.0; 8];

        let found = grid
            .find_cell_global(&[1.6, 1.5, 0.0], 0.0, &mut pcoords, &mut weights)
            .expect("search")
            .expect("inside");
        assert_eq!(found, 1 + 4);
        assert!((pcoords[0] - 0.2).abs() < 1e-12);
        assert!((pcoords[1] - 0.5).abs() < 1e-12);
        assert!((pcoords[2] - 0.5).abs() < 1e-12);

        let corner = grid
            .find_cell_global(&[3.0, 2.0, 1.0], 0.0, &mut pcoords, &mut weights)
            .expect("search")
            .expect("upper corner belongs to the last cell");
        assert_eq!(corner, grid.number_of_cells() - 1);

        let outside = grid
            .find_cell_global(&[3.1, 1.0, 0.0], 0.0, &mut pcoords, &mut weights)
            .expect("search");
        assert!(outside.is_none());
    }

    #[test]
    fn voxel_point_ids_match_grid_points() {
        let grid = grid();
        let voxel = grid.cell(5).expect("cell");
        let ids = voxel.point_ids();
        let p0 = grid.point(ids[0]);
        let p7 = grid.point(ids[7]);
        assert_eq!(p0, [1.5, 1.0, -1.0]);
        assert_eq!(p7, [2.0, 2.0, 1.0]);
    }

    #[test]
    fn vectors_sampled_from_closure() {
        let mut grid = grid();
        grid.add_vectors_from("velocity", |p| [p[0], 2.0 * p[1], 0.0]);
        let vectors = grid.point_data().vectors(None).expect("vectors");
        assert_eq!(vectors[29], [3.0, 4.0, 0.0]);
        assert!(grid.add_scalars("s", vec![0.0; 3]).is_err());
    }
}
