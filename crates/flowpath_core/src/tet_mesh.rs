//! Unstructured tetrahedral mesh.
//!
//! Besides storage, the mesh keeps the topology the cell search needs:
//! point-to-cell links for the locator path and face adjacency for walking
//! from a previous cell towards the query point.

use crate::cells::Tetra;
use crate::dataset::{Bounds, Cell, CellId, DataSet};
use crate::error::FieldResult;
use crate::locator::{PointLocator, DEFAULT_POINTS_PER_BUCKET};
use crate::point_data::PointData;
use anyhow::{bail, Result};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Upper bound on cells visited by one neighbour walk.
pub const MAX_WALK_STEPS: usize = 64;

#[derive(Debug, Clone)]
pub struct TetMesh {
    points: Vec<[f64; 3]>,
    tets: Vec<[usize; 4]>,
    /// `neighbors[c][f]` is the cell across the face opposite local vertex `f`.
    neighbors: Vec<[Option<CellId>; 4]>,
    point_cells: Vec<Vec<CellId>>,
    bounds: Bounds,
    locator: PointLocator,
    point_data: PointData,
}

impl TetMesh {
    pub fn new(points: Vec<[f64; 3]>, tets: Vec<[usize; 4]>) -> Result<Self> {
        if points.is_empty() {
            bail!("Mesh has no points.");
        }
        if tets.is_empty() {
            bail!("Mesh has no cells.");
        }
        if let Some(id) = points
            .iter()
            .position(|p| p.iter().any(|c| !c.is_finite()))
        {
            bail!("Point {} has a non-finite coordinate.", id);
        }

        let mut point_cells = vec![Vec::new(); points.len()];
        for (cell, ids) in tets.iter().enumerate() {
            for &pid in ids {
                if pid >= points.len() {
                    bail!(
                        "Tetrahedron {} references point {} but the mesh has {} points.",
                        cell,
                        pid,
                        points.len()
                    );
                }
                point_cells[pid].push(cell);
            }
            let tetra = Tetra::new(cell, *ids, ids.map(|pid| points[pid]));
            if tetra.is_degenerate() {
                bail!("Tetrahedron {} is degenerate.", cell);
            }
        }

        let neighbors = build_face_neighbors(&tets)?;
        let bounds = Bounds::from_points(&points)
            .ok_or_else(|| anyhow::anyhow!("Mesh has no points."))?;
        let locator = PointLocator::build(&points, DEFAULT_POINTS_PER_BUCKET)
            .ok_or_else(|| anyhow::anyhow!("Failed to build point locator."))?;

        debug!(
            points = points.len(),
            cells = tets.len(),
            "tetrahedral mesh built"
        );

        Ok(Self {
            points,
            tets,
            neighbors,
            point_cells,
            bounds,
            locator,
            point_data: PointData::default(),
        })
    }

    /// Builds a mesh from flat arrays: `xyz xyz ...` and `abcd abcd ...`.
    pub fn from_flat(points: &[f64], tets: &[u32]) -> Result<Self> {
        if points.len() % 3 != 0 {
            bail!(
                "Point array length ({}) is not a multiple of 3.",
                points.len()
            );
        }
        if tets.len() % 4 != 0 {
            bail!(
                "Connectivity array length ({}) is not a multiple of 4.",
                tets.len()
            );
        }
        let points = points.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        let tets = tets
            .chunks_exact(4)
            .map(|c| [c[0] as usize, c[1] as usize, c[2] as usize, c[3] as usize])
            .collect();
        Self::new(points, tets)
    }

    /// Attaches a per-point vector array. The first one attached is active.
    pub fn add_vectors(&mut self, name: &str, data: Vec<[f64; 3]>) -> Result<()> {
        if data.len() != self.points.len() {
            bail!(
                "Vector array '{}' has {} entries but the mesh has {} points.",
                name,
                data.len(),
                self.points.len()
            );
        }
        self.point_data.insert_vectors(name, data);
        Ok(())
    }

    pub fn add_scalars(&mut self, name: &str, data: Vec<f64>) -> Result<()> {
        if data.len() != self.points.len() {
            bail!(
                "Scalar array '{}' has {} entries but the mesh has {} points.",
                name,
                data.len(),
                self.points.len()
            );
        }
        self.point_data.insert_scalars(name, data);
        Ok(())
    }

    pub fn set_active_vectors(&mut self, name: &str) -> Result<()> {
        if !self.point_data.set_active_vectors(name) {
            bail!("Unknown vector array '{}'.", name);
        }
        Ok(())
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn tets(&self) -> &[[usize; 4]] {
        &self.tets
    }

    pub fn cells_using_point(&self, point: usize) -> &[CellId] {
        self.point_cells.get(point).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn face_neighbor(&self, cell: CellId, face: usize) -> Option<CellId> {
        self.neighbors.get(cell).and_then(|n| n.get(face).copied().flatten())
    }

    fn tetra(&self, id: CellId) -> Tetra {
        let ids = self.tets[id];
        Tetra::new(id, ids, ids.map(|pid| self.points[pid]))
    }

    /// Walks face neighbours from `start`, always leaving through the face
    /// with the most negative barycentric weight that does not lead straight
    /// back. Stops at the mesh boundary or after `MAX_WALK_STEPS` cells.
    fn walk(
        &self,
        x: &[f64; 3],
        start: CellId,
        tol2: f64,
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Option<CellId>> {
        let mut current = start;
        let mut previous: Option<CellId> = None;
        for _ in 0..MAX_WALK_STEPS {
            let position = self.tetra(current).evaluate_position(x, pcoords, weights)?;
            if position.within(tol2) {
                return Ok(Some(current));
            }

            let mut faces = [0, 1, 2, 3];
            faces.sort_by(|a, b| weights[*a].total_cmp(&weights[*b]));
            let next = faces
                .iter()
                .take_while(|f| weights[**f] < 0.0)
                .filter_map(|f| self.neighbors[current][*f])
                .find(|n| Some(*n) != previous);
            match next {
                Some(n) => {
                    previous = Some(current);
                    current = n;
                }
                None => return Ok(None),
            }
        }
        trace!(start, "neighbour walk exhausted its step budget");
        Ok(None)
    }

    fn scan(
        &self,
        x: &[f64; 3],
        tol2: f64,
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Option<CellId>> {
        for id in 0..self.tets.len() {
            if self.tetra(id).evaluate_position(x, pcoords, weights)?.within(tol2) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

impl DataSet for TetMesh {
    type Cell = Tetra;

    fn number_of_points(&self) -> usize {
        self.points.len()
    }

    fn number_of_cells(&self) -> usize {
        self.tets.len()
    }

    fn max_cell_size(&self) -> usize {
        4
    }

    fn cell(&self, id: CellId) -> Option<Tetra> {
        (id < self.tets.len()).then(|| self.tetra(id))
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn point_data(&self) -> &PointData {
        &self.point_data
    }

    fn find_cell_seeded(
        &self,
        x: &[f64; 3],
        previous: CellId,
        tol2: f64,
        pcoords: &mut [f64; 3],
        weights: &mut [f64],
    ) -> FieldResult<Option<CellId>> {
        if previous >= self.tets.len() {
            return Ok(None);
        }
        self.walk(x, previous, tol2, pcoords, weights)
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

        if let Some(closest) = self.locator.find_closest_point(&self.points, x) {
            let incident = &self.point_cells[closest];
            for &id in incident {
                if self.tetra(id).evaluate_position(x, pcoords, weights)?.within(tol2) {
                    return Ok(Some(id));
                }
            }
            if let Some(&start) = incident.first() {
                if let Some(id) = self.walk(x, start, tol2, pcoords, weights)? {
                    return Ok(Some(id));
                }
            }
        }

        debug!(?x, "point locator missed; scanning every cell");
        self.scan(x, tol2, pcoords, weights)
    }
}

enum FaceSlot {
    Open(CellId, usize),
    Paired,
}

fn build_face_neighbors(tets: &[[usize; 4]]) -> Result<Vec<[Option<CellId>; 4]>> {
    let mut neighbors = vec![[None; 4]; tets.len()];
    let mut faces: HashMap<[usize; 3], FaceSlot> = HashMap::with_capacity(tets.len() * 2);

    for (cell, ids) in tets.iter().enumerate() {
        for face in 0..4 {
            let mut key = [0; 3];
            let mut n = 0;
            for (local, &pid) in ids.iter().enumerate() {
                if local != face {
                    key[n] = pid;
                    n += 1;
                }
            }
            key.sort_unstable();

            match faces.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(FaceSlot::Open(cell, face));
                }
                Entry::Occupied(mut slot) => {
                    let (other, other_face) = match slot.get() {
                        FaceSlot::Open(other, other_face) => (*other, *other_face),
                        FaceSlot::Paired => {
                            bail!("Face {:?} is shared by more than two cells.", key);
                        }
                    };
                    neighbors[cell][face] = Some(other);
                    neighbors[other][other_face] = Some(cell);
                    slot.insert(FaceSlot::Paired);
                }
            }
        }
    }

    Ok(neighbors)
}
