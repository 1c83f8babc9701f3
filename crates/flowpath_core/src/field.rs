//! Velocity field interpolated from per-point vectors on registered meshes.
//!
//! The evaluator borrows its meshes (`&'a M`); it never owns or reference
//! counts them. Cache state is mutated in place through `&mut self`, so one
//! evaluator serves one trajectory at a time. Trace concurrent trajectories
//! with separate evaluators, e.g. from [`InterpolatedVelocityField::with_fresh_caches`].

use crate::cache::{CacheStats, CellCache, LocationStrategy};
use crate::dataset::{Cell, CellId, DataSet, Position};
use crate::error::{FieldError, FieldResult};
use crate::traits::VelocityField;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSettings {
    /// Use the intra-cell and seeded tiers. When off every query runs a
    /// global search.
    pub caching: bool,
    /// Scale results to unit length (zero vectors are left alone).
    pub normalize_vector: bool,
    /// Point-data vector array to interpolate; `None` uses the active one.
    pub vectors: Option<String>,
    /// `tol2 = length^2 * tolerance_scale`, where `length` is the mesh
    /// bounding-box diagonal.
    pub tolerance_scale: f64,
    pub strategy: LocationStrategy,
}

impl Default for FieldSettings {
    fn default() -> Self {
        Self {
            caching: true,
            normalize_vector: false,
            vectors: None,
            tolerance_scale: 1e-8,
            strategy: LocationStrategy::Tiered,
        }
    }
}

struct Entry<'a, M> {
    mesh: &'a M,
    cache: CellCache,
    tol2: f64,
}

/// Cache state detached from the meshes it was built against.
#[derive(Debug, Clone)]
pub struct FieldCaches {
    caches: Vec<CellCache>,
    active: usize,
}

impl FieldCaches {
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

pub struct InterpolatedVelocityField<'a, M: DataSet> {
    entries: Vec<Entry<'a, M>>,
    active: usize,
    settings: FieldSettings,
}

impl<'a, M: DataSet> InterpolatedVelocityField<'a, M> {
    pub fn new(settings: FieldSettings) -> Self {
        Self {
            entries: Vec::new(),
            active: 0,
            settings,
        }
    }

    pub fn settings(&self) -> &FieldSettings {
        &self.settings
    }

    pub fn number_of_data_sets(&self) -> usize {
        self.entries.len()
    }

    /// Registers `mesh` behind the already registered ones and returns its
    /// index. The mesh must carry the selected vector array.
    pub fn add_data_set(&mut self, mesh: &'a M) -> FieldResult<usize> {
        let index = self.entries.len();
        if mesh.number_of_points() == 0 || mesh.number_of_cells() == 0 {
            return Err(FieldError::EmptyDataSet { index });
        }
        let vectors = mesh.point_data().vectors(self.settings.vectors.as_deref());
        if vectors.map_or(true, |v| v.len() != mesh.number_of_points()) {
            return Err(FieldError::MissingVectors {
                index,
                name: self.settings.vectors.clone(),
            });
        }

        let length = mesh.length();
        self.entries.push(Entry {
            mesh,
            cache: CellCache::new(mesh.max_cell_size()),
            tol2: length * length * self.settings.tolerance_scale,
        });
        debug!(
            index,
            cells = mesh.number_of_cells(),
            points = mesh.number_of_points(),
            "data set registered"
        );
        Ok(index)
    }

    /// Interpolates the velocity at `(x, y, z)`; `point[3]` (time) is ignored.
    ///
    /// The active mesh is tried first, then the others in registration order.
    /// If no mesh contains the point every cache ends up empty, the first mesh
    /// becomes active again and `FieldError::OutOfDomain` is returned.
    pub fn evaluate(&mut self, point: &[f64; 4]) -> FieldResult<[f64; 3]> {
        let x = [point[0], point[1], point[2]];
        if x.iter().any(|c| !c.is_finite()) {
            return Err(FieldError::NonFinitePoint);
        }
        if self.entries.is_empty() {
            return Err(FieldError::NoDataSets);
        }

        let first = self.active;
        if let Some(value) = self.evaluate_in(first, &x)? {
            return Ok(value);
        }
        for index in 0..self.entries.len() {
            if index == first {
                continue;
            }
            if let Some(value) = self.evaluate_in(index, &x)? {
                trace!(from = first, to = index, "active data set changed");
                self.active = index;
                return Ok(value);
            }
        }

        self.active = 0;
        Err(FieldError::OutOfDomain(x))
    }

    fn evaluate_in(&mut self, index: usize, x: &[f64; 3]) -> FieldResult<Option<[f64; 3]>> {
        let settings = &self.settings;
        let entry = &mut self.entries[index];
        let strategy = if settings.caching {
            settings.strategy
        } else {
            LocationStrategy::Global
        };

        let resolved = entry
            .cache
            .resolve(entry.mesh, x, entry.tol2, strategy)
            .inspect_err(|err| warn!(data_set = index, %err, "cell location failed"))?;
        let Some((cell_id, tier)) = resolved else {
            return Ok(None);
        };
        trace!(data_set = index, cell = cell_id, ?tier, "point located");

        let vectors = entry
            .mesh
            .point_data()
            .vectors(settings.vectors.as_deref())
            .ok_or_else(|| FieldError::MissingVectors {
                index,
                name: settings.vectors.clone(),
            })?;
        let cell = entry.mesh.cell(cell_id).ok_or(FieldError::InvalidCellId {
            cell: cell_id,
            count: entry.mesh.number_of_cells(),
        })?;
        let weights = entry.cache.weights().unwrap_or(&[]);

        let mut value = [0.0; 3];
        for (w, &pid) in weights.iter().zip(cell.point_ids()) {
            for axis in 0..3 {
                value[axis] += w * vectors[pid][axis];
            }
        }
        if settings.normalize_vector {
            normalize(&mut value);
        }
        Ok(Some(value))
    }

    /// Seeds the cache of the active data set with `cell` (`None` clears it).
    pub fn set_last_cell_id(&mut self, cell: Option<CellId>) -> FieldResult<()> {
        if self.entries.is_empty() {
            return Err(FieldError::NoDataSets);
        }
        self.set_last_cell_id_in(cell, self.active)
    }

    /// Seeds the cache of data set `index` with `cell` and makes it active,
    /// so the next query starts with an intra-cell test against `cell`.
    pub fn set_last_cell_id_in(&mut self, cell: Option<CellId>, index: usize) -> FieldResult<()> {
        let count = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(FieldError::InvalidDataSetIndex { index, count })?;
        if let Some(cell) = cell {
            let cells = entry.mesh.number_of_cells();
            if cell >= cells {
                return Err(FieldError::InvalidCellId { cell, count: cells });
            }
        }
        entry.cache.seed(cell);
        self.active = index;
        Ok(())
    }

    pub fn clear_last_cell_id(&mut self) {
        if let Some(entry) = self.entries.get_mut(self.active) {
            entry.cache.clear();
        }
    }

    /// Index of the data set that resolved the latest query (or was seeded).
    pub fn last_data_set_index(&self) -> usize {
        self.active
    }

    pub fn last_cell_id(&self) -> Option<CellId> {
        self.entries.get(self.active).and_then(|e| e.cache.cell())
    }

    pub fn last_pcoords(&self) -> Option<[f64; 3]> {
        self.entries.get(self.active).and_then(|e| e.cache.pcoords())
    }

    /// Interpolation weights of the latest resolution, one per cell vertex
    /// (padded to the mesh's largest cell).
    pub fn last_weights(&self) -> Option<&[f64]> {
        self.entries.get(self.active).and_then(|e| e.cache.weights())
    }

    /// Hits and misses summed over every registered data set.
    pub fn cache_stats(&self) -> CacheStats {
        self.entries
            .iter()
            .fold(CacheStats::default(), |acc, e| acc + e.cache.stats())
    }

    /// Projects `origin` onto the cached cell of the active data set: the
    /// parametric coordinates are clamped to the cell and mapped back to
    /// physical space. Points inside the cell come back unchanged. No new
    /// search is performed.
    pub fn snap_point_on_cell(&self, origin: &[f64; 3]) -> FieldResult<[f64; 3]> {
        let entry = self.entries.get(self.active).ok_or(FieldError::NoDataSets)?;
        let cell_id = entry.cache.cell().ok_or(FieldError::NoCachedCell)?;
        let cell = entry.mesh.cell(cell_id).ok_or(FieldError::InvalidCellId {
            cell: cell_id,
            count: entry.mesh.number_of_cells(),
        })?;

        let mut pcoords = [0.0; 3];
        let mut weights = vec![0.0; entry.cache.capacity()];
        match cell.evaluate_position(origin, &mut pcoords, &mut weights)? {
            Position::Inside => Ok(*origin),
            Position::Outside { closest, .. } => Ok(closest),
        }
    }

    /// Interpolates the named scalar array at the latest resolved location.
    pub fn interpolate_scalar(&self, name: &str) -> Option<f64> {
        let entry = self.entries.get(self.active)?;
        let data = entry.mesh.point_data().scalars(name)?;
        let cell = entry.mesh.cell(entry.cache.cell()?)?;
        let weights = entry.cache.weights()?;
        Some(
            weights
                .iter()
                .zip(cell.point_ids())
                .map(|(w, &pid)| w * data[pid])
                .sum(),
        )
    }

    /// Interpolates the named vector array at the latest resolved location.
    pub fn interpolate_vector(&self, name: &str) -> Option<[f64; 3]> {
        let entry = self.entries.get(self.active)?;
        let data = entry.mesh.point_data().vectors(Some(name))?;
        let cell = entry.mesh.cell(entry.cache.cell()?)?;
        let weights = entry.cache.weights()?;
        let mut value = [0.0; 3];
        for (w, &pid) in weights.iter().zip(cell.point_ids()) {
            for axis in 0..3 {
                value[axis] += w * data[pid][axis];
            }
        }
        Some(value)
    }

    /// Same meshes and settings, empty caches.
    pub fn with_fresh_caches(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|e| Entry {
                    mesh: e.mesh,
                    cache: CellCache::new(e.cache.capacity()),
                    tol2: e.tol2,
                })
                .collect(),
            active: 0,
            settings: self.settings.clone(),
        }
    }

    /// Releases the mesh borrows, keeping the cache state.
    pub fn into_caches(self) -> FieldCaches {
        FieldCaches {
            caches: self.entries.into_iter().map(|e| e.cache).collect(),
            active: self.active,
        }
    }

    /// Rebuilds an evaluator over `meshes` and restores `caches`, which must
    /// come from an evaluator over the same meshes in the same order.
    pub fn with_caches(
        meshes: &[&'a M],
        settings: FieldSettings,
        caches: FieldCaches,
    ) -> FieldResult<Self> {
        let mut field = Self::new(settings);
        for &mesh in meshes {
            field.add_data_set(mesh)?;
        }
        if caches.caches.len() != field.entries.len() {
            return Err(FieldError::InvalidDataSetIndex {
                index: caches.caches.len(),
                count: field.entries.len(),
            });
        }
        for (index, (entry, cache)) in field.entries.iter_mut().zip(caches.caches).enumerate() {
            if cache.capacity() != entry.cache.capacity() {
                return Err(FieldError::InvalidDataSetIndex {
                    index,
                    count: meshes.len(),
                });
            }
            entry.cache = cache;
        }
        field.active = caches.active.min(field.entries.len().saturating_sub(1));
        Ok(field)
    }
}

impl<M: DataSet> VelocityField for InterpolatedVelocityField<'_, M> {
    fn evaluate(&mut self, point: &[f64; 4]) -> FieldResult<[f64; 3]> {
        InterpolatedVelocityField::evaluate(self, point)
    }

    fn snap_point_on_cell(&self, origin: &[f64; 3]) -> FieldResult<[f64; 3]> {
        InterpolatedVelocityField::snap_point_on_cell(self, origin)
    }
}

fn normalize(v: &mut [f64; 3]) {
    let norm = v.iter().map(|c| c * c).sum::<f64>().sqrt();
    if norm > 0.0 {
        for c in v.iter_mut() {
            *c /= norm;
        }
    }
}
