//! Per-mesh cell cache and the tiered point location built on it.
//!
//! Successive queries along a trajectory usually land in the cell of the
//! previous query or one next to it. The cache remembers that cell and tries,
//! in order:
//!
//! 0. the cached cell itself (intra-cell),
//! 1. the mesh's seeded search starting from the cached cell (inter-cell),
//! 2. the mesh's unseeded search (global).
//!
//! The first tier that accepts the point wins, including for points lying
//! exactly on a face shared by two cells.

use crate::dataset::{Cell, CellId, DataSet};
use crate::error::FieldResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// How a cache resolves a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStrategy {
    /// Intra-cell, then seeded, then global search.
    #[default]
    Tiered,
    /// Global search on every query; slower but independent of history.
    Global,
}

/// The tier that resolved a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    IntraCell,
    InterCell,
    Global,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Queries answered by the cached cell.
    pub hits: u64,
    /// Queries the cached cell could not answer, whether the seeded or the
    /// global search then found the point or not.
    pub misses: u64,
}

impl std::ops::Add for CacheStats {
    type Output = CacheStats;

    fn add(self, other: CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
        }
    }
}

/// Last successful location in one mesh.
///
/// `pcoords` and `weights` are only meaningful while `weights_current` is
/// set; a failed or in-progress lookup clears it.
#[derive(Debug, Clone)]
pub struct CellCache {
    cell: Option<CellId>,
    pcoords: [f64; 3],
    weights: Vec<f64>,
    weights_current: bool,
    stats: CacheStats,
}

impl CellCache {
    pub fn new(max_cell_size: usize) -> Self {
        Self {
            cell: None,
            pcoords: [0.0; 3],
            weights: vec![0.0; max_cell_size],
            weights_current: false,
            stats: CacheStats::default(),
        }
    }

    pub fn cell(&self) -> Option<CellId> {
        self.cell
    }

    pub fn pcoords(&self) -> Option<[f64; 3]> {
        self.weights_current.then_some(self.pcoords)
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights_current.then_some(self.weights.as_slice())
    }

    pub fn is_current(&self) -> bool {
        self.weights_current
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub(crate) fn capacity(&self) -> usize {
        self.weights.len()
    }

    /// Seeds the intra-cell tier with `cell` without computing weights.
    pub fn seed(&mut self, cell: Option<CellId>) {
        self.cell = cell;
        self.weights_current = false;
    }

    pub fn clear(&mut self) {
        self.seed(None);
    }

    /// Locates `x` in `mesh`, refreshing the cache on success and emptying it
    /// when no tier accepts the point. Points within `sqrt(tol2)` of a cell
    /// count as inside it.
    pub fn resolve<M: DataSet + ?Sized>(
        &mut self,
        mesh: &M,
        x: &[f64; 3],
        tol2: f64,
        strategy: LocationStrategy,
    ) -> FieldResult<Option<(CellId, Tier)>> {
        self.weights_current = false;
        if strategy == LocationStrategy::Tiered {
            if let Some(found) = self.try_cached(mesh, x, tol2)? {
                return Ok(Some(found));
            }
        } else {
            self.stats.misses += 1;
        }

        trace!(?x, "falling back to global cell search");
        match mesh.find_cell_global(x, tol2, &mut self.pcoords, &mut self.weights)? {
            Some(found) => Ok(Some(self.accept(found, Tier::Global))),
            None => {
                self.clear();
                Ok(None)
            }
        }
    }

    /// Tiers 0 and 1. Counts a hit when the cached cell accepts `x` and a
    /// miss otherwise.
    fn try_cached<M: DataSet + ?Sized>(
        &mut self,
        mesh: &M,
        x: &[f64; 3],
        tol2: f64,
    ) -> FieldResult<Option<(CellId, Tier)>> {
        let Some(previous) = self.cell else {
            self.stats.misses += 1;
            return Ok(None);
        };
        let Some(cell) = mesh.cell(previous) else {
            debug!(cell = previous, "cached cell id no longer exists in the mesh");
            self.stats.misses += 1;
            return Ok(None);
        };

        let position = cell.evaluate_position(x, &mut self.pcoords, &mut self.weights)?;
        if position.within(tol2) {
            self.stats.hits += 1;
            return Ok(Some(self.accept(previous, Tier::IntraCell)));
        }

        self.stats.misses += 1;
        trace!(cell = previous, "point left the cached cell");
        match mesh.find_cell_seeded(x, previous, tol2, &mut self.pcoords, &mut self.weights)? {
            Some(found) => Ok(Some(self.accept(found, Tier::InterCell))),
            None => Ok(None),
        }
    }

    fn accept(&mut self, cell: CellId, tier: Tier) -> (CellId, Tier) {
        self.cell = Some(cell);
        self.weights_current = true;
        (cell, tier)
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheStats, CellCache, LocationStrategy, Tier};
    use crate::dataset::DataSet;
    use crate::test_support::box_mesh;

    const TOL2: f64 = 1e-20;

    #[test]
    fn empty_cache_goes_global_then_hits() {
        let mesh = box_mesh(2, 1.0, [0.0; 3]);
        let mut cache = CellCache::new(mesh.max_cell_size());
        assert!(cache.weights().is_none());

        let (cell, tier) = cache
            .resolve(&mesh, &[0.3, 0.3, 0.4], TOL2, LocationStrategy::Tiered)
            .expect("resolve")
            .expect("found");
        assert_eq!(tier, Tier::Global);
        assert_eq!(cache.cell(), Some(cell));
        assert!(cache.is_current());

        let (again, tier) = cache
            .resolve(&mesh, &[0.31, 0.3, 0.4], TOL2, LocationStrategy::Tiered)
            .expect("resolve")
            .expect("found");
        assert_eq!(tier, Tier::IntraCell);
        assert_eq!(again, cell);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn crossing_a_face_uses_the_seeded_tier() {
        let mesh = box_mesh(2, 1.0, [0.0; 3]);
        let mut cache = CellCache::new(mesh.max_cell_size());
        cache
            .resolve(&mesh, &[0.2, 0.2, 0.2], TOL2, LocationStrategy::Tiered)
            .expect("resolve");
        let (_, tier) = cache
            .resolve(&mesh, &[1.7, 1.6, 1.8], TOL2, LocationStrategy::Tiered)
            .expect("resolve")
            .expect("found");
        assert_eq!(tier, Tier::InterCell);
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 2 });
    }

    #[test]
    fn exhaustion_empties_the_cache() {
        let mesh = box_mesh(1, 1.0, [0.0; 3]);
        let mut cache = CellCache::new(mesh.max_cell_size());
        cache
            .resolve(&mesh, &[0.5, 0.25, 0.75], TOL2, LocationStrategy::Tiered)
            .expect("resolve")
            .expect("found");

        let result = cache
            .resolve(&mesh, &[3.0, 0.0, 0.0], TOL2, LocationStrategy::Tiered)
            .expect("resolve");
        assert!(result.is_none());
        assert_eq!(cache.cell(), None);
        assert!(cache.weights().is_none());
        assert!(cache.pcoords().is_none());
    }

    #[test]
    fn global_strategy_never_hits() {
        let mesh = box_mesh(1, 1.0, [0.0; 3]);
        let mut cache = CellCache::new(mesh.max_cell_size());
        for _ in 0..3 {
            let (_, tier) = cache
                .resolve(&mesh, &[0.5, 0.5, 0.5], TOL2, LocationStrategy::Global)
                .expect("resolve")
                .expect("found");
            assert_eq!(tier, Tier::Global);
        }
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 3 });
    }

    #[test]
    fn stale_seed_falls_through_to_global() {
        let mesh = box_mesh(1, 1.0, [0.0; 3]);
        let mut cache = CellCache::new(mesh.max_cell_size());
        cache.seed(Some(1_000));
        let (cell, tier) = cache
            .resolve(&mesh, &[0.5, 0.5, 0.5], TOL2, LocationStrategy::Tiered)
            .expect("resolve")
            .expect("found");
        assert_eq!(tier, Tier::Global);
        assert!(cell < mesh.number_of_cells());
    }

    #[test]
    fn seeding_discards_current_weights() {
        let mesh = box_mesh(1, 1.0, [0.0; 3]);
        let mut cache = CellCache::new(mesh.max_cell_size());
        cache
            .resolve(&mesh, &[0.5, 0.5, 0.5], TOL2, LocationStrategy::Tiered)
            .expect("resolve");
        assert!(cache.weights().is_some());
        cache.seed(Some(0));
        assert_eq!(cache.cell(), Some(0));
        assert!(cache.weights().is_none());
    }

    #[test]
    fn every_query_is_either_a_hit_or_a_miss() {
        let mesh = box_mesh(2, 1.0, [0.0; 3]);
        let mut cache = CellCache::new(mesh.max_cell_size());
        let queries = [
            [0.2, 0.1, 0.1],
            [0.21, 0.1, 0.1],
            [1.7, 1.6, 1.8],
            [5.0, 5.0, 5.0],
            [0.5, 0.5, 0.4],
        ];
        for x in &queries {
            cache
                .resolve(&mesh, x, TOL2, LocationStrategy::Tiered)
                .expect("resolve");
        }
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.hits + stats.misses, queries.len() as u64);
    }

    #[test]
    fn stats_add() {
        let total = CacheStats { hits: 2, misses: 1 } + CacheStats { hits: 3, misses: 4 };
        assert_eq!(total, CacheStats { hits: 5, misses: 5 });
    }
}
