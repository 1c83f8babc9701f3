//! Uniform-bin point locator used by the unseeded cell search.

use crate::cells::distance2;
use crate::dataset::Bounds;

/// Average number of points a bucket should hold.
pub const DEFAULT_POINTS_PER_BUCKET: usize = 3;

/// Buckets points into a regular grid over their bounding box and answers
/// closest-point queries by searching rings of buckets outward from the
/// query's bucket.
#[derive(Debug, Clone)]
pub struct PointLocator {
    bounds: Bounds,
    divisions: [usize; 3],
    bucket_size: [f64; 3],
    buckets: Vec<Vec<usize>>,
}

impl PointLocator {
    /// Returns `None` for an empty point set.
    pub fn build(points: &[[f64; 3]], points_per_bucket: usize) -> Option<Self> {
        let bounds = Bounds::from_points(points)?;
        let target_buckets = (points.len() / points_per_bucket.max(1)).max(1) as f64;
        let per_axis = target_buckets.cbrt().ceil().max(1.0) as usize;

        let mut divisions = [1; 3];
        let mut bucket_size = [1.0; 3];
        for axis in 0..3 {
            let extent = bounds.max[axis] - bounds.min[axis];
            if extent > 0.0 {
                divisions[axis] = per_axis;
                bucket_size[axis] = extent / per_axis as f64;
            }
        }

        let mut locator = Self {
            bounds,
            divisions,
            bucket_size,
            buckets: vec![Vec::new(); divisions[0] * divisions[1] * divisions[2]],
        };
        for (id, p) in points.iter().enumerate() {
            let bucket = locator.bucket_of(p);
            let index = locator.flat_index(bucket);
            locator.buckets[index].push(id);
        }
        Some(locator)
    }

    pub fn divisions(&self) -> [usize; 3] {
        self.divisions
    }

    /// Id of the point in `points` closest to `x`. `points` must be the
    /// slice the locator was built from.
    pub fn find_closest_point(&self, points: &[[f64; 3]], x: &[f64; 3]) -> Option<usize> {
        let center = self.bucket_of(x);
        let min_bucket = self
            .bucket_size
            .iter()
            .zip(self.divisions.iter())
            .filter(|(_, d)| **d > 1)
            .map(|(h, _)| *h)
            .fold(f64::INFINITY, f64::min);
        let max_ring = *self.divisions.iter().max().unwrap_or(&1);

        let mut best: Option<(usize, f64)> = None;
        for ring in 0..=max_ring {
            self.visit_ring(center, ring, |bucket| {
                for &id in &self.buckets[bucket] {
                    let d2 = distance2(&points[id], x);
                    if best.map_or(true, |(_, b)| d2 < b) {
                        best = Some((id, d2));
                    }
                }
            });
            // Every bucket in ring `ring + 1` is at least `ring` buckets away.
            if let Some((_, d2)) = best {
                let reach = ring as f64 * min_bucket;
                if d2 <= reach * reach {
                    break;
                }
            }
        }
        best.map(|(id, _)| id)
    }

    fn bucket_of(&self, x: &[f64; 3]) -> [usize; 3] {
        let mut bucket = [0; 3];
        for axis in 0..3 {
            let offset = (x[axis] - self.bounds.min[axis]) / self.bucket_size[axis];
            let last = self.divisions[axis] - 1;
            bucket[axis] = if offset.is_nan() || offset <= 0.0 {
                0
            } else {
                (offset.floor() as usize).min(last)
            };
        }
        bucket
    }

    fn flat_index(&self, bucket: [usize; 3]) -> usize {
        bucket[0] + self.divisions[0] * (bucket[1] + self.divisions[1] * bucket[2])
    }

    fn visit_ring(&self, center: [usize; 3], ring: usize, mut visit: impl FnMut(usize)) {
        let ring = ring as isize;
        let range = |axis: usize| {
            let c = center[axis] as isize;
            let hi = self.divisions[axis] as isize - 1;
            (c - ring).max(0)..=(c + ring).min(hi)
        };
        for k in range(2) {
            for j in range(1) {
                for i in range(0) {
                    let offset = (i - center[0] as isize)
                        .abs()
                        .max((j - center[1] as isize).abs())
                        .max((k - center[2] as isize).abs());
                    if offset == ring {
                        visit(self.flat_index([i as usize, j as usize, k as usize]));
                    }
                }
            }
        }
    }
}
