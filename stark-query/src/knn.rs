//! Two-pass k-nearest-neighbor search.
//!
//! Pass one computes a local top-k per partition with the bounded [`Knn`]
//! accumulator; pass two merges the at most `partitions * k` local
//! candidates and keeps the global k, ordered by ascending distance.
//! Distances are exact object distances, so the result is correct for
//! any geometry mix; ties at position k resolve by insertion order.

use crate::collection::{CancelToken, SpatialCollection};
use stark_core::error::{Error, Result};
use stark_core::geometry::DistanceMetric;
use stark_core::object::StObject;

/// Bounded container of the k nearest values seen so far.
///
/// Below capacity, values append in arrival order. At capacity, a new
/// value replaces the current maximum only when strictly closer, so ties
/// at the boundary keep the earliest arrival.
#[derive(Debug, Clone)]
pub struct Knn<V> {
    k: usize,
    items: Vec<(f64, V)>,
    min_idx: usize,
    max_idx: usize,
}

impl<V> Knn<V> {
    /// Create an accumulator for `k` values.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::config("k must be positive"));
        }
        Ok(Self {
            k,
            items: Vec::with_capacity(k),
            min_idx: 0,
            max_idx: 0,
        })
    }

    /// Capacity of the accumulator.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Values currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no value was inserted.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True once `k` values are held.
    pub fn is_full(&self) -> bool {
        self.items.len() == self.k
    }

    /// Smallest held distance.
    pub fn min_dist(&self) -> Option<f64> {
        self.items.get(self.min_idx).map(|(d, _)| *d)
    }

    /// Largest held distance.
    pub fn max_dist(&self) -> Option<f64> {
        self.items.get(self.max_idx).map(|(d, _)| *d)
    }

    /// Offer a value at the given distance.
    pub fn insert(&mut self, dist: f64, value: V) {
        if self.items.len() < self.k {
            self.items.push((dist, value));
            let idx = self.items.len() - 1;
            if dist < self.items[self.min_idx].0 {
                self.min_idx = idx;
            }
            // the max index tracks the latest maximum, so evictions hit
            // the most recent arrival and boundary ties keep the earliest
            if dist >= self.items[self.max_idx].0 {
                self.max_idx = idx;
            }
            return;
        }
        if dist < self.items[self.max_idx].0 {
            self.items[self.max_idx] = (dist, value);
            self.recompute_extremes();
        }
    }

    fn recompute_extremes(&mut self) {
        let mut min_idx = 0;
        let mut max_idx = 0;
        for (idx, (d, _)) in self.items.iter().enumerate() {
            if *d < self.items[min_idx].0 {
                min_idx = idx;
            }
            if *d >= self.items[max_idx].0 {
                max_idx = idx;
            }
        }
        self.min_idx = min_idx;
        self.max_idx = max_idx;
    }

    /// Merge another accumulator in.
    ///
    /// Short-circuits when `self` is full and everything in `other` is
    /// farther than the current maximum.
    pub fn merge(mut self, other: Knn<V>) -> Knn<V> {
        if self.is_full() {
            if let (Some(other_min), Some(self_max)) = (other.min_dist(), self.max_dist()) {
                if other_min > self_max {
                    return self;
                }
            }
        }
        for (dist, value) in other.items {
            self.insert(dist, value);
        }
        self
    }

    /// Consume into `(distance, value)` pairs sorted by ascending
    /// distance, ties in insertion order.
    pub fn into_sorted(self) -> Vec<(f64, V)> {
        let mut items = self.items;
        // stable sort keeps insertion order among equal distances
        items.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        items
    }
}

/// The k records nearest to `query`, ordered by ascending distance.
///
/// Fails with a configuration error on `k == 0`.
pub fn knn<V>(
    coll: &SpatialCollection<V>,
    query: &StObject,
    k: usize,
    metric: DistanceMetric,
    token: &CancelToken,
) -> Result<Vec<(f64, (StObject, V))>>
where
    V: Clone + Send + Sync,
{
    if k == 0 {
        return Err(Error::config("k must be positive"));
    }

    // local pass: bounded top-k per partition
    let locals = coll.map_partitions(|part| {
        let mut acc = Knn::new(k)?;
        for (obj, value) in part {
            token.check()?;
            acc.insert(obj.distance(query, metric), (obj.clone(), value.clone()));
        }
        Ok(vec![acc])
    })?;

    // global merge: at most partitions * k candidates
    let mut merged = Knn::new(k)?;
    for acc in locals.into_iter().flatten() {
        merged = merged.merge(acc);
    }
    tracing::debug!(k = k, found = merged.len(), "k-NN global merge");
    Ok(merged.into_sorted())
}
