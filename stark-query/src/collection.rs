//! The bulk-parallel collection the operators run on.
//!
//! [`SpatialCollection`] is the minimal contract the engine needs from its
//! runtime: partitions of `(StObject, value)` records, per-partition map
//! and aggregate primitives executed with rayon, repartitioning by a
//! spatial partitioner, and cancellable element streams. Tasks are
//! single-threaded per partition; shared read-only state travels by
//! `Arc` (the broadcast of this runtime).

use rayon::prelude::*;
use stark_core::error::{Error, Result};
use stark_core::object::StObject;
use stark_partition::SpatialPartitioner;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag.
///
/// Operators check it at the boundary of every element emission and fail
/// with [`Error::Interrupted`] once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Fail with [`Error::Interrupted`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Share a value with every task, by reference count.
pub fn broadcast<T>(value: T) -> Arc<T> {
    Arc::new(value)
}

/// A partitioned collection of spatio-temporal records.
#[derive(Clone)]
pub struct SpatialCollection<V> {
    partitions: Vec<Vec<(StObject, V)>>,
    partitioner: Option<Arc<dyn SpatialPartitioner>>,
}

impl<V: std::fmt::Debug> std::fmt::Debug for SpatialCollection<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialCollection")
            .field("partitions", &self.partitions)
            .field("partitioner", &self.partitioner.as_ref().map(|_| "<partitioner>"))
            .finish()
    }
}

impl<V> SpatialCollection<V> {
    /// Distribute records over `num_partitions` chunks, with no spatial
    /// partitioner attached.
    pub fn parallelize(records: Vec<(StObject, V)>, num_partitions: usize) -> Self {
        let num = num_partitions.max(1);
        let chunk = records.len().div_ceil(num).max(1);
        let mut partitions: Vec<Vec<(StObject, V)>> = Vec::with_capacity(num);
        let mut iter = records.into_iter();
        for _ in 0..num {
            partitions.push(iter.by_ref().take(chunk).collect());
        }
        Self {
            partitions,
            partitioner: None,
        }
    }

    /// Wrap pre-partitioned data, with no spatial partitioner attached.
    pub fn from_partitions(partitions: Vec<Vec<(StObject, V)>>) -> Self {
        Self {
            partitions,
            partitioner: None,
        }
    }

    /// Attach a partitioner without moving data. The caller asserts the
    /// layout already matches.
    pub(crate) fn with_partitioner(
        mut self,
        partitioner: Option<Arc<dyn SpatialPartitioner>>,
    ) -> Self {
        self.partitioner = partitioner;
        self
    }

    /// The attached spatial partitioner, if any.
    pub fn partitioner(&self) -> Option<&Arc<dyn SpatialPartitioner>> {
        self.partitioner.as_ref()
    }

    /// Number of partitions.
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    /// True when no partition holds a record.
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(Vec::is_empty)
    }

    /// The raw partitions.
    pub fn partitions(&self) -> &[Vec<(StObject, V)>] {
        &self.partitions
    }

    /// A cancellable stream over one partition.
    ///
    /// Yields `Err(Interrupted)` once the token fires, then ends.
    pub fn iter_partition<'a>(
        &'a self,
        idx: usize,
        token: &'a CancelToken,
    ) -> impl Iterator<Item = Result<&'a (StObject, V)>> + 'a {
        let mut interrupted = false;
        self.partitions
            .get(idx)
            .map(|p| p.as_slice())
            .unwrap_or(&[])
            .iter()
            .map_while(move |record| {
                if interrupted {
                    return None;
                }
                if token.is_cancelled() {
                    interrupted = true;
                    return Some(Err(Error::Interrupted));
                }
                Some(Ok(record))
            })
    }
}

impl<V: Clone + Send + Sync> SpatialCollection<V> {
    /// Redistribute records by a spatial partitioner.
    ///
    /// The resulting collection has exactly `partitioner.num_partitions()`
    /// partitions and carries the partitioner.
    pub fn partition_by(&self, partitioner: Arc<dyn SpatialPartitioner>) -> Result<Self> {
        let mut partitions: Vec<Vec<(StObject, V)>> =
            (0..partitioner.num_partitions()).map(|_| Vec::new()).collect();
        for record in self.partitions.iter().flatten() {
            let id = partitioner.partition_id(&record.0)?;
            partitions[id as usize].push(record.clone());
        }
        Ok(Self {
            partitions,
            partitioner: Some(partitioner),
        })
    }

    /// Run a function over every partition in parallel.
    pub fn map_partitions<U, F>(&self, f: F) -> Result<Vec<Vec<U>>>
    where
        U: Send,
        F: Fn(&[(StObject, V)]) -> Result<Vec<U>> + Sync,
    {
        self.partitions
            .par_iter()
            .map(|p| f(p.as_slice()))
            .collect()
    }

    /// Run a function over every partition in parallel, with the stable
    /// partition id.
    pub fn map_partitions_with_index<U, F>(&self, f: F) -> Result<Vec<Vec<U>>>
    where
        U: Send,
        F: Fn(u32, &[(StObject, V)]) -> Result<Vec<U>> + Sync,
    {
        self.partitions
            .par_iter()
            .enumerate()
            .map(|(idx, p)| f(idx as u32, p.as_slice()))
            .collect()
    }

    /// Fold every record into an accumulator per partition, then combine
    /// the partials. `comb` must be associative and commutative.
    pub fn aggregate<A, S, C>(&self, zero: A, seq: S, comb: C) -> A
    where
        A: Clone + Send + Sync,
        S: Fn(A, &(StObject, V)) -> A + Sync,
        C: Fn(A, A) -> A + Sync + Send,
    {
        self.partitions
            .par_iter()
            .map(|p| p.iter().fold(zero.clone(), &seq))
            .reduce(|| zero.clone(), &comb)
    }

    /// All records, flattened in partition order.
    pub fn collect(&self) -> Vec<(StObject, V)> {
        self.partitions.iter().flatten().cloned().collect()
    }

    /// The first `k` records in partition order.
    pub fn take(&self, k: usize) -> Vec<(StObject, V)> {
        self.partitions
            .iter()
            .flatten()
            .take(k)
            .cloned()
            .collect()
    }
}
