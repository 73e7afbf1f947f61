//! Partition-pruning spatial filter.
//!
//! Filters a collection down to the records matching a predicate against
//! one query object. When the collection carries a spatial partitioner,
//! partitions whose extent cannot hold a match are never read. Within a
//! surviving partition the operator either scans, or builds a live R-tree
//! and probes it for candidates before applying the exact spatio-temporal
//! predicate.

use crate::collection::{CancelToken, SpatialCollection};
use stark_core::cell::NRectRange;
use stark_core::error::Result;
use stark_core::object::StObject;
use stark_core::predicate::JoinPredicate;
use stark_index::RTree;

/// Per-partition index strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    /// Scan every record of a surviving partition.
    #[default]
    None,
    /// Build an R-tree over the partition inside the task, probe it, and
    /// discard it with the task.
    Live { order: usize },
}

/// The envelope to probe partitions and indexes with: the query envelope,
/// inflated by the maximum distance for distance predicates.
pub(crate) fn probe_envelope(query: &StObject, pred: &JoinPredicate) -> NRectRange {
    match pred {
        JoinPredicate::WithinDistance { max_dist, .. } => {
            query.geo().envelope().inflate(*max_dist)
        }
        _ => query.geo().envelope().clone(),
    }
}

/// Filter `coll` to the records `r` with `pred(r, query)`.
///
/// The result keeps the input's partition layout and partitioner.
pub fn spatial_filter<V>(
    coll: &SpatialCollection<V>,
    query: &StObject,
    pred: JoinPredicate,
    index: IndexMode,
    token: &CancelToken,
) -> Result<SpatialCollection<V>>
where
    V: Clone + Send + Sync,
{
    let probe_env = probe_envelope(query, &pred);

    let partitions = coll.map_partitions_with_index(|idx, part| {
        token.check()?;

        if let Some(partitioner) = coll.partitioner() {
            if partitioner.is_empty(idx) {
                return Ok(Vec::new());
            }
            let extent = partitioner.partition_extent(idx)?;
            if !pred.prune_keep(&extent, query.geo().envelope()) {
                tracing::trace!(partition = idx, "pruned by extent");
                return Ok(Vec::new());
            }
        }

        match index {
            IndexMode::None => {
                let mut out = Vec::new();
                for (obj, value) in part {
                    token.check()?;
                    if pred.eval(obj, query) {
                        out.push((obj.clone(), value.clone()));
                    }
                }
                Ok(out)
            }
            IndexMode::Live { order } => {
                let mut tree = RTree::with_order(order)?;
                for (i, (obj, _)) in part.iter().enumerate() {
                    tree.insert(obj.geo().envelope().clone(), i)?;
                }
                tree.build()?;

                let mut out = Vec::new();
                for i in tree.query(&probe_env)? {
                    token.check()?;
                    let (obj, value) = &part[*i];
                    if pred.eval(obj, query) {
                        out.push((obj.clone(), value.clone()));
                    }
                }
                Ok(out)
            }
        }
    })?;

    Ok(SpatialCollection::from_partitions(partitions)
        .with_partitioner(coll.partitioner().cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stark_core::geometry::{DistanceMetric, Geo};
    use stark_core::temporal::TemporalExpr;
    use stark_partition::GridPartitioner;
    use std::sync::Arc;

    fn pt(x: f64, y: f64, v: u32) -> (StObject, u32) {
        (StObject::new(Geo::point(x, y).unwrap()), v)
    }

    fn grid_collection() -> SpatialCollection<u32> {
        let universe = NRectRange::new2(0.0, 0.0, 10.0, 10.0).unwrap();
        let records: Vec<_> = (0..100)
            .map(|i| pt((i % 10) as f64 + 0.5, (i / 10) as f64 + 0.5, i))
            .collect();
        let objs: Vec<StObject> = records.iter().map(|(o, _)| o.clone()).collect();
        let p = Arc::new(GridPartitioner::with_parts_per_dim(universe, 5, objs.iter()).unwrap());
        SpatialCollection::parallelize(records, 1)
            .partition_by(p)
            .unwrap()
    }

    #[test]
    fn test_contained_by_window() {
        let coll = grid_collection();
        let window = StObject::from_wkt("POLYGON((0 0, 3 0, 3 3, 0 3, 0 0))").unwrap();
        let token = CancelToken::new();

        let hits = spatial_filter(
            &coll,
            &window,
            JoinPredicate::ContainedBy,
            IndexMode::None,
            &token,
        )
        .unwrap();

        let mut values: Vec<u32> = hits.collect().into_iter().map(|(_, v)| v).collect();
        values.sort_unstable();
        // points at x, y in {0.5, 1.5, 2.5}
        assert_eq!(values, vec![0, 1, 2, 10, 11, 12, 20, 21, 22]);
    }

    #[test]
    fn test_live_index_agrees_with_scan() {
        let coll = grid_collection();
        let window = StObject::from_wkt("POLYGON((2 2, 8 2, 8 6, 2 6, 2 2))").unwrap();
        let token = CancelToken::new();

        let scan = spatial_filter(
            &coll,
            &window,
            JoinPredicate::Intersects,
            IndexMode::None,
            &token,
        )
        .unwrap();
        let indexed = spatial_filter(
            &coll,
            &window,
            JoinPredicate::Intersects,
            IndexMode::Live { order: 4 },
            &token,
        )
        .unwrap();

        let mut a: Vec<u32> = scan.collect().into_iter().map(|(_, v)| v).collect();
        let mut b: Vec<u32> = indexed.collect().into_iter().map(|(_, v)| v).collect();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_within_distance_filter() {
        let coll = grid_collection();
        let q = StObject::new(Geo::point(5.0, 5.0).unwrap());
        let token = CancelToken::new();
        let pred = JoinPredicate::WithinDistance {
            max_dist: 1.0,
            metric: DistanceMetric::Euclidean,
        };

        let hits = spatial_filter(&coll, &q, pred, IndexMode::Live { order: 4 }, &token).unwrap();
        let mut values: Vec<u32> = hits.collect().into_iter().map(|(_, v)| v).collect();
        values.sort_unstable();
        // the four grid points at distance sqrt(0.5) around (5, 5)
        assert_eq!(values, vec![44, 45, 54, 55]);
    }

    #[test]
    fn test_temporal_mismatch_filtered_out() {
        let a = StObject::with_time(
            Geo::point(1.0, 1.0).unwrap(),
            TemporalExpr::interval(0, 10).unwrap(),
        );
        let b = StObject::new(Geo::point(1.0, 1.0).unwrap());
        let coll = SpatialCollection::parallelize(vec![(a, 0u32), (b, 1u32)], 1);

        let q = StObject::with_time(
            Geo::point(1.0, 1.0).unwrap(),
            TemporalExpr::interval(5, 15).unwrap(),
        );
        let token = CancelToken::new();
        let hits = spatial_filter(&coll, &q, JoinPredicate::Intersects, IndexMode::None, &token)
            .unwrap();
        let values: Vec<u32> = hits.collect().into_iter().map(|(_, v)| v).collect();
        // only the record with an overlapping interval matches; the
        // timeless one is excluded by the composition rule
        assert_eq!(values, vec![0]);
    }

    #[test]
    fn test_cancellation_surfaces() {
        let coll = grid_collection();
        let q = StObject::from_wkt("POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))").unwrap();
        let token = CancelToken::new();
        token.cancel();
        let err = spatial_filter(&coll, &q, JoinPredicate::Intersects, IndexMode::None, &token)
            .unwrap_err();
        assert!(matches!(err, stark_core::Error::Interrupted));
    }
}
