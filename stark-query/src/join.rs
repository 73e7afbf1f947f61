//! Spatial join of two collections.
//!
//! Joins enumerate partition pairs, prune pairs whose extents cannot
//! overlap, and evaluate the exact condition per pair, optionally
//! through a live R-tree built over the smaller side. The result is the
//! filter of the full cartesian product by the condition, in unspecified
//! order.
//!
//! With `one_to_many` set, the operator instead produces one task per
//! left partition carrying every compatible right partition, which avoids
//! re-reading right partitions once per pair when both sides share a
//! partitioner.

use crate::collection::{CancelToken, SpatialCollection};
use crate::filter::IndexMode;
use rayon::prelude::*;
use stark_core::error::Result;
use stark_core::object::StObject;
use stark_core::predicate::JoinPredicate;
use stark_index::RTree;
use stark_partition::SpatialPartitioner;
use std::sync::Arc;

/// The join condition: a predicate the operator can prune and index for,
/// or an arbitrary pair function.
#[derive(Clone)]
pub enum JoinCondition {
    /// A spatio-temporal predicate.
    Predicate(JoinPredicate),
    /// An arbitrary pair test. Pairs are still pruned by partition
    /// extents, but live indexes are not probed for candidates since the
    /// condition carries no envelope semantics.
    Custom(Arc<dyn Fn(&StObject, &StObject) -> bool + Send + Sync>),
}

impl JoinCondition {
    fn eval(&self, left: &StObject, right: &StObject) -> bool {
        match self {
            JoinCondition::Predicate(p) => p.eval(left, right),
            JoinCondition::Custom(f) => f(left, right),
        }
    }
}

/// Join options.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOptions {
    /// Group all compatible right partitions under each left partition
    /// instead of enumerating pairs.
    pub one_to_many: bool,
    /// Live-index strategy for the per-pair computation.
    pub index: IndexMode,
}

/// Join two collections on a condition.
///
/// When `partitioner` is given, any side not already partitioned by it is
/// repartitioned first. Emits `(left_value, right_value)` for every
/// matching pair.
pub fn spatial_join<V, W>(
    left: &SpatialCollection<V>,
    right: &SpatialCollection<W>,
    condition: &JoinCondition,
    partitioner: Option<Arc<dyn SpatialPartitioner>>,
    options: JoinOptions,
    token: &CancelToken,
) -> Result<Vec<(V, W)>>
where
    V: Clone + Send + Sync,
    W: Clone + Send + Sync,
{
    // normalize partitioning
    let left_re;
    let left = match &partitioner {
        Some(p) if !is_partitioned_by(left.partitioner(), p) => {
            left_re = left.partition_by(p.clone())?;
            &left_re
        }
        _ => left,
    };
    let right_re;
    let right = match &partitioner {
        Some(p) if !is_partitioned_by(right.partitioner(), p) => {
            right_re = right.partition_by(p.clone())?;
            &right_re
        }
        _ => right,
    };

    if options.one_to_many {
        join_one_to_many(left, right, condition, options.index, token)
    } else {
        join_pairwise(left, right, condition, options.index, token)
    }
}

fn is_partitioned_by(
    current: Option<&Arc<dyn SpatialPartitioner>>,
    wanted: &Arc<dyn SpatialPartitioner>,
) -> bool {
    current.is_some_and(|p| Arc::ptr_eq(p, wanted))
}

/// Can this partition pair hold a matching pair at all?
///
/// A pair survives when either side lacks a spatial partitioner, or the
/// two extents overlap under the right-open convention.
fn pair_survives<V, W>(
    left: &SpatialCollection<V>,
    right: &SpatialCollection<W>,
    lp: u32,
    rp: u32,
) -> Result<bool> {
    let (lpart, rpart) = match (left.partitioner(), right.partitioner()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Ok(true),
    };
    Ok(lpart
        .partition_extent(lp)?
        .intersects(&rpart.partition_extent(rp)?))
}

fn join_pairwise<V, W>(
    left: &SpatialCollection<V>,
    right: &SpatialCollection<W>,
    condition: &JoinCondition,
    index: IndexMode,
    token: &CancelToken,
) -> Result<Vec<(V, W)>>
where
    V: Clone + Send + Sync,
    W: Clone + Send + Sync,
{
    let mut pairs = Vec::new();
    for lp in 0..left.num_partitions() {
        if left.partitions()[lp].is_empty() {
            continue;
        }
        for rp in 0..right.num_partitions() {
            if right.partitions()[rp].is_empty() {
                continue;
            }
            if pair_survives(left, right, lp as u32, rp as u32)? {
                pairs.push((lp, rp));
            }
        }
    }
    tracing::debug!(
        left = left.num_partitions(),
        right = right.num_partitions(),
        surviving_pairs = pairs.len(),
        "enumerated join partition pairs"
    );

    let results: Vec<Vec<(V, W)>> = pairs
        .par_iter()
        .map(|&(lp, rp)| {
            join_parts(
                &left.partitions()[lp],
                &[&right.partitions()[rp]],
                condition,
                index,
                token,
            )
        })
        .collect::<Result<_>>()?;
    Ok(results.into_iter().flatten().collect())
}

fn join_one_to_many<V, W>(
    left: &SpatialCollection<V>,
    right: &SpatialCollection<W>,
    condition: &JoinCondition,
    index: IndexMode,
    token: &CancelToken,
) -> Result<Vec<(V, W)>>
where
    V: Clone + Send + Sync,
    W: Clone + Send + Sync,
{
    // one task per left partition, carrying all compatible right ids
    let mut tasks: Vec<(usize, Vec<usize>)> = Vec::new();
    for lp in 0..left.num_partitions() {
        if left.partitions()[lp].is_empty() {
            continue;
        }
        let mut rights = Vec::new();
        for rp in 0..right.num_partitions() {
            if right.partitions()[rp].is_empty() {
                continue;
            }
            if pair_survives(left, right, lp as u32, rp as u32)? {
                rights.push(rp);
            }
        }
        if !rights.is_empty() {
            tasks.push((lp, rights));
        }
    }

    let results: Vec<Vec<(V, W)>> = tasks
        .par_iter()
        .map(|(lp, rights)| {
            let rparts: Vec<&[(StObject, W)]> = rights
                .iter()
                .map(|rp| right.partitions()[*rp].as_slice())
                .collect();
            join_parts(&left.partitions()[*lp], &rparts, condition, index, token)
        })
        .collect::<Result<_>>()?;
    Ok(results.into_iter().flatten().collect())
}

/// Join one left partition against a set of right partitions.
fn join_parts<V, W, R>(
    lpart: &[(StObject, V)],
    rparts: &[R],
    condition: &JoinCondition,
    index: IndexMode,
    token: &CancelToken,
) -> Result<Vec<(V, W)>>
where
    V: Clone,
    W: Clone,
    R: AsRef<[(StObject, W)]>,
{
    let mut out = Vec::new();

    // live indexes only pay off for predicate conditions, whose envelope
    // semantics make MBR probing sound
    if let (IndexMode::Live { order }, JoinCondition::Predicate(pred)) = (index, condition) {
        let rlen: usize = rparts.iter().map(|r| r.as_ref().len()).sum();
        if lpart.len() <= rlen {
            // index the left side, probe with right records
            let mut tree = RTree::with_order(order)?;
            for (i, (obj, _)) in lpart.iter().enumerate() {
                tree.insert(obj.geo().envelope().clone(), i)?;
            }
            tree.build()?;
            for rpart in rparts {
                for (robj, rval) in rpart.as_ref() {
                    token.check()?;
                    let probe = crate::filter::probe_envelope(robj, pred);
                    for i in tree.query(&probe)? {
                        let (lobj, lval) = &lpart[*i];
                        if pred.eval(lobj, robj) {
                            out.push((lval.clone(), rval.clone()));
                        }
                    }
                }
            }
        } else {
            // index the right side, probe with left records
            let mut tree = RTree::with_order(order)?;
            let mut flat: Vec<&(StObject, W)> = Vec::with_capacity(rlen);
            for rpart in rparts {
                for record in rpart.as_ref() {
                    tree.insert(record.0.geo().envelope().clone(), flat.len())?;
                    flat.push(record);
                }
            }
            tree.build()?;
            for (lobj, lval) in lpart {
                token.check()?;
                let probe = crate::filter::probe_envelope(lobj, pred);
                for i in tree.query(&probe)? {
                    let (robj, rval) = flat[*i];
                    if pred.eval(lobj, robj) {
                        out.push((lval.clone(), rval.clone()));
                    }
                }
            }
        }
        return Ok(out);
    }

    for (lobj, lval) in lpart {
        token.check()?;
        for rpart in rparts {
            for (robj, rval) in rpart.as_ref() {
                if condition.eval(lobj, robj) {
                    out.push((lval.clone(), rval.clone()));
                }
            }
        }
    }
    Ok(out)
}
