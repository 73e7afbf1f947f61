//! Skyline (pareto-front) computation.
//!
//! All three flavors work in a 2-D distance space: every record maps to
//! `(spatial distance, temporal distance)` from a reference object, and a
//! caller-supplied `dominates` test decides the front. The flavors differ
//! in how work is cut:
//!
//! - [`skyline`]: BBS-style: grid-partition the distance space, compute
//!   a local skyline per grid partition, drop partitions whose whole
//!   extent is dominated by an earlier partition's max corner, merge the
//!   survivors.
//! - [`skyline_agg`]: fold the whole collection into one [`Skyline`]
//!   accumulator; merge is associative and commutative up to dominance
//!   equivalence.
//! - [`skyline_angular`]: partition records by angle around the
//!   reference into `ppd` sectors, compute per-sector skylines, merge.

use crate::collection::{CancelToken, SpatialCollection};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use stark_core::cell::EPS;
use stark_core::error::{Error, Result};
use stark_core::geometry::DistanceMetric;
use stark_core::object::StObject;
use std::sync::Arc;

/// A point in the 2-D distance space: (spatial, temporal).
pub type SkyPoint = (f64, f64);

/// Caller-supplied strict dominance test.
pub type DominatesFn = Arc<dyn Fn(&SkyPoint, &SkyPoint) -> bool + Send + Sync>;

/// Minimizing dominance: `a` dominates `b` when it is no worse in both
/// dimensions and strictly better in at least one.
pub fn dominates_min(a: &SkyPoint, b: &SkyPoint) -> bool {
    a.0 <= b.0 && a.1 <= b.1 && (a.0 < b.0 || a.1 < b.1)
}

/// Distance pair of a record relative to the reference.
///
/// The temporal distance is the absolute difference of start instants;
/// records without a matching temporal component contribute zero.
pub fn distance_pair(reference: &StObject, obj: &StObject, metric: DistanceMetric) -> SkyPoint {
    let s = reference.distance(obj, metric);
    let t = match (reference.time(), obj.time()) {
        (Some(a), Some(b)) => (a.start() - b.start()).unsigned_abs() as f64,
        _ => 0.0,
    };
    (s, t)
}

/// Set of mutually non-dominated points.
///
/// Inserting a point removes every stored point it dominates and is a
/// no-op when a stored point dominates it.
#[derive(Clone)]
pub struct Skyline<V> {
    points: Vec<(SkyPoint, V)>,
    dominates: DominatesFn,
}

impl<V> Skyline<V> {
    /// An empty skyline under the given dominance test.
    pub fn new(dominates: DominatesFn) -> Self {
        Self {
            points: Vec::new(),
            dominates,
        }
    }

    /// An empty skyline under [`dominates_min`].
    pub fn minimizing() -> Self {
        Self::new(Arc::new(dominates_min))
    }

    /// Offer a point. Returns true when it joined the skyline.
    pub fn insert(&mut self, point: SkyPoint, value: V) -> bool {
        if self
            .points
            .iter()
            .any(|(stored, _)| (self.dominates)(stored, &point))
        {
            return false;
        }
        let dominates = &self.dominates;
        self.points.retain(|(stored, _)| !dominates(&point, stored));
        self.points.push((point, value));
        true
    }

    /// Merge another skyline in.
    pub fn merge(mut self, other: Skyline<V>) -> Skyline<V> {
        for (point, value) in other.points {
            self.insert(point, value);
        }
        self
    }

    /// The current front.
    pub fn points(&self) -> &[(SkyPoint, V)] {
        &self.points
    }

    /// Consume into the front.
    pub fn into_points(self) -> Vec<(SkyPoint, V)> {
        self.points
    }

    /// Number of points on the front.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the front is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// BBS-style skyline with grid partitioning of the distance space.
///
/// `ppd` is the number of grid partitions per distance dimension.
pub fn skyline<V>(
    coll: &SpatialCollection<V>,
    reference: &StObject,
    dominates: DominatesFn,
    ppd: usize,
    metric: DistanceMetric,
    token: &CancelToken,
) -> Result<Vec<(SkyPoint, (StObject, V))>>
where
    V: Clone + Send + Sync,
{
    if ppd == 0 {
        return Err(Error::config("partitions per dimension must be at least 1"));
    }

    // project to distance space
    let projected = coll.map_partitions(|part| {
        let mut out = Vec::with_capacity(part.len());
        for (obj, value) in part {
            token.check()?;
            out.push((
                distance_pair(reference, obj, metric),
                (obj.clone(), value.clone()),
            ));
        }
        Ok(out)
    })?;

    // bounds of the distance space
    let (max_s, max_t) = projected
        .iter()
        .flatten()
        .fold((0.0f64, 0.0f64), |(ms, mt), ((s, t), _)| {
            (ms.max(*s), mt.max(*t))
        });
    let s_len = (max_s + EPS) / ppd as f64;
    let t_len = (max_t + EPS) / ppd as f64;

    // grid-partition the distance space
    let mut cells: Vec<Vec<(SkyPoint, (StObject, V))>> = (0..ppd * ppd).map(|_| Vec::new()).collect();
    for (point, record) in projected.into_iter().flatten() {
        let cx = ((point.0 / s_len) as usize).min(ppd - 1);
        let cy = ((point.1 / t_len) as usize).min(ppd - 1);
        cells[cy * ppd + cx].push((point, record));
    }

    // local skyline plus extent per non-empty grid partition
    let locals: Vec<(usize, SkyPoint, SkyPoint, Skyline<(StObject, V)>)> = cells
        .into_par_iter()
        .enumerate()
        .filter(|(_, cell)| !cell.is_empty())
        .map(|(id, cell)| {
            let mut lo = (f64::INFINITY, f64::INFINITY);
            let mut hi = (f64::NEG_INFINITY, f64::NEG_INFINITY);
            let mut local = Skyline::new(dominates.clone());
            for (point, record) in cell {
                lo = (lo.0.min(point.0), lo.1.min(point.1));
                hi = (hi.0.max(point.0), hi.1.max(point.1));
                local.insert(point, record);
            }
            (id, lo, hi, local)
        })
        .collect();

    // drop partitions whose whole extent is dominated by an earlier
    // partition's max corner: every point there is dominated by every
    // point of the earlier partition
    let mut global = Skyline::new(dominates.clone());
    let mut pruned = 0usize;
    for (idx, (_, lo, _, local)) in locals.iter().enumerate() {
        let dominated = locals[..idx]
            .iter()
            .any(|(_, _, earlier_hi, _)| dominates(earlier_hi, lo));
        if dominated {
            pruned += 1;
            continue;
        }
        global = global.merge(local.clone());
    }
    tracing::debug!(
        partitions = locals.len(),
        pruned = pruned,
        skyline = global.len(),
        "BBS skyline merge"
    );
    Ok(global.into_points())
}

/// Skyline as a single fold over the collection.
pub fn skyline_agg<V>(
    coll: &SpatialCollection<V>,
    reference: &StObject,
    dominates: DominatesFn,
    metric: DistanceMetric,
) -> Vec<(SkyPoint, (StObject, V))>
where
    V: Clone + Send + Sync,
{
    let zero = Skyline::new(dominates);
    coll.aggregate(
        zero,
        |mut acc, (obj, value)| {
            acc.insert(
                distance_pair(reference, obj, metric),
                (obj.clone(), value.clone()),
            );
            acc
        },
        Skyline::merge,
    )
    .into_points()
}

/// Skyline with angular partitioning around the reference.
///
/// Records partition into `ppd` sectors by their angle around the
/// reference centroid, over the full circle or only the first quadrant
/// when `first_quadrant` is set. Sector skylines are reduced by sector id
/// across the collection's partitions, then merged globally.
pub fn skyline_angular<V>(
    coll: &SpatialCollection<V>,
    reference: &StObject,
    dominates: DominatesFn,
    ppd: usize,
    first_quadrant: bool,
    metric: DistanceMetric,
    token: &CancelToken,
) -> Result<Vec<(SkyPoint, (StObject, V))>>
where
    V: Clone + Send + Sync,
{
    if ppd == 0 {
        return Err(Error::config("sectors per dimension must be at least 1"));
    }
    let full = if first_quadrant {
        std::f64::consts::FRAC_PI_2
    } else {
        2.0 * std::f64::consts::PI
    };
    let sector_width = full / ppd as f64;
    let ref_center = reference.geo().centroid().clone();

    // per physical partition: sector id -> sector skyline
    let partials = coll.map_partitions(|part| {
        let mut sectors: FxHashMap<usize, Skyline<(StObject, V)>> = FxHashMap::default();
        for (obj, value) in part {
            token.check()?;
            let c = obj.geo().centroid();
            let mut angle = (c.get(1) - ref_center.get(1))
                .atan2(c.get(0) - ref_center.get(0));
            if angle < 0.0 {
                angle += 2.0 * std::f64::consts::PI;
            }
            let sector = ((angle / sector_width) as usize).min(ppd - 1);
            sectors
                .entry(sector)
                .or_insert_with(|| Skyline::new(dominates.clone()))
                .insert(
                    distance_pair(reference, obj, metric),
                    (obj.clone(), value.clone()),
                );
        }
        Ok(vec![sectors])
    })?;

    // reduce by sector id across partitions
    let mut by_sector: FxHashMap<usize, Skyline<(StObject, V)>> = FxHashMap::default();
    for sectors in partials.into_iter().flatten() {
        for (sector, sky) in sectors {
            let merged = match by_sector.remove(&sector) {
                Some(existing) => existing.merge(sky),
                None => sky,
            };
            by_sector.insert(sector, merged);
        }
    }

    // final global merge
    let mut global = Skyline::new(dominates.clone());
    for (_, sky) in by_sector {
        global = global.merge(sky);
    }
    Ok(global.into_points())
}
