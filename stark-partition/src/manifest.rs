//! Partition manifest sidecar.
//!
//! A dataset directory may carry a `partition_info` file describing each
//! partition's spatial envelope, temporal range, and payload file. One
//! line per partition:
//!
//! ```text
//! <wkt-envelope>;<startEpochMillisOrEmpty>;<endEpochMillisOrEmpty>;<partFileName>
//! ```
//!
//! An empty temporal field means unbounded on that side; both empty means
//! the partition has no temporal component. Readers treat a missing
//! sidecar as "read everything".

use crate::partitioner::SpatialPartitioner;
use geo::BoundingRect;
use geo_types::polygon;
use serde::{Deserialize, Serialize};
use stark_core::cell::NRectRange;
use stark_core::error::{Error, Result};
use stark_core::geometry::parse_wkt;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Sidecar file name under the dataset directory.
pub const MANIFEST_FILE: &str = "partition_info";

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Spatial envelope of the partition (right-open upper bounds, as
    /// written).
    pub envelope: NRectRange,

    /// Temporal lower bound; `None` is unbounded.
    pub start: Option<i64>,

    /// Temporal upper bound; `None` is unbounded.
    pub end: Option<i64>,

    /// Payload file name of the partition.
    pub file: String,
}

/// Write the manifest for a partitioner, without temporal bounds.
///
/// Part file names follow the `part-NNNNN` pattern in partition id order.
/// Returns the path of the written sidecar.
pub fn write_manifest(partitioner: &dyn SpatialPartitioner, dir: &Path) -> Result<PathBuf> {
    let temporal = vec![(None, None); partitioner.num_partitions() as usize];
    write_manifest_with_temporal(partitioner, dir, &temporal)
}

/// Write the manifest with per-partition temporal bounds.
///
/// `temporal` must hold one `(start, end)` pair per partition.
pub fn write_manifest_with_temporal(
    partitioner: &dyn SpatialPartitioner,
    dir: &Path,
    temporal: &[(Option<i64>, Option<i64>)],
) -> Result<PathBuf> {
    let num = partitioner.num_partitions() as usize;
    if temporal.len() != num {
        return Err(Error::config(format!(
            "temporal bounds for {} partitions, expected {}",
            temporal.len(),
            num
        )));
    }

    let path = dir.join(MANIFEST_FILE);
    let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
    for id in 0..partitioner.num_partitions() {
        let extent = partitioner.partition_extent(id)?;
        let (start, end) = temporal[id as usize];
        writeln!(
            file,
            "{};{};{};part-{:05}",
            envelope_wkt(&extent),
            start.map_or_else(String::new, |t| t.to_string()),
            end.map_or_else(String::new, |t| t.to_string()),
            id
        )?;
    }
    file.flush()?;
    tracing::debug!(path = %path.display(), partitions = num, "wrote partition manifest");
    Ok(path)
}

/// Read the manifest under a dataset directory.
///
/// Returns `Ok(None)` when the sidecar does not exist, which callers
/// interpret as "read everything".
pub fn read_manifest(dir: &Path) -> Result<Option<Vec<ManifestEntry>>> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let reader = BufReader::new(std::fs::File::open(&path)?);
    let mut entries = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(parse_line(&line).map_err(|e| {
            Error::domain(format!(
                "{}:{}: {}",
                path.display(),
                lineno + 1,
                e
            ))
        })?);
    }
    Ok(Some(entries))
}

fn parse_line(line: &str) -> Result<ManifestEntry> {
    let fields: Vec<&str> = line.split(';').collect();
    if fields.len() != 4 {
        return Err(Error::domain(format!(
            "expected 4 ';'-separated fields, got {}",
            fields.len()
        )));
    }

    let geom = parse_wkt(fields[0])?;
    let rect = geom
        .bounding_rect()
        .ok_or_else(|| Error::geometry("manifest envelope has no extent"))?;
    // the written coordinates already carry the right-open upper bounds
    let envelope = NRectRange::new2(rect.min().x, rect.min().y, rect.max().x, rect.max().y)?;

    Ok(ManifestEntry {
        envelope,
        start: parse_bound(fields[1])?,
        end: parse_bound(fields[2])?,
        file: fields[3].to_string(),
    })
}

fn parse_bound(field: &str) -> Result<Option<i64>> {
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse::<i64>()
        .map(Some)
        .map_err(|e| Error::domain(format!("bad temporal bound '{}': {}", field, e)))
}

/// Render an envelope as a WKT polygon, counter-clockwise from the
/// lower-left corner.
fn envelope_wkt(r: &NRectRange) -> String {
    use wkt::ToWkt;
    let (x0, y0) = (r.ll().get(0), r.ll().get(1));
    let (x1, y1) = (r.ur().get(0), r.ur().get(1));
    let poly = geo_types::polygon![
        (x: x0, y: y0),
        (x: x1, y: y0),
        (x: x1, y: y1),
        (x: x0, y: y1),
        (x: x0, y: y0),
    ];
    poly.wkt_string()
}
