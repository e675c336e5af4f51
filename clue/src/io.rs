//! CSV reader/writer for the interchange format: one record per point,
//! `Ndim` coordinate columns, a weight column, and for output files the
//! clusterId and isSeed columns. The header row is ignored on input.

use std::path::Path;

use crate::error::{Error, Result};
use crate::points::PointsHost;

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => Error::Io(io),
            other => Error::Parse(format!("{other:?}")),
        }
    }
}

fn parse_f32(field: &str, line: usize) -> Result<f32> {
    field
        .trim()
        .parse::<f32>()
        .map_err(|_| Error::Parse(format!("bad float {field:?} on line {line}")))
}

fn parse_i32(field: &str, line: usize) -> Result<i32> {
    field
        .trim()
        .parse::<i32>()
        .map_err(|_| Error::Parse(format!("bad int {field:?} on line {line}")))
}

fn read_records<const N: usize>(
    path: &Path,
    extra_columns: usize,
) -> Result<(Vec<[f32; N]>, Vec<f32>, Vec<Vec<i32>>)> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut coords = Vec::new();
    let mut weights = Vec::new();
    let mut extras = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let line = row + 2;
        if record.len() < N + 1 + extra_columns {
            return Err(Error::Parse(format!(
                "line {line} has {} fields, expected at least {}",
                record.len(),
                N + 1 + extra_columns
            )));
        }
        let mut point = [0f32; N];
        for dim in 0..N {
            point[dim] = parse_f32(&record[dim], line)?;
        }
        coords.push(point);
        weights.push(parse_f32(&record[N], line)?);
        let mut extra = Vec::with_capacity(extra_columns);
        for column in 0..extra_columns {
            extra.push(parse_i32(&record[N + 1 + column], line)?);
        }
        extras.push(extra);
    }
    Ok((coords, weights, extras))
}

/// Read an input file: coordinates and weights.
pub fn read_csv<const N: usize>(path: impl AsRef<Path>) -> Result<PointsHost<N>> {
    let (coords, weights, _) = read_records::<N>(path.as_ref(), 0)?;
    PointsHost::from_points(&coords, &weights)
}

/// Read a previously written output file, restoring the clusterId and
/// isSeed columns as well.
pub fn read_output_csv<const N: usize>(path: impl AsRef<Path>) -> Result<PointsHost<N>> {
    let (coords, weights, extras) = read_records::<N>(path.as_ref(), 2)?;
    let mut points = PointsHost::from_points(&coords, &weights)?;
    let cluster_ids: Vec<i32> = extras.iter().map(|e| e[0]).collect();
    let seeds: Vec<i32> = extras.iter().map(|e| e[1]).collect();
    points.set_cluster_indexes(&cluster_ids);
    points.set_is_seed(&seeds);
    Ok(points)
}

/// Write clustering results next to their inputs.
pub fn write_output_csv<const N: usize>(path: impl AsRef<Path>, points: &PointsHost<N>) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().from_path(path.as_ref())?;
    let mut header: Vec<String> = (0..N).map(|dim| format!("x{dim}")).collect();
    header.push("weight".into());
    header.push("clusterId".into());
    header.push("isSeed".into());
    writer.write_record(&header)?;

    let weights = points.weights();
    let cluster_ids = points.cluster_indexes();
    let seeds = points.is_seed();
    for i in 0..points.size() {
        let mut record: Vec<String> =
            points.point(i).iter().map(|coord| coord.to_string()).collect();
        record.push(weights[i].to_string());
        record.push(cluster_ids[i].to_string());
        record.push(seeds[i].to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");

        let mut points = PointsHost::<2>::from_points(
            &[[0.0, 1.0], [2.5, -1.25], [10.0, 10.0]],
            &[1.0, 2.0, 0.5],
        )
        .unwrap();
        points.set_cluster_indexes(&[0, 0, -1]);
        points.set_is_seed(&[1, 0, 0]);
        write_output_csv(&path, &points).unwrap();

        let restored = read_output_csv::<2>(&path).unwrap();
        assert_eq!(restored.size(), 3);
        assert_eq!(restored.coords(0).unwrap(), points.coords(0).unwrap());
        assert_eq!(restored.weights(), points.weights());
        assert_eq!(restored.cluster_indexes(), points.cluster_indexes());
        assert_eq!(restored.is_seed(), points.is_seed());

        // The same file reads back as a plain input file, ignoring the
        // result columns.
        let inputs = read_csv::<2>(&path).unwrap();
        assert_eq!(inputs.weights(), points.weights());
        assert!(inputs.cluster_indexes().iter().all(|&id| id == -1));
    }

    #[test]
    fn test_missing_columns_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "x0,x1,weight\n1.0,2.0\n").unwrap();
        assert!(read_csv::<2>(&path).is_err());
    }

    #[test]
    fn test_bad_float_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "x0,x1,weight\n1.0,oops,1.0\n").unwrap();
        assert!(matches!(read_csv::<2>(&path), Err(Error::Parse(_))));
    }
}
