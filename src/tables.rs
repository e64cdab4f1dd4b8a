use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;
use crate::summary::TrackSummary;

pub const METRICS: [&str; 3] = ["area", "length", "fit"];

/// One compiled metric table: the shared Time column plus one column per track.
/// Rows are aligned by position across the tables of a genotype.
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    pub time: Vec<f64>,
    pub tracks: Vec<String>,
    columns: HashMap<String, Vec<Option<f64>>>,
}

impl MetricTable {
    pub fn new(time: Vec<f64>) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }

    /// Add a track column; columns shorter than the table are padded as undefined
    pub fn insert_track(&mut self, track: &str, mut values: Vec<Option<f64>>) {
        values.resize(self.time.len(), None);
        if !self.columns.contains_key(track) {
            self.tracks.push(track.to_string());
        }
        self.columns.insert(track.to_string(), values);
    }

    pub fn column(&self, track: &str) -> Option<&[Option<f64>]> {
        self.columns.get(track).map(|v| v.as_slice())
    }
}

/// The area/length/fit triple for one genotype.
#[derive(Debug, Clone)]
pub struct GroupTables {
    pub genotype: String,
    pub area: MetricTable,
    pub length: MetricTable,
    pub fit: MetricTable,
}

#[derive(Debug)]
pub enum GroupInput {
    Loaded(GroupTables),
    Missing(Vec<PathBuf>),
}

pub fn metric_path(data_dir: &Path, genotype: &str, metric: &str) -> PathBuf {
    data_dir.join(format!("{} compiled_{}.csv", genotype, metric))
}

/// Parse one cell; empty and NaN cells are undefined
fn parse_cell(raw: &str, path: &Path, row: usize) -> Result<Option<f64>, AppError> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Ok(None),
        Err(_) => Err(AppError::MalformedTable {
            path: path.display().to_string(),
            reason: format!("unparsable value '{}' at row {}", s, row + 2),
        }),
    }
}

pub fn read_metric_table(path: &Path) -> Result<MetricTable, AppError> {
    let malformed = |reason: String| AppError::MalformedTable {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(File::open(path)?);
    let headers = reader.headers()?.clone();

    let frame_idx = headers
        .iter()
        .position(|h| h.trim() == "Frame")
        .ok_or_else(|| malformed("missing Frame column".to_string()))?;
    let time_idx = headers
        .iter()
        .position(|h| h.trim() == "Time")
        .ok_or_else(|| malformed("missing Time column".to_string()))?;
    let track_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != frame_idx && *i != time_idx)
        .map(|(i, h)| (i, h.trim().to_string()))
        .collect();

    let mut time = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); track_cols.len()];

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let t = parse_cell(record.get(time_idx).unwrap_or(""), path, row)?
            .ok_or_else(|| malformed(format!("missing Time at row {}", row + 2)))?;
        parse_cell(record.get(frame_idx).unwrap_or(""), path, row)?
            .ok_or_else(|| malformed(format!("missing Frame at row {}", row + 2)))?;
        time.push(t);
        for (slot, (col, _)) in values.iter_mut().zip(&track_cols) {
            slot.push(parse_cell(record.get(*col).unwrap_or(""), path, row)?);
        }
    }

    let mut table = MetricTable::new(time);
    for ((_, name), column) in track_cols.into_iter().zip(values) {
        table.insert_track(&name, column);
    }
    Ok(table)
}

/// Load the three metric tables of a genotype, or report which files are absent.
pub fn load_group_tables(data_dir: &Path, genotype: &str) -> Result<GroupInput, AppError> {
    let paths: Vec<PathBuf> = METRICS
        .iter()
        .map(|m| metric_path(data_dir, genotype, m))
        .collect();
    if paths.iter().any(|p| !p.exists()) {
        return Ok(GroupInput::Missing(paths));
    }

    Ok(GroupInput::Loaded(GroupTables {
        genotype: genotype.to_string(),
        area: read_metric_table(&paths[0])?,
        length: read_metric_table(&paths[1])?,
        fit: read_metric_table(&paths[2])?,
    }))
}

/// Write `Genotype, Track, <value_column>`
pub fn write_per_track(
    path: &Path,
    value_column: &str,
    rows: &[TrackSummary],
) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Genotype", "Track", value_column])?;
    for row in rows {
        let value = row.mean.to_string();
        writer.write_record([row.genotype.as_str(), row.track.as_str(), value.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a per-track table back; rows without a value are skipped.
pub fn read_per_track(path: &Path) -> Result<Vec<TrackSummary>, AppError> {
    let mut reader = csv::Reader::from_reader(File::open(path)?);
    if reader.headers()?.len() < 3 {
        return Err(AppError::MalformedTable {
            path: path.display().to_string(),
            reason: "expected Genotype, Track and value columns".to_string(),
        });
    }

    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if let Some(mean) = parse_cell(record.get(2).unwrap_or(""), path, row)? {
            rows.push(TrackSummary {
                genotype: record.get(0).unwrap_or("").to_string(),
                track: record.get(1).unwrap_or("").to_string(),
                mean,
            });
        }
    }
    Ok(rows)
}

/// Serialize fixed-shape records; an empty slice still gets a header from `header`.
pub fn write_records<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: &[T],
) -> Result<(), AppError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
