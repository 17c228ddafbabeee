// src/services/data_writer.rs

use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;

use crate::errors::{MatchError, MatchResult};
use crate::models::{CrosswalkRecord, RegionSummary};

/// Writes rows to `path` via a temp file in the same directory and a rename,
/// so readers never see a half-written CSV.
fn write_csv_atomic<T: Serialize>(path: &Path, rows: &[T], headers: &[&str]) -> MatchResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    fs::create_dir_all(&dir)?;

    let tmp = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file());
        // Header written explicitly so an empty file still carries its columns
        writer.write_record(headers)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| MatchError::Io(e.error))?;
    Ok(())
}

const CROSSWALK_HEADERS: [&str; 6] = [
    "source_name",
    "target_name",
    "match_probability",
    "cosine_similarity",
    "normalized_lexical_similarity",
    "region",
];

const SUMMARY_HEADERS: [&str; 6] = [
    "region",
    "n_source_names",
    "n_matched",
    "match_rate",
    "status",
    "processed_at",
];

/// Replaces the region crosswalk wholesale. An empty slice still produces a header-only file.
pub fn write_crosswalk(path: &Path, records: &[CrosswalkRecord]) -> MatchResult<()> {
    let start = Instant::now();
    write_csv_atomic(path, records, &CROSSWALK_HEADERS)?;
    info!(
        "Saved {} crosswalk rows to {} in {:.2?}",
        records.len(),
        path.display(),
        start.elapsed()
    );
    Ok(())
}

/// Deletes a crosswalk left by an earlier run. Returns whether a file was removed.
pub fn remove_crosswalk(path: &Path) -> MatchResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MatchError::Io(e)),
    }
}

pub fn read_crosswalk(path: &Path) -> MatchResult<Vec<CrosswalkRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Reads the summary file; a missing file is an empty summary.
pub fn read_summary(path: &Path) -> MatchResult<Vec<RegionSummary>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Inserts or replaces the row for `summary.region`, leaving other regions untouched.
///
/// Existing rows keep their position; a new region is appended.
pub fn upsert_summary(path: &Path, summary: &RegionSummary) -> MatchResult<()> {
    let mut rows = read_summary(path)?;
    match rows.iter_mut().find(|r| r.region == summary.region) {
        Some(existing) => *existing = summary.clone(),
        None => rows.push(summary.clone()),
    }
    write_csv_atomic(path, &rows, &SUMMARY_HEADERS)?;
    debug!(
        "Upserted summary row for {} ({} regions in {})",
        summary.region,
        rows.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegionStatus;

    fn record(source: &str, target: &str, p: f64) -> CrosswalkRecord {
        CrosswalkRecord {
            source_name: source.to_string(),
            target_name: target.to_string(),
            match_probability: p,
            cosine_similarity: 0.8,
            normalized_lexical_similarity: 0.9,
            region: "r1".to_string(),
        }
    }

    #[test]
    fn test_empty_crosswalk_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("r1_crosswalk.csv");
        write_crosswalk(&path, &[]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("source_name,target_name,match_probability"));
        assert!(read_crosswalk(&path).unwrap().is_empty());
    }

    #[test]
    fn test_crosswalk_is_replaced_not_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r1_crosswalk.csv");
        write_crosswalk(&path, &[record("a, inc", "A", 0.9), record("b", "B", 0.5)]).unwrap();
        write_crosswalk(&path, &[record("c \"quoted\"", "C", 0.7)]).unwrap();
        let back = read_crosswalk(&path).unwrap();
        assert_eq!(back, vec![record("c \"quoted\"", "C", 0.7)]);
    }

    #[test]
    fn test_remove_crosswalk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r1_crosswalk.csv");
        assert!(!remove_crosswalk(&path).unwrap());

        write_crosswalk(&path, &[record("a", "A", 0.9)]).unwrap();
        assert!(remove_crosswalk(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_summary_upsert_replaces_by_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processing_summary.csv");

        let failed = RegionSummary::new("r1", 10, 0, &RegionStatus::error("boom"));
        upsert_summary(&path, &failed).unwrap();
        upsert_summary(&path, &RegionSummary::new("r2", 5, 2, &RegionStatus::Success)).unwrap();
        upsert_summary(&path, &RegionSummary::new("r1", 10, 4, &RegionStatus::Success)).unwrap();

        let rows = read_summary(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].region, "r1");
        assert_eq!(rows[0].n_matched, 4);
        assert!(rows[0].status().is_success());
        assert_eq!(rows[1].region, "r2");
        assert!((rows[1].match_rate - 0.4).abs() < 1e-12);
    }
}
