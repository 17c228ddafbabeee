// src/services/data_fetcher.rs

use log::{info, warn};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::errors::{MatchError, MatchResult};
use crate::matching::name::{sanitize_opt, unique_sanitized};

const SOURCE_NAME_COLUMN: &str = "location_name";
const REGISTRY_REGION_COLUMN: &str = "region";
const REGISTRY_NAME_COLUMN: &str = "company_name";

#[derive(Debug, Deserialize)]
struct SourceRow {
    location_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegistryRow {
    region: Option<String>,
    company_name: Option<String>,
}

/// Loads, sanitizes and dedupes the source (POI) names for one region.
///
/// An absent file is reported as `MissingInput`, which the orchestrator turns into a skip.
pub fn load_source_names(path: &Path, region: &str) -> MatchResult<Vec<String>> {
    if !path.exists() {
        return Err(MatchError::MissingInput {
            region: region.to_string(),
            reason: format!("no source name file at {}", path.display()),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    require_columns(reader.headers()?, &[SOURCE_NAME_COLUMN], path)?;

    let mut raw = Vec::new();
    for row in reader.deserialize::<SourceRow>() {
        raw.push(row?.location_name);
    }
    let total_rows = raw.len();
    let names = unique_sanitized(raw.iter().map(|n| sanitize_opt(n.as_deref())));

    info!(
        "Region {}: {} distinct source names from {} rows",
        region,
        names.len(),
        total_rows
    );
    Ok(names)
}

/// Company-registry names grouped by region, loaded once per run.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    by_region: HashMap<String, Vec<String>>,
}

impl Registry {
    /// Reads the shared registry CSV (`region,company_name`). A missing file is an error.
    pub fn load(path: &Path) -> MatchResult<Self> {
        let start = Instant::now();
        if !path.exists() {
            return Err(MatchError::InvalidInput(format!(
                "registry file {} not found",
                path.display()
            )));
        }

        let mut reader = csv::Reader::from_path(path)?;
        require_columns(
            reader.headers()?,
            &[REGISTRY_REGION_COLUMN, REGISTRY_NAME_COLUMN],
            path,
        )?;

        let mut raw: HashMap<String, Vec<String>> = HashMap::new();
        let mut rows = 0usize;
        for row in reader.deserialize::<RegistryRow>() {
            let row = row?;
            rows += 1;
            let region = sanitize_opt(row.region.as_deref());
            if region.is_empty() {
                continue;
            }
            raw.entry(region)
                .or_default()
                .push(sanitize_opt(row.company_name.as_deref()));
        }

        let by_region: HashMap<String, Vec<String>> = raw
            .into_iter()
            .map(|(region, names)| (region, unique_sanitized(names)))
            .collect();

        info!(
            "Loaded registry from {}: {} rows across {} regions in {:.2?}",
            path.display(),
            rows,
            by_region.len(),
            start.elapsed()
        );
        Ok(Self { by_region })
    }

    pub fn from_map(by_region: HashMap<String, Vec<String>>) -> Self {
        Self {
            by_region: by_region
                .into_iter()
                .map(|(region, names)| (region, unique_sanitized(names)))
                .collect(),
        }
    }

    /// Distinct sanitized registry names for `region`; empty if the region is unknown.
    pub fn targets(&self, region: &str) -> &[String] {
        self.by_region
            .get(region)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_region(&self, region: &str) -> bool {
        !self.targets(region).is_empty()
    }

    pub fn regions(&self) -> Vec<&str> {
        let mut regions: Vec<&str> = self.by_region.keys().map(|r| r.as_str()).collect();
        regions.sort_unstable();
        regions
    }
}

/// A region id names files on disk, so it is restricted to `[A-Za-z0-9_.-]+`.
pub fn is_valid_region_id(region: &str) -> bool {
    !region.is_empty()
        && region != "."
        && region != ".."
        && region
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

/// Validates a region list. Duplicates are dropped with a warning, keeping the first.
pub fn validate_regions<I, S>(regions: I) -> MatchResult<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut valid = Vec::new();
    for region in regions {
        let region = region.as_ref().trim();
        if !is_valid_region_id(region) {
            return Err(MatchError::InvalidRegionList(format!(
                "malformed region id '{}'",
                region
            )));
        }
        if seen.insert(region.to_string()) {
            valid.push(region.to_string());
        } else {
            warn!("Region {} listed more than once; processing it once", region);
        }
    }

    if valid.is_empty() {
        return Err(MatchError::InvalidRegionList("no regions given".to_string()));
    }
    Ok(valid)
}

/// Parses one region id per line; blank lines and `#` comments are ignored.
pub fn parse_region_list(text: &str) -> MatchResult<Vec<String>> {
    validate_regions(
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
}

pub fn load_region_file(path: &Path) -> MatchResult<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| {
        MatchError::InvalidRegionList(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_region_list(&text)
}

/// Regions that have a `<region>.csv` name file in `source_dir`, sorted.
pub fn list_source_regions(source_dir: &Path) -> MatchResult<Vec<(String, PathBuf)>> {
    let mut regions = Vec::new();
    for entry in fs::read_dir(source_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        if let Some(region) = path.file_stem().and_then(|s| s.to_str()) {
            if is_valid_region_id(region) {
                regions.push((region.to_string(), path.clone()));
            } else {
                warn!("Skipping {}: not a valid region id", path.display());
            }
        }
    }
    regions.sort();
    Ok(regions)
}

fn require_columns(
    headers: &csv::StringRecord,
    required: &[&str],
    path: &Path,
) -> MatchResult<()> {
    for column in required {
        if !headers.iter().any(|h| h.trim() == *column) {
            return Err(MatchError::InvalidInput(format!(
                "{} has no '{}' column",
                path.display(),
                column
            )));
        }
    }
    Ok(())
}
