// src/planning.rs

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::MatchResult;
use crate::services::data_fetcher::{list_source_regions, load_source_names, Registry};

pub const TOKENS_PER_NAME: u64 = 6;
pub const USD_PER_MILLION_TOKENS: f64 = 0.13;
pub const LARGE_REGION_NAMES: usize = 100_000;
pub const MEDIUM_REGION_NAMES: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionTier {
    Large,
    Medium,
    Small,
}

impl RegionTier {
    pub fn for_total(total_names: usize) -> Self {
        if total_names >= LARGE_REGION_NAMES {
            RegionTier::Large
        } else if total_names >= MEDIUM_REGION_NAMES {
            RegionTier::Medium
        } else {
            RegionTier::Small
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            RegionTier::Large => "large_regions.txt",
            RegionTier::Medium => "medium_regions.txt",
            RegionTier::Small => "small_regions.txt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionVolume {
    pub region: String,
    pub n_source_names: usize,
    pub n_target_names: usize,
}

impl RegionVolume {
    pub fn total(&self) -> usize {
        self.n_source_names + self.n_target_names
    }
}

pub fn estimated_tokens(names: usize) -> u64 {
    names as u64 * TOKENS_PER_NAME
}

pub fn estimated_cost_usd(names: usize) -> f64 {
    estimated_tokens(names) as f64 / 1_000_000.0 * USD_PER_MILLION_TOKENS
}

/// Embedding workload across all regions that have a source name file.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Sorted by total names, largest first.
    pub volumes: Vec<RegionVolume>,
}

impl RunPlan {
    pub fn build(source_dir: &Path, registry: &Registry) -> MatchResult<Self> {
        let mut volumes = Vec::new();
        for (region, path) in list_source_regions(source_dir)? {
            let n_source_names = match load_source_names(&path, &region) {
                Ok(names) => names.len(),
                Err(e) => {
                    warn!("Region {}: cannot count source names: {}", region, e);
                    continue;
                }
            };
            volumes.push(RegionVolume {
                n_target_names: registry.targets(&region).len(),
                region,
                n_source_names,
            });
        }
        Ok(Self::from_volumes(volumes))
    }

    pub fn from_volumes(mut volumes: Vec<RegionVolume>) -> Self {
        volumes.sort_by(|a, b| b.total().cmp(&a.total()).then_with(|| a.region.cmp(&b.region)));
        Self { volumes }
    }

    pub fn total_names(&self) -> usize {
        self.volumes.iter().map(|v| v.total()).sum()
    }

    pub fn without_registry(&self) -> Vec<&RegionVolume> {
        self.volumes.iter().filter(|v| v.n_target_names == 0).collect()
    }

    /// Regions with registry entries in `tier`, largest first.
    pub fn tier(&self, tier: RegionTier) -> Vec<&RegionVolume> {
        self.volumes
            .iter()
            .filter(|v| v.n_target_names > 0 && RegionTier::for_total(v.total()) == tier)
            .collect()
    }

    /// Writes one region list per tier into `dir`; returns the written paths.
    pub fn write_tier_files(&self, dir: &Path) -> MatchResult<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for tier in [RegionTier::Large, RegionTier::Medium, RegionTier::Small] {
            let regions: Vec<&str> = self.tier(tier).iter().map(|v| v.region.as_str()).collect();
            let path = dir.join(tier.file_name());
            let mut body = regions.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            fs::write(&path, body)?;
            info!("Wrote {} {:?} regions to {}", regions.len(), tier, path.display());
            written.push(path);
        }
        Ok(written)
    }

    pub fn render(&self, top: usize) -> String {
        let total = self.total_names();
        let mut lines = vec![
            format!("Regions with source names: {}", self.volumes.len()),
            format!(
                "Source names: {}, registry names: {}",
                self.volumes.iter().map(|v| v.n_source_names).sum::<usize>(),
                self.volumes.iter().map(|v| v.n_target_names).sum::<usize>()
            ),
            format!("Estimated tokens: {}", estimated_tokens(total)),
            format!("Estimated cost: ${:.2}", estimated_cost_usd(total)),
            format!("Top {} regions by volume:", top.min(self.volumes.len())),
        ];
        for v in self.volumes.iter().take(top) {
            lines.push(format!(
                "  {:<40} {:>10} source {:>10} registry {:>10} total",
                v.region,
                v.n_source_names,
                v.n_target_names,
                v.total()
            ));
        }

        let missing = self.without_registry();
        lines.push(format!(
            "Regions without registry entries (no matches possible): {}",
            missing.len()
        ));
        for v in missing.iter().take(5) {
            lines.push(format!("  {}", v.region));
        }

        for tier in [RegionTier::Large, RegionTier::Medium, RegionTier::Small] {
            let members = self.tier(tier);
            let names: usize = members.iter().map(|v| v.total()).sum();
            lines.push(format!(
                "{:?}: {} regions, {} names, ${:.2}",
                tier,
                members.len(),
                names,
                estimated_cost_usd(names)
            ));
        }
        lines.join("\n")
    }
}
