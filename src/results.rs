// src/results.rs

use log::info;
use std::collections::HashSet;
use std::time::Duration;

use crate::models::{CrosswalkRecord, RegionStatus};

/// Where a region's run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Unstarted,
    NamesLoaded,
    EmbeddingsResolved,
    CandidatesGenerated,
    Classified,
    CrosswalkSaved,
    Failed,
    Skipped,
}

/// Outcome of processing one region.
#[derive(Debug, Clone)]
pub struct RegionOutcome {
    pub region: String,
    pub state: RegionState,
    /// Last non-terminal state reached; tells where a failed region stopped.
    pub reached: RegionState,
    pub status: RegionStatus,
    pub n_source_names: usize,
    pub n_matched: usize,
    pub elapsed: Duration,
}

/// Aggregate statistics for one invocation over a list of regions.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub outcomes: Vec<RegionOutcome>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, RegionStatus::Success))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, RegionStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, RegionStatus::Error(_)))
    }

    /// Source names across successful regions.
    pub fn total_source_names(&self) -> usize {
        self.successful().map(|o| o.n_source_names).sum()
    }

    pub fn total_matched(&self) -> usize {
        self.successful().map(|o| o.n_matched).sum()
    }

    /// Matched over source names, counting successful regions only.
    pub fn overall_match_rate(&self) -> f64 {
        let total = self.total_source_names();
        if total == 0 {
            0.0
        } else {
            self.total_matched() as f64 / total as f64
        }
    }

    fn successful(&self) -> impl Iterator<Item = &RegionOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_success())
    }

    fn count(&self, pred: impl Fn(&RegionStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            "========================================".to_string(),
            format!("Run {} finished in {:.2?}", self.run_id, self.elapsed),
            format!("Regions processed: {}", self.outcomes.len()),
            format!("  succeeded: {}", self.succeeded()),
            format!("  skipped:   {}", self.skipped()),
            format!("  failed:    {}", self.failed()),
            format!("Total source names: {}", self.total_source_names()),
            format!("Total matched:      {}", self.total_matched()),
            format!("Overall match rate: {:.1}%", self.overall_match_rate() * 100.0),
        ];
        let failures: Vec<&RegionOutcome> = self
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, RegionStatus::Error(_)))
            .collect();
        if !failures.is_empty() {
            lines.push("Failed regions:".to_string());
            for o in failures {
                lines.push(format!("  {} ({:?}): {}", o.region, o.reached, o.status));
            }
        }
        lines.push("========================================".to_string());
        lines.join("\n")
    }

    /// Prints the report to stdout and mirrors the totals into the log.
    pub fn print(&self) {
        println!("{}", self.render());
        info!(
            "Run {}: {} succeeded, {} skipped, {} failed; matched {}/{} ({:.1}%)",
            self.run_id,
            self.succeeded(),
            self.skipped(),
            self.failed(),
            self.total_matched(),
            self.total_source_names(),
            self.overall_match_rate() * 100.0
        );
    }
}

pub const PROFILE_CUTOFFS: [f64; 8] = [0.99, 0.95, 0.90, 0.80, 0.70, 0.60, 0.50, 0.40];

/// Probability distribution of a saved crosswalk, for eyeballing match quality.
#[derive(Debug, Clone)]
pub struct CrosswalkProfile {
    pub total: usize,
    pub distinct_sources: usize,
    pub distinct_targets: usize,
    /// (cutoff, rows with probability >= cutoff), in `PROFILE_CUTOFFS` order.
    pub at_cutoff: Vec<(f64, usize)>,
    pub high: Vec<CrosswalkRecord>,
    pub medium: Vec<CrosswalkRecord>,
    pub low: Vec<CrosswalkRecord>,
}

impl CrosswalkProfile {
    /// Bands: high >= 0.95, medium in [0.60, 0.80), low in [0.40, 0.60).
    /// Each band keeps at most `sample_size` rows in file order.
    pub fn from_records(records: &[CrosswalkRecord], sample_size: usize) -> Self {
        let distinct_sources: HashSet<&str> =
            records.iter().map(|r| r.source_name.as_str()).collect();
        let distinct_targets: HashSet<&str> =
            records.iter().map(|r| r.target_name.as_str()).collect();

        let at_cutoff = PROFILE_CUTOFFS
            .iter()
            .map(|&c| (c, records.iter().filter(|r| r.match_probability >= c).count()))
            .collect();

        let band = |lo: f64, hi: f64| -> Vec<CrosswalkRecord> {
            records
                .iter()
                .filter(|r| r.match_probability >= lo && r.match_probability < hi)
                .take(sample_size)
                .cloned()
                .collect()
        };

        Self {
            total: records.len(),
            distinct_sources: distinct_sources.len(),
            distinct_targets: distinct_targets.len(),
            at_cutoff,
            high: band(0.95, f64::INFINITY),
            medium: band(0.60, 0.80),
            low: band(0.40, 0.60),
        }
    }

    pub fn render(&self, region: &str) -> String {
        let pct = |n: usize| {
            if self.total == 0 {
                0.0
            } else {
                n as f64 * 100.0 / self.total as f64
            }
        };

        let mut lines = vec![
            format!("Crosswalk for {}: {} rows", region, self.total),
            format!(
                "Distinct source names: {}, distinct registry names: {}",
                self.distinct_sources, self.distinct_targets
            ),
            "Rows by probability cutoff:".to_string(),
        ];
        for (cutoff, n) in &self.at_cutoff {
            lines.push(format!("  >= {:.2}: {:>8} ({:.1}%)", cutoff, n, pct(*n)));
        }
        for (label, rows) in [
            ("High confidence (>= 0.95)", &self.high),
            ("Medium confidence (0.60-0.80)", &self.medium),
            ("Low confidence (0.40-0.60)", &self.low),
        ] {
            lines.push(format!("{}:", label));
            for r in rows {
                lines.push(format!(
                    "  [{:.3}] {} -> {}",
                    r.match_probability, r.source_name, r.target_name
                ));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(region: &str, status: RegionStatus, n: usize, m: usize) -> RegionOutcome {
        RegionOutcome {
            region: region.to_string(),
            state: RegionState::CrosswalkSaved,
            reached: RegionState::CrosswalkSaved,
            status,
            n_source_names: n,
            n_matched: m,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_match_rate_counts_successful_regions_only() {
        let report = RunReport {
            run_id: "run".to_string(),
            outcomes: vec![
                outcome("a", RegionStatus::Success, 100, 40),
                outcome("b", RegionStatus::Success, 100, 20),
                outcome("c", RegionStatus::skipped("no registry entries"), 0, 0),
                outcome("d", RegionStatus::error("boom"), 50, 0),
            ],
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.total_source_names(), 200);
        assert!((report.overall_match_rate() - 0.3).abs() < 1e-12);
        assert!(report.render().contains("d (CrosswalkSaved): error: boom"));
    }

    #[test]
    fn test_profile_bands() {
        let rec = |s: &str, t: &str, p: f64| CrosswalkRecord {
            source_name: s.to_string(),
            target_name: t.to_string(),
            match_probability: p,
            cosine_similarity: 0.7,
            normalized_lexical_similarity: 0.7,
            region: "r".to_string(),
        };
        let records = vec![
            rec("a", "X", 0.99),
            rec("b", "X", 0.85),
            rec("c", "Y", 0.65),
            rec("d", "Z", 0.45),
        ];
        let profile = CrosswalkProfile::from_records(&records, 10);
        assert_eq!(profile.distinct_sources, 4);
        assert_eq!(profile.distinct_targets, 3);
        assert_eq!(profile.at_cutoff[0], (0.99, 1));
        assert_eq!(profile.at_cutoff[7], (0.40, 4));
        assert_eq!(profile.high.len(), 1);
        assert_eq!(profile.medium.len(), 1);
        assert_eq!(profile.low.len(), 1);
    }
}
