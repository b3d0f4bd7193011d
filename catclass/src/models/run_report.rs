//! Run statistics and the final run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ErrorChannel;

/// Why a rule row was not turned into a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Every hierarchy level was blank after normalization
    EmptyPath,
    /// No include term survived normalization
    EmptyInclude,
    /// The CSV reader could not decode the row
    Malformed,
}

/// Rule loading counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    /// Data rows seen (header excluded)
    pub rows_read: usize,
    pub rules_loaded: usize,
    pub skipped_empty_path: usize,
    pub skipped_empty_include: usize,
    pub skipped_malformed: usize,
    /// Rows kept with priority 0 because the PRIORITY cell was not an integer
    pub priorities_defaulted: usize,
    /// Taxonomy nodes created while binding rules
    pub categories_created: usize,
}

impl LoadStats {
    pub fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::EmptyPath => self.skipped_empty_path += 1,
            SkipReason::EmptyInclude => self.skipped_empty_include += 1,
            SkipReason::Malformed => self.skipped_malformed += 1,
        }
    }

    pub fn rows_skipped(&self) -> usize {
        self.skipped_empty_path + self.skipped_empty_include + self.skipped_malformed
    }
}

/// A page whose bulk write did not commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub page: usize,
    pub first_guid: String,
    pub last_guid: String,
    pub error: String,
}

/// Batch classification counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Unlocked products listed at the start of the run
    pub products_considered: usize,
    /// Products scored against the rule set
    pub products_evaluated: usize,
    pub products_matched: usize,
    pub products_unmatched: usize,
    /// Products whose category or confidence differed from the stored values
    pub changes_staged: usize,
    /// Rows actually written (0 on a dry run)
    pub changes_written: usize,
    pub pages_committed: usize,
    pub pages_failed: Vec<PageFailure>,
    pub record_errors: ErrorChannel,
}

impl BatchStats {
    pub fn new(error_sample_limit: usize) -> Self {
        Self {
            record_errors: ErrorChannel::new(error_sample_limit),
            ..Default::default()
        }
    }

    /// Fold one page's counters into the run totals
    pub fn merge(&mut self, page: BatchStats) {
        self.products_evaluated += page.products_evaluated;
        self.products_matched += page.products_matched;
        self.products_unmatched += page.products_unmatched;
        self.changes_staged += page.changes_staged;
        self.changes_written += page.changes_written;
        self.pages_committed += page.pages_committed;
        self.pages_failed.extend(page.pages_failed);
        self.record_errors.merge(page.record_errors);
    }
}

/// Everything a run did, persisted to `classification_runs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub rule_source: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub dry_run: bool,
    pub rules: LoadStats,
    pub batch: BatchStats,
}

impl RunReport {
    /// A run succeeded when every page committed
    pub fn is_clean(&self) -> bool {
        self.batch.pages_failed.is_empty()
    }

    /// Multi-line human readable summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Run {} ({})", self.run_id, if self.dry_run { "dry run" } else { "applied" }),
            format!("Rule source: {}", self.rule_source),
            format!(
                "Rules: {} loaded from {} rows ({} skipped: {} empty path, {} empty include, {} malformed; {} priorities defaulted to 0)",
                self.rules.rules_loaded,
                self.rules.rows_read,
                self.rules.rows_skipped(),
                self.rules.skipped_empty_path,
                self.rules.skipped_empty_include,
                self.rules.skipped_malformed,
                self.rules.priorities_defaulted,
            ),
            format!("Categories created: {}", self.rules.categories_created),
            format!(
                "Products: {} considered, {} evaluated, {} matched, {} unmatched",
                self.batch.products_considered,
                self.batch.products_evaluated,
                self.batch.products_matched,
                self.batch.products_unmatched,
            ),
            format!(
                "Changes: {} staged, {} written",
                self.batch.changes_staged, self.batch.changes_written
            ),
            format!(
                "Pages: {} committed, {} failed",
                self.batch.pages_committed,
                self.batch.pages_failed.len()
            ),
            format!("Record errors: {}", self.batch.record_errors.count),
        ];

        for failure in &self.batch.pages_failed {
            lines.push(format!(
                "  page {} [{} .. {}]: {}",
                failure.page, failure.first_guid, failure.last_guid, failure.error
            ));
        }
        for sample in &self.batch.record_errors.samples {
            lines.push(format!("  record {}: {}", sample.guid, sample.message));
        }

        lines.push(format!(
            "Duration: {} ms",
            (self.ended_at - self.started_at).num_milliseconds()
        ));
        lines.join("\n")
    }
}
