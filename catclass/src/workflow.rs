//! End-to-end operations behind the CLI
//!
//! **classify:** load rules (fatal on failure, before any product write) →
//! batch over the product store → run report, persisted unless dry run.
//!
//! **validate:** fetch and parse the sheet only; the database is not opened.
//!
//! **explain:** load rules, then score one ad-hoc product with a per-rule
//! breakdown. Products are never written.

use catclass_common::config::TomlConfig;
use catclass_common::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::{BatchExecutor, BatchOptions};
use crate::db::runs;
use crate::models::{LoadStats, RunReport};
use crate::normalize::{normalize_opt, product_text};
use crate::rules::{self, RuleSource};
use crate::scoring::{Explanation, ScoringEngine};

/// Classify the whole product store with the rules at `source`
pub async fn run_classification(
    db: &SqlitePool,
    source: &RuleSource,
    config: &TomlConfig,
    dry_run: bool,
) -> Result<RunReport> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(run_id = %run_id, source = %source, dry_run, "Classification run started");

    let (rule_set, load_stats) = rules::load_rules(db, source, config).await?;
    if rule_set.is_empty() {
        warn!(source = %source, "Rule set is empty, every product will be unmatched");
    }

    let executor = BatchExecutor::new(
        db.clone(),
        Arc::new(rule_set),
        ScoringEngine::new(config.scoring),
        BatchOptions::from_settings(&config.classifier, dry_run),
    );
    let batch_stats = executor.run().await?;

    let report = RunReport {
        run_id,
        rule_source: source.to_string(),
        started_at,
        ended_at: Utc::now(),
        dry_run,
        rules: load_stats,
        batch: batch_stats,
    };

    if !dry_run {
        // The product writes already stand; a lost audit row is not a failed run
        if let Err(e) = runs::save_run(db, &report).await {
            warn!(run_id = %run_id, error = %e, "Failed to persist run report");
        }
    }

    info!(
        run_id = %run_id,
        written = report.batch.changes_written,
        pages_failed = report.batch.pages_failed.len(),
        "Classification run finished"
    );

    Ok(report)
}

/// Parse a rule sheet without binding it to the taxonomy
pub async fn validate_rules(source: &RuleSource, config: &TomlConfig) -> Result<LoadStats> {
    let body = source.fetch(&config.rule_source).await?;
    let sheet = rules::parse_rule_sheet(&body, config.rule_source.delimiter)?;

    let mut stats = sheet.stats;
    stats.rules_loaded = sheet.rows.len();
    Ok(stats)
}

/// Score one ad-hoc product against the rules at `source`
pub async fn explain_product(
    db: &SqlitePool,
    source: &RuleSource,
    config: &TomlConfig,
    name: &str,
    brand: Option<&str>,
    raw_category: Option<&str>,
) -> Result<Explanation> {
    let (rule_set, _) = rules::load_rules(db, source, config).await?;
    let engine = ScoringEngine::new(config.scoring);

    let text = product_text(name, brand, raw_category);
    Ok(engine.explain(&text, &normalize_opt(brand), &rule_set))
}
