//! Batch executor
//!
//! Applies a rule set to every unlocked product, one page at a time.
//!
//! **Per run:**
//! 1. List unlocked product guids in order (locked products never enter the run)
//! 2. Cut the list into pages of `page_size`; a page is the inclusive guid
//!    range of its slice, so no two pages overlap
//! 3. Per page: load the projection, score each record, stage the records whose
//!    category or confidence changed, write the staged records in one transaction
//! 4. Drop the page's working state before moving on
//!
//! Up to `workers` pages are in flight at once. A failed record is skipped and
//! counted; a failed page write leaves that page untouched and the run goes on.
//! Nothing outside the product rows records progress, so re-running resumes.

use catclass_common::config::ClassifierSettings;
use catclass_common::db::models::ProductRecord;
use catclass_common::Result;
use futures::stream::{self, StreamExt};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::products::{self, StagedUpdate};
use crate::models::{BatchStats, PageFailure};
use crate::rules::RuleSet;
use crate::scoring::{Classification, ScoringEngine};
use crate::utils::{begin_monitored, retry_on_lock};

/// Confidences closer than this are treated as unchanged
const CONFIDENCE_EPSILON: f64 = 1e-9;

/// Batch run knobs
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub page_size: usize,
    pub workers: usize,
    pub error_sample_limit: usize,
    pub max_lock_wait_ms: u64,
    /// Score and stage, never write
    pub dry_run: bool,
}

impl BatchOptions {
    pub fn from_settings(settings: &ClassifierSettings, dry_run: bool) -> Self {
        Self {
            page_size: settings.page_size.max(1),
            workers: settings.workers.max(1),
            error_sample_limit: settings.error_sample_limit,
            max_lock_wait_ms: settings.max_lock_wait_ms,
            dry_run,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_settings(&ClassifierSettings::default(), false)
    }
}

/// One slice of the ordered guid list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange {
    /// 1-based
    pub index: usize,
    pub first: String,
    pub last: String,
    /// Guids listed in this slice
    pub len: usize,
}

/// Partition ordered guids into pages of at most `page_size`
pub fn partition_pages(guids: &[String], page_size: usize) -> Vec<PageRange> {
    guids
        .chunks(page_size.max(1))
        .enumerate()
        .filter_map(|(i, chunk)| {
            Some(PageRange {
                index: i + 1,
                first: chunk.first()?.clone(),
                last: chunk.last()?.clone(),
                len: chunk.len(),
            })
        })
        .collect()
}

/// Decide whether a product needs a write
///
/// A match moves the product to the winning category with the new confidence.
/// No match keeps the category and clears confidence to 0.
pub fn plan_update(product: &ProductRecord, result: &Classification) -> Option<StagedUpdate> {
    let (category_guid, confidence) = if result.is_match() {
        (result.category, result.confidence)
    } else {
        (product.category_guid, 0.0)
    };

    let unchanged = category_guid == product.category_guid
        && (confidence - product.confidence).abs() < CONFIDENCE_EPSILON;
    if unchanged {
        return None;
    }

    Some(StagedUpdate {
        guid: product.guid,
        category_guid,
        confidence,
    })
}

/// Classifies the product store page by page
#[derive(Clone)]
pub struct BatchExecutor {
    db: SqlitePool,
    rules: Arc<RuleSet>,
    engine: ScoringEngine,
    options: BatchOptions,
}

impl BatchExecutor {
    pub fn new(db: SqlitePool, rules: Arc<RuleSet>, engine: ScoringEngine, options: BatchOptions) -> Self {
        Self {
            db,
            rules,
            engine,
            options,
        }
    }

    /// Run over every unlocked product
    ///
    /// Only listing the products can fail the run; page and record failures
    /// are reported in the returned stats.
    pub async fn run(&self) -> Result<BatchStats> {
        let guids = products::list_unlocked_guids(&self.db).await?;
        let total = guids.len();
        let mut stats = BatchStats::new(self.options.error_sample_limit);
        stats.products_considered = total;

        let pages = partition_pages(&guids, self.options.page_size);
        drop(guids);

        info!(
            products = total,
            pages = pages.len(),
            page_size = self.options.page_size,
            workers = self.options.workers,
            rules = self.rules.len(),
            dry_run = self.options.dry_run,
            "Starting batch classification"
        );

        let mut processed = 0usize;
        let mut results = stream::iter(pages)
            .map(|page| {
                let executor = self.clone();
                async move { executor.process_page(page).await }
            })
            .buffer_unordered(self.options.workers);

        while let Some((page, page_stats)) = results.next().await {
            processed += page.len;
            info!(
                page = page.index,
                progress = format!("{}/{}", processed, total),
                updated = page_stats.changes_written,
                staged = page_stats.changes_staged,
                "Page processed"
            );
            stats.merge(page_stats);
        }

        info!(
            evaluated = stats.products_evaluated,
            matched = stats.products_matched,
            written = stats.changes_written,
            pages_failed = stats.pages_failed.len(),
            record_errors = stats.record_errors.count,
            "Batch classification finished"
        );

        Ok(stats)
    }

    /// Score one page and write its changes
    async fn process_page(&self, page: PageRange) -> (PageRange, BatchStats) {
        let mut stats = BatchStats::new(self.options.error_sample_limit);

        let rows = match products::load_page(&self.db, &page.first, &page.last).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(page = page.index, error = %e, "Page load failed");
                stats.pages_failed.push(failure(&page, e.to_string()));
                return (page, stats);
            }
        };

        let mut staged = Vec::new();
        for row in &rows {
            let product = match ProductRecord::from_row(row) {
                Ok(product) => product,
                Err(e) => {
                    let guid: String = row.try_get("guid").unwrap_or_default();
                    warn!(guid = %guid, error = %e, "Skipping product record");
                    stats.record_errors.record(guid, e.to_string());
                    continue;
                }
            };

            stats.products_evaluated += 1;
            let result = self.engine.classify_product(&product, &self.rules);
            if result.is_match() {
                stats.products_matched += 1;
            } else {
                stats.products_unmatched += 1;
            }

            if let Some(update) = plan_update(&product, &result) {
                staged.push(update);
            }
        }
        drop(rows);

        stats.changes_staged = staged.len();

        if self.options.dry_run || staged.is_empty() {
            stats.pages_committed = 1;
            return (page, stats);
        }

        match self.write_page(&staged).await {
            Ok(written) => {
                stats.changes_written = written as usize;
                stats.pages_committed = 1;
            }
            Err(e) => {
                error!(
                    page = page.index,
                    first = %page.first,
                    last = %page.last,
                    error = %e,
                    "Page write failed, changes not applied"
                );
                stats.pages_failed.push(failure(&page, e.to_string()));
            }
        }

        (page, stats)
    }

    /// One transaction per page, retried while the database is locked
    async fn write_page(&self, staged: &[StagedUpdate]) -> Result<u64> {
        retry_on_lock("page write", self.options.max_lock_wait_ms, || async {
            let mut tx = begin_monitored(&self.db, "batch_page_write").await?;
            let written = products::apply_updates(tx.inner_mut()?, staged).await?;
            tx.commit().await?;
            debug!(rows = written, "Page committed");
            Ok(written)
        })
        .await
    }
}

fn failure(page: &PageRange, error: String) -> PageFailure {
    PageFailure {
        page: page.index,
        first_guid: page.first.clone(),
        last_guid: page.last.clone(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ClassificationRule, KeywordSet};
    use catclass_common::db::init::init_memory_database;
    use uuid::Uuid;

    fn product(category: Option<Uuid>, confidence: f64) -> ProductRecord {
        ProductRecord {
            guid: Uuid::new_v4(),
            name: "x".to_string(),
            brand: None,
            raw_category: None,
            category_guid: category,
            confidence,
            locked: false,
        }
    }

    fn matched(category: Uuid, confidence: f64) -> Classification {
        Classification {
            category: Some(category),
            rule_index: Some(0),
            score: 0,
            confidence,
        }
    }

    fn unmatched() -> Classification {
        Classification {
            category: None,
            rule_index: None,
            score: 0,
            confidence: 0.0,
        }
    }

    #[test]
    fn test_partition_pages() {
        let guids: Vec<String> = (0..7).map(|i| format!("g{}", i)).collect();
        let pages = partition_pages(&guids, 3);

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].first, "g0");
        assert_eq!(pages[0].last, "g2");
        assert_eq!(pages[2].first, "g6");
        assert_eq!(pages[2].last, "g6");
        assert_eq!(pages[2].len, 1);
        assert!(partition_pages(&[], 3).is_empty());
    }

    #[test]
    fn test_plan_update_on_match() {
        let cat = Uuid::new_v4();
        let p = product(None, 0.0);
        let update = plan_update(&p, &matched(cat, 37.5)).unwrap();
        assert_eq!(update.category_guid, Some(cat));
        assert_eq!(update.confidence, 37.5);

        let already = product(Some(cat), 37.5);
        assert!(plan_update(&already, &matched(cat, 37.5)).is_none());
    }

    #[test]
    fn test_plan_update_no_match_keeps_category() {
        let cat = Uuid::new_v4();
        let p = product(Some(cat), 50.0);

        let update = plan_update(&p, &unmatched()).unwrap();
        assert_eq!(update.category_guid, Some(cat));
        assert_eq!(update.confidence, 0.0);

        let cleared = product(Some(cat), 0.0);
        assert!(plan_update(&cleared, &unmatched()).is_none());
    }

    async fn seed(pool: &SqlitePool, name: &str, locked: bool) -> Uuid {
        let guid = Uuid::new_v4();
        sqlx::query("INSERT INTO products (guid, name, locked) VALUES (?, ?, ?)")
            .bind(guid.to_string())
            .bind(name)
            .bind(locked as i64)
            .execute(pool)
            .await
            .unwrap();
        guid
    }

    async fn seed_category(pool: &SqlitePool, slug: &str) -> Uuid {
        let guid = Uuid::new_v4();
        sqlx::query("INSERT INTO categories (guid, name, slug) VALUES (?, ?, ?)")
            .bind(guid.to_string())
            .bind(slug)
            .bind(slug)
            .execute(pool)
            .await
            .unwrap();
        guid
    }

    fn executor(pool: &SqlitePool, category: Uuid, options: BatchOptions) -> BatchExecutor {
        let rule = ClassificationRule::new(
            category,
            "Kable",
            KeywordSet::from_terms(["kabel"]),
            KeywordSet::default(),
            KeywordSet::default(),
            0,
        )
        .unwrap();
        BatchExecutor::new(
            pool.clone(),
            Arc::new(RuleSet::new(vec![rule])),
            ScoringEngine::default(),
            options,
        )
    }

    #[tokio::test]
    async fn test_run_writes_and_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        let cat = seed_category(&pool, "kable").await;
        let hit = seed(&pool, "HDMI kabel", false).await;
        seed(&pool, "Myš", false).await;
        seed(&pool, "USB kabel", true).await;

        let options = BatchOptions {
            page_size: 1,
            ..Default::default()
        };
        let stats = executor(&pool, cat, options.clone()).run().await.unwrap();

        assert_eq!(stats.products_considered, 2);
        assert_eq!(stats.products_evaluated, 2);
        assert_eq!(stats.products_matched, 1);
        assert_eq!(stats.changes_written, 1);
        assert_eq!(stats.pages_committed, 2);

        let category: Option<String> =
            sqlx::query_scalar("SELECT category_guid FROM products WHERE guid = ?")
                .bind(hit.to_string())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(category, Some(cat.to_string()));

        let again = executor(&pool, cat, options).run().await.unwrap();
        assert_eq!(again.changes_staged, 0);
        assert_eq!(again.changes_written, 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let pool = init_memory_database().await.unwrap();
        let cat = seed_category(&pool, "kable").await;
        seed(&pool, "HDMI kabel", false).await;

        let options = BatchOptions {
            dry_run: true,
            ..Default::default()
        };
        let stats = executor(&pool, cat, options).run().await.unwrap();

        assert_eq!(stats.changes_staged, 1);
        assert_eq!(stats.changes_written, 0);
        let assigned: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_guid IS NOT NULL")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(assigned, 0);
    }

    #[tokio::test]
    async fn test_bad_record_is_skipped_not_fatal() {
        let pool = init_memory_database().await.unwrap();
        let cat = seed_category(&pool, "kable").await;
        seed(&pool, "HDMI kabel", false).await;
        sqlx::query("INSERT INTO products (guid, name) VALUES ('zzz-not-a-uuid', 'kabel')")
            .execute(&pool)
            .await
            .unwrap();

        let stats = executor(&pool, cat, BatchOptions::default()).run().await.unwrap();

        assert_eq!(stats.products_considered, 2);
        assert_eq!(stats.products_evaluated, 1);
        assert_eq!(stats.record_errors.count, 1);
        assert_eq!(stats.record_errors.samples[0].guid, "zzz-not-a-uuid");
        assert_eq!(stats.changes_written, 1);
    }

    #[tokio::test]
    async fn test_page_write_failure_is_reported() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool, "HDMI kabel", false).await;

        // Category that does not exist: the foreign key rejects the write
        let stats = executor(&pool, Uuid::new_v4(), BatchOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(stats.pages_failed.len(), 1);
        assert_eq!(stats.pages_committed, 0);
        assert_eq!(stats.changes_written, 0);
    }

    #[tokio::test]
    async fn test_empty_store_is_success() {
        let pool = init_memory_database().await.unwrap();
        let stats = executor(&pool, Uuid::new_v4(), BatchOptions::default())
            .run()
            .await
            .unwrap();

        assert_eq!(stats.products_considered, 0);
        assert!(stats.pages_failed.is_empty());
    }
}
