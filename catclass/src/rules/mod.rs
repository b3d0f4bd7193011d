//! Classification rules
//!
//! A rule binds one taxonomy node to three keyword sets and a priority:
//! - `include`: any match makes the product a candidate (never empty)
//! - `exclude`: any match vetoes the rule
//! - `require`: when non-empty, at least one must match or the rule is vetoed
//!
//! Rules are parsed from an external sheet once per run into an immutable
//! [`RuleSet`] shared read-only by every batch worker.

pub mod loader;
pub mod source;

pub use loader::{parse_rule_sheet, ParsedSheet, RuleRow};
pub use source::RuleSource;

use catclass_common::config::TomlConfig;
use catclass_common::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{LoadStats, SkipReason};
use crate::normalize::normalize;
use crate::taxonomy::TaxonomyBuilder;

/// Pre-normalized, deduplicated keywords in sheet order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    /// Split a cell on `delimiter`, normalize each term, drop blanks and repeats
    pub fn from_raw(cell: &str, delimiter: char) -> Self {
        let mut terms: Vec<String> = Vec::new();
        for term in cell.split(delimiter).map(normalize) {
            if !term.is_empty() && !terms.contains(&term) {
                terms.push(term);
            }
        }
        Self(terms)
    }

    /// Build from terms that are normalized here
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set: Vec<String> = Vec::new();
        for term in terms.into_iter().map(|t| normalize(t.as_ref())) {
            if !term.is_empty() && !set.contains(&term) {
                set.push(term);
            }
        }
        Self(set)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// First term that occurs as a substring of `text`
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.iter().find(|term| text.contains(term))
    }
}

/// One validated rule bound to a category
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRule {
    category: Uuid,
    label: String,
    include: KeywordSet,
    exclude: KeywordSet,
    require: KeywordSet,
    priority: i64,
    source_row: usize,
}

impl ClassificationRule {
    /// Returns `None` when `include` is empty; such a rule could never fire
    pub fn new(
        category: Uuid,
        label: impl Into<String>,
        include: KeywordSet,
        exclude: KeywordSet,
        require: KeywordSet,
        priority: i64,
    ) -> Option<Self> {
        if include.is_empty() {
            return None;
        }
        Some(Self {
            category,
            label: label.into(),
            include,
            exclude,
            require,
            priority,
            source_row: 0,
        })
    }

    /// Record the sheet line this rule came from
    pub fn with_source_row(mut self, row: usize) -> Self {
        self.source_row = row;
        self
    }

    pub fn category(&self) -> Uuid {
        self.category
    }

    /// Category path as written in the sheet, `A > B > C`
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn include(&self) -> &KeywordSet {
        &self.include
    }

    pub fn exclude(&self) -> &KeywordSet {
        &self.exclude
    }

    pub fn require(&self) -> &KeywordSet {
        &self.require
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn source_row(&self) -> usize {
        self.source_row
    }
}

/// Immutable, ordered rule collection
///
/// Order is sheet order and decides ties.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn get(&self, index: usize) -> Option<&ClassificationRule> {
        self.rules.get(index)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Fetch, parse and bind a rule sheet
///
/// Taxonomy nodes named by the sheet are created as needed. A fetch failure or
/// an unusable header is returned as an error before anything is written;
/// individual bad rows are skipped and counted in [`LoadStats`].
pub async fn load_rules(
    db: &SqlitePool,
    source: &RuleSource,
    config: &TomlConfig,
) -> Result<(RuleSet, LoadStats)> {
    let body = source.fetch(&config.rule_source).await?;
    let sheet = parse_rule_sheet(&body, config.rule_source.delimiter)?;
    bind_rules(db, sheet, config.classifier.slug_max_len).await
}

/// Resolve each parsed row's path to a category and build the rule set
pub async fn bind_rules(
    db: &SqlitePool,
    sheet: ParsedSheet,
    slug_max_len: usize,
) -> Result<(RuleSet, LoadStats)> {
    let ParsedSheet { rows, mut stats } = sheet;
    let mut taxonomy = TaxonomyBuilder::new(db.clone(), slug_max_len);
    let mut rules = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(node) = taxonomy.resolve(&row.path).await? else {
            warn!(row = row.row_number, "Rule row has no target category, skipping");
            stats.record_skip(SkipReason::EmptyPath);
            continue;
        };

        let label = row.path.join(" > ");
        match ClassificationRule::new(
            node.guid,
            label,
            row.include,
            row.exclude,
            row.require,
            row.priority,
        ) {
            Some(rule) => rules.push(rule.with_source_row(row.row_number)),
            None => stats.record_skip(SkipReason::EmptyInclude),
        }
    }

    stats.rules_loaded = rules.len();
    stats.categories_created = taxonomy.created_count();

    info!(
        rules = stats.rules_loaded,
        rows = stats.rows_read,
        skipped = stats.rows_skipped(),
        priorities_defaulted = stats.priorities_defaulted,
        categories_created = stats.categories_created,
        "Rule set loaded"
    );

    Ok((RuleSet::new(rules), stats))
}
