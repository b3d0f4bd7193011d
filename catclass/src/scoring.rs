//! Scoring engine
//!
//! Evaluates one product's normalized text against every rule and picks the
//! highest-scoring candidate.
//!
//! **Per rule:**
//! 1. Any `exclude` term in the text vetoes the rule
//! 2. A non-empty `require` set with no term in the text vetoes the rule
//! 3. score = include_weight x distinct matched include terms
//!    + brand_bonus if the normalized brand equals a matched include term
//!    + priority (once, only when at least one include term matched)
//! 4. Zero include matches: not a candidate
//!
//! Every rule is evaluated. A later rule replaces the current best only with a
//! strictly higher score, so ties go to the earlier rule.
//!
//! confidence = clamp(score x multiplier, floor, ceiling) for a winner, 0.0 otherwise.

use catclass_common::config::ScoringWeights;
use catclass_common::db::models::ProductRecord;
use serde::Serialize;
use uuid::Uuid;

use crate::normalize::{normalize_opt, product_text};
use crate::rules::{ClassificationRule, RuleSet};

/// Outcome of classifying one product
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    /// Winning rule's category, `None` when nothing matched
    pub category: Option<Uuid>,
    /// Index of the winning rule in the rule set
    pub rule_index: Option<usize>,
    pub score: i64,
    pub confidence: f64,
}

impl Classification {
    fn no_match() -> Self {
        Self {
            category: None,
            rule_index: None,
            score: 0,
            confidence: 0.0,
        }
    }

    pub fn is_match(&self) -> bool {
        self.rule_index.is_some()
    }
}

/// How one rule fared against one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RuleOutcome {
    /// Vetoed by an exclude term
    Excluded { term: String },
    /// Vetoed: require terms present but none matched
    MissingRequired,
    /// No include term matched
    NoMatch,
    Scored {
        matched: Vec<String>,
        brand_bonus: bool,
        score: i64,
    },
}

/// One line of an explanation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleExplanation {
    pub rule_index: usize,
    pub label: String,
    pub category: Uuid,
    pub source_row: usize,
    #[serde(flatten)]
    pub outcome: RuleOutcome,
}

/// Full evaluation of one product against the rule set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub product_text: String,
    pub brand: String,
    pub rules: Vec<RuleExplanation>,
    pub winner: Classification,
}

/// Internal per-rule result, allocation free
enum Evaluation<'r> {
    Excluded(&'r str),
    MissingRequired,
    NoMatch,
    Scored { brand_hit: bool, score: i64 },
}

/// Rule evaluator parameterized by the scoring weights
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Classify a product
    ///
    /// `text` is the normalized product text; `brand` the normalized brand
    /// (empty when the product has none).
    pub fn classify(&self, text: &str, brand: &str, rules: &RuleSet) -> Classification {
        let mut best: Option<(usize, i64)> = None;

        for (index, rule) in rules.rules().iter().enumerate() {
            if let Evaluation::Scored { score, .. } = self.evaluate(rule, text, brand, |_| {}) {
                match best {
                    Some((_, best_score)) if score <= best_score => {}
                    _ => best = Some((index, score)),
                }
            }
        }

        match best {
            Some((index, score)) => Classification {
                category: rules.get(index).map(ClassificationRule::category),
                rule_index: Some(index),
                score,
                confidence: self.confidence_for(score),
            },
            None => Classification::no_match(),
        }
    }

    /// Classify a stored product record
    pub fn classify_product(&self, product: &ProductRecord, rules: &RuleSet) -> Classification {
        let text = product_text(
            &product.name,
            product.brand.as_deref(),
            product.raw_category.as_deref(),
        );
        let brand = normalize_opt(product.brand.as_deref());
        self.classify(&text, &brand, rules)
    }

    /// Per-rule breakdown for the same inputs `classify` takes
    pub fn explain(&self, text: &str, brand: &str, rules: &RuleSet) -> Explanation {
        let explained = rules
            .rules()
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let mut matched = Vec::new();
                let outcome = match self.evaluate(rule, text, brand, |term| {
                    matched.push(term.to_string())
                }) {
                    Evaluation::Excluded(term) => RuleOutcome::Excluded {
                        term: term.to_string(),
                    },
                    Evaluation::MissingRequired => RuleOutcome::MissingRequired,
                    Evaluation::NoMatch => RuleOutcome::NoMatch,
                    Evaluation::Scored { brand_hit, score } => RuleOutcome::Scored {
                        matched,
                        brand_bonus: brand_hit,
                        score,
                    },
                };
                RuleExplanation {
                    rule_index: index,
                    label: rule.label().to_string(),
                    category: rule.category(),
                    source_row: rule.source_row(),
                    outcome,
                }
            })
            .collect();

        Explanation {
            product_text: text.to_string(),
            brand: brand.to_string(),
            rules: explained,
            winner: self.classify(text, brand, rules),
        }
    }

    /// Confidence for a winning score
    pub fn confidence_for(&self, score: i64) -> f64 {
        let w = &self.weights;
        (score as f64 * w.confidence_multiplier).clamp(w.confidence_floor, w.confidence_ceiling)
    }

    fn evaluate<'r>(
        &self,
        rule: &'r ClassificationRule,
        text: &str,
        brand: &str,
        mut on_match: impl FnMut(&'r str),
    ) -> Evaluation<'r> {
        if let Some(term) = rule.exclude().first_match(text) {
            return Evaluation::Excluded(term);
        }
        if !rule.require().is_empty() && rule.require().first_match(text).is_none() {
            return Evaluation::MissingRequired;
        }

        let mut matched = 0i64;
        let mut brand_hit = false;
        for term in rule.include().iter().filter(|term| text.contains(term)) {
            matched += 1;
            brand_hit |= term == brand;
            on_match(term);
        }

        if matched == 0 {
            return Evaluation::NoMatch;
        }

        // Saturating: sheet priorities span the whole i64 range
        let mut score = self
            .weights
            .include_weight
            .saturating_mul(matched)
            .saturating_add(rule.priority());
        if brand_hit {
            score = score.saturating_add(self.weights.brand_bonus);
        }
        Evaluation::Scored { brand_hit, score }
    }
}
