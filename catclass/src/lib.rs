//! catclass library interface
//!
//! Rule-based product taxonomy classification. The binary is a thin CLI over
//! [`workflow`]; integration tests drive the same functions.

pub mod batch;
pub mod db;
pub mod models;
pub mod normalize;
pub mod rules;
pub mod scoring;
pub mod taxonomy;
pub mod utils;
pub mod workflow;

pub use batch::{BatchExecutor, BatchOptions};
pub use rules::{ClassificationRule, KeywordSet, RuleSet, RuleSource};
pub use scoring::{Classification, ScoringEngine};
pub use taxonomy::TaxonomyBuilder;
