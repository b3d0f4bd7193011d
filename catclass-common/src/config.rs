//! Configuration loading and database path resolution
//!
//! Bootstrap configuration lives in an optional TOML file. Everything in it has a
//! compiled default, so a missing file is a warning, never a startup failure.
//!
//! # Database Path Priority
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `CATCLASS_DATABASE`
//! 3. TOML `database_path`
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the database path
pub const DATABASE_ENV_VAR: &str = "CATCLASS_DATABASE";

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "CATCLASS_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Path to SQLite database file (optional)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Batch classification settings
    #[serde(default)]
    pub classifier: ClassifierSettings,

    /// Scoring weights and confidence scale
    #[serde(default)]
    pub scoring: ScoringWeights,

    /// Rule source fetch settings
    #[serde(default)]
    pub rule_source: RuleSourceSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Batch executor settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSettings {
    /// Products loaded per page (bounds peak resident records)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Pages processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Record error messages kept in the run report
    #[serde(default = "default_error_sample_limit")]
    pub error_sample_limit: usize,

    /// Maximum time a page write retries on lock contention
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,

    /// Upper bound for generated category slugs
    #[serde(default = "default_slug_max_len")]
    pub slug_max_len: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            workers: default_workers(),
            error_sample_limit: default_error_sample_limit(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
            slug_max_len: default_slug_max_len(),
        }
    }
}

/// Scoring constants
///
/// The defaults are the empirical values the rule sheets were tuned against:
/// 10 points per include term, 15 for a brand hit, confidence = score * 2.5
/// clamped to [10, 100].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_include_weight")]
    pub include_weight: i64,

    #[serde(default = "default_brand_bonus")]
    pub brand_bonus: i64,

    #[serde(default = "default_confidence_multiplier")]
    pub confidence_multiplier: f64,

    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    #[serde(default = "default_confidence_ceiling")]
    pub confidence_ceiling: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            include_weight: default_include_weight(),
            brand_bonus: default_brand_bonus(),
            confidence_multiplier: default_confidence_multiplier(),
            confidence_floor: default_confidence_floor(),
            confidence_ceiling: default_confidence_ceiling(),
        }
    }
}

/// Rule source fetch settings
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSourceSettings {
    /// HTTP fetch timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Separator between keywords inside one IN/OUT/MUST cell
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for RuleSourceSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            delimiter: default_delimiter(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_workers() -> usize {
    1
}

fn default_error_sample_limit() -> usize {
    20
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_slug_max_len() -> usize {
    50
}

fn default_include_weight() -> i64 {
    10
}

fn default_brand_bonus() -> i64 {
    15
}

fn default_confidence_multiplier() -> f64 {
    2.5
}

fn default_confidence_floor() -> f64 {
    10.0
}

fn default_confidence_ceiling() -> f64 {
    100.0
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_delimiter() -> char {
    ','
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break paging or the confidence scale
    pub fn validate(&self) -> Result<()> {
        if self.classifier.page_size == 0 {
            return Err(Error::Config("classifier.page_size must be at least 1".to_string()));
        }
        if self.classifier.workers == 0 {
            return Err(Error::Config("classifier.workers must be at least 1".to_string()));
        }
        if self.classifier.slug_max_len < 8 {
            return Err(Error::Config("classifier.slug_max_len must be at least 8".to_string()));
        }
        self.scoring.validate()
    }
}

impl ScoringWeights {
    /// Monotonicity of confidence needs non-negative weights and a positive scale
    pub fn validate(&self) -> Result<()> {
        if self.include_weight < 0 || self.brand_bonus < 0 {
            return Err(Error::Config(
                "scoring weights must not be negative".to_string(),
            ));
        }
        if !self.confidence_multiplier.is_finite() || self.confidence_multiplier <= 0.0 {
            return Err(Error::Config(
                "scoring.confidence_multiplier must be a finite positive number".to_string(),
            ));
        }
        // Stored confidence is bounded to [0, 100] by the products table
        let (floor, ceiling) = (self.confidence_floor, self.confidence_ceiling);
        if !floor.is_finite() || !ceiling.is_finite() {
            return Err(Error::Config(
                "scoring confidence bounds must be finite".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&floor) || !(0.0..=100.0).contains(&ceiling) {
            return Err(Error::Config(format!(
                "scoring confidence bounds ({}, {}) must lie within 0..=100",
                floor, ceiling
            )));
        }
        if floor > ceiling {
            return Err(Error::Config(format!(
                "scoring.confidence_floor ({}) exceeds confidence_ceiling ({})",
                floor, ceiling
            )));
        }
        Ok(())
    }
}

/// Load the bootstrap config
///
/// An explicitly requested file (CLI or env) must exist and parse. The default
/// location is optional: when absent, compiled defaults are used with a warning.
pub fn load_toml_config(explicit_path: Option<&Path>) -> Result<TomlConfig> {
    let explicit = explicit_path
        .map(PathBuf::from)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

    if let Some(path) = explicit {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = TomlConfig::from_toml_str(&content)?;
        info!("Loaded config: {}", path.display());
        return Ok(config);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)?;
            let config = TomlConfig::from_toml_str(&content)?;
            info!("Loaded config: {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!(
                "Config file not found at {}, using compiled defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        None => {
            warn!("Could not determine config directory, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve the database path following the documented priority order
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.database_path {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_database_path()
}

/// Default config file location for the platform
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("catclass").join("config.toml"))
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("catclass"))
        .unwrap_or_else(|| PathBuf::from("./catclass_data"))
        .join("catalog.db")
}
