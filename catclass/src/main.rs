//! catclass - rule-based product taxonomy classifier
//!
//! Offline batch tool: reads an externally authored rule sheet, materializes the
//! taxonomy it names, and assigns a category and confidence to every unlocked
//! product in the catalog database.
//!
//! Exit status is non-zero only when the run cannot start (rule source
//! unreachable or unparsable, config or database unusable). Page and record
//! failures are reported, not fatal.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use catclass::models::LoadStats;
use catclass::rules::RuleSource;
use catclass::scoring::{Explanation, RuleOutcome};
use catclass::workflow;
use catclass_common::config::{self, TomlConfig};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for catclass
#[derive(Parser, Debug)]
#[command(name = "catclass")]
#[command(about = "Rule-based product taxonomy classifier")]
#[command(version)]
struct Cli {
    /// Catalog database file
    #[arg(long, global = true, env = config::DATABASE_ENV_VAR)]
    database: Option<PathBuf>,

    /// Bootstrap config file (TOML)
    #[arg(long, global = true, env = config::CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every unlocked product
    Classify {
        /// Rule sheet: file path or http(s) URL
        rules: String,

        /// Products per page
        #[arg(long)]
        page_size: Option<usize>,

        /// Pages processed concurrently
        #[arg(long)]
        workers: Option<usize>,

        /// Evaluate and report, write nothing to products
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch and parse a rule sheet without touching the database
    Validate {
        /// Rule sheet: file path or http(s) URL
        rules: String,
    },

    /// Show how every rule scores one product
    Explain {
        /// Rule sheet: file path or http(s) URL
        rules: String,

        /// Product name
        #[arg(long)]
        name: String,

        #[arg(long)]
        brand: Option<String>,

        /// Supplier category text
        #[arg(long)]
        category_text: Option<String>,

        /// Print the explanation as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut toml_config = config::load_toml_config(cli.config.as_deref())
        .context("Failed to load configuration")?;
    init_logging(&toml_config)?;

    info!("Starting catclass v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Classify {
            rules,
            page_size,
            workers,
            dry_run,
            json,
        } => {
            if let Some(page_size) = page_size {
                toml_config.classifier.page_size = page_size;
            }
            if let Some(workers) = workers {
                toml_config.classifier.workers = workers;
            }
            toml_config.validate().context("Invalid classifier settings")?;

            let db = open_database(cli.database.as_deref(), &toml_config).await?;
            let source = RuleSource::parse(&rules);

            let report = workflow::run_classification(&db, &source, &toml_config, dry_run)
                .await
                .with_context(|| format!("Classification with rules from {} failed", source))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }
        }

        Command::Validate { rules } => {
            let source = RuleSource::parse(&rules);
            let stats = workflow::validate_rules(&source, &toml_config)
                .await
                .with_context(|| format!("Rule source {} is unusable", source))?;
            print_load_stats(&source, &stats);
        }

        Command::Explain {
            rules,
            name,
            brand,
            category_text,
            json,
        } => {
            let db = open_database(cli.database.as_deref(), &toml_config).await?;
            let source = RuleSource::parse(&rules);

            let explanation = workflow::explain_product(
                &db,
                &source,
                &toml_config,
                &name,
                brand.as_deref(),
                category_text.as_deref(),
            )
            .await
            .with_context(|| format!("Loading rules from {} failed", source))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&explanation)?);
            } else {
                print_explanation(&explanation);
            }
        }
    }

    Ok(())
}

/// stderr or file output, `RUST_LOG` overriding the configured level
fn init_logging(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid logging.level")?;

    let (file_layer, stderr_layer) = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

async fn open_database(cli_path: Option<&Path>, config: &TomlConfig) -> Result<sqlx::SqlitePool> {
    let db_path = config::resolve_database_path(cli_path, config);
    info!("Database: {}", db_path.display());

    catclass::db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

fn print_load_stats(source: &RuleSource, stats: &LoadStats) {
    println!("Rule source: {}", source);
    println!("Rows read: {}", stats.rows_read);
    println!("Valid rules: {}", stats.rules_loaded);
    println!(
        "Rows skipped: {} ({} empty path, {} empty include, {} malformed)",
        stats.rows_skipped(),
        stats.skipped_empty_path,
        stats.skipped_empty_include,
        stats.skipped_malformed
    );
    println!("Priorities defaulted to 0: {}", stats.priorities_defaulted);
}

fn print_explanation(explanation: &Explanation) {
    println!("Product text: \"{}\"", explanation.product_text);
    println!("Brand: \"{}\"", explanation.brand);
    println!();

    for rule in &explanation.rules {
        let verdict = match &rule.outcome {
            RuleOutcome::Excluded { term } => format!("vetoed, exclude term \"{}\"", term),
            RuleOutcome::MissingRequired => "vetoed, no required term".to_string(),
            RuleOutcome::NoMatch => continue,
            RuleOutcome::Scored {
                matched,
                brand_bonus,
                score,
            } => format!(
                "score {} (matched: {}{})",
                score,
                matched.join(", "),
                if *brand_bonus { "; brand bonus" } else { "" }
            ),
        };
        println!("  row {:>4}  {}: {}", rule.source_row, rule.label, verdict);
    }

    println!();
    match explanation.winner.rule_index.and_then(|i| explanation.rules.get(i)) {
        Some(rule) => println!(
            "Winner: {} (score {}, confidence {:.1})",
            rule.label, explanation.winner.score, explanation.winner.confidence
        ),
        None => println!("No rule matched (confidence 0.0)"),
    }
}
