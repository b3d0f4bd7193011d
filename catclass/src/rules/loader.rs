//! Rule sheet parsing
//!
//! Turns raw CSV bytes into validated rows without touching the database.
//! Binding rows to taxonomy nodes happens in [`super::load_rules`].
//!
//! Header matching runs on normalized header text, so `IN`, `in`,
//! `IN (keywords)` and `Include terms` all name the include column.

use catclass_common::{Error, Result};
use tracing::warn;

use super::KeywordSet;
use crate::models::{LoadStats, SkipReason};
use crate::normalize::normalize;

/// Hierarchy depth supported by the sheet
pub const MAX_LEVELS: usize = 5;

/// Column positions found in the header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    levels: [Option<usize>; MAX_LEVELS],
    include: usize,
    exclude: Option<usize>,
    require: Option<usize>,
    priority: Option<usize>,
}

impl ColumnMap {
    /// Map header cells to columns
    ///
    /// A sheet without an `L1` column or without an include column cannot
    /// describe a single rule and is rejected as a whole.
    pub fn from_headers<'a, I>(headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut levels = [None; MAX_LEVELS];
        let mut include = None;
        let mut exclude = None;
        let mut require = None;
        let mut priority = None;

        for (idx, raw) in headers.into_iter().enumerate() {
            let header = normalize(raw);
            // First occurrence of a column name wins
            let slot = if let Some(level) = level_index(&header) {
                &mut levels[level]
            } else if is_include_header(&header) {
                &mut include
            } else if header == "out" || header.starts_with("out ") || header.starts_with("exclude") {
                &mut exclude
            } else if header == "must" || header.starts_with("must ") || header.starts_with("require") {
                &mut require
            } else if header == "priority" || header.starts_with("priority ") {
                &mut priority
            } else {
                continue;
            };
            if slot.is_none() {
                *slot = Some(idx);
            }
        }

        if levels[0].is_none() {
            return Err(Error::RuleSource(
                "rule sheet has no L1 column".to_string(),
            ));
        }
        let include = include.ok_or_else(|| {
            Error::RuleSource("rule sheet has no IN (include) column".to_string())
        })?;

        Ok(Self {
            levels,
            include,
            exclude,
            require,
            priority,
        })
    }
}

/// `l1`..`l5` or `level 1`..`level 5`
fn level_index(header: &str) -> Option<usize> {
    let digits = header
        .strip_prefix("level ")
        .or_else(|| header.strip_prefix('l'))?;
    let level: usize = digits.parse().ok()?;
    (1..=MAX_LEVELS).contains(&level).then(|| level - 1)
}

fn is_include_header(header: &str) -> bool {
    header == "in"
        || header == "include"
        || header.starts_with("in ")
        || header.starts_with("include ")
        || header == "includes"
}

/// One validated sheet row, not yet bound to a category
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRow {
    /// 1-based line in the sheet (header is line 1)
    pub row_number: usize,
    /// Non-blank hierarchy segments, trimmed, in order
    pub path: Vec<String>,
    pub include: KeywordSet,
    pub exclude: KeywordSet,
    pub require: KeywordSet,
    pub priority: i64,
}

/// Result of parsing a whole sheet
#[derive(Debug, Clone, Default)]
pub struct ParsedSheet {
    pub rows: Vec<RuleRow>,
    /// Counters for rows read, skipped and defaulted; `rules_loaded` and
    /// `categories_created` are filled in once rows are bound
    pub stats: LoadStats,
}

/// Parse a rule sheet
///
/// Fails only when the header row is unreadable or lacks the required columns.
/// Individual bad rows are skipped and counted.
pub fn parse_rule_sheet(body: &[u8], delimiter: char) -> Result<ParsedSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| Error::RuleSource(format!("rule sheet header unreadable: {}", e)))?
        .clone();
    let columns = ColumnMap::from_headers(headers.iter())?;

    let mut sheet = ParsedSheet::default();

    for (idx, result) in reader.records().enumerate() {
        sheet.stats.rows_read += 1;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let row_number = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(idx + 2);
                warn!(row = row_number, error = %e, "Skipping malformed rule row");
                sheet.stats.record_skip(SkipReason::Malformed);
                continue;
            }
        };

        let row_number = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);

        match build_row(&record, &columns, delimiter, row_number) {
            Ok((row, priority_defaulted)) => {
                if priority_defaulted {
                    sheet.stats.priorities_defaulted += 1;
                }
                sheet.rows.push(row);
            }
            Err(reason) => {
                warn!(row = row_number, reason = ?reason, "Skipping rule row");
                sheet.stats.record_skip(reason);
            }
        }
    }

    Ok(sheet)
}

fn build_row(
    record: &csv::StringRecord,
    columns: &ColumnMap,
    delimiter: char,
    row_number: usize,
) -> std::result::Result<(RuleRow, bool), SkipReason> {
    let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");

    let path: Vec<String> = columns
        .levels
        .iter()
        .map(|&idx| cell(idx).trim())
        .filter(|segment| !normalize(segment).is_empty())
        .map(str::to_string)
        .collect();
    if path.is_empty() {
        return Err(SkipReason::EmptyPath);
    }

    let include = KeywordSet::from_raw(cell(Some(columns.include)), delimiter);
    if include.is_empty() {
        return Err(SkipReason::EmptyInclude);
    }

    let (priority, priority_defaulted) = parse_priority(cell(columns.priority));
    if priority_defaulted {
        warn!(
            row = row_number,
            value = cell(columns.priority),
            "PRIORITY is not an integer, using 0"
        );
    }

    Ok((
        RuleRow {
            row_number,
            path,
            include,
            exclude: KeywordSet::from_raw(cell(columns.exclude), delimiter),
            require: KeywordSet::from_raw(cell(columns.require), delimiter),
            priority,
        },
        priority_defaulted,
    ))
}

/// Parse a PRIORITY cell
///
/// Returns the priority and whether it fell back to 0. A blank cell is a plain
/// 0. Spreadsheets export integers as `5.0`, which is accepted.
pub fn parse_priority(cell: &str) -> (i64, bool) {
    let value = cell.trim();
    if value.is_empty() {
        return (0, false);
    }
    if let Ok(n) = value.parse::<i64>() {
        return (n, false);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            (f as i64, false)
        }
        _ => (0, true),
    }
}
