//! Database models
//!
//! GUIDs are stored as TEXT and parsed on read, the same way everywhere.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// A node of the product taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub guid: Uuid,
    pub name: String,
    /// URL-safe, globally unique
    pub slug: String,
    pub parent_guid: Option<Uuid>,
    /// Visibility flag for storefront display
    pub active: bool,
}

impl CategoryNode {
    /// Decode a `categories` row
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let guid: String = row.try_get("guid")?;
        let parent_guid: Option<String> = row.try_get("parent_guid")?;
        let active: i64 = row.try_get("active")?;

        Ok(Self {
            guid: parse_guid(&guid)?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            parent_guid: parent_guid.as_deref().map(parse_guid).transpose()?,
            active: active != 0,
        })
    }
}

/// The projection of a product the classifier reads
///
/// Only `category_guid` and `confidence` are ever written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub guid: Uuid,
    pub name: String,
    pub brand: Option<String>,
    /// Free-text category from the supplier feed; a signal, not authoritative
    pub raw_category: Option<String>,
    pub category_guid: Option<Uuid>,
    /// In [0, 100]
    pub confidence: f64,
    /// Set by a trusted process; locked rows are never modified
    pub locked: bool,
}

impl ProductRecord {
    /// Decode a `products` row
    ///
    /// Fails on a NULL name or a malformed GUID so the caller can skip the record
    /// without aborting the page.
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let guid: String = row.try_get("guid")?;
        let category_guid: Option<String> = row.try_get("category_guid")?;
        let name: Option<String> = row.try_get("name")?;
        let locked: i64 = row.try_get("locked")?;

        let guid = parse_guid(&guid)?;
        let name = name.ok_or_else(|| {
            Error::InvalidInput(format!("product {} has no name", guid))
        })?;

        Ok(Self {
            guid,
            name,
            brand: row.try_get("brand")?,
            raw_category: row.try_get("raw_category")?,
            category_guid: category_guid.as_deref().map(parse_guid).transpose()?,
            confidence: row.try_get("confidence")?,
            locked: locked != 0,
        })
    }
}

/// Parse a TEXT guid column
pub fn parse_guid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database '{}': {}", value, e)))
}
