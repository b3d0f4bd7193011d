//! Taxonomy builder
//!
//! Resolves ordered path segments (e.g. `["Elektronika", "Mobily", "Smartfóny"]`)
//! to the deepest category node, creating missing nodes on the way.
//!
//! **Algorithm:**
//! 1. Trim each segment; skip segments that normalize to the empty string
//! 2. Look for an existing child of the current parent with exactly that name
//!    (case-sensitive), memoized per builder by (name, parent)
//! 3. If absent, derive a slug from the parent slug and the segment, truncate it
//!    to the configured bound, and insert; on a slug collision retry with
//!    `-2`, `-3`, ... suffixes
//! 4. Return the deepest node
//!
//! New nodes always hang under an existing node, so parent links stay a forest.
//! The memo map lives as long as one builder (one rule load), never longer.

use catclass_common::db::models::CategoryNode;
use catclass_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::db::categories;
use crate::normalize::normalize;

/// Give up on a slug after this many suffixes
const MAX_SLUG_ATTEMPTS: usize = 10_000;

/// Creates and looks up taxonomy nodes for one rule load
pub struct TaxonomyBuilder {
    db: SqlitePool,
    slug_max_len: usize,
    cache: HashMap<(String, Option<Uuid>), CategoryNode>,
    created: usize,
}

impl TaxonomyBuilder {
    pub fn new(db: SqlitePool, slug_max_len: usize) -> Self {
        Self {
            db,
            slug_max_len,
            cache: HashMap::new(),
            created: 0,
        }
    }

    /// Resolve a path to its deepest node, creating missing nodes
    ///
    /// Returns `Ok(None)` ("no target category") when every segment is blank.
    pub async fn resolve<S: AsRef<str>>(&mut self, path: &[S]) -> Result<Option<CategoryNode>> {
        let mut current: Option<CategoryNode> = None;

        for segment in path {
            let name = segment.as_ref().trim();
            if normalize(name).is_empty() {
                continue;
            }
            let node = self.resolve_child(name, current.as_ref()).await?;
            current = Some(node);
        }

        Ok(current)
    }

    /// Nodes created by this builder so far
    pub fn created_count(&self) -> usize {
        self.created
    }

    async fn resolve_child(
        &mut self,
        name: &str,
        parent: Option<&CategoryNode>,
    ) -> Result<CategoryNode> {
        let parent_guid = parent.map(|p| p.guid);
        let key = (name.to_string(), parent_guid);

        if let Some(node) = self.cache.get(&key) {
            return Ok(node.clone());
        }

        let node = match categories::find_child(&self.db, name, parent_guid).await? {
            Some(existing) => existing,
            None => self.create_child(name, parent).await?,
        };

        self.cache.insert(key, node.clone());
        Ok(node)
    }

    async fn create_child(&mut self, name: &str, parent: Option<&CategoryNode>) -> Result<CategoryNode> {
        let base = derive_slug(name, parent.map(|p| p.slug.as_str()), self.slug_max_len);
        let mut node = CategoryNode {
            guid: Uuid::new_v4(),
            name: name.to_string(),
            slug: base.clone(),
            parent_guid: parent.map(|p| p.guid),
            active: true,
        };

        for attempt in 1..=MAX_SLUG_ATTEMPTS {
            if attempt > 1 {
                node.slug = slug_with_suffix(&base, attempt, self.slug_max_len);
            }
            if categories::try_insert(&self.db, &node).await? {
                self.created += 1;
                debug!(
                    name = %node.name,
                    slug = %node.slug,
                    parent = ?node.parent_guid,
                    "Created category"
                );
                return Ok(node);
            }
        }

        Err(Error::Internal(format!(
            "no free slug for category '{}' after {} attempts",
            name, MAX_SLUG_ATTEMPTS
        )))
    }
}

/// URL-safe form of a name: normalized tokens joined by `-`
pub fn slugify(name: &str) -> String {
    normalize(name).replace(' ', "-")
}

/// Slug for a new node: `<parent slug>-<own slug>`, cut to `max_len`
pub fn derive_slug(name: &str, parent_slug: Option<&str>, max_len: usize) -> String {
    let own = slugify(name);
    let full = match parent_slug {
        Some(parent) if !parent.is_empty() => format!("{}-{}", parent, own),
        _ => own,
    };
    truncate_slug(&full, max_len)
}

/// `base` with a numeric suffix, still within `max_len`
pub fn slug_with_suffix(base: &str, n: usize, max_len: usize) -> String {
    let suffix = format!("-{}", n);
    let keep = max_len.saturating_sub(suffix.len());
    format!("{}{}", truncate_slug(base, keep), suffix)
}

fn truncate_slug(slug: &str, max_len: usize) -> String {
    // Slugs are ASCII, byte slicing is safe
    let cut = &slug[..slug.len().min(max_len)];
    cut.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catclass_common::db::init::init_memory_database;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Smartfóny & Tablety"), "smartfony-tablety");
        assert_eq!(slugify("  TV  "), "tv");
    }

    #[test]
    fn test_derive_slug_prefixes_parent_and_truncates() {
        assert_eq!(derive_slug("Mobily", Some("elektronika"), 50), "elektronika-mobily");
        assert_eq!(derive_slug("Mobily", None, 50), "mobily");

        let long = derive_slug("Príslušenstvo k mobilným telefónom", Some("elektronika-mobily"), 24);
        assert!(long.len() <= 24);
        assert!(!long.ends_with('-'));
        assert!(long.starts_with("elektronika-mobily"));
    }

    #[test]
    fn test_slug_with_suffix_stays_bounded() {
        assert_eq!(slug_with_suffix("audio", 2, 50), "audio-2");
        let s = slug_with_suffix("abcdefghij", 12, 10);
        assert_eq!(s.len(), 10);
        assert!(s.ends_with("-12"));
    }

    #[tokio::test]
    async fn test_resolve_creates_path_once() {
        let pool = init_memory_database().await.unwrap();
        let mut builder = TaxonomyBuilder::new(pool.clone(), 50);

        let leaf = builder
            .resolve(&["Elektronika", "Mobily", "Smartfóny"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leaf.name, "Smartfóny");
        assert_eq!(leaf.slug, "elektronika-mobily-smartfony");
        assert_eq!(builder.created_count(), 3);

        let again = builder
            .resolve(&["Elektronika", "Mobily", "Smartfóny"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again, leaf);
        assert_eq!(builder.created_count(), 3);
        assert_eq!(categories::count_categories(&pool).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent_across_builders() {
        let pool = init_memory_database().await.unwrap();

        let first = TaxonomyBuilder::new(pool.clone(), 50)
            .resolve(&["Audio", "Slúchadlá"])
            .await
            .unwrap()
            .unwrap();

        let mut second_builder = TaxonomyBuilder::new(pool.clone(), 50);
        let second = second_builder
            .resolve(&["Audio", "Slúchadlá"])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.guid, second.guid);
        assert_eq!(second_builder.created_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_segments_are_skipped() {
        let pool = init_memory_database().await.unwrap();
        let mut builder = TaxonomyBuilder::new(pool.clone(), 50);

        let node = builder
            .resolve(&["Audio", "  ", "--", "Reproduktory"])
            .await
            .unwrap()
            .unwrap();
        let path = categories::category_path(&pool, node.guid).await.unwrap();
        assert_eq!(path, vec!["Audio", "Reproduktory"]);
    }

    #[tokio::test]
    async fn test_all_blank_path_has_no_target() {
        let pool = init_memory_database().await.unwrap();
        let mut builder = TaxonomyBuilder::new(pool.clone(), 50);

        let empty: [&str; 0] = [];
        assert!(builder.resolve(&["", " ", "!!"]).await.unwrap().is_none());
        assert!(builder.resolve(&empty).await.unwrap().is_none());
        assert_eq!(categories::count_categories(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_name_match_is_case_sensitive() {
        let pool = init_memory_database().await.unwrap();
        let mut builder = TaxonomyBuilder::new(pool.clone(), 50);

        let upper = builder.resolve(&["TV"]).await.unwrap().unwrap();
        let lower = builder.resolve(&["tv"]).await.unwrap().unwrap();

        assert_ne!(upper.guid, lower.guid);
        assert_eq!(upper.slug, "tv");
        assert_eq!(lower.slug, "tv-2");
    }

    #[tokio::test]
    async fn test_same_name_under_different_parents() {
        let pool = init_memory_database().await.unwrap();
        let mut builder = TaxonomyBuilder::new(pool.clone(), 50);

        let a = builder.resolve(&["Audio", "Káble"]).await.unwrap().unwrap();
        let b = builder.resolve(&["Video", "Káble"]).await.unwrap().unwrap();

        assert_ne!(a.guid, b.guid);
        assert_eq!(a.slug, "audio-kable");
        assert_eq!(b.slug, "video-kable");
    }
}
