//! Text normalization
//!
//! The single canonical form every keyword and every product text is matched in:
//! lowercase ASCII letters and digits separated by single spaces.
//!
//! **Algorithm:**
//! 1. Unicode lowercase
//! 2. NFKD decomposition
//! 3. Drop every non-ASCII code point (combining marks and anything without an
//!    ASCII base letter)
//! 4. Every remaining character outside `[a-z0-9]` becomes a separator
//! 5. Runs of separators collapse to one space; leading/trailing ones are trimmed
//!
//! The function is total and idempotent: `normalize(&normalize(s)) == normalize(s)`.

use unicode_normalization::UnicodeNormalization;

/// Separator used when joining product fields before normalization
const FIELD_SEPARATOR: &str = " | ";

/// Canonicalize arbitrary text for substring matching
///
/// # Examples
///
/// ```
/// use catclass::normalize::normalize;
///
/// assert_eq!(normalize("Smartfóny & Tablety"), "smartfony tablety");
/// assert_eq!(normalize("  iPhone-15 (128GB) "), "iphone 15 128gb");
/// assert_eq!(normalize(""), "");
/// ```
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_separator = false;

    for c in lowered.nfkd() {
        if !c.is_ascii() {
            continue;
        }
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !out.is_empty() {
                out.push(' ');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }

    out
}

/// Normalize an optional field; `None` is the empty string
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Build the matching text of one product
///
/// The fields are joined with a separator before normalizing so that the end of
/// one field can never fuse with the start of the next into a spurious token.
pub fn product_text(name: &str, brand: Option<&str>, raw_category: Option<&str>) -> String {
    let joined = [Some(name), brand, raw_category]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR);
    normalize(&joined)
}
