//! DBF field name resolution
//!
//! DBF limits field names to 10 characters. Attribute keys harvested from
//! descriptions are arbitrary text, so each key is cleaned, truncated and,
//! on collision, suffixed with `_1`, `_2`, ... until unique.
//!
//! | Original | Resolved |
//! |----------|----------|
//! | `Population Total` | `Population` |
//! | `Population Density` | `Populati_1` |
//! | `123field` | `_123field` |
//! | `%%%` | `field` |
//!
//! Resolution is a pure function of the ordered key list. Callers pass keys
//! in sorted order so identical input always gives identical names.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{ConvertError, Result};

/// Maximum DBF field name length
pub const MAX_FIELD_LENGTH: usize = 10;

/// Name used when a key has no valid characters at all
pub const FALLBACK_FIELD_NAME: &str = "field";

/// Highest collision suffix tried before giving up
pub const MAX_COLLISION_SUFFIX: u32 = 9999;

/// Bidirectional mapping between original keys and resolved field names
///
/// Iteration follows the order in which keys were resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    entries: Vec<(String, String)>,
    #[serde(skip)]
    by_original: HashMap<String, usize>,
    #[serde(skip)]
    by_resolved: HashMap<String, usize>,
}

impl FieldMapping {
    /// Resolved name for an original key
    #[must_use]
    pub fn resolved(&self, original: &str) -> Option<&str> {
        self.by_original
            .get(original)
            .map(|&i| self.entries[i].1.as_str())
    }

    /// Original key for a resolved name
    #[must_use]
    pub fn original(&self, resolved: &str) -> Option<&str> {
        self.by_resolved
            .get(resolved)
            .map(|&i| self.entries[i].0.as_str())
    }

    /// `(original, resolved)` pairs in resolution order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(o, r)| (o.as_str(), r.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, original: String, resolved: String) {
        let index = self.entries.len();
        self.by_original.insert(original.clone(), index);
        self.by_resolved.insert(resolved.clone(), index);
        self.entries.push((original, resolved));
    }
}

/// Resolve DBF field names for an ordered list of unique keys
///
/// # Errors
///
/// Returns [`ConvertError::FieldMapping`] if no free name exists for a key
/// after trying every suffix up to `_9999`.
///
/// # Examples
///
/// ```
/// use kmz2shp_core::fields::resolve_field_names;
///
/// let mapping = resolve_field_names(&["verylongfield1", "verylongfield2"])?;
/// assert_eq!(mapping.resolved("verylongfield1"), Some("verylongfi"));
/// assert_eq!(mapping.resolved("verylongfield2"), Some("verylong_1"));
/// # Ok::<(), kmz2shp_core::ConvertError>(())
/// ```
pub fn resolve_field_names<S: AsRef<str>>(keys: &[S]) -> Result<FieldMapping> {
    let mut mapping = FieldMapping::default();
    let mut used: HashSet<String> = HashSet::new();

    for key in keys {
        let key = key.as_ref();
        if mapping.by_original.contains_key(key) {
            continue;
        }
        let candidate = base_name(key);
        let resolved = if used.contains(&candidate) {
            resolve_collision(&candidate, &used)?
        } else {
            candidate
        };
        used.insert(resolved.clone());
        mapping.insert(key.to_string(), resolved);
    }

    Ok(mapping)
}

/// Collapse runs of characters outside `[A-Za-z0-9_]` to `_` and trim `_`
fn clean_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut in_invalid_run = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            cleaned.push(ch);
            in_invalid_run = false;
        } else if !in_invalid_run {
            cleaned.push('_');
            in_invalid_run = true;
        }
    }
    cleaned.trim_matches('_').to_string()
}

/// Truncate an ASCII name to at most `len` characters
#[inline]
fn truncate(name: &str, len: usize) -> String {
    name.chars().take(len).collect()
}

/// Candidate name before collision handling
fn base_name(original: &str) -> String {
    let mut candidate = truncate(&clean_name(original), MAX_FIELD_LENGTH);

    if candidate.is_empty() {
        candidate = FALLBACK_FIELD_NAME.to_string();
    }

    if candidate
        .chars()
        .next()
        .is_some_and(|c| !(c.is_ascii_alphabetic() || c == '_'))
    {
        candidate = truncate(&format!("_{candidate}"), MAX_FIELD_LENGTH);
    }

    candidate
}

fn resolve_collision(base: &str, used: &HashSet<String>) -> Result<String> {
    for counter in 1..=MAX_COLLISION_SUFFIX {
        let suffix = format!("_{counter}");
        let keep = MAX_FIELD_LENGTH.saturating_sub(suffix.len());
        let name = format!("{}{suffix}", truncate(base, keep));
        if !used.contains(&name) {
            return Ok(name);
        }
    }
    Err(ConvertError::FieldMapping(format!(
        "unable to create a unique field name for '{base}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_valid_dbf_name(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= MAX_FIELD_LENGTH
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && name
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    }

    #[test]
    fn test_short_names_unchanged() {
        let mapping = resolve_field_names(&["name", "ID", "area_km2"]).unwrap();
        assert_eq!(mapping.resolved("name"), Some("name"));
        assert_eq!(mapping.resolved("ID"), Some("ID"));
        assert_eq!(mapping.resolved("area_km2"), Some("area_km2"));
    }

    #[test]
    fn test_truncation_collisions_are_distinct() {
        let keys = ["verylongfield1", "verylongfield2", "verylongfield3"];
        let mapping = resolve_field_names(&keys).unwrap();
        let names: HashSet<&str> = keys.iter().filter_map(|k| mapping.resolved(k)).collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.len() <= MAX_FIELD_LENGTH));
        assert_eq!(mapping.resolved("verylongfield3"), Some("verylong_2"));
    }

    #[test]
    fn test_leading_digit_gets_underscore() {
        let mapping = resolve_field_names(&["123field"]).unwrap();
        assert_eq!(mapping.resolved("123field"), Some("_123field"));

        let mapping = resolve_field_names(&["1234567890abc"]).unwrap();
        assert_eq!(mapping.resolved("1234567890abc"), Some("_123456789"));
    }

    #[test]
    fn test_invalid_characters_collapse() {
        let mapping = resolve_field_names(&["Pop. (2020)", "a--b  c", "__x__"]).unwrap();
        assert_eq!(mapping.resolved("Pop. (2020)"), Some("Pop_2020"));
        assert_eq!(mapping.resolved("a--b  c"), Some("a_b_c"));
        assert_eq!(mapping.resolved("__x__"), Some("x"));
    }

    #[test]
    fn test_empty_names_fall_back() {
        let mapping = resolve_field_names(&["%%%", "", "é"]).unwrap();
        assert_eq!(mapping.resolved("%%%"), Some("field"));
        assert_eq!(mapping.resolved(""), Some("field_1"));
        assert_eq!(mapping.resolved("é"), Some("field_2"));
    }

    #[test]
    fn test_suffix_skips_names_already_taken() {
        let mapping = resolve_field_names(&["value_1", "value", "value!"]).unwrap();
        assert_eq!(mapping.resolved("value_1"), Some("value_1"));
        assert_eq!(mapping.resolved("value"), Some("value"));
        assert_eq!(mapping.resolved("value!"), Some("value_2"));
    }

    #[test]
    fn test_reverse_lookup() {
        let mapping = resolve_field_names(&["Population Density"]).unwrap();
        assert_eq!(mapping.original("Population"), Some("Population Density"));
        assert_eq!(mapping.original("missing"), None);
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let keys = ["b long attribute", "a long attribute", "a long attribute 2"];
        let first = resolve_field_names(&keys).unwrap();
        let second = resolve_field_names(&keys).unwrap();
        assert_eq!(first, second);
        let pairs: Vec<_> = first.iter().collect();
        assert_eq!(pairs[0].0, "b long attribute");
    }

    #[test]
    fn test_all_names_valid() {
        let keys = ["", "9", "_", "x y z", "ÄÖÜ", "a".repeat(40).as_str(), "name"]
            .map(str::to_string);
        let mapping = resolve_field_names(&keys).unwrap();
        assert_eq!(mapping.len(), keys.len());
        for (_, resolved) in mapping.iter() {
            assert!(is_valid_dbf_name(resolved), "invalid name {resolved}");
        }
    }

    #[test]
    fn test_exhausted_suffixes_is_an_error() {
        // Every key cleans to "x", so the 10001st key has nowhere to go
        let keys: Vec<String> = (0..=MAX_COLLISION_SUFFIX)
            .filter_map(|i| char::from_u32(0x100 + i))
            .map(|c| format!("x{c}"))
            .chain(std::iter::once("x".to_string()))
            .collect();
        assert_eq!(keys.len(), MAX_COLLISION_SUFFIX as usize + 2);
        let result = resolve_field_names(&keys);
        assert!(matches!(result, Err(ConvertError::FieldMapping(_))));
    }
}
