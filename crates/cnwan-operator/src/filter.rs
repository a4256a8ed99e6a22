//!
//! Annotation and label filtering.
//!
//! Allowed entries are exact keys or `prefix/name` patterns where either
//! segment may be `*`. `*/*` lets everything through.
//!
use std::collections::{BTreeMap, HashSet};

pub const ALLOW_ALL: &str = "*/*";

pub fn filter_annotations(
    source: &BTreeMap<String, String>,
    allowed: &[String],
) -> BTreeMap<String, String> {
    if source.is_empty() || allowed.is_empty() {
        return BTreeMap::new();
    }

    let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    if allowed.contains(ALLOW_ALL) {
        return source.clone();
    }

    source
        .iter()
        .filter(|(key, _)| is_allowed(key, &allowed))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_allowed(key: &str, allowed: &HashSet<&str>) -> bool {
    if allowed.contains(key) {
        return true;
    }

    let mut segments = key.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(prefix), Some(name), None) => {
            allowed.contains(format!("{prefix}/*").as_str())
                || allowed.contains(format!("*/{name}").as_str())
        }
        _ => false,
    }
}
