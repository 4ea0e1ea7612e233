//! Response envelope normalization
//!
//! The backend returns records in several envelope shapes:
//! - a bare array
//! - an object holding the array under `items`, `data`, `results` or `rows`
//! - `data.items` style single nesting
//! - a single object (one-element collection)
//!
//! Both extractors are total: malformed input degrades to an empty list or
//! unset pagination fields and is logged at debug level only.

use serde_json::Value;
use tracing::debug;

use crate::constants;
use crate::pagination::PaginationDescriptor;
use crate::record::Record;

/// Normalize a raw response into an ordered list of records
pub fn extract_items(raw: &Value) -> Vec<Record> {
    match raw {
        Value::Array(items) => records_from_array(items),
        Value::Object(obj) => {
            if let Some(items) = find_array(obj) {
                return records_from_array(items);
            }
            if let Some(items) = find_nested_array(obj) {
                return records_from_array(items);
            }
            let Some((key, value)) = find_collection(obj) else {
                return vec![obj.clone()];
            };
            match value {
                Value::Object(inner) => match find_collection(inner) {
                    Some((inner_key, other)) => {
                        debug!(
                            "Collection '{}.{}' is {}, treating as empty",
                            key,
                            inner_key,
                            kind_of(other)
                        );
                        Vec::new()
                    }
                    None => vec![inner.clone()],
                },
                other => {
                    debug!("Collection '{}' is {}, treating as empty", key, kind_of(other));
                    Vec::new()
                }
            }
        }
        other => {
            debug!("Response is {}, no records extracted", kind_of(other));
            Vec::new()
        }
    }
}

/// Extract pagination metadata, defaulting the page size to the global default
pub fn extract_pagination(raw: &Value) -> PaginationDescriptor {
    extract_pagination_or(raw, constants::DEFAULT_PAGE_SIZE)
}

/// Extract pagination metadata from the top level or one level under
/// `pagination`/`meta`. Absent totals stay unset.
pub fn extract_pagination_or(raw: &Value, default_page_size: u64) -> PaginationDescriptor {
    let defaults = PaginationDescriptor::unpaged(default_page_size);
    let total_count = find_count(raw, constants::TOTAL_COUNT_KEYS);
    let total_pages = find_count(raw, constants::TOTAL_PAGES_KEYS);

    if total_count.is_none() && total_pages.is_none() {
        debug!("No pagination metadata in response");
    }

    PaginationDescriptor {
        total_count,
        total_pages,
        current_page: find_count(raw, constants::CURRENT_PAGE_KEYS)
            .filter(|p| *p >= 1)
            .unwrap_or(defaults.current_page),
        page_size: find_count(raw, constants::PAGE_SIZE_KEYS)
            .filter(|s| *s >= 1)
            .unwrap_or(defaults.page_size),
    }
}

fn records_from_array(items: &[Value]) -> Vec<Record> {
    let records: Vec<Record> = items
        .iter()
        .filter_map(|item| item.as_object().cloned())
        .collect();
    if records.len() != items.len() {
        debug!(
            "Dropped {} non-object entries from collection",
            items.len() - records.len()
        );
    }
    records
}

/// First recognized collection key holding an array
fn find_array(obj: &serde_json::Map<String, Value>) -> Option<&Vec<Value>> {
    constants::COLLECTION_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
}

/// `data.items` style: an array one level under a recognized key
fn find_nested_array(obj: &serde_json::Map<String, Value>) -> Option<&Vec<Value>> {
    constants::COLLECTION_KEYS
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_object))
        .find_map(find_array)
}

/// First recognized collection key present in `obj`, whatever its value
fn find_collection(obj: &serde_json::Map<String, Value>) -> Option<(&'static str, &Value)> {
    constants::COLLECTION_KEYS
        .iter()
        .find_map(|key| obj.get(*key).map(|v| (*key, v)))
}

/// Look up a non-negative integer under any alias, top level first
fn find_count(raw: &Value, keys: &[&str]) -> Option<u64> {
    let obj = raw.as_object()?;

    if let Some(n) = keys.iter().find_map(|k| obj.get(*k).and_then(as_count)) {
        return Some(n);
    }

    constants::PAGINATION_CONTAINER_KEYS
        .iter()
        .filter_map(|c| obj.get(*c).and_then(Value::as_object))
        .find_map(|inner| keys.iter().find_map(|k| inner.get(*k).and_then(as_count)))
}

/// Accept integral numbers and integer strings; reject negatives and fractions
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
