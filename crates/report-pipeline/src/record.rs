//! Normalized report rows and field access
//!
//! A record is an opaque JSON object. Only the fields a report declares for
//! filtering, aggregation or export are ever read, and each of those is
//! reached through an ordered list of physical key aliases
//! (e.g. `saleAmount` falling back to `saleValue`).

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;

use crate::constants;

/// One normalized row of report data, keyed by field name
pub type Record = serde_json::Map<String, Value>;

/// Maps logical field names to ordered physical key aliases
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldAccessors {
    aliases: HashMap<String, Vec<String>>,
}

impl FieldAccessors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`FieldAccessors::insert`]
    pub fn with<I, S>(mut self, logical: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(logical, keys);
        self
    }

    /// Declare the physical keys for a logical field, in lookup order
    pub fn insert<I, S>(&mut self, logical: &str, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.aliases.insert(logical.to_string(), keys);
    }

    /// Physical keys for a logical field. Undeclared fields map to themselves.
    pub fn keys<'a>(&'a self, logical: &'a str) -> Vec<&'a str> {
        match self.aliases.get(logical) {
            Some(keys) if !keys.is_empty() => keys.iter().map(String::as_str).collect(),
            _ => vec![logical],
        }
    }

    /// First present value of a logical field
    pub fn get<'r>(&self, record: &'r Record, logical: &str) -> Option<&'r Value> {
        lookup(record, &self.keys(logical))
    }
}

/// First present, non-null value among `keys`
pub fn lookup<'r, K: AsRef<str>>(record: &'r Record, keys: &[K]) -> Option<&'r Value> {
    keys.iter()
        .filter_map(|k| record.get(k.as_ref()))
        .find(|v| !v.is_null())
}

/// Display text for a scalar value. Missing, null and nested values are empty.
pub fn value_to_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Coerce a value to a finite number; anything else is 0
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_numeric_text(s).unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() { n } else { 0.0 }
}

/// Parse "1,200.50" style amounts. "NaN" and "inf" are not amounts.
pub(crate) fn parse_numeric_text(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a value as a calendar date
pub fn parse_date(value: Option<&Value>) -> Option<NaiveDate> {
    match value {
        Some(Value::String(s)) => parse_date_str(s),
        _ => None,
    }
}

/// Parse a date string in any of the accepted record formats
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    for fmt in constants::RECORD_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    constants::RECORD_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
