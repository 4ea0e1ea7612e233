//! Client-side record filtering
//!
//! Three predicates, ANDed:
//! - free text: case-insensitive substring over the declared searchable fields
//! - date range: inclusive `[from, to]` over the declared date field
//! - field equality: case-insensitive match, with an "all" sentinel
//!
//! Records whose date cannot be parsed always pass the date predicate so
//! that rows with malformed dates stay visible in reports.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::constants;
use crate::record::{parse_date, value_to_text, FieldAccessors, Record};

/// Inclusive date interval; either bound may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }

    /// True when neither bound is set
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// User-controlled filter state of a report screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub free_text: String,
    pub date_range: Option<DateRange>,
    /// Logical field -> required value
    pub field_equals: BTreeMap<String, String>,
}

impl FilterState {
    pub fn with_free_text(mut self, text: impl Into<String>) -> Self {
        self.free_text = text.into();
        self
    }

    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_range = Some(DateRange::new(from, to));
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.field_equals.insert(field.into(), value.into());
        self
    }

    /// Active equality filters, skipping blanks and the sentinel
    pub fn active_fields<'a>(
        &'a self,
        all_sentinel: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.field_equals
            .iter()
            .map(|(k, v)| (k.as_str(), v.trim()))
            .filter(move |(_, v)| !v.is_empty() && !v.eq_ignore_ascii_case(all_sentinel))
    }

    /// True when no predicate would exclude anything
    pub fn is_inactive(&self, all_sentinel: &str) -> bool {
        self.free_text.trim().is_empty()
            && self.date_range.is_none_or(|r| r.is_unbounded())
            && self.active_fields(all_sentinel).next().is_none()
    }
}

/// Predicate evaluation over records, configured per report
#[derive(Debug, Clone)]
pub struct FilterEngine {
    accessors: FieldAccessors,
    searchable: Vec<String>,
    date_field: Option<String>,
    all_sentinel: String,
}

impl FilterEngine {
    pub fn new(accessors: FieldAccessors) -> Self {
        Self {
            accessors,
            searchable: Vec::new(),
            date_field: None,
            all_sentinel: constants::DEFAULT_ALL_SENTINEL.to_string(),
        }
    }

    /// Logical fields included in free-text search
    pub fn searchable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Logical field tested against the date range
    pub fn date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    /// Equality value that means "no filter"
    pub fn all_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.all_sentinel = sentinel.into();
        self
    }

    pub fn accessors(&self) -> &FieldAccessors {
        &self.accessors
    }

    pub fn sentinel(&self) -> &str {
        &self.all_sentinel
    }

    /// Records passing every active predicate, in original order
    pub fn apply(&self, records: &[Record], filter: &FilterState) -> Vec<Record> {
        if filter.is_inactive(&self.all_sentinel) {
            return records.to_vec();
        }

        let needle = filter.free_text.trim().to_lowercase();
        if !needle.is_empty() && self.searchable.is_empty() {
            debug!("Free-text filter set but no searchable fields declared");
        }
        let range = filter.date_range.filter(|r| !r.is_unbounded());
        let equals: Vec<(&str, String)> = filter
            .active_fields(&self.all_sentinel)
            .map(|(field, value)| (field, value.to_lowercase()))
            .collect();

        records
            .iter()
            .filter(|r| needle.is_empty() || self.matches_text(r, &needle))
            .filter(|r| range.is_none_or(|range| self.matches_date(r, &range)))
            .filter(|r| {
                equals
                    .iter()
                    .all(|(field, value)| self.matches_field(r, field, value))
            })
            .cloned()
            .collect()
    }

    fn matches_text(&self, record: &Record, needle: &str) -> bool {
        let haystack = self
            .searchable
            .iter()
            .map(|field| value_to_text(self.accessors.get(record, field)))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        haystack.contains(needle)
    }

    fn matches_date(&self, record: &Record, range: &DateRange) -> bool {
        let Some(field) = &self.date_field else {
            return true;
        };
        match parse_date(self.accessors.get(record, field)) {
            Some(date) => range.contains(date),
            None => true,
        }
    }

    fn matches_field(&self, record: &Record, field: &str, expected_lower: &str) -> bool {
        self.accessors
            .keys(field)
            .iter()
            .filter_map(|key| record.get(*key))
            .any(|value| value_to_text(Some(value)).trim().to_lowercase() == expected_lower)
    }
}
