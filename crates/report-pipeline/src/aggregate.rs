//! Footer totals and running balances
//!
//! Values are coerced to numbers through the same alias lookup used
//! everywhere else; anything non-numeric counts as 0.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::record::{coerce_number, lookup, Record};

/// A column to total, with its physical key aliases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalColumn {
    pub name: String,
    pub keys: Vec<String>,
}

impl TotalColumn {
    pub fn new<I, S>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

/// Synthetic totals row: column name -> sum over the filtered set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateRow(BTreeMap<String, f64>);

impl AggregateRow {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.0.get(column).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Sum a column, trying each alias in order per record
pub fn sum<K: AsRef<str>>(records: &[Record], keys: &[K]) -> f64 {
    normalize_zero(records.iter().map(|r| coerce_number(lookup(r, keys))).sum())
}

/// Totals for every declared column
pub fn aggregate_row(records: &[Record], columns: &[TotalColumn]) -> AggregateRow {
    AggregateRow(
        columns
            .iter()
            .map(|c| (c.name.clone(), sum(records, c.keys.as_slice())))
            .collect(),
    )
}

/// Per-row cumulative balance: `result[i] = sum(debit[0..=i]) - sum(credit[0..=i])`
pub fn running_balance<D, C>(records: &[Record], debit_keys: &[D], credit_keys: &[C]) -> Vec<f64>
where
    D: AsRef<str>,
    C: AsRef<str>,
{
    let mut balance = 0.0;
    records
        .iter()
        .map(|r| {
            balance += coerce_number(lookup(r, debit_keys)) - coerce_number(lookup(r, credit_keys));
            normalize_zero(balance)
        })
        .collect()
}

/// Balance after the last row, or 0 for an empty set
pub fn closing_balance<D, C>(records: &[Record], debit_keys: &[D], credit_keys: &[C]) -> f64
where
    D: AsRef<str>,
    C: AsRef<str>,
{
    running_balance(records, debit_keys, credit_keys)
        .last()
        .copied()
        .unwrap_or(0.0)
}

/// Normalize -0.0 to 0.0 for cleaner display
fn normalize_zero(val: f64) -> f64 {
    if val == 0.0 { 0.0 } else { val }
}
