//! Request parameters for report fetches
//!
//! Predicates the backend understands are sent as query parameters; the
//! remainder is returned as a residual filter to apply client-side.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::config::ReportDefinition;
use crate::constants;
use crate::filter::FilterState;

/// Snapshot of the parameters for one `GET <resource>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub page: u64,
    pub page_size: u64,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    /// Report-specific parameters, already renamed to their wire names
    pub filters: BTreeMap<String, String>,
}

impl ReportQuery {
    /// Build the query for a report, filter state and requested page
    pub fn build(
        definition: &ReportDefinition,
        filter: &FilterState,
        requested_page: i64,
        page_size: u64,
    ) -> Self {
        let (from_date, to_date) = match (definition.server_date_filter, filter.date_range) {
            (true, Some(range)) => (range.from, range.to),
            _ => (None, None),
        };

        let mut filters: BTreeMap<String, String> = filter
            .active_fields(&definition.all_sentinel)
            .filter_map(|(field, value)| {
                definition
                    .server_filters
                    .get(field)
                    .map(|param| (param.clone(), value.to_string()))
            })
            .collect();

        if let Some(param) = &definition.search_param {
            let text = filter.free_text.trim();
            if !text.is_empty() {
                filters.insert(param.clone(), text.to_string());
            }
        }

        Self {
            page: requested_page.max(1) as u64,
            page_size: page_size.max(1),
            from_date,
            to_date,
            filters,
        }
    }

    /// String-keyed parameters; unset optional fields are omitted
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            (constants::PARAM_PAGE.to_string(), self.page.to_string()),
            (constants::PARAM_PAGE_SIZE.to_string(), self.page_size.to_string()),
        ];
        if let Some(from) = self.from_date {
            params.push((
                constants::PARAM_FROM_DATE.to_string(),
                from.format(constants::PARAM_DATE_FORMAT).to_string(),
            ));
        }
        if let Some(to) = self.to_date {
            params.push((
                constants::PARAM_TO_DATE.to_string(),
                to.format(constants::PARAM_DATE_FORMAT).to_string(),
            ));
        }
        params.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }
}

/// The part of `filter` the backend does not apply
pub fn residual_filter(definition: &ReportDefinition, filter: &FilterState) -> FilterState {
    FilterState {
        free_text: if definition.search_param.is_some() {
            String::new()
        } else {
            filter.free_text.clone()
        },
        date_range: if definition.server_date_filter {
            None
        } else {
            filter.date_range
        },
        field_equals: filter
            .field_equals
            .iter()
            .filter(|(field, _)| !definition.server_filters.contains_key(*field))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}
