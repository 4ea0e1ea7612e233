//! Report definitions loaded from a TOML file
//!
//! Each report screen declares its resource, searchable fields, field
//! aliases, server-side filters and export columns here instead of carrying
//! its own copy of the filtering/pagination/export code.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::aggregate::TotalColumn;
use crate::constants;
use crate::export::ColumnMapping;
use crate::filter::FilterEngine;
use crate::record::{FieldAccessors, Record};

// =============================================================================
// File-based Configuration (reports.toml)
// =============================================================================

/// Configuration loaded from the report definition file
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub reports: Vec<ReportFileConfig>,
}

/// Backend REST endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    constants::DEFAULT_TIMEOUT_SECS
}

fn default_page_size() -> u64 {
    constants::DEFAULT_PAGE_SIZE
}

fn default_sentinel() -> String {
    constants::DEFAULT_ALL_SENTINEL.to_string()
}

/// One report screen as written in the file
#[derive(Debug, Clone, Deserialize)]
pub struct ReportFileConfig {
    pub name: String,
    pub resource: String,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default)]
    pub searchable: Vec<String>,
    #[serde(default)]
    pub date_field: Option<String>,
    #[serde(default = "default_sentinel")]
    pub all_sentinel: String,
    /// Backend understands FromDate/ToDate
    #[serde(default)]
    pub server_date_filter: bool,
    /// Query parameter carrying the free text, if the backend searches
    #[serde(default)]
    pub search_param: Option<String>,
    /// Explicit opt-in rows shown when the backend returns nothing
    #[serde(default)]
    pub placeholder_rows: Vec<Value>,
    #[serde(default)]
    pub fields: HashMap<String, Vec<String>>,
    /// Logical field -> query parameter name
    #[serde(default)]
    pub server_filters: BTreeMap<String, String>,
    #[serde(default)]
    pub columns: Vec<ColumnMapping>,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report config: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).with_context(|| {
            "Failed to parse report config. Check for:\n\
             - Missing required fields (backend.base_url, reports.name, reports.resource)\n\
             - Invalid TOML syntax (missing quotes, brackets, etc.)\n\
             - Incorrect data types (strings vs numbers)"
        })?;

        let mut seen = std::collections::HashSet::new();
        for report in &config.reports {
            if !seen.insert(report.name.as_str()) {
                anyhow::bail!("Duplicate report name '{}' in config", report.name);
            }
        }
        Ok(config)
    }

    /// Runtime definition of a named report
    pub fn report(&self, name: &str) -> Result<ReportDefinition> {
        let report = self
            .reports
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| anyhow::anyhow!("Report '{}' not found in config", name))?;
        Ok(ReportDefinition::from_file(report))
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Everything a report screen needs to fetch, filter, total and export
#[derive(Debug, Clone)]
pub struct ReportDefinition {
    pub name: String,
    pub resource: String,
    /// Always at least 1
    pub page_size: u64,
    pub accessors: FieldAccessors,
    pub searchable: Vec<String>,
    pub date_field: Option<String>,
    pub all_sentinel: String,
    pub server_date_filter: bool,
    pub search_param: Option<String>,
    pub server_filters: BTreeMap<String, String>,
    pub columns: Vec<ColumnMapping>,
    pub placeholder_rows: Vec<Record>,
}

impl ReportDefinition {
    /// Minimal definition; callers fill in the rest with the builder methods
    pub fn new(name: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            page_size: constants::DEFAULT_PAGE_SIZE,
            accessors: FieldAccessors::new(),
            searchable: Vec::new(),
            date_field: None,
            all_sentinel: constants::DEFAULT_ALL_SENTINEL.to_string(),
            server_date_filter: false,
            search_param: None,
            server_filters: BTreeMap::new(),
            columns: Vec::new(),
            placeholder_rows: Vec::new(),
        }
    }

    pub fn from_file(file: &ReportFileConfig) -> Self {
        let mut accessors = FieldAccessors::new();
        for (logical, keys) in &file.fields {
            accessors.insert(logical, keys.iter().cloned());
        }

        Self {
            name: file.name.clone(),
            resource: file.resource.clone(),
            page_size: file.page_size.max(1),
            accessors,
            searchable: file.searchable.clone(),
            date_field: file.date_field.clone(),
            all_sentinel: file.all_sentinel.clone(),
            server_date_filter: file.server_date_filter,
            search_param: file.search_param.clone(),
            server_filters: file.server_filters.clone(),
            columns: file.columns.clone(),
            // Non-object placeholder entries are ignored
            placeholder_rows: file
                .placeholder_rows
                .iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_accessors(mut self, accessors: FieldAccessors) -> Self {
        self.accessors = accessors;
        self
    }

    pub fn with_searchable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    pub fn with_server_date_filter(mut self) -> Self {
        self.server_date_filter = true;
        self
    }

    pub fn with_search_param(mut self, param: impl Into<String>) -> Self {
        self.search_param = Some(param.into());
        self
    }

    pub fn with_server_filter(mut self, field: impl Into<String>, param: impl Into<String>) -> Self {
        self.server_filters.insert(field.into(), param.into());
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnMapping>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_placeholder_rows(mut self, rows: Vec<Record>) -> Self {
        self.placeholder_rows = rows;
        self
    }

    /// Filter engine configured for this report
    pub fn filter_engine(&self) -> FilterEngine {
        let engine = FilterEngine::new(self.accessors.clone())
            .searchable(self.searchable.iter().cloned())
            .all_sentinel(self.all_sentinel.clone());
        match &self.date_field {
            Some(field) => engine.date_field(field.clone()),
            None => engine,
        }
    }

    /// Columns flagged for the totals row, keyed by header
    pub fn total_columns(&self) -> Vec<TotalColumn> {
        self.columns
            .iter()
            .filter(|c| c.total)
            .map(|c| {
                TotalColumn::new(
                    c.header.clone(),
                    self.accessors.keys(&c.field).into_iter().map(str::to_string),
                )
            })
            .collect()
    }
}
