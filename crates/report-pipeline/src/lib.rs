//! Generic core of the ERP report screens
//!
//! A report screen is declared once in `reports.toml` (resource, searchable
//! fields, field aliases, export columns) and driven by a `ReportViewModel`:
//!
//! filter/page change -> `ReportQuery` -> `ReportSource::fetch` ->
//! `extract_items` -> residual `FilterEngine::apply` -> `reconcile` ->
//! `aggregate_row` -> render surface / export pipeline
//!
//! Extraction, filtering, aggregation and pagination are pure and total.
//! Only fetch and export failures reach the user, as non-blocking notices.

pub mod aggregate;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod extract;
pub mod filter;
pub mod notify;
pub mod pagination;
pub mod query;
pub mod record;
pub mod source;
pub mod view_model;

pub use aggregate::{aggregate_row, closing_balance, running_balance, sum, AggregateRow, TotalColumn};
pub use config::{BackendConfig, FileConfig, ReportDefinition};
pub use error::{ExportError, FetchError, FetchFailureKind};
pub use extract::{extract_items, extract_pagination, extract_pagination_or};
pub use filter::{DateRange, FilterEngine, FilterState};
pub use notify::{Notice, NoticeLevel, Notifier, TracingNotifier};
pub use pagination::{reconcile, PaginationDescriptor, ReconciledPage};
pub use query::{residual_filter, ReportQuery};
pub use record::{FieldAccessors, Record};
pub use source::{HttpReportSource, ReportSource};
pub use view_model::{PendingRequest, Phase, ReportSnapshot, ReportViewModel};
