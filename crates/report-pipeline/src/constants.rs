//! Centralized constants for the report pipeline
//!
//! Alias tables used to sniff response envelopes live here so the accepted
//! shapes are listed in one place. Report-specific settings are loaded from
//! the report definition file (see `config`).

// =============================================================================
// Response Envelope Aliases (checked in order, first match wins)
// =============================================================================

/// Keys that may hold the record collection
pub const COLLECTION_KEYS: &[&str] = &["items", "data", "results", "rows"];

/// Keys that may hold the total record count
pub const TOTAL_COUNT_KEYS: &[&str] = &["totalCount", "total", "count"];

/// Keys that may hold the total page count
pub const TOTAL_PAGES_KEYS: &[&str] = &["totalPages", "pages"];

/// Keys that may hold the current page number
pub const CURRENT_PAGE_KEYS: &[&str] = &["page", "currentPage", "pageNumber"];

/// Keys that may hold the page size
pub const PAGE_SIZE_KEYS: &[&str] = &["pageSize", "limit", "perPage"];

/// Nested objects that may carry pagination metadata
pub const PAGINATION_CONTAINER_KEYS: &[&str] = &["pagination", "meta"];

// =============================================================================
// Filtering
// =============================================================================

/// Field-equality value meaning "no filter"
pub const DEFAULT_ALL_SENTINEL: &str = "All";

/// Date formats accepted in record fields (tried in order after RFC 3339)
pub const RECORD_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Datetime formats accepted in record fields (date part is used)
pub const RECORD_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

// =============================================================================
// Pagination & Backend Query
// =============================================================================

/// Page size when neither the report nor the response supplies one
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Backend request timeout when the config omits one
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Query parameter names understood by the backend
pub const PARAM_PAGE: &str = "Page";
pub const PARAM_PAGE_SIZE: &str = "PageSize";
pub const PARAM_FROM_DATE: &str = "FromDate";
pub const PARAM_TO_DATE: &str = "ToDate";

/// Date format used in query parameters and export file names
pub const PARAM_DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Export
// =============================================================================

/// Placeholder for an unset date bound in export file names
pub const FILE_NAME_OPEN_BOUND: &str = "All";

/// Workbook file extension
pub const XLSX_EXTENSION: &str = "xlsx";

/// Label written in the first column of a totals row
pub const TOTALS_LABEL: &str = "Total";

/// Off-screen surface width in CSS pixels (A4 portrait at 96 DPI)
pub const PRINT_PAGE_WIDTH_PX: u32 = 794;

/// A4 page dimensions in millimetres, used to slice the raster into pages
pub const PAGE_WIDTH_MM: f64 = 210.0;
pub const PAGE_HEIGHT_MM: f64 = 297.0;

/// Offset that keeps the off-screen surface outside the visible viewport
pub const OFFSCREEN_OFFSET_PX: i32 = -10_000;

/// MIME type of assembled documents
pub const DOCUMENT_MIME: &str = "application/pdf";

/// Scheme prefix of revocable local handles
pub const HANDLE_SCHEME: &str = "blob:report/";
