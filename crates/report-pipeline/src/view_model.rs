//! Per-screen report state machine
//!
//! `Idle -> Loading -> {Ready, Failed}`; any filter/page/page-size change
//! re-enters `Loading`. Exports pass through `GeneratingExport` and always
//! return to the state they started from.
//!
//! Every request carries a sequence number. A response is applied only if
//! its number is the latest issued, so late answers to superseded requests
//! are dropped. On fetch failure the previous data stays on display.

use chrono::NaiveDate;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::aggregate::{aggregate_row, AggregateRow, TotalColumn};
use crate::config::ReportDefinition;
use crate::constants;
use crate::error::{ExportError, FetchError, FetchFailureKind};
use crate::export::{
    export_file_stem, perform, to_workbook, ArtifactStore, DocumentArtifact, DocumentPipeline,
    PreviewAction, PreviewSurface, RenderSpec, WorkbookArtifact,
};
use crate::extract::{extract_items, extract_pagination_or};
use crate::filter::{FilterEngine, FilterState};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::pagination::{reconcile, ReconciledPage};
use crate::query::{residual_filter, ReportQuery};
use crate::record::Record;
use crate::source::ReportSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Failed(FetchFailureKind),
    GeneratingExport,
}

/// Data of the last applied response
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSnapshot {
    pub request_seq: u64,
    /// Filtered set; exports and totals work on all of it
    pub records: Vec<Record>,
    pub page: ReconciledPage,
    /// Footer totals over the visible page
    pub footer: AggregateRow,
    /// Totals over the whole filtered set; exported with the records
    pub totals: AggregateRow,
    /// Filter the data was produced with, for display echo
    pub filter: FilterState,
    /// Rows came from the report's declared placeholder set
    pub is_placeholder: bool,
}

impl ReportSnapshot {
    /// Rows for the current page
    pub fn visible(&self) -> &[Record] {
        self.page.visible_slice(&self.records)
    }
}

/// A fetch the caller must run and feed back through `complete_load`
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub seq: u64,
    pub resource: String,
    pub query: ReportQuery,
}

/// Parameters captured when a request was issued
#[derive(Debug, Clone)]
struct RequestParams {
    seq: u64,
    filter: FilterState,
    requested_page: i64,
    page_size: u64,
}

struct OpenPreview {
    store: ArtifactStore,
    artifact: DocumentArtifact,
}

pub struct ReportViewModel {
    definition: ReportDefinition,
    engine: FilterEngine,
    total_columns: Vec<TotalColumn>,
    notifier: Arc<dyn Notifier>,

    filter: FilterState,
    requested_page: i64,
    page_size: u64,

    phase: Phase,
    latest_seq: u64,
    in_flight: Option<RequestParams>,
    data: Option<ReportSnapshot>,
    preview: Option<OpenPreview>,
}

impl ReportViewModel {
    pub fn new(definition: ReportDefinition) -> Self {
        let engine = definition.filter_engine();
        let total_columns = definition.total_columns();
        let page_size = definition.page_size;
        Self {
            definition,
            engine,
            total_columns,
            notifier: Arc::new(TracingNotifier),
            filter: FilterState::default(),
            requested_page: 1,
            page_size,
            phase: Phase::Idle,
            latest_seq: 0,
            in_flight: None,
            data: None,
            preview: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn definition(&self) -> &ReportDefinition {
        &self.definition
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn requested_page(&self) -> i64 {
        self.requested_page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    /// Last applied data; still present while `Failed`
    pub fn data(&self) -> Option<&ReportSnapshot> {
        self.data.as_ref()
    }

    pub fn visible(&self) -> &[Record] {
        self.data.as_ref().map(ReportSnapshot::visible).unwrap_or(&[])
    }

    pub fn preview(&self) -> Option<&DocumentArtifact> {
        self.preview.as_ref().map(|p| &p.artifact)
    }

    // =========================================================================
    // State changes (each one issues a new request)
    // =========================================================================

    /// Replace the filter and go back to the first page
    pub fn set_filter(&mut self, filter: FilterState) -> PendingRequest {
        self.filter = filter;
        self.requested_page = 1;
        self.begin_load()
    }

    /// Reset the filter to empty and go back to the first page
    pub fn clear_filter(&mut self) -> PendingRequest {
        self.set_filter(FilterState::default())
    }

    pub fn set_page(&mut self, page: i64) -> PendingRequest {
        self.requested_page = page;
        self.begin_load()
    }

    pub fn set_page_size(&mut self, page_size: u64) -> PendingRequest {
        self.page_size = page_size.max(1);
        self.requested_page = 1;
        self.begin_load()
    }

    /// Snapshot the current filter/page/page size into a new request
    pub fn begin_load(&mut self) -> PendingRequest {
        self.latest_seq += 1;
        let params = RequestParams {
            seq: self.latest_seq,
            filter: self.filter.clone(),
            requested_page: self.requested_page,
            page_size: self.page_size,
        };
        let query = ReportQuery::build(
            &self.definition,
            &params.filter,
            params.requested_page,
            params.page_size,
        );
        debug!(
            "{}: request #{} page {} size {}",
            self.definition.name, params.seq, query.page, query.page_size
        );
        self.in_flight = Some(params);
        self.phase = Phase::Loading;

        PendingRequest {
            seq: self.latest_seq,
            resource: self.definition.resource.clone(),
            query,
        }
    }

    /// Apply the outcome of request `seq`. Returns false if it was superseded.
    pub fn complete_load(&mut self, seq: u64, result: Result<Value, FetchError>) -> bool {
        let params = match self.in_flight.take() {
            Some(params) if params.seq == seq => params,
            other => {
                self.in_flight = other;
                debug!(
                    "{}: dropping response #{} (latest is #{})",
                    self.definition.name, seq, self.latest_seq
                );
                return false;
            }
        };

        match result {
            Ok(raw) => {
                let snapshot = self.build_snapshot(&raw, params);
                // Out-of-range requests settle on the clamped page
                self.requested_page = snapshot.page.effective_page as i64;
                info!(
                    "{}: {} records, page {}/{}",
                    self.definition.name,
                    snapshot.page.total_count,
                    snapshot.page.effective_page,
                    snapshot.page.total_pages
                );
                self.data = Some(snapshot);
                self.phase = Phase::Ready;
            }
            Err(e) => {
                let kind = e.kind();
                warn!("{}: fetch failed ({}): {}", self.definition.name, kind, e);
                self.notifier.notify(Notice::error(kind.user_message()));
                self.phase = Phase::Failed(kind);
            }
        }
        true
    }

    /// Issue a request for the current state and apply its result
    pub async fn load(&mut self, source: &dyn ReportSource) -> bool {
        let request = self.begin_load();
        self.run(request, source).await
    }

    /// Run an already issued request against `source`
    pub async fn run(&mut self, request: PendingRequest, source: &dyn ReportSource) -> bool {
        let result = source.fetch(&request.resource, &request.query).await;
        self.complete_load(request.seq, result)
    }

    fn build_snapshot(&self, raw: &Value, params: RequestParams) -> ReportSnapshot {
        let mut items = extract_items(raw);
        let mut is_placeholder = false;
        if items.is_empty() && !self.definition.placeholder_rows.is_empty() {
            debug!("{}: empty response, using placeholder rows", self.definition.name);
            items = self.definition.placeholder_rows.clone();
            is_placeholder = true;
            self.notifier
                .notify(Notice::warning("No data returned. Showing sample rows."));
        }

        let residual = residual_filter(&self.definition, &params.filter);
        let records = self.engine.apply(&items, &residual);

        let server = extract_pagination_or(raw, params.page_size);
        let page = reconcile(&server, records.len(), params.requested_page, params.page_size);
        let footer = aggregate_row(page.visible_slice(&records), &self.total_columns);
        let totals = aggregate_row(&records, &self.total_columns);

        ReportSnapshot {
            request_seq: params.seq,
            records,
            page,
            footer,
            totals,
            filter: params.filter,
            is_placeholder,
        }
    }

    // =========================================================================
    // Export
    // =========================================================================

    fn export_range(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        self.data
            .as_ref()
            .and_then(|d| d.filter.date_range)
            .map_or((None, None), |r| (r.from, r.to))
    }

    fn export_failed(&self, e: ExportError) -> ExportError {
        error!("{}: export failed: {}", self.definition.name, e);
        self.notifier.notify(Notice::error(e.user_message()));
        e
    }

    /// Workbook of the whole filtered set, with a totals row when configured
    pub fn workbook(&self) -> Result<WorkbookArtifact, ExportError> {
        let Some(data) = &self.data else {
            return Err(self.export_failed(ExportError::NoData));
        };
        let (from, to) = self.export_range();
        let workbook = to_workbook(&data.records, &self.definition.columns, &self.definition.accessors)
            .named(&self.definition.name, from, to);
        Ok(if data.totals.is_empty() {
            workbook
        } else {
            workbook.with_totals(&data.totals, constants::TOTALS_LABEL)
        })
    }

    /// Write the workbook as XLSX into `dir`
    pub fn export_workbook(&mut self, dir: &Path) -> Result<PathBuf, ExportError> {
        let prior = std::mem::replace(&mut self.phase, Phase::GeneratingExport);
        let result = self
            .workbook()
            .and_then(|w| w.save_xlsx(dir).map_err(|e| self.export_failed(e)));
        self.phase = prior;
        if let Ok(path) = &result {
            self.notifier
                .notify(Notice::info(format!("Exported {}", path.display())));
        }
        result
    }

    /// Render the filtered set into a paged document and open it as the preview
    ///
    /// A successful export replaces (and revokes) the previous preview; a
    /// failed one leaves it open.
    pub async fn export_document(
        &mut self,
        pipeline: &DocumentPipeline,
    ) -> Result<DocumentArtifact, ExportError> {
        if self.data.is_none() {
            return Err(self.export_failed(ExportError::NoData));
        }

        let (from, to) = self.export_range();
        let mut template = RenderSpec::new(self.definition.name.clone(), self.definition.columns.clone());
        if from.is_some() || to.is_some() {
            template = template.with_subtitle(format!(
                "{} to {}",
                from.map_or_else(|| "start".to_string(), |d| d.to_string()),
                to.map_or_else(|| "end".to_string(), |d| d.to_string())
            ));
        }
        let file_name = format!(
            "{}.pdf",
            export_file_stem(&self.definition.name, from, to)
        );

        let prior = std::mem::replace(&mut self.phase, Phase::GeneratingExport);
        let result = match &self.data {
            Some(data) => {
                let aggregate = (!data.totals.is_empty()).then_some(&data.totals);
                pipeline
                    .to_document(
                        &data.records,
                        &template,
                        &self.definition.accessors,
                        aggregate,
                        &file_name,
                    )
                    .await
            }
            None => Err(ExportError::NoData),
        };
        self.phase = prior;

        match result {
            Ok(artifact) => {
                self.close_preview();
                self.preview = Some(OpenPreview {
                    store: pipeline.store().clone(),
                    artifact: artifact.clone(),
                });
                self.notifier
                    .notify(Notice::info(format!("Generated {}", artifact.file_name)));
                Ok(artifact)
            }
            Err(e) => Err(self.export_failed(e)),
        }
    }

    /// Run a preview action against the open document
    pub fn preview_action(
        &self,
        surface: &dyn PreviewSurface,
        action: &PreviewAction,
    ) -> Result<Option<PathBuf>, ExportError> {
        let Some(preview) = &self.preview else {
            return Err(self.export_failed(ExportError::NoPreview));
        };
        perform(&preview.store, surface, &preview.artifact.handle, action)
            .map_err(|e| self.export_failed(e))
    }

    /// Close the preview and revoke its handle
    pub fn close_preview(&mut self) -> bool {
        match self.preview.take() {
            Some(preview) => {
                debug!("Revoking {}", preview.artifact.handle);
                preview.store.revoke(&preview.artifact.handle)
            }
            None => false,
        }
    }
}

impl Drop for ReportViewModel {
    fn drop(&mut self) {
        self.close_preview();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::document::tests::{FakeAssembler, FakeRasterizer};
    use crate::export::preview::tests::RecordingPreview;
    use crate::export::{ArtifactHandle, ColumnMapping, DetachedHost, StoredArtifact};
    use crate::notify::NoticeLevel;
    use crate::record::FieldAccessors;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    /// Answers queued responses in order and remembers the queries
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Value, FetchError>>>,
        queries: Mutex<Vec<ReportQuery>>,
    }

    impl ScriptedSource {
        fn with(responses: Vec<Result<Value, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReportSource for ScriptedSource {
        async fn fetch(&self, _resource: &str, query: &ReportQuery) -> Result<Value, FetchError> {
            self.queries.lock().unwrap().push(query.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Value::Null))
        }
    }

    fn sales_definition() -> ReportDefinition {
        ReportDefinition::new("SalesReport", "/reports/sales")
            .with_accessors(FieldAccessors::new().with("saleAmount", ["saleAmount", "saleValue"]))
            .with_searchable(["customer"])
            .with_date_field("date")
            .with_columns(vec![
                ColumnMapping::new("Date", "date"),
                ColumnMapping::new("Amount", "saleAmount").total(),
            ])
    }

    fn sales_response() -> Value {
        json!({ "data": [
            { "id": 1, "date": "2025-11-01", "saleAmount": 100 },
            { "id": 2, "date": "2025-11-05", "saleAmount": 50 }
        ]})
    }

    fn view_model() -> (ReportViewModel, Arc<RecordingNotifier>) {
        init_tracing();
        let notifier = Arc::new(RecordingNotifier::default());
        let vm = ReportViewModel::new(sales_definition()).with_notifier(notifier.clone());
        (vm, notifier)
    }

    fn pipeline(store: &ArtifactStore, host: Arc<DetachedHost>, fails: bool) -> DocumentPipeline {
        let rasterizer = if fails {
            FakeRasterizer::failing()
        } else {
            FakeRasterizer::ok()
        };
        DocumentPipeline::new(
            host,
            Arc::new(rasterizer),
            Arc::new(FakeAssembler { fail: false }),
            store.clone(),
        )
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[test]
    fn test_starts_idle_with_empty_filter() {
        let (vm, _) = view_model();
        assert_eq!(vm.phase(), Phase::Idle);
        assert_eq!(vm.filter(), &FilterState::default());
        assert!(vm.data().is_none());
        assert!(vm.visible().is_empty());
    }

    #[test]
    fn test_filter_scenario_end_to_end() {
        let (mut vm, _) = view_model();
        let request = vm.set_filter(
            FilterState::default().with_date_range(Some(date(2025, 11, 1)), Some(date(2025, 11, 3))),
        );
        assert_eq!(vm.phase(), Phase::Loading);

        assert!(vm.complete_load(request.seq, Ok(sales_response())));
        assert_eq!(vm.phase(), Phase::Ready);

        let data = vm.data().unwrap();
        assert_eq!(ids(&data.records), vec![1]);
        assert_eq!(data.totals.get("Amount"), Some(100.0));
        assert_eq!(data.footer.get("Amount"), Some(100.0));
        assert_eq!(data.filter.date_range.unwrap().to, Some(date(2025, 11, 3)));
        assert!(!data.is_placeholder);
    }

    #[test]
    fn test_late_response_to_older_request_is_dropped() {
        let (mut vm, _) = view_model();
        let first = vm.begin_load();
        let second = vm.set_filter(FilterState::default().with_free_text("acme"));

        let newer = json!([{ "id": 2, "customer": "ACME Ltd" }]);
        let older = json!([{ "id": 1, "customer": "Other" }]);

        assert!(vm.complete_load(second.seq, Ok(newer)));
        assert!(!vm.complete_load(first.seq, Ok(older)));

        let data = vm.data().unwrap();
        assert_eq!(data.request_seq, second.seq);
        assert_eq!(ids(&data.records), vec![2]);
    }

    #[test]
    fn test_early_response_to_older_request_is_dropped() {
        let (mut vm, _) = view_model();
        let first = vm.begin_load();
        let second = vm.set_page(2);

        assert!(!vm.complete_load(first.seq, Ok(json!([{ "id": 1 }]))));
        assert_eq!(vm.phase(), Phase::Loading);
        assert!(vm.data().is_none());

        assert!(vm.complete_load(second.seq, Ok(json!([]))));
        assert_eq!(vm.phase(), Phase::Ready);
    }

    #[test]
    fn test_out_of_range_page_is_clamped() {
        let (mut vm, _) = view_model();
        let rows: Vec<Value> = (1..=30).map(|i| json!({ "id": i })).collect();
        let request = vm.set_page(5);
        assert_eq!(request.query.page, 5);

        vm.complete_load(request.seq, Ok(Value::Array(rows)));
        let data = vm.data().unwrap();
        assert_eq!(data.page.effective_page, 3);
        assert_eq!(data.page.total_pages, 3);
        assert_eq!(ids(vm.visible()), (21..=30).collect::<Vec<_>>());
        assert_eq!(vm.requested_page(), 3);
    }

    #[test]
    fn test_footer_totals_cover_visible_page_only() {
        init_tracing();
        let mut vm = ReportViewModel::new(sales_definition().with_page_size(10));
        let rows: Vec<Value> = (1..=30).map(|i| json!({ "id": i, "saleAmount": 1 })).collect();
        let request = vm.set_page(2);
        vm.complete_load(request.seq, Ok(Value::Array(rows)));

        let data = vm.data().unwrap();
        assert_eq!(data.visible().len(), 10);
        assert_eq!(data.footer.get("Amount"), Some(10.0));
        assert_eq!(data.totals.get("Amount"), Some(30.0));

        // Exports carry the whole filtered set and its totals
        let workbook = vm.workbook().unwrap();
        assert_eq!(workbook.rows.len(), 30);
        assert_eq!(
            workbook.totals.as_ref().and_then(|t| t.get(1)),
            Some(&crate::export::CellValue::Number(30.0))
        );
    }

    #[test]
    fn test_server_paged_response_shown_whole() {
        let (mut vm, _) = view_model();
        let request = vm.set_page(2);
        let raw = json!({
            "items": [{ "id": 11 }, { "id": 12 }],
            "pagination": { "totalCount": 12, "totalPages": 2 }
        });
        vm.complete_load(request.seq, Ok(raw));

        let data = vm.data().unwrap();
        assert!(data.page.is_server_paged);
        assert_eq!(data.page.effective_page, 2);
        assert_eq!(ids(vm.visible()), vec![11, 12]);
    }

    #[test]
    fn test_failure_keeps_previous_data() {
        let (mut vm, notifier) = view_model();
        let request = vm.begin_load();
        vm.complete_load(request.seq, Ok(sales_response()));

        let request = vm.set_page(2);
        vm.complete_load(
            request.seq,
            Err(FetchError::Status {
                status: 503,
                body: String::new(),
            }),
        );

        assert_eq!(vm.phase(), Phase::Failed(FetchFailureKind::Server));
        assert_eq!(ids(&vm.data().unwrap().records), vec![1, 2]);

        let notices = notifier.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].message, FetchFailureKind::Server.user_message());
    }

    #[test]
    fn test_clear_filter_resets_page() {
        let (mut vm, _) = view_model();
        vm.set_filter(FilterState::default().with_free_text("acme"));
        vm.set_page(4);

        let request = vm.clear_filter();
        assert_eq!(vm.filter(), &FilterState::default());
        assert_eq!(vm.requested_page(), 1);
        assert_eq!(request.query.page, 1);
    }

    #[test]
    fn test_page_size_change_resets_page() {
        let (mut vm, _) = view_model();
        vm.set_page(3);
        let request = vm.set_page_size(0);
        assert_eq!(vm.page_size(), 1);
        assert_eq!(request.query.page, 1);
        assert_eq!(request.query.page_size, 1);
    }

    #[test]
    fn test_placeholder_rows_are_opt_in() {
        let (mut vm, _) = view_model();
        let request = vm.begin_load();
        vm.complete_load(request.seq, Ok(json!({ "data": [] })));
        assert!(vm.data().unwrap().records.is_empty());
        assert!(!vm.data().unwrap().is_placeholder);

        let sample = json!({ "id": 0, "saleAmount": 7 }).as_object().cloned().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut vm = ReportViewModel::new(sales_definition().with_placeholder_rows(vec![sample]))
            .with_notifier(notifier.clone());
        let request = vm.begin_load();
        vm.complete_load(request.seq, Ok(json!({ "data": [] })));
        let data = vm.data().unwrap();
        assert!(data.is_placeholder);
        assert_eq!(data.totals.get("Amount"), Some(7.0));

        let notices = notifier.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
    }

    #[test]
    fn test_server_filters_are_not_reapplied() {
        init_tracing();
        let def = sales_definition()
            .with_server_filter("category", "Category")
            .with_server_date_filter();
        let mut vm = ReportViewModel::new(def);
        let request = vm.set_filter(
            FilterState::default()
                .with_field("category", "Import")
                .with_date_range(Some(date(2025, 11, 1)), Some(date(2025, 11, 3))),
        );
        assert_eq!(
            request.query.filters.get("Category").map(String::as_str),
            Some("Import")
        );

        // Backend already filtered; rows without the field and outside the
        // range are kept as returned
        vm.complete_load(request.seq, Ok(sales_response()));
        assert_eq!(ids(&vm.data().unwrap().records), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_load_through_source() {
        let (mut vm, _) = view_model();
        let source = ScriptedSource::with(vec![
            Ok(sales_response()),
            Err(FetchError::Timeout),
        ]);

        assert!(vm.load(&source).await);
        assert_eq!(vm.phase(), Phase::Ready);

        let request = vm.set_page(2);
        assert!(vm.run(request, &source).await);
        assert_eq!(vm.phase(), Phase::Failed(FetchFailureKind::Network));
        assert_eq!(vm.data().unwrap().records.len(), 2);

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].page, 2);
    }

    #[test]
    fn test_workbook_export_uses_filtered_set() {
        let (mut vm, notifier) = view_model();
        let request = vm.set_filter(
            FilterState::default().with_date_range(Some(date(2025, 11, 1)), Some(date(2025, 11, 3))),
        );
        vm.complete_load(request.seq, Ok(sales_response()));

        let workbook = vm.workbook().unwrap();
        assert_eq!(workbook.file_name, "SalesReport_2025-11-01_2025-11-03.xlsx");
        assert_eq!(workbook.rows.len(), 1);
        assert!(workbook.totals.is_some());

        let dir = TempDir::new().unwrap();
        let path = vm.export_workbook(dir.path()).unwrap();
        assert!(path.exists());
        assert_eq!(vm.phase(), Phase::Ready);
        assert_eq!(
            notifier.notices.lock().unwrap().as_slice(),
            &[Notice::info(format!("Exported {}", path.display()))]
        );
    }

    #[test]
    fn test_export_without_data_notifies() {
        let (mut vm, notifier) = view_model();
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            vm.export_workbook(dir.path()),
            Err(ExportError::NoData)
        ));
        assert_eq!(vm.phase(), Phase::Idle);
        assert_eq!(notifier.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_document_handles_are_released() {
        let (mut vm, _) = view_model();
        let request = vm.begin_load();
        vm.complete_load(request.seq, Ok(sales_response()));

        let store = ArtifactStore::new();
        let host = Arc::new(DetachedHost::new());
        let pipeline = pipeline(&store, host.clone(), false);

        let first = vm.export_document(&pipeline).await.unwrap();
        assert_eq!(first.file_name, "SalesReport_All_All.pdf");
        assert_eq!(vm.phase(), Phase::Ready);
        assert_eq!(host.mounted_count(), 0);
        assert!(store.is_live(&first.handle));

        // Replacement revokes the previous handle
        let second = vm.export_document(&pipeline).await.unwrap();
        assert_ne!(first.handle, second.handle);
        assert!(!store.is_live(&first.handle));
        assert_eq!(store.live_count(), 1);

        // Closing the preview revokes
        assert!(vm.close_preview());
        assert_eq!(store.live_count(), 0);
        assert!(!vm.close_preview());

        // Teardown revokes
        vm.export_document(&pipeline).await.unwrap();
        assert_eq!(store.live_count(), 1);
        drop(vm);
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_document_export_returns_to_prior_state() {
        let (mut vm, notifier) = view_model();
        let request = vm.begin_load();
        vm.complete_load(request.seq, Ok(sales_response()));

        let store = ArtifactStore::new();
        let host = Arc::new(DetachedHost::new());
        let previous = vm
            .export_document(&pipeline(&store, host.clone(), false))
            .await
            .unwrap();

        let err = vm
            .export_document(&pipeline(&store, host.clone(), true))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Rasterize(_)));
        assert_eq!(vm.phase(), Phase::Ready);
        assert_eq!(host.mounted_count(), 0);
        let errors = notifier
            .notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .count();
        assert_eq!(errors, 1);

        // The earlier preview stays open
        assert!(store.is_live(&previous.handle));
        assert_eq!(vm.preview().map(|p| &p.handle), Some(&previous.handle));
    }

    #[tokio::test]
    async fn test_preview_actions() {
        let (mut vm, _) = view_model();
        let surface = RecordingPreview::default();
        assert!(matches!(
            vm.preview_action(&surface, &PreviewAction::Open),
            Err(ExportError::NoPreview)
        ));

        let request = vm.begin_load();
        vm.complete_load(request.seq, Ok(sales_response()));
        let store = ArtifactStore::new();
        vm.export_document(&pipeline(&store, Arc::new(DetachedHost::new()), false))
            .await
            .unwrap();

        assert_eq!(vm.preview_action(&surface, &PreviewAction::Print).unwrap(), None);
        let dir = TempDir::new().unwrap();
        let saved = vm
            .preview_action(
                &surface,
                &PreviewAction::Save {
                    dir: dir.path().to_path_buf(),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(saved, dir.path().join("SalesReport_All_All.pdf"));
        assert_eq!(surface.calls.lock().unwrap().len(), 1);
    }

    /// Mail client that refuses every message
    struct OfflineMail;

    impl PreviewSurface for OfflineMail {
        fn open(&self, _: &ArtifactHandle, _: &StoredArtifact) -> Result<(), ExportError> {
            Ok(())
        }
        fn print(&self, _: &ArtifactHandle, _: &StoredArtifact) -> Result<(), ExportError> {
            Ok(())
        }
        fn email(&self, _: &ArtifactHandle, _: &StoredArtifact) -> Result<(), ExportError> {
            Err(ExportError::Preview("no mail account configured".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_preview_action_notifies() {
        let (mut vm, notifier) = view_model();
        let request = vm.begin_load();
        vm.complete_load(request.seq, Ok(sales_response()));
        let store = ArtifactStore::new();
        vm.export_document(&pipeline(&store, Arc::new(DetachedHost::new()), false))
            .await
            .unwrap();

        let err = vm.preview_action(&OfflineMail, &PreviewAction::Email).unwrap_err();
        assert!(matches!(err, ExportError::Preview(_)));
        assert!(vm.preview().is_some());

        let notices = notifier.notices.lock().unwrap();
        assert_eq!(notices.last().map(|n| n.level), Some(NoticeLevel::Error));
    }
}
