//! Paged document export
//!
//! Records are rendered into a fixed-width (print page) markup fragment,
//! mounted on an off-screen surface, rasterized, sliced into A4 pages and
//! assembled into a document blob registered under a revocable handle.
//!
//! The surface is held by a guard that unmounts it on drop, so it is gone
//! after success, after a rasterizer or assembler error, and if the export
//! future is dropped mid-flight.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use super::handles::{ArtifactHandle, ArtifactStore};
use super::workbook::{CellValue, ColumnMapping};
use crate::aggregate::AggregateRow;
use crate::constants;
use crate::error::ExportError;
use crate::record::{FieldAccessors, Record};

// =============================================================================
// Render Template
// =============================================================================

/// How a report is laid out on paper
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSpec {
    pub title: String,
    pub subtitle: Option<String>,
    pub columns: Vec<ColumnMapping>,
    pub width_px: u32,
}

impl RenderSpec {
    pub fn new(title: impl Into<String>, columns: Vec<ColumnMapping>) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            columns,
            width_px: constants::PRINT_PAGE_WIDTH_PX,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn cell_text(cell: &CellValue, numeric: bool) -> String {
    match cell {
        CellValue::Number(n) if numeric => format!("{:.2}", n),
        other => other.display(),
    }
}

/// Render the print fragment: title, table body and optional totals footer
pub fn render_markup(
    records: &[Record],
    template: &RenderSpec,
    accessors: &FieldAccessors,
    aggregate: Option<&AggregateRow>,
) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        "<div class=\"report-print\" style=\"width:{}px\">",
        template.width_px
    ));
    html.push_str(&format!("<h1>{}</h1>", escape_html(&template.title)));
    if let Some(subtitle) = &template.subtitle {
        html.push_str(&format!("<p class=\"subtitle\">{}</p>", escape_html(subtitle)));
    }

    html.push_str("<table><thead><tr>");
    for column in &template.columns {
        html.push_str(&format!("<th>{}</th>", escape_html(&column.header)));
    }
    html.push_str("</tr></thead><tbody>");

    for record in records {
        html.push_str("<tr>");
        for column in &template.columns {
            let cell = CellValue::from_value(accessors.get(record, &column.field), column.numeric);
            let class = if column.numeric { " class=\"num\"" } else { "" };
            html.push_str(&format!(
                "<td{}>{}</td>",
                class,
                escape_html(&cell_text(&cell, column.numeric))
            ));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody>");

    if let Some(aggregate) = aggregate.filter(|a| !a.is_empty()) {
        html.push_str("<tfoot><tr>");
        for (idx, column) in template.columns.iter().enumerate() {
            let text = match aggregate.get(&column.header) {
                Some(total) => format!("{:.2}", total),
                None if idx == 0 => constants::TOTALS_LABEL.to_string(),
                None => String::new(),
            };
            html.push_str(&format!("<td>{}</td>", escape_html(&text)));
        }
        html.push_str("</tr></tfoot>");
    }

    html.push_str("</table></div>");
    html
}

// =============================================================================
// Off-screen Surface
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

/// A mounted render surface, positioned outside the visible viewport
#[derive(Debug, Clone, PartialEq)]
pub struct OffscreenSurface {
    pub id: SurfaceId,
    pub markup: String,
    pub width_px: u32,
    pub left_px: i32,
    pub top_px: i32,
}

/// Where off-screen surfaces live while they are rasterized
pub trait RenderHost: Send + Sync {
    fn mount(&self, markup: String, width_px: u32) -> OffscreenSurface;
    fn unmount(&self, id: SurfaceId) -> bool;
    fn is_mounted(&self, id: SurfaceId) -> bool;
}

/// In-memory host; surfaces are kept apart from any visible layout
#[derive(Debug, Default)]
pub struct DetachedHost {
    next_id: AtomicU64,
    surfaces: Mutex<HashMap<SurfaceId, OffscreenSurface>>,
}

impl DetachedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mounted_count(&self) -> usize {
        self.surfaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl RenderHost for DetachedHost {
    fn mount(&self, markup: String, width_px: u32) -> OffscreenSurface {
        let id = SurfaceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let surface = OffscreenSurface {
            id,
            markup,
            width_px,
            left_px: constants::OFFSCREEN_OFFSET_PX,
            top_px: 0,
        };
        self.surfaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, surface.clone());
        surface
    }

    fn unmount(&self, id: SurfaceId) -> bool {
        self.surfaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
            .is_some()
    }

    fn is_mounted(&self, id: SurfaceId) -> bool {
        self.surfaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&id)
    }
}

/// Unmounts its surface when dropped
struct MountedSurface<'h> {
    host: &'h dyn RenderHost,
    surface: OffscreenSurface,
}

impl<'h> MountedSurface<'h> {
    fn mount(host: &'h dyn RenderHost, markup: String, width_px: u32) -> Self {
        let surface = host.mount(markup, width_px);
        debug!("Mounted off-screen surface {:?}", surface.id);
        Self { host, surface }
    }
}

impl Drop for MountedSurface<'_> {
    fn drop(&mut self) {
        self.host.unmount(self.surface.id);
        debug!("Unmounted off-screen surface {:?}", self.surface.id);
    }
}

// =============================================================================
// Rasterization & Assembly Sinks
// =============================================================================

/// Rasterized surface; `data` is opaque to this crate
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width_px: u32,
    pub height_px: u32,
    pub data: Vec<u8>,
}

/// One page worth of raster rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlice {
    pub index: usize,
    pub offset_px: u32,
    pub height_px: u32,
}

#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, surface: &OffscreenSurface) -> Result<Raster, ExportError>;
}

pub trait DocumentAssembler: Send + Sync {
    fn assemble(&self, raster: &Raster, pages: &[PageSlice]) -> Result<Vec<u8>, ExportError>;
}

/// Slice a raster into A4-proportioned pages (at least one)
pub fn paginate(raster: &Raster) -> Vec<PageSlice> {
    let page_height =
        ((raster.width_px as f64) * constants::PAGE_HEIGHT_MM / constants::PAGE_WIDTH_MM).round() as u32;
    if page_height == 0 || raster.height_px == 0 {
        return vec![PageSlice {
            index: 0,
            offset_px: 0,
            height_px: raster.height_px,
        }];
    }

    (0..raster.height_px.div_ceil(page_height))
        .map(|i| {
            let offset = i * page_height;
            PageSlice {
                index: i as usize,
                offset_px: offset,
                height_px: page_height.min(raster.height_px - offset),
            }
        })
        .collect()
}

// =============================================================================
// Pipeline
// =============================================================================

/// A generated document, reachable through its handle until revoked
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentArtifact {
    pub handle: ArtifactHandle,
    pub file_name: String,
    pub page_count: usize,
}

/// Render -> rasterize -> paginate -> assemble -> register
#[derive(Clone)]
pub struct DocumentPipeline {
    host: Arc<dyn RenderHost>,
    rasterizer: Arc<dyn Rasterizer>,
    assembler: Arc<dyn DocumentAssembler>,
    store: ArtifactStore,
}

impl DocumentPipeline {
    pub fn new(
        host: Arc<dyn RenderHost>,
        rasterizer: Arc<dyn Rasterizer>,
        assembler: Arc<dyn DocumentAssembler>,
        store: ArtifactStore,
    ) -> Self {
        Self {
            host,
            rasterizer,
            assembler,
            store,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Produce a document for `records`. Records are only read.
    pub async fn to_document(
        &self,
        records: &[Record],
        template: &RenderSpec,
        accessors: &FieldAccessors,
        aggregate: Option<&AggregateRow>,
        file_name: &str,
    ) -> Result<DocumentArtifact, ExportError> {
        let markup = render_markup(records, template, accessors, aggregate);
        let mounted = MountedSurface::mount(self.host.as_ref(), markup, template.width_px);

        let result = self.rasterize_and_assemble(&mounted.surface).await;
        drop(mounted);

        match result {
            Ok((bytes, page_count)) => {
                let handle = self.store.create(bytes, constants::DOCUMENT_MIME, file_name);
                info!("Generated: {} ({} pages, {})", file_name, page_count, handle);
                Ok(DocumentArtifact {
                    handle,
                    file_name: file_name.to_string(),
                    page_count,
                })
            }
            Err(e) => {
                error!("Document export failed: {}", e);
                Err(e)
            }
        }
    }

    async fn rasterize_and_assemble(
        &self,
        surface: &OffscreenSurface,
    ) -> Result<(Vec<u8>, usize), ExportError> {
        let raster = self.rasterizer.rasterize(surface).await?;
        let pages = paginate(&raster);
        let bytes = self.assembler.assemble(&raster, &pages)?;
        Ok((bytes, pages.len()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::{json, Value};

    /// Raster height grows with the number of table rows
    pub(crate) struct FakeRasterizer {
        pub seen: Mutex<Vec<SurfaceId>>,
        pub fail: bool,
    }

    impl FakeRasterizer {
        pub fn ok() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn last_seen(&self) -> Option<SurfaceId> {
            self.seen.lock().unwrap().last().copied()
        }
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        async fn rasterize(&self, surface: &OffscreenSurface) -> Result<Raster, ExportError> {
            self.seen.lock().unwrap().push(surface.id);
            if self.fail {
                return Err(ExportError::Rasterize("canvas tainted".into()));
            }
            let rows = surface.markup.matches("<tr>").count() as u32;
            Ok(Raster {
                width_px: surface.width_px,
                height_px: 200 + rows * 40,
                data: vec![0; 16],
            })
        }
    }

    pub(crate) struct FakeAssembler {
        pub fail: bool,
    }

    impl DocumentAssembler for FakeAssembler {
        fn assemble(&self, _raster: &Raster, pages: &[PageSlice]) -> Result<Vec<u8>, ExportError> {
            if self.fail {
                return Err(ExportError::Assemble("out of memory".into()));
            }
            Ok(format!("%PDF pages={}", pages.len()).into_bytes())
        }
    }

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn template() -> RenderSpec {
        RenderSpec::new(
            "Sales <Report>",
            vec![
                ColumnMapping::new("Date", "date"),
                ColumnMapping::new("Amount", "saleAmount").total(),
            ],
        )
        .with_subtitle("2025-11-01 to 2025-11-03")
    }

    fn pipeline(
        host: Arc<DetachedHost>,
        rasterizer: Arc<FakeRasterizer>,
        assembler_fails: bool,
    ) -> DocumentPipeline {
        DocumentPipeline::new(
            host,
            rasterizer,
            Arc::new(FakeAssembler {
                fail: assembler_fails,
            }),
            ArtifactStore::new(),
        )
    }

    #[test]
    fn test_render_markup_escapes_and_blanks_missing() {
        let rows = records(json!([{"saleAmount": 100}, {"date": "2025-11-02", "saleAmount": "x<y"}]));
        let html = render_markup(&rows, &template(), &FieldAccessors::new(), None);
        assert!(html.contains("<h1>Sales &lt;Report&gt;</h1>"));
        assert!(html.contains("<td></td><td class=\"num\">100.00</td>"));
        assert!(html.contains("x&lt;y"));
        assert!(!html.contains("undefined"));
        assert!(!html.contains("null"));
        assert!(!html.contains("<tfoot>"));
    }

    #[test]
    fn test_render_markup_totals_footer() {
        let rows = records(json!([{"saleAmount": 100}, {"saleAmount": 50}]));
        let totals = crate::aggregate::aggregate_row(
            &rows,
            &[crate::aggregate::TotalColumn::new("Amount", ["saleAmount"])],
        );
        let html = render_markup(&rows, &template(), &FieldAccessors::new(), Some(&totals));
        assert!(html.contains("<tfoot><tr><td>Total</td><td>150.00</td></tr></tfoot>"));
    }

    #[test]
    fn test_paginate_a4_slices() {
        // 794px wide -> 1123px page height
        let raster = Raster {
            width_px: 794,
            height_px: 2500,
            data: Vec::new(),
        };
        let pages = paginate(&raster);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].height_px, 1123);
        assert_eq!(pages[2].offset_px, 2246);
        assert_eq!(pages[2].height_px, 254);
    }

    #[test]
    fn test_paginate_empty_raster_is_one_page() {
        let raster = Raster {
            width_px: 794,
            height_px: 0,
            data: Vec::new(),
        };
        assert_eq!(paginate(&raster).len(), 1);
    }

    #[tokio::test]
    async fn test_to_document_success_unmounts_surface() {
        let host = Arc::new(DetachedHost::new());
        let rasterizer = Arc::new(FakeRasterizer::ok());
        let pipeline = pipeline(host.clone(), rasterizer.clone(), false);
        let rows = records(json!([{"date": "2025-11-01", "saleAmount": 100}]));

        let artifact = pipeline
            .to_document(&rows, &template(), &FieldAccessors::new(), None, "Sales.pdf")
            .await
            .unwrap();

        let surface = rasterizer.last_seen().unwrap();
        assert!(!host.is_mounted(surface));
        assert_eq!(host.mounted_count(), 0);
        assert_eq!(artifact.page_count, 1);
        assert!(pipeline.store().is_live(&artifact.handle));
        let stored = pipeline.store().get(&artifact.handle).unwrap();
        assert_eq!(stored.mime, constants::DOCUMENT_MIME);
        assert_eq!(&stored.bytes[..], b"%PDF pages=1");
    }

    #[tokio::test]
    async fn test_to_document_rasterize_failure_unmounts_surface() {
        let host = Arc::new(DetachedHost::new());
        let rasterizer = Arc::new(FakeRasterizer::failing());
        let pipeline = pipeline(host.clone(), rasterizer.clone(), false);

        let err = pipeline
            .to_document(&[], &template(), &FieldAccessors::new(), None, "Sales.pdf")
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Rasterize(_)));
        let surface = rasterizer.last_seen().unwrap();
        assert!(!host.is_mounted(surface));
        assert_eq!(host.mounted_count(), 0);
        assert_eq!(pipeline.store().live_count(), 0);
    }

    #[tokio::test]
    async fn test_to_document_assembly_failure_unmounts_surface() {
        let host = Arc::new(DetachedHost::new());
        let rasterizer = Arc::new(FakeRasterizer::ok());
        let pipeline = pipeline(host.clone(), rasterizer.clone(), true);

        let err = pipeline
            .to_document(&[], &template(), &FieldAccessors::new(), None, "Sales.pdf")
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Assemble(_)));
        assert_eq!(host.mounted_count(), 0);
        assert_eq!(pipeline.store().live_count(), 0);
    }

    #[tokio::test]
    async fn test_each_generation_gets_a_new_handle() {
        let host = Arc::new(DetachedHost::new());
        let pipeline = pipeline(host, Arc::new(FakeRasterizer::ok()), false);
        let a = pipeline
            .to_document(&[], &template(), &FieldAccessors::new(), None, "a.pdf")
            .await
            .unwrap();
        let b = pipeline
            .to_document(&[], &template(), &FieldAccessors::new(), None, "a.pdf")
            .await
            .unwrap();
        assert_ne!(a.handle, b.handle);
        // The pipeline never revokes on its own
        assert!(pipeline.store().is_live(&a.handle));
    }
}
