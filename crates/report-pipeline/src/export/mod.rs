//! Report export: workbook (XLSX/CSV) and paged document generation

pub mod document;
pub mod handles;
pub mod preview;
pub mod workbook;

pub use document::{
    paginate, render_markup, DetachedHost, DocumentArtifact, DocumentAssembler, DocumentPipeline,
    OffscreenSurface, PageSlice, Raster, Rasterizer, RenderHost, RenderSpec, SurfaceId,
};
pub use handles::{ArtifactHandle, ArtifactStore, StoredArtifact};
pub use preview::{perform, PreviewAction, PreviewSurface};
pub use workbook::{
    export_file_name, export_file_stem, to_workbook, CellValue, ColumnMapping, WorkbookArtifact,
};
