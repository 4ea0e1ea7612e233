//! Single-sheet workbook export (XLSX and CSV)
//!
//! Column order is exactly the order of the column mapping. Missing fields
//! become empty cells, never the text "undefined" or "null".

use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::aggregate::AggregateRow;
use crate::constants;
use crate::error::ExportError;
use crate::record::{parse_numeric_text, FieldAccessors, Record};

/// One export column: header text and the logical field it reads
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnMapping {
    pub header: String,
    pub field: String,
    /// Coerce numeric-looking text to numbers
    #[serde(default)]
    pub numeric: bool,
    /// Include in the totals row
    #[serde(default)]
    pub total: bool,
}

impl ColumnMapping {
    pub fn new(header: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            field: field.into(),
            numeric: false,
            total: false,
        }
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }

    pub fn total(mut self) -> Self {
        self.numeric = true;
        self.total = true;
        self
    }
}

/// A workbook cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

impl CellValue {
    pub(crate) fn from_value(value: Option<&Value>, numeric: bool) -> Self {
        match value {
            None | Some(Value::Null) => CellValue::Empty,
            Some(Value::Number(n)) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            Some(Value::String(s)) => {
                match parse_numeric_text(s) {
                    Some(n) if numeric => CellValue::Number(n),
                    _ => CellValue::Text(s.clone()),
                }
            }
            Some(Value::Bool(b)) => CellValue::Text(b.to_string()),
            Some(nested) => CellValue::Text(nested.to_string()),
        }
    }

    /// Text form used by CSV and previews
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
        }
    }
}

/// Tabular export artifact: one sheet, header row, data rows, optional totals
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookArtifact {
    pub sheet_name: String,
    pub file_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub totals: Option<Vec<CellValue>>,
}

/// Build the workbook artifact for `records`
pub fn to_workbook(
    records: &[Record],
    columns: &[ColumnMapping],
    accessors: &FieldAccessors,
) -> WorkbookArtifact {
    let headers = columns.iter().map(|c| c.header.clone()).collect();
    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| CellValue::from_value(accessors.get(record, &c.field), c.numeric))
                .collect()
        })
        .collect();

    WorkbookArtifact {
        sheet_name: "Report".to_string(),
        file_name: format!("Report.{}", constants::XLSX_EXTENSION),
        headers,
        rows,
        totals: None,
    }
}

/// `<ReportName>_<fromDate>_<toDate>`, open bounds rendered as `All`
pub fn export_file_stem(report_name: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> String {
    let bound = |d: Option<NaiveDate>| {
        d.map(|d| d.format(constants::PARAM_DATE_FORMAT).to_string())
            .unwrap_or_else(|| constants::FILE_NAME_OPEN_BOUND.to_string())
    };
    format!("{}_{}_{}", report_name, bound(from), bound(to))
}

/// Workbook file name for a report and date range
pub fn export_file_name(report_name: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> String {
    format!(
        "{}.{}",
        export_file_stem(report_name, from, to),
        constants::XLSX_EXTENSION
    )
}

/// Excel sheet names: at most 31 chars, none of `[]:*?/\`
fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        "Report".to_string()
    } else {
        cleaned
    }
}

impl WorkbookArtifact {
    /// Name the sheet and the output file after the report and its date range
    pub fn named(mut self, report_name: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.sheet_name = sanitize_sheet_name(report_name);
        self.file_name = export_file_name(report_name, from, to);
        self
    }

    /// Append a totals row; totals are looked up by column header
    pub fn with_totals(mut self, aggregate: &AggregateRow, label: &str) -> Self {
        if self.headers.is_empty() {
            return self;
        }
        let mut row: Vec<CellValue> = self
            .headers
            .iter()
            .map(|h| aggregate.get(h).map_or(CellValue::Empty, CellValue::Number))
            .collect();
        if row[0] == CellValue::Empty {
            row[0] = CellValue::Text(label.to_string());
        }
        self.totals = Some(row);
        self
    }

    fn all_rows(&self) -> impl Iterator<Item = &Vec<CellValue>> {
        self.rows.iter().chain(self.totals.iter())
    }

    /// Serialize to XLSX bytes
    pub fn to_xlsx_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name)?;

        for (col, header) in self.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &bold)?;
        }

        let totals_row = self.rows.len() + 1;
        for (idx, row) in self.all_rows().enumerate() {
            let row_num = (idx + 1) as u32;
            let is_totals = idx + 1 == totals_row && self.totals.is_some();
            for (col, cell) in row.iter().enumerate() {
                let col = col as u16;
                match (cell, is_totals) {
                    (CellValue::Empty, _) => {}
                    (CellValue::Text(s), false) => {
                        worksheet.write_string(row_num, col, s)?;
                    }
                    (CellValue::Text(s), true) => {
                        worksheet.write_string_with_format(row_num, col, s, &bold)?;
                    }
                    (CellValue::Number(n), false) => {
                        worksheet.write_number(row_num, col, *n)?;
                    }
                    (CellValue::Number(n), true) => {
                        worksheet.write_number_with_format(row_num, col, *n, &bold)?;
                    }
                }
            }
        }

        Ok(workbook.save_to_buffer()?)
    }

    /// Write `<file_name>` into `dir`, returning the full path
    pub fn save_xlsx(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, self.to_xlsx_bytes()?)?;
        info!("Generated: {}", path.display());
        Ok(path)
    }

    /// Write the same table as CSV
    pub fn write_csv(&self, path: &Path) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(&self.headers)?;
        for row in self.all_rows() {
            wtr.write_record(row.iter().map(CellValue::display))?;
        }
        wtr.flush()?;
        info!("Generated: {}", path.display());
        Ok(())
    }
}
