// 🗂️ Grid Loader - workbook bytes ⇄ 2-D grid of raw cells
//
// No interpretation happens here: a grid is rows of text/number/empty cells,
// exactly as the sheet holds them. Sections, headers and records are the
// business of the modules downstream.

use crate::error::{LedgerError, Result};
use crate::normalize::excel_serial_to_date;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

// ============================================================================
// CELLS & GRIDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    /// Blank text counts as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Display form: trimmed text, integers without a decimal point.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
        }
    }
}

/// Immutable grid of raw cell values. Rows may be ragged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGrid {
    rows: Vec<Vec<Cell>>,
}

static EMPTY_CELL: Cell = Cell::Empty;

impl RawGrid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        RawGrid { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> &[Cell] {
        self.rows.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reading past the end of a row (or the grid) yields `Cell::Empty`.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.row(row).get(col).unwrap_or(&EMPTY_CELL)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

// ============================================================================
// GRID SOURCES
// ============================================================================

/// Turns uploaded bytes into a grid.
pub trait GridSource {
    fn load(&self, bytes: &[u8]) -> Result<RawGrid>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Excel/ODS workbooks read through calamine; one named sheet is loaded.
pub struct WorkbookSource {
    pub sheet_name: String,
}

impl WorkbookSource {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        WorkbookSource {
            sheet_name: sheet_name.into(),
        }
    }
}

impl GridSource for WorkbookSource {
    fn load(&self, bytes: &[u8]) -> Result<RawGrid> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| LedgerError::UnreadableWorkbook(e.to_string()))?;

        if !workbook.sheet_names().iter().any(|name| name == &self.sheet_name) {
            return Err(LedgerError::MissingSheet(self.sheet_name.clone()));
        }

        let range = workbook
            .worksheet_range(&self.sheet_name)
            .map_err(|e| LedgerError::UnreadableWorkbook(e.to_string()))?;

        // Range may not begin at A1
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];

        for source_row in range.rows() {
            let mut row = vec![Cell::Empty; start_col as usize];
            row.extend(source_row.iter().map(data_to_cell));
            while matches!(row.last(), Some(Cell::Empty)) {
                row.pop();
            }
            rows.push(row);
        }

        Ok(RawGrid::new(rows))
    }

    fn name(&self) -> &str {
        "workbook"
    }
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s.clone()),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
            Some(date) => Cell::Text(date.format("%Y-%m-%d").to_string()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// CSV dump of the stock sheet. Numeric-looking fields become numbers,
/// except codes with a leading zero (`0401`), which stay text.
pub struct CsvSource;

fn csv_cell(field: &str) -> Cell {
    let trimmed = field.trim();
    let mut chars = trimmed.chars();
    if let (Some('0'), Some(next)) = (chars.next(), chars.next()) {
        if next.is_ascii_digit() {
            return Cell::text(field);
        }
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Cell::Number(n),
        _ => Cell::text(field),
    }
}

impl GridSource for CsvSource {
    fn load(&self, bytes: &[u8]) -> Result<RawGrid> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                LedgerError::UnreadableWorkbook(format!("CSV line {}: {}", line_num + 1, e))
            })?;
            let row = record
                .iter()
                .map(csv_cell)
                .collect();
            rows.push(row);
        }

        Ok(RawGrid::new(rows))
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// Pick a grid source from the uploaded file's name.
pub fn source_for_file(file_name: &str, sheet_name: &str) -> Result<Box<dyn GridSource>> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "ods" => Ok(Box::new(WorkbookSource::new(sheet_name))),
        "csv" => Ok(Box::new(CsvSource)),
        _ => Err(LedgerError::UnsupportedFile(file_name.to_string())),
    }
}

// ============================================================================
// WRITING
// ============================================================================

/// Write a grid to a single-sheet XLSX workbook. Rows listed in
/// `bold_rows` (section markers, header rows) are written bold.
pub fn write_workbook(grid: &RawGrid, sheet_name: &str, bold_rows: &[usize]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let plain = Format::new();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (row_idx, row) in grid.rows().enumerate() {
        let format = if bold_rows.contains(&row_idx) { &bold } else { &plain };
        let row32 = row_idx as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            let col16 = col_idx as u16;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    worksheet.write_string_with_format(row32, col16, s, format)?;
                }
                Cell::Number(n) => {
                    worksheet.write_number_with_format(row32, col16, *n, format)?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
