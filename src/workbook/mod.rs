//! Style-preserving workbook mutation.
//!
//! A `WorkbookMutator` owns one open workbook for the duration of a ticker
//! run and exposes the narrow contract the agent tools are allowed to use:
//! structure inspection, single-cell updates into empty cells, and the
//! structural "insert new leftmost period column" operation.
//!
//! Formatting invariants:
//! - `update_cell` into column B clones the same-row column-C style onto
//!   the target before the value is stored.
//! - Column insertion shifts everything right through the spreadsheet
//!   engine (merged cells, widths and heights follow the shift), then
//!   clones the pre-shift header styles back onto the new B1/B2.

pub mod schema;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use umya_spreadsheet::Spreadsheet;

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("failed to open workbook {path}: {message}")]
    Open { path: String, message: String },

    #[error("failed to save workbook {path}: {message}")]
    Save { path: String, message: String },

    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    #[error("invalid cell reference: {0}")]
    InvalidReference(String),

    /// The target cell already holds a value. The agent must pick a
    /// different target; existing data is never overwritten.
    #[error("cell {cell_ref} already contains a value and cannot be overwritten")]
    CellConflict { cell_ref: String },

    /// One structural insertion per sheet per run.
    #[error("a new period column was already inserted into sheet '{0}' during this run")]
    AlreadyInserted(String),
}

/// A value the agent is allowed to write into a cell.
#[derive(Debug, Clone)]
pub enum CellWrite {
    Number(f64),
    Text(String),
}

/// One row of the newly inserted column that expects a value.
#[derive(Debug, Clone, Serialize)]
pub struct RowMapEntry {
    pub row_number: u32,
    pub label: String,
    pub cell_reference: String,
}

/// Parse an A1-style cell reference into (column, row), both 1-based.
pub fn parse_cell_ref(cell_ref: &str) -> Result<(u32, u32), WorkbookError> {
    let mut chars = cell_ref.chars().peekable();
    let mut col: u32 = 0;
    let mut letters = 0usize;

    while let Some(c) = chars.peek().copied() {
        if c.is_ascii_alphabetic() {
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
            letters += 1;
            chars.next();
        } else {
            break;
        }
    }

    let digits: String = chars.collect();
    if letters == 0 || letters > 3 || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return Err(WorkbookError::InvalidReference(cell_ref.to_string()));
    }
    let row: u32 = digits
        .parse()
        .map_err(|_| WorkbookError::InvalidReference(cell_ref.to_string()))?;
    if row == 0 || col == 0 {
        return Err(WorkbookError::InvalidReference(cell_ref.to_string()));
    }
    Ok((col, row))
}

/// 1-based column index to letters ("A", "B", ..., "AA").
pub fn column_letter(mut col: u32) -> String {
    let mut s = String::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        s.insert(0, (b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    s
}

/// An open workbook plus the bookkeeping the mutation contract needs.
pub struct WorkbookMutator {
    path: PathBuf,
    book: Spreadsheet,
    inserted_sheets: HashSet<String>,
    cells_written: u32,
}

impl WorkbookMutator {
    /// Open the workbook at `path`.
    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| WorkbookError::Open {
            path: path.display().to_string(),
            message: format!("{:?}", e),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            book,
            inserted_sheets: HashSet::new(),
            cells_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of successful `update_cell` calls since open.
    pub fn cells_written(&self) -> u32 {
        self.cells_written
    }

    /// Whether the cell currently holds no value.
    pub fn is_empty(&self, sheet: &str, cell_ref: &str) -> Result<bool, WorkbookError> {
        let (col, row) = parse_cell_ref(cell_ref)?;
        let ws = self
            .book
            .get_sheet_by_name(sheet)
            .ok_or_else(|| WorkbookError::SheetNotFound(sheet.to_string()))?;
        Ok(ws.get_value((col, row)).is_empty())
    }

    /// Read a cell value ("" for blank).
    pub fn value(&self, sheet: &str, cell_ref: &str) -> Result<String, WorkbookError> {
        let (col, row) = parse_cell_ref(cell_ref)?;
        let ws = self
            .book
            .get_sheet_by_name(sheet)
            .ok_or_else(|| WorkbookError::SheetNotFound(sheet.to_string()))?;
        Ok(ws.get_value((col, row)))
    }

    /// Write a value into an empty cell.
    ///
    /// Column-B targets get the same-row column-C style cloned first so a
    /// freshly inserted period column renders like its neighbors. Targets
    /// that already hold a value are refused with `CellConflict`.
    pub fn update_cell(
        &mut self,
        sheet: &str,
        cell_ref: &str,
        value: CellWrite,
    ) -> Result<(), WorkbookError> {
        let (col, row) = parse_cell_ref(cell_ref)?;

        let ws = self
            .book
            .get_sheet_by_name_mut(sheet)
            .ok_or_else(|| WorkbookError::SheetNotFound(sheet.to_string()))?;

        if !ws.get_value((col, row)).is_empty() {
            return Err(WorkbookError::CellConflict {
                cell_ref: cell_ref.to_string(),
            });
        }

        if col == 2 {
            let style = ws.get_cell((3u32, row)).map(|c| c.get_style().clone());
            if let Some(style) = style {
                ws.get_cell_mut((2u32, row)).set_style(style);
            }
        }

        let cell = ws.get_cell_mut((col, row));
        match value {
            CellWrite::Number(n) => {
                cell.set_value_number(n);
            }
            CellWrite::Text(s) => {
                cell.set_value_string(s);
            }
        }

        self.cells_written += 1;
        Ok(())
    }

    /// Insert a new leftmost data column (column B) into `sheet`.
    ///
    /// Everything from column B rightwards shifts one column; the headers
    /// land in B1/B2 with the styles of the pre-shift headers; the row map
    /// lists every row whose post-shift column C holds a value.
    ///
    /// Refuses a second insertion into the same sheet during one run.
    pub fn insert_period_column(
        &mut self,
        sheet: &str,
        date_header: &str,
        period_header: &str,
    ) -> Result<Vec<RowMapEntry>, WorkbookError> {
        if self.inserted_sheets.contains(sheet) {
            return Err(WorkbookError::AlreadyInserted(sheet.to_string()));
        }

        let ws = self
            .book
            .get_sheet_by_name_mut(sheet)
            .ok_or_else(|| WorkbookError::SheetNotFound(sheet.to_string()))?;

        // Engine-level shift: B.. becomes C.., merged cells and dimensions follow.
        ws.insert_new_column("B", &1);

        // The previous headers now sit at C1/C2; clone their styles onto the
        // fresh B1/B2 so the new period renders identically.
        for row in [1u32, 2u32] {
            let style = ws.get_cell((3u32, row)).map(|c| c.get_style().clone());
            if let Some(style) = style {
                ws.get_cell_mut((2u32, row)).set_style(style);
            }
        }
        ws.get_cell_mut((2u32, 1u32)).set_value_string(date_header);
        ws.get_cell_mut((2u32, 2u32)).set_value_string(period_header);

        let highest_row = ws.get_highest_row();
        let mut row_map = Vec::new();
        for row in 1..=highest_row {
            if !ws.get_value((3u32, row)).is_empty() {
                row_map.push(RowMapEntry {
                    row_number: row,
                    label: ws.get_value((1u32, row)),
                    cell_reference: format!("B{}", row),
                });
            }
        }

        self.inserted_sheets.insert(sheet.to_string());
        Ok(row_map)
    }

    /// Serialize the workbook back to its path.
    pub fn save(&self) -> Result<(), WorkbookError> {
        umya_spreadsheet::writer::xlsx::write(&self.book, &self.path).map_err(|e| {
            WorkbookError::Save {
                path: self.path.display().to_string(),
                message: format!("{:?}", e),
            }
        })
    }

    pub(crate) fn book(&self) -> &Spreadsheet {
        &self.book
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("A1").unwrap(), (1, 1));
        assert_eq!(parse_cell_ref("B5").unwrap(), (2, 5));
        assert_eq!(parse_cell_ref("AA10").unwrap(), (27, 10));
        assert_eq!(parse_cell_ref("c3").unwrap(), (3, 3));
    }

    #[test]
    fn test_parse_cell_ref_rejects_malformed() {
        for bad in ["", "5", "B", "B0", "1B", "B-2", "B2.5", "ABCD1"] {
            assert!(
                matches!(parse_cell_ref(bad), Err(WorkbookError::InvalidReference(_))),
                "expected InvalidReference for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_column_letter_round_trip() {
        for (idx, letter) in [(1, "A"), (2, "B"), (26, "Z"), (27, "AA"), (52, "AZ")] {
            assert_eq!(column_letter(idx), letter);
            assert_eq!(parse_cell_ref(&format!("{}1", letter)).unwrap().0, idx);
        }
    }
}
