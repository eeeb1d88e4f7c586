//! Read-only workbook structure inspection.
//!
//! Produces the per-sheet report the agent sees: dimensions, the two
//! header rows, the label column, a value grid, and the empty-cell list.
//! Blank cells are rendered with an explicit sentinel so the model can
//! tell "blank" from "zero".

use serde::Serialize;

use super::{column_letter, WorkbookError, WorkbookMutator};

/// Sentinel used for blank cells in grids shown to the model.
pub const EMPTY_SENTINEL: &str = "<empty>";

/// Columns beyond this are summarized rather than listed. The statement
/// files carry roughly a decade of periods; anything wider is noise.
const MAX_GRID_COLUMNS: u32 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct SheetStructure {
    pub name: String,
    pub rows: u32,
    pub columns: u32,
    /// Period end dates (row 1), leftmost first.
    pub period_dates: Vec<String>,
    /// Period labels (row 2), leftmost first.
    pub period_labels: Vec<String>,
    /// Row labels (column A), top first.
    pub row_labels: Vec<String>,
    /// Full value grid, `grid[row-1][col-1]`, blanks as the sentinel.
    pub grid: Vec<Vec<String>>,
    /// Cell references that are currently blank inside the data area.
    pub empty_cells: Vec<String>,
}

/// Inspect every sheet of an open workbook.
pub fn analyze(mutator: &WorkbookMutator) -> Result<Vec<SheetStructure>, WorkbookError> {
    let mut sheets = Vec::new();

    for ws in mutator.book().get_sheet_collection() {
        let rows = ws.get_highest_row();
        let columns = ws.get_highest_column();
        let shown_columns = columns.min(MAX_GRID_COLUMNS);

        let read = |col: u32, row: u32| -> String {
            let v = ws.get_value((col, row));
            if v.is_empty() {
                EMPTY_SENTINEL.to_string()
            } else {
                v
            }
        };

        let period_dates = (1..=shown_columns).map(|c| read(c, 1)).collect();
        let period_labels = (1..=shown_columns).map(|c| read(c, 2)).collect();
        let row_labels = (1..=rows).map(|r| read(1, r)).collect();

        let mut grid = Vec::with_capacity(rows as usize);
        let mut empty_cells = Vec::new();
        for row in 1..=rows {
            let mut line = Vec::with_capacity(shown_columns as usize);
            for col in 1..=shown_columns {
                let v = ws.get_value((col, row));
                if v.is_empty() {
                    // Only data cells count as fillable: skip the label
                    // column and rows with no label at all.
                    if col > 1 && row > 2 && !ws.get_value((1u32, row)).is_empty() {
                        empty_cells.push(format!("{}{}", column_letter(col), row));
                    }
                    line.push(EMPTY_SENTINEL.to_string());
                } else {
                    line.push(v);
                }
            }
            grid.push(line);
        }

        sheets.push(SheetStructure {
            name: ws.get_name().to_string(),
            rows,
            columns,
            period_dates,
            period_labels,
            row_labels,
            grid,
            empty_cells,
        });
    }

    Ok(sheets)
}

impl SheetStructure {
    /// Empty cells restricted to column B, for the insert-pending case.
    pub fn empty_cells_column_b(&self) -> Vec<String> {
        self.empty_cells
            .iter()
            .filter(|r| r.starts_with('B'))
            .cloned()
            .collect()
    }

    /// Render the sheet for a prompt: headers, labeled grid rows, and the
    /// empty-cell summary.
    pub fn format_for_prompt(&self, column_b_only: bool) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "### Sheet: {} ({} rows x {} columns)\n",
            self.name, self.rows, self.columns
        ));

        for (row_idx, line) in self.grid.iter().enumerate() {
            let cells = line
                .iter()
                .enumerate()
                .map(|(col_idx, v)| format!("{}{}: {}", column_letter(col_idx as u32 + 1), row_idx + 1, v))
                .collect::<Vec<_>>()
                .join(" | ");
            out.push_str(&format!("Row {}: {}\n", row_idx + 1, cells));
        }

        let empties = if column_b_only {
            self.empty_cells_column_b()
        } else {
            self.empty_cells.clone()
        };
        if empties.is_empty() {
            out.push_str("Empty cells: none\n");
        } else {
            let shown = empties.iter().take(60).cloned().collect::<Vec<_>>().join(", ");
            out.push_str(&format!("Empty cells ({} total): {}\n", empties.len(), shown));
        }

        out
    }
}
