use crate::error::StashError;
use crate::record::Record;
use crate::record::Value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::DecodedSheet;
use crate::spreadsheet::SpreadsheetError;
use std::collections::HashMap;

/// Header text given to columns whose header cell is empty.
const EMPTY_HEADER: &str = "__EMPTY";

/// The used cells of one worksheet as read from the file.
pub(crate) struct Sheet {
    pub(crate) name: String,
    pub(crate) cells: Vec<Cell>,
}

impl Sheet {
    pub(super) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
        }
    }

    pub(super) fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Turns the cell grid into header-keyed records.
    ///
    /// The first used row is the header row and the used column span gives the fields.
    /// Missing cells become null, and rows with nothing but nulls are dropped.
    pub(super) fn into_decoded(mut self, shared_strings: &[String]) -> Result<DecodedSheet, StashError> {
        // Readers emit cells row by row, but formula results and MULRK runs may arrive out of
        // column order
        self.cells.sort_by_key(|cell| (cell.row, cell.col));

        let mut decoded = DecodedSheet {
            name: self.name.to_lowercase(),
            source_name: self.name.to_owned(),
            columns: Vec::new(),
            rows: Vec::new(),
        };
        let Some(first) = self.cells.first() else {
            return Ok(decoded);
        };
        let header_row = first.row;
        let col_lower = self.cells.iter().map(|cell| cell.col).min().unwrap_or_default();
        let col_upper = self.cells.iter().map(|cell| cell.col).max().unwrap_or_default();
        let width = col_upper - col_lower + 1;

        let header_end = self.cells.partition_point(|cell| cell.row == header_row);
        let (header_cells, body_cells) = self.cells.split_at(header_end);
        let mut header = vec![Value::Null; width];
        for cell in header_cells {
            header[cell.col - col_lower] = self.value_of(cell, shared_strings)?;
        }
        decoded.columns = header_names(&header);

        // Only rows holding at least one cell are visited
        for row_cells in body_cells.chunk_by(|a, b| a.row == b.row) {
            let mut values = vec![Value::Null; width];
            let mut is_empty = true;
            for cell in row_cells {
                let value = self.value_of(cell, shared_strings)?;
                is_empty &= value.is_null();
                values[cell.col - col_lower] = value;
            }
            if !is_empty {
                decoded.rows.push(decoded.columns.iter().cloned().zip(values).collect::<Record>());
            }
        }

        Ok(decoded)
    }

    fn value_of(&self, cell: &Cell, shared_strings: &[String]) -> Result<Value, StashError> {
        cell.to_value(shared_strings).map_err(|message| {
            SpreadsheetError::CellValueError(self.name.to_owned(), cell.reference(), message).into()
        })
    }
}

/// Names the columns after their header cells. Blank headers become `__EMPTY`, and a name
/// seen before gets the next free `_N` suffix while its first occurrence stays bare.
fn header_names(header: &[Value]) -> Vec<String> {
    let mut counters = HashMap::<String, usize>::new();
    header
        .iter()
        .map(|value| {
            let text = value.to_string();
            let base = if text.is_empty() { EMPTY_HEADER.to_owned() } else { text };
            match counters.get(&base).copied() {
                None => {
                    counters.insert(base.to_owned(), 1);
                    base
                }
                Some(mut counter) => {
                    let mut name = format!("{base}_{counter}");
                    counter += 1;
                    while counters.contains_key(&name) {
                        name = format!("{base}_{counter}");
                        counter += 1;
                    }
                    counters.insert(base, counter);
                    counters.insert(name.to_owned(), 1);
                    name
                }
            }
        })
        .collect()
}
