//! Event sheets exchanged as headerless CSV
//!
//! A sheet is a grid of text cells. The clock time and label of each event
//! sit in fixed columns; after alignment the relative offset and inclusion
//! status of every evaluated row are written into two more columns.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::align::{EventRow, ExternalEvent, RowRef};
use crate::error::{EdfError, Result};

/// Column positions (zero based) used in event sheets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SheetLayout {
    pub time_column: usize,
    pub label_column: usize,
    pub relative_column: usize,
    pub status_column: usize,
    /// File extension of sheets, without the dot
    pub extension: String,
}

impl Default for SheetLayout {
    fn default() -> Self {
        // C、D 列读取，E、F 列写回
        SheetLayout {
            time_column: 2,
            label_column: 3,
            relative_column: 4,
            status_column: 5,
            extension: "csv".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSheet {
    path: PathBuf,
    source: usize,
    rows: Vec<Vec<String>>,
}

impl EventSheet {
    /// Reads a sheet; `source` tags every row reference it hands out
    pub fn open<P: AsRef<Path>>(path: P, source: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| EdfError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let mut sheet = Self::from_reader(file, source)?;
        sheet.path = path.to_path_buf();
        Ok(sheet)
    }

    pub fn from_reader<R: Read>(input: R, source: usize) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|cell| cell.to_string()).collect());
        }

        Ok(EventSheet {
            path: PathBuf::new(),
            source,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Rows handed to alignment; fully blank rows are left out
    pub fn event_rows(&self, layout: &SheetLayout) -> Vec<EventRow> {
        fn cell(row: &[String], column: usize) -> &str {
            row.get(column).map(String::as_str).unwrap_or("")
        }

        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|c| !c.trim().is_empty()))
            .map(|(i, row)| {
                EventRow::new(
                    cell(row, layout.time_column),
                    cell(row, layout.label_column),
                    RowRef {
                        source: self.source,
                        row: i,
                    },
                )
            })
            .collect()
    }

    /// Writes relative offset and status of this sheet's evaluated events
    ///
    /// Returns how many rows were updated. Rows that alignment never saw keep
    /// their cells.
    pub fn apply_statuses(&mut self, layout: &SheetLayout, events: &[ExternalEvent]) -> usize {
        let width = layout.relative_column.max(layout.status_column) + 1;
        let mut updated = 0;

        for event in events.iter().filter(|e| e.row.source == self.source) {
            let Some(row) = self.rows.get_mut(event.row.row) else {
                continue;
            };
            if row.len() < width {
                row.resize(width, String::new());
            }
            row[layout.relative_column] = format!("{:.2}", event.relative_offset);
            row[layout.status_column] = event.status.as_str().to_string();
            updated += 1;
        }

        updated
    }

    /// Empties the given columns in every row, returning the number of cells cleared
    pub fn clear_columns(&mut self, columns: &[usize]) -> usize {
        let mut cleared = 0;
        for row in self.rows.iter_mut() {
            for &column in columns {
                if let Some(cell) = row.get_mut(column) {
                    if !cell.is_empty() {
                        cell.clear();
                        cleared += 1;
                    }
                }
            }
        }
        cleared
    }

    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = WriterBuilder::new().flexible(true).from_writer(out);
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Overwrites the file the sheet was opened from
    pub fn save(&self) -> Result<()> {
        let file = File::create(&self.path)?;
        self.write_to(file)
    }
}
