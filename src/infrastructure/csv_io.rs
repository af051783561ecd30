//! CSV import and export for the cell store.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::info;

use super::errors::StorageResult;
use crate::domain::{CellId, CellStore, FormatChange, ValueKind, MAX_COLUMNS};

/// Rows beyond this count are ignored on import.
pub const MAX_IMPORT_ROWS: usize = 100;

/// Shape of the data brought in by [`import_csv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvImport {
    /// Number of CSV rows read.
    pub rows: usize,
    /// Widest row read, capped at [`MAX_COLUMNS`].
    pub columns: usize,
    /// Cells that ended up with content.
    pub cells: usize,
}

/// Replaces the store's contents with delimited text.
///
/// Every field becomes one [`CellStore::set_cell`] call with its trimmed
/// text, row by row from `A1`. Literal cells are tagged as numbers or text.
///
/// All records are read before the store is touched, so a malformed input
/// returns an error and leaves the store as it was.
pub fn import_csv<R: Read>(reader: R, store: &mut CellStore) -> StorageResult<CsvImport> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let records = csv_reader
        .records()
        .take(MAX_IMPORT_ROWS)
        .collect::<Result<Vec<csv::StringRecord>, _>>()?;

    store.clear();
    let mut import = CsvImport {
        rows: 0,
        columns: 0,
        cells: 0,
    };

    for (row, record) in records.iter().enumerate() {
        import.rows = row + 1;
        import.columns = import.columns.max(record.len().min(MAX_COLUMNS));

        for (col, field) in record.iter().take(MAX_COLUMNS).enumerate() {
            let id = CellId::new(row, col)?;
            let text = field.trim();
            let Some(is_formula) = store.set_cell(id, text).map(|cell| cell.is_formula()) else {
                continue;
            };
            import.cells += 1;

            if !is_formula {
                store.set_format(id, FormatChange::Kind(ValueKind::classify(text)))?;
            }
        }
    }

    store.recalculate_all();
    info!(rows = import.rows, columns = import.columns, cells = import.cells, "imported CSV");
    Ok(import)
}

pub fn import_csv_file(path: &Path, store: &mut CellStore) -> StorageResult<CsvImport> {
    import_csv(File::open(path)?, store)
}

/// Writes the grid's display values: a header row of column letters, then
/// one line per row prefixed with its row number.
pub fn export_csv<W: Write>(store: &CellStore, rows: usize, columns: usize, writer: W) -> StorageResult<()> {
    let columns = columns.min(MAX_COLUMNS);
    let mut csv_writer = csv::WriterBuilder::new().flexible(false).from_writer(writer);

    let mut header = vec![String::new()];
    header.extend((0..columns).filter_map(CellId::column_label));
    csv_writer.write_record(&header)?;

    for row in 0..rows {
        let mut line = Vec::with_capacity(columns + 1);
        line.push((row + 1).to_string());
        for col in 0..columns {
            let value = CellId::new(row, col)
                .map(|id| store.display_value(id).to_string())
                .unwrap_or_default();
            line.push(value);
        }
        csv_writer.write_record(&line)?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn export_csv_file(store: &CellStore, rows: usize, columns: usize, path: &Path) -> StorageResult<()> {
    export_csv(store, rows, columns, File::create(path)?)?;
    info!(path = %path.display(), rows, columns, "exported CSV");
    Ok(())
}
