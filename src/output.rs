//! Persistence for flattened arrival rows.
//!
//! Rows go either to a CSV file that grows across runs or to any writer,
//! usually stdout.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use tracing::debug;

use crate::error::Result;
use crate::parser::ArrivalRow;

/// Appends `rows` to the CSV file at `path`.
///
/// Creates the file with headers if it does not already exist. An empty
/// `rows` leaves the filesystem untouched so the header is never lost.
pub fn append_rows(path: &Path, rows: &[ArrivalRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, rows = rows.len(), "Appending arrival rows");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes a header line followed by `rows` to `out`.
pub fn write_rows<W: Write>(out: W, rows: &[ArrivalRow]) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);

    writer.write_record(crate::parser::ARRIVAL_CSV_COLUMNS.split(','))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
