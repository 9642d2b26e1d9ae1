use std::fs;
use std::io::Write;

use camino::Utf8Path;

use crate::domain::{ReportTable, SequenceRecord};
use crate::error::TaxlenError;

pub const REPORT_HEADER: [&str; 3] = ["Accession", "Length", "Description"];

/// Sorts `records` longest first and writes them as CSV to `output_path`.
/// Returns the sorted table, i.e. exactly what was persisted.
pub fn build_report(
    records: Vec<SequenceRecord>,
    output_path: &Utf8Path,
) -> Result<ReportTable, TaxlenError> {
    let table = ReportTable::from_records(records);
    let content = to_csv_bytes(&table)?;
    write_file_atomic(output_path, &content)?;
    tracing::info!(path = %output_path, rows = table.len(), "report written");
    Ok(table)
}

pub fn to_csv_bytes(table: &ReportTable) -> Result<Vec<u8>, TaxlenError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(REPORT_HEADER)
        .map_err(|err| TaxlenError::io("report", err))?;
    for row in table.rows() {
        writer
            .serialize(row)
            .map_err(|err| TaxlenError::io("report", err))?;
    }
    writer
        .into_inner()
        .map_err(|err| TaxlenError::io("report", err))
}

pub fn read_report(path: &Utf8Path) -> Result<Vec<SequenceRecord>, TaxlenError> {
    let mut reader = csv::Reader::from_path(path.as_std_path())
        .map_err(|err| TaxlenError::io(path, err))?;
    reader
        .deserialize::<SequenceRecord>()
        .map(|row| row.map_err(|err| TaxlenError::io(path, err)))
        .collect()
}

/// Writes into a temporary sibling file and renames it over `path`, replacing any
/// previous artifact in one step.
pub(crate) fn write_file_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), TaxlenError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path()).map_err(|err| TaxlenError::io(parent, err))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".kira-taxlen")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| TaxlenError::io(path, err))?;
    temp.write_all(content)
        .map_err(|err| TaxlenError::io(path, err))?;
    temp.persist(path.as_std_path())
        .map_err(|err| TaxlenError::io(path, err.error))?;
    Ok(())
}
