//! Delimited text artifact for exported records.
//!
//! Header row of field names (primary key first, the rest sorted), one row
//! per record. Structured values are JSON-encoded; a field containing the
//! delimiter, a quote, or a line break is quoted with inner quotes doubled.
//! Null and absent values render as an empty field.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use ledgersync_types::value::Record;
use serde_json::Value;

/// Column order: `primary_key` first, then every other field name sorted.
#[must_use]
pub fn header(records: &[Record], primary_key: &str) -> Vec<String> {
    let rest: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .filter(|k| *k != primary_key)
        .collect();
    std::iter::once(primary_key)
        .chain(rest)
        .map(str::to_string)
        .collect()
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(structured) => structured.to_string(),
    }
}

fn escape(field: &str, delimiter: char) -> String {
    if field.contains([delimiter, '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_row<W: Write>(out: &mut W, fields: impl IntoIterator<Item = String>, delimiter: char) -> io::Result<()> {
    let line: Vec<String> = fields.into_iter().map(|f| escape(&f, delimiter)).collect();
    writeln!(out, "{}", line.join(&delimiter.to_string()))
}

/// Write `records` as a delimited artifact to `out`.
///
/// # Errors
///
/// Returns any I/O error from the writer.
pub fn write_records<W: Write>(
    out: &mut W,
    records: &[Record],
    primary_key: &str,
    delimiter: char,
) -> io::Result<()> {
    let columns = header(records, primary_key);
    write_row(out, columns.iter().cloned(), delimiter)?;
    for record in records {
        write_row(
            out,
            columns.iter().map(|c| render(record.get(c))),
            delimiter,
        )?;
    }
    out.flush()
}

/// Write `<dir>/<table>.csv`, creating `dir` if needed. Returns the path.
///
/// # Errors
///
/// Returns any I/O error creating or writing the file.
pub fn write_table_file(
    dir: &Path,
    table: &str,
    records: &[Record],
    primary_key: &str,
    delimiter: char,
) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{table}.csv"));
    let mut out = BufWriter::new(File::create(&path)?);
    write_records(&mut out, records, primary_key, delimiter)?;
    Ok(path)
}
