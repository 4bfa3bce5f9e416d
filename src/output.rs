//! Result sinks for extracted rows.
//!
//! Rows are sparse: each row carries only the columns its message actually
//! captured. The CSV sink writes the union of columns across all rows,
//! leaving missing cells empty; the NDJSON sink writes one JSON object per
//! row as-is.

use std::io::Write;

use crate::transaction::Row;

/// Error type for sink operations
#[derive(Debug)]
pub enum SinkError {
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    IoError(std::io::Error),
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::JsonError(err)
    }
}

impl From<csv::Error> for SinkError {
    fn from(err: csv::Error) -> Self {
        SinkError::CsvError(err)
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::IoError(err)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::JsonError(e) => write!(f, "JSON error: {}", e),
            SinkError::CsvError(e) => write!(f, "CSV error: {}", e),
            SinkError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

/// Union of column names across rows, in first-appearance order.
pub fn union_columns(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for name in row.keys() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.clone());
            }
        }
    }
    columns
}

/// Write rows as CSV with a union-of-columns header.
///
/// Cells for columns a row does not carry are written empty.
pub fn write_csv<W: Write>(writer: W, rows: &[Row]) -> Result<(), SinkError> {
    let columns = union_columns(rows);
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&columns)?;
    for row in rows {
        let record: Vec<&str> = columns
            .iter()
            .map(|column| row.get(column).map(|v| v.as_str()).unwrap_or(""))
            .collect();
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// NDJSON (Newline Delimited JSON) writer
///
/// Writes rows as NDJSON, one JSON object per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonWriter<W> {
    /// Create a new NDJSON writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single row as an NDJSON line
    pub fn write(&mut self, row: &Row) -> Result<(), SinkError> {
        let json = serde_json::to_string(row)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }

    /// Write multiple rows
    pub fn write_all(&mut self, rows: &[Row]) -> Result<(), SinkError> {
        for row in rows {
            self.write(row)?;
        }
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_union_columns_preserves_first_appearance_order() {
        let rows = vec![
            make_row(&[("TID", "1"), ("message_id", "m1"), ("A", "x")]),
            make_row(&[("TID", "1"), ("message_id", "m2"), ("B", "y")]),
        ];
        let columns = union_columns(&rows);
        assert_eq!(columns, vec!["TID", "message_id", "A", "B"]);
    }

    #[test]
    fn test_write_csv_fills_sparse_cells() {
        let rows = vec![
            make_row(&[("TID", "1"), ("A", "x")]),
            make_row(&[("TID", "1"), ("B", "y")]),
        ];
        let mut buf = Vec::new();
        write_csv(&mut buf, &rows).unwrap();

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "TID,A,B");
        assert_eq!(lines[1], "1,x,");
        assert_eq!(lines[2], "1,,y");
    }

    #[test]
    fn test_ndjson_writer() {
        let rows = vec![
            make_row(&[("TID", "1"), ("A", "x")]),
            make_row(&[("TID", "2"), ("B", "y")]),
        ];
        let mut buf = Vec::new();
        let mut writer = NdjsonWriter::new(&mut buf);
        writer.write_all(&rows).unwrap();
        writer.flush().unwrap();

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"TID\":\"1\""));
        assert!(lines[1].contains("\"B\":\"y\""));
    }
}
