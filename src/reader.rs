//! File readers driving the extraction engines.
//!
//! Two reader types cover the two trace formats:
//! - [`PlainTraceReader`] runs the trigger config parser over a config file
//!   and then the trace scanner over a free-form trace file, streaming one
//!   line at a time.
//! - [`CsvTraceReader`] reads a fixed column schema (`field<TAB>dtype` per
//!   line) and loads a delimited trace directly into a typed in-memory
//!   table.
//!
//! Both fail fast on empty or missing paths, before any parsing begins.
//! In-stream anomalies never interrupt a scan; the caller gets either a
//! complete result or a fatal error.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDateTime;
use indexmap::IndexMap;

use crate::config::TriggerConfigParser;
use crate::engine::{ScanError, TraceScanner};
use crate::transaction::Row;
use crate::trigger::TransactionTrigger;

/// Error type for reader operations.
#[derive(Debug)]
pub enum ReaderError {
    /// Empty path given for a config or trace file
    InvalidPath,
    /// File could not be opened or read
    Io {
        path: String,
        source: std::io::Error,
    },
    /// Trace scanning failed (bad pattern or capture contract)
    Scan(ScanError),
    /// Delimited trace could not be parsed
    Csv(csv::Error),
    /// A schema column is missing from the delimited trace header
    MissingColumn(String),
    /// A cell value does not parse under its declared column type
    InvalidCell { column: String, value: String },
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::InvalidPath => write!(f, "Incorrect file name: empty path"),
            ReaderError::Io { path, source } => {
                write!(f, "Failed to read file {}: {}", path, source)
            }
            ReaderError::Scan(e) => write!(f, "Trace scan failed: {}", e),
            ReaderError::Csv(e) => write!(f, "CSV error: {}", e),
            ReaderError::MissingColumn(column) => {
                write!(f, "Schema column '{}' not found in trace header", column)
            }
            ReaderError::InvalidCell { column, value } => {
                write!(f, "Value '{}' is invalid for column '{}'", value, column)
            }
        }
    }
}

impl std::error::Error for ReaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReaderError::Io { source, .. } => Some(source),
            ReaderError::Scan(e) => Some(e),
            ReaderError::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ScanError> for ReaderError {
    fn from(err: ScanError) -> Self {
        ReaderError::Scan(err)
    }
}

impl From<csv::Error> for ReaderError {
    fn from(err: csv::Error) -> Self {
        ReaderError::Csv(err)
    }
}

fn open_buffered(path: &Path) -> Result<BufReader<File>, ReaderError> {
    if path.as_os_str().is_empty() {
        return Err(ReaderError::InvalidPath);
    }
    let file = File::open(path).map_err(|source| ReaderError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn read_line_error(path: &Path, source: std::io::Error) -> ReaderError {
    ReaderError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Reader for free-form text traces described by a trigger config.
///
/// # Example
/// ```ignore
/// use tracemill::reader::PlainTraceReader;
///
/// let reader = PlainTraceReader::from_files("triggers.txt", "trace.txt")?;
/// for row in reader.rows() {
///     println!("{:?}", row);
/// }
/// ```
#[derive(Debug, Default)]
pub struct PlainTraceReader {
    triggers: Vec<TransactionTrigger>,
    rows: Vec<Row>,
}

impl PlainTraceReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a trigger config and then extract transactions from a trace.
    pub fn from_files(
        config_path: impl AsRef<Path>,
        trace_path: impl AsRef<Path>,
    ) -> Result<Self, ReaderError> {
        let mut reader = Self::new();
        reader.read_config_file(config_path)?;
        reader.read_trace_file(trace_path)?;
        Ok(reader)
    }

    /// Parse the trigger config file.
    ///
    /// # Returns
    /// The number of complete triggers found.
    pub fn read_config_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ReaderError> {
        let path = path.as_ref();
        let file = open_buffered(path)?;
        let mut parser = TriggerConfigParser::new();
        for line in file.lines() {
            let line = line.map_err(|e| read_line_error(path, e))?;
            if !parser.push_line(&line) {
                // Line without a key/value pair: treated as end of input.
                break;
            }
        }
        self.triggers = parser.finish();
        tracing::debug!(
            path = %path.display(),
            triggers = self.triggers.len(),
            "trigger config loaded"
        );
        Ok(self.triggers.len())
    }

    /// Scan the trace file with the loaded triggers, one line at a time.
    ///
    /// # Returns
    /// The number of result rows collected.
    pub fn read_trace_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ReaderError> {
        let path = path.as_ref();
        let file = open_buffered(path)?;
        let mut scanner = TraceScanner::new(&self.triggers)?;
        for line in file.lines() {
            let line = line.map_err(|e| read_line_error(path, e))?;
            scanner.push_line(&line)?;
        }
        self.rows = scanner.finish()?;
        tracing::debug!(
            path = %path.display(),
            rows = self.rows.len(),
            "trace extracted"
        );
        Ok(self.rows.len())
    }

    /// Triggers collected from the config file.
    pub fn triggers(&self) -> &[TransactionTrigger] {
        &self.triggers
    }

    /// Extracted result rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consume the reader and take the result rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Column type declared in a tabular schema config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    DateTime,
}

impl ColumnType {
    /// Map a dtype string from the schema config. Datetime spellings
    /// include the pandas-style `datetime64[ns]`; anything unrecognized
    /// is read as text.
    pub fn from_dtype(dtype: &str) -> Self {
        let dtype = dtype.trim();
        if dtype.starts_with("datetime") {
            ColumnType::DateTime
        } else if dtype.starts_with("int") || dtype.starts_with("uint") {
            ColumnType::Integer
        } else if dtype.starts_with("float") {
            ColumnType::Float
        } else {
            ColumnType::Text
        }
    }
}

/// One typed cell in a loaded table.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Null,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(x) => write!(f, "{}", x),
            CellValue::DateTime(dt) => write!(f, "{}", dt),
            CellValue::Null => write!(f, ""),
        }
    }
}

/// Accepted datetime layouts for `ColumnType::DateTime` cells.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
];

fn parse_cell(column: &str, column_type: ColumnType, raw: &str) -> Result<CellValue, ReaderError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(CellValue::Null);
    }
    let invalid = || ReaderError::InvalidCell {
        column: column.to_string(),
        value: raw.to_string(),
    };
    match column_type {
        ColumnType::Text => Ok(CellValue::Text(raw.to_string())),
        ColumnType::Integer => raw.parse().map(CellValue::Integer).map_err(|_| invalid()),
        ColumnType::Float => raw.parse().map(CellValue::Float).map_err(|_| invalid()),
        ColumnType::DateTime => DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(CellValue::DateTime)
            .ok_or_else(invalid),
    }
}

/// In-memory table loaded from a delimited trace.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Reader for delimited traces with a fixed column schema.
///
/// The schema config is one `field<TAB>dtype` pair per line, no blank-line
/// grouping; lines without a pair are skipped. Loading delegates to the
/// `csv` crate; datetime columns are parsed with `chrono`.
#[derive(Debug, Default)]
pub struct CsvTraceReader {
    schema: IndexMap<String, ColumnType>,
    table: Table,
}

impl CsvTraceReader {
    /// Default field separator, matching the trigger config convention.
    pub const DEFAULT_SEPARATOR: char = '\t';

    pub fn new() -> Self {
        Self::default()
    }

    /// Read schema and trace with the default separator and no skipped rows.
    pub fn from_files(
        config_path: impl AsRef<Path>,
        trace_path: impl AsRef<Path>,
    ) -> Result<Self, ReaderError> {
        let mut reader = Self::new();
        reader.read_schema_file(config_path)?;
        reader.read_trace_file(trace_path, Self::DEFAULT_SEPARATOR, 0)?;
        Ok(reader)
    }

    /// Parse the schema config file.
    ///
    /// # Returns
    /// The number of schema fields found.
    pub fn read_schema_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ReaderError> {
        let path = path.as_ref();
        let file = open_buffered(path)?;
        for line in file.lines() {
            let line = line.map_err(|e| read_line_error(path, e))?;
            let mut parts = line.split('\t');
            let (Some(field), Some(dtype)) = (parts.next(), parts.next()) else {
                continue;
            };
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            self.schema
                .insert(field.to_string(), ColumnType::from_dtype(dtype));
        }
        tracing::debug!(
            path = %path.display(),
            fields = self.schema.len(),
            "table schema loaded"
        );
        Ok(self.schema.len())
    }

    /// Load a delimited trace into memory using the loaded schema.
    ///
    /// Only the schema's columns are kept, in schema order. The first
    /// non-skipped line must be a header naming every schema column.
    ///
    /// # Arguments
    /// * `sep` - field separator
    /// * `skip_rows` - lines to discard before the header
    ///
    /// # Returns
    /// The number of data rows loaded.
    pub fn read_trace_file(
        &mut self,
        path: impl AsRef<Path>,
        sep: char,
        skip_rows: usize,
    ) -> Result<usize, ReaderError> {
        let path = path.as_ref();
        let mut file = open_buffered(path)?;
        for _ in 0..skip_rows {
            let mut discard = String::new();
            let read = file
                .read_line(&mut discard)
                .map_err(|e| read_line_error(path, e))?;
            if read == 0 {
                break;
            }
        }

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(sep as u8)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        // Map each schema column to its position in the trace header.
        let headers = csv_reader.headers()?.clone();
        let mut positions = Vec::with_capacity(self.schema.len());
        for column in self.schema.keys() {
            let position = headers
                .iter()
                .position(|h| h.trim() == column)
                .ok_or_else(|| ReaderError::MissingColumn(column.clone()))?;
            positions.push(position);
        }

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let mut row = Vec::with_capacity(self.schema.len());
            for ((column, column_type), &position) in self.schema.iter().zip(&positions) {
                let raw = record.get(position).unwrap_or("");
                row.push(parse_cell(column, *column_type, raw)?);
            }
            rows.push(row);
        }

        self.table = Table {
            columns: self.schema.keys().cloned().collect(),
            rows,
        };
        tracing::debug!(
            path = %path.display(),
            rows = self.table.row_count(),
            "delimited trace loaded"
        );
        Ok(self.table.row_count())
    }

    /// Declared schema in config order.
    pub fn schema(&self) -> &IndexMap<String, ColumnType> {
        &self.schema
    }

    /// The loaded table.
    pub fn table(&self) -> &Table {
        &self.table
    }
}
