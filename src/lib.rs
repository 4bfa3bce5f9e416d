//! # Tracemill: Trigger-Driven Trace Extraction
//!
//! Tracemill extracts structured transaction records from large,
//! semi-structured text trace logs (e.g., telecom protocol captures) using
//! a declarative trigger configuration instead of a hand-coded parser per
//! log format.
//!
//! ## How it works
//!
//! Two cooperating state machines do the work:
//!
//! - The **trigger config parser** turns a tab-delimited config file into
//!   an ordered sequence of trigger definitions (transaction name, start
//!   pattern, timestamp pattern, message pattern, and per-section
//!   parameter patterns).
//! - The **trace scanner** replays those triggers against the raw trace,
//!   line by line, assembling transactions composed of messages composed
//!   of fields, and projects them to flattened rows.
//!
//! ## Example trigger config
//!
//! ```text
//! TRANSACTION_NAME	Create PDP
//! TRANSACTION_START_TRIGGER	CALL START
//! MSG_TIMESTAMP_TRIGGER	(\d+)\s+(\S+)\s+(.*)
//! MSG_TRIGGER	Message (\d+)
//! SECTION_TRIGGER	Quality of Service
//! SECTION_PARAM	Delay class=
//! SECTION_PARAM	Peak throughput=
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tracemill::PlainTraceReader;
//!
//! let reader = PlainTraceReader::from_files("triggers.txt", "trace.txt")?;
//! for row in reader.rows() {
//!     println!("{:?}", row);
//! }
//! ```
//!
//! A second reader, [`CsvTraceReader`], covers the degenerate case of
//! traces that are already tabular: a `field<TAB>dtype` schema config plus
//! a delimited file loaded into a typed in-memory table.

// Core modules
pub mod config;
pub mod engine;
pub mod output;
pub mod reader;
pub mod transaction;
pub mod trigger;

// Re-export key types
pub use config::TriggerConfigParser;
pub use engine::{ScanError, TraceScanner};
pub use output::{write_csv, NdjsonWriter, SinkError};
pub use reader::{CellValue, ColumnType, CsvTraceReader, PlainTraceReader, ReaderError, Table};
pub use transaction::{Message, Row, Transaction};
pub use trigger::{SectionTrigger, TransactionTrigger};
