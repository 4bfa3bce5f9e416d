//! tracemill CLI - trigger-driven transaction extraction from trace logs
//!
//! Reads a trigger config and a trace file, extracts transactions, and
//! writes the flattened rows as CSV or NDJSON.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracemill::{output, CsvTraceReader, PlainTraceReader};

#[derive(Parser)]
#[command(name = "tracemill")]
#[command(version, about = "Trigger-driven transaction extraction from trace logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Csv,
    Ndjson,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract transactions from a plain-text trace
    Extract {
        /// Path to the trigger config file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the trace file
        #[arg(short, long)]
        trace: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },

    /// Parse a trigger config and report what was found
    Triggers {
        /// Path to the trigger config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Load a delimited trace using a column schema config
    Table {
        /// Path to the schema config file (field<TAB>dtype per line)
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the delimited trace file
        #[arg(short, long)]
        trace: PathBuf,

        /// Field separator
        #[arg(short, long, default_value = "\t")]
        sep: char,

        /// Lines to skip before the header
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Extract {
            config,
            trace,
            output: output_path,
            format,
        } => {
            let reader = PlainTraceReader::from_files(&config, &trace)?;
            let rows = reader.rows();

            let mut writer: Box<dyn Write> = match output_path {
                Some(path) => Box::new(File::create(path)?),
                None => Box::new(io::stdout()),
            };
            match format {
                OutputFormat::Csv => output::write_csv(&mut writer, rows)?,
                OutputFormat::Ndjson => {
                    let mut ndjson = output::NdjsonWriter::new(&mut writer);
                    ndjson.write_all(rows)?;
                    ndjson.flush()?;
                }
            }
            tracing::info!(rows = rows.len(), "extraction complete");
        }

        Commands::Triggers { config } => {
            let mut reader = PlainTraceReader::new();
            let triggers_found = reader.read_config_file(&config)?;
            println!("Triggers found: {}", triggers_found);
            for trigger in reader.triggers() {
                let parameters: usize = trigger
                    .sections
                    .iter()
                    .map(|s| s.parameter_patterns.len())
                    .sum();
                println!(
                    "  {}: {} sections, {} parameters",
                    trigger.name,
                    trigger.sections.len(),
                    parameters
                );
            }
        }

        Commands::Table {
            config,
            trace,
            sep,
            skip_rows,
        } => {
            let mut reader = CsvTraceReader::new();
            let fields = reader.read_schema_file(&config)?;
            let rows = reader.read_trace_file(&trace, sep, skip_rows)?;
            println!("Schema fields: {}", fields);
            println!("Rows loaded: {} x {} columns", rows, reader.table().column_count());
        }
    }
    Ok(())
}
