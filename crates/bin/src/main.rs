//! Tasman CLI binary.
//!
//! Builds the analysis-ready panel from a SQLite extract store and writes the
//! panel and its diagnostics.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process;
use tasman::data::ExtractStore;
use tasman::data::schema::builtin_schemas;
use tasman::output::{AuditSummary, ExportFormat, Exporter, write_panel_csv};
use tasman::vars::available_variables;
use tasman::{Pipeline, PipelineConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tasman")]
#[command(about = "Tasman: firm-year panel merge and variable construction", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SummaryStyle {
    /// Plain-text table
    Ascii,
    /// Markdown tables
    Markdown,
    /// No summary
    None,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the panel from an extract store
    Run {
        /// SQLite extract store
        #[arg(long)]
        db: PathBuf,

        /// Pipeline config (JSON); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the panel as CSV
        #[arg(long)]
        out: Option<PathBuf>,

        /// Write diagnostics (.json or .csv)
        #[arg(long)]
        diagnostics: Option<PathBuf>,

        /// Audit summary printed after the run
        #[arg(long, value_enum, default_value = "ascii")]
        summary: SummaryStyle,
    },

    /// Print the built-in table schemas and derived variables
    Schema {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print an example config
    InitConfig,

    /// Show the tables in an extract store
    Stats {
        /// SQLite extract store
        #[arg(long)]
        db: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Run {
            db,
            config,
            out,
            diagnostics,
            summary,
        } => build_panel(
            &db,
            config.as_deref(),
            out.as_deref(),
            diagnostics.as_deref(),
            summary,
        )?,
        Commands::Schema { json } => print_schemas(json)?,
        Commands::InitConfig => println!("{}", PipelineConfig::example().to_json()?),
        Commands::Stats { db } => print_stats(&db)?,
    }
    Ok(())
}

fn build_panel(
    db: &Path,
    config: Option<&Path>,
    out: Option<&Path>,
    diagnostics: Option<&Path>,
    summary: SummaryStyle,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    let floor = config.match_rate_floor;

    let store = ExtractStore::open(db)?;
    info!(db = %db.display(), "Extract store opened");
    let output = Pipeline::new(config)?.run(&store)?;

    if let Some(path) = out {
        let rows = write_panel_csv(&output.panel, BufWriter::new(File::create(path)?))?;
        info!(path = %path.display(), rows, "Panel written");
    }
    if let Some(path) = diagnostics {
        let format = ExportFormat::from_path(path)?;
        output.diagnostics.export_to_file(path, format)?;
        info!(path = %path.display(), "Diagnostics written");
    }

    let audit = AuditSummary::from_diagnostics(&output.diagnostics, floor);
    match summary {
        SummaryStyle::Ascii => println!("{}", audit.to_ascii_table()),
        SummaryStyle::Markdown => println!("{}", audit.to_markdown()),
        SummaryStyle::None => {}
    }
    Ok(())
}

fn print_schemas(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let value = serde_json::json!({
            "schemas": builtin_schemas(),
            "variables": available_variables(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for schema in builtin_schemas() {
        println!("{}", schema);
    }
    println!("derived variables");
    for variable in available_variables() {
        println!("  {:<24} {}", variable.name, variable.description);
    }
    Ok(())
}

fn print_stats(db: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let stats = ExtractStore::open(db)?.stats()?;
    println!("{} tables", stats.tables);
    for (table, rows) in stats.rows {
        println!("  {:<32} {:>10}", table, rows);
    }
    Ok(())
}
