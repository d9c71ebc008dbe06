use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use factoid::{meta, Registry, RegistryConfig};
use factoid_guidelines::{ingest, IngestMode, IngestReport};
use tracing::info;
use tracing_subscriber::EnvFilter;

// Binding held only for the duration of an import with no --bind.
const IMPORT_ROUTING_KEY: &str = "\u{1}import";

/// Load a guideline document into a named factoid database.
#[derive(Parser, Debug)]
#[command(name = "factoid-import", version, about)]
struct Cli {
    /// Guideline document to read.
    guide: PathBuf,

    /// Target database name (letters and digits, not starting with a digit).
    database: String,

    /// Document layout: `index` for table-of-contents bullets, `reasons`
    /// for anchored headings with their reason paragraphs.
    #[arg(long, default_value_t = IngestMode::Index)]
    mode: IngestMode,

    /// Title recorded when the database is created.
    #[arg(long)]
    title: Option<String>,

    /// Data directory (overrides FACTOID_DATA_DIR).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Delete an existing database of the same name first.
    #[arg(long)]
    replace: bool,

    /// Leave this routing key bound to the database afterwards.
    #[arg(long, value_name = "KEY")]
    bind: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Read the whole guide before touching any database, so a bad path or
    // undecodable text cannot cost an existing database under --replace.
    let guide = fs::read_to_string(&cli.guide)
        .with_context(|| format!("failed to read {}", cli.guide.display()))?;

    let mut config = RegistryConfig::from_env();
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }
    let mut registry = Registry::open(config).context("failed to open factoid registry")?;

    let name = cli.database.as_str();
    let is_default = name == registry.config().default_database;

    if cli.replace && !is_default && registry.exists(name) {
        registry
            .remove(name)
            .with_context(|| format!("failed to remove database {name}"))?;
    }
    if !is_default && !registry.exists(name) {
        registry
            .create(name, cli.title.as_deref())
            .with_context(|| format!("failed to create database {name}"))?;
    }

    let routing_key = cli.bind.as_deref().unwrap_or(IMPORT_ROUTING_KEY);
    registry
        .load(name, routing_key)
        .with_context(|| format!("failed to load database {name}"))?;

    let imported = (|| -> Result<IngestReport> {
        let db = registry.select(routing_key);
        if is_default {
            if let Some(title) = cli.title.as_deref() {
                db.set_metadata(meta::TITLE, title)?;
            }
        }
        ingest(guide.as_bytes(), db, cli.mode)
            .with_context(|| format!("failed to import {}", cli.guide.display()))
    })();

    // The transient binding goes whether or not the import succeeded.
    if cli.bind.is_none() {
        registry
            .unbind(IMPORT_ROUTING_KEY)
            .context("failed to drop import binding")?;
    }
    let report = imported?;

    info!(database = name, mode = %cli.mode, ?report, "import finished");
    println!(
        "{name}: {} lines read, {} sections, {} rules, {} aliases, {} reason lines",
        report.lines_read, report.sections, report.rules, report.aliases, report.reason_lines
    );
    Ok(())
}
