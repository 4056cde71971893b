use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use revlog_kernel::adapters::document::{Document, ProxyResolver, SchemaRegistry};
use revlog_kernel::config::RevertConfig;
use revlog_kernel::log::{
    InMemoryLogStore, LogEntry, LogQuery, LogStore, ObjectClass, ObjectId, SortOrder, Version,
};
use revlog_kernel::revert::RevertEngine;

/// Revlog audit log CLI
#[derive(Parser, Debug)]
#[command(name = "revlog")]
#[command(about = "Browse audit history and revert documents", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List log entries of an object, newest first
    History {
        /// Path to log entries JSON
        #[arg(long)]
        log: String,

        /// Object identifier
        #[arg(long)]
        object: String,

        /// Object class
        #[arg(long)]
        class: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        skip: Option<usize>,
    },

    /// Revert a document and print it
    Revert(RevertArgs),

    /// Print the reconstructed state without applying it
    Show(SourceArgs),
}

#[derive(Args, Debug)]
struct RevertArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Path to revert config JSON
    #[arg(long)]
    config: Option<String>,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Path to log entries JSON
    #[arg(long)]
    log: String,

    /// Path to schema JSON
    #[arg(long)]
    schema: String,

    /// Path to the current document JSON
    #[arg(long)]
    document: String,

    /// Target version
    #[arg(long)]
    version: Version,
}

/// Wrapper for history output
#[derive(Debug, Serialize)]
struct HistoryOutput {
    object_id: ObjectId,
    object_class: ObjectClass,
    entries: Vec<LogEntry>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::History {
            log,
            object,
            class,
            limit,
            skip,
        } => {
            let store = load_log(&log)?;
            let query = LogQuery::new(ObjectId::new(object), ObjectClass::new(class))
                .order(SortOrder::Descending)
                .page(limit, skip);

            let output = HistoryOutput {
                object_id: query.object_id.clone(),
                object_class: query.object_class.clone(),
                entries: store.list(&query)?,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Revert(args) => {
            let config = load_config(args.config.as_deref())?;
            let (engine, mut document) = prepare(&args.source, config)?;
            engine.revert(&mut document, args.source.version)?;
            println!("{}", serde_json::to_string_pretty(&document.to_json())?);
        }
        Command::Show(args) => {
            let (engine, document) = prepare(&args, RevertConfig::default_config())?;
            let state = engine.reconstruct(&document, args.version)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}

// ----------------------------
// Load metadata log
// ----------------------------
fn load_log(path: &str) -> Result<InMemoryLogStore> {
    let data = fs::read_to_string(path).with_context(|| format!("reading log {path}"))?;
    let mut entries: Vec<LogEntry> = serde_json::from_str(&data)?;

    // Files may list entries in any order; the store wants them ascending
    entries.sort_by_key(|e| e.version);

    tracing::debug!(path, entries = entries.len(), "loaded log");
    Ok(InMemoryLogStore::from_entries(entries)?)
}

// ----------------------------
// Load revert config
// ----------------------------
fn load_config(path: Option<&str>) -> Result<RevertConfig> {
    let Some(path) = path else {
        return Ok(RevertConfig::default_config());
    };

    let data = fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
    let config: RevertConfig = serde_json::from_str(&data)?;
    tracing::debug!(path, strict = config.strict, "loaded revert config");
    Ok(config)
}

// ----------------------------
// Wire the engine
// ----------------------------
fn prepare(
    args: &SourceArgs,
    config: RevertConfig,
) -> Result<(RevertEngine<Document, InMemoryLogStore>, Document)> {
    let store = load_log(&args.log)?;

    let schema = fs::read_to_string(&args.schema)
        .with_context(|| format!("reading schema {}", args.schema))?;
    let registry = Arc::new(SchemaRegistry::from_json(&schema)?);
    tracing::debug!(path = %args.schema, "loaded schema");

    let document = fs::read_to_string(&args.document)
        .with_context(|| format!("reading document {}", args.document))?;
    let document = Document::from_json(serde_json::from_str(&document)?)?;
    tracing::debug!(
        path = %args.document,
        class = %document.class(),
        "loaded document"
    );

    let engine = RevertEngine::<Document, _>::builder(store, registry.clone(), Arc::new(ProxyResolver::new()))
        .versioned_fields(registry)
        .config(config)
        .build()?;

    Ok((engine, document))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_rejects_revert_config() {
        let args = [
            "revlog", "show", "--log", "l.json", "--schema", "s.json", "--document", "d.json",
            "--version", "2",
        ];
        assert!(Cli::try_parse_from(args).is_ok());

        let with_config = args.iter().copied().chain(["--config", "c.json"]);
        assert!(Cli::try_parse_from(with_config).is_err());
    }

    #[test]
    fn revert_accepts_revert_config() {
        let cli = Cli::try_parse_from([
            "revlog", "revert", "--log", "l.json", "--schema", "s.json", "--document", "d.json",
            "--version", "2", "--config", "c.json",
        ])
        .unwrap();

        let Command::Revert(args) = cli.command else {
            panic!("expected revert");
        };
        assert_eq!(args.config.as_deref(), Some("c.json"));
        assert_eq!(args.source.version, 2);
    }

    #[test]
    fn missing_config_path_uses_default() {
        assert_eq!(load_config(None).unwrap(), RevertConfig::default_config());
    }
}
