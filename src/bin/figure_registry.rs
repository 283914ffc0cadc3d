//! Figure Registry CLI
//!
//! Commands for registering and inspecting figures.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use refgraph::{ArtifactRegistry, FigureSpec, RefConfig, RefError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "figure-registry")]
#[command(about = "Durable registry of generated figures")]
struct Cli {
    /// Path to the registry store (defaults to the configured store)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Config file layered over refgraph.toml and REFGRAPH__* variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a figure (replaces an existing label unless --strict)
    Register {
        filename: String,
        #[arg(long)]
        caption: String,
        /// Defaults to fig:<filename stem>
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        width: Option<String>,
        #[arg(long)]
        placement: Option<String>,
        #[arg(long)]
        generator: Option<String>,
        /// Extra metadata as key=value, repeatable
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
        /// Fail if the label is already registered
        #[arg(long)]
        strict: bool,
    },

    /// Show a figure by label
    Get {
        label: String,
    },

    /// List figures in sequence order
    List {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = RefConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let store = match cli.store {
        Some(path) => path,
        None => config.store_path(&std::env::current_dir()?),
    };
    let registry = ArtifactRegistry::open_with_generator(&store, &config.registry.default_generator)
        .with_context(|| format!("opening registry {}", store.display()))?;

    match cli.command {
        Commands::Register {
            filename,
            caption,
            label,
            section,
            width,
            placement,
            generator,
            metadata,
            strict,
        } => {
            let spec = FigureSpec {
                filename,
                caption,
                label,
                section,
                width,
                placement,
                generator,
                metadata: metadata.into_iter().collect(),
            };

            let result = if strict {
                registry.register_or_fail(spec)
            } else {
                registry.register(spec)
            };

            match result {
                Ok(record) => {
                    println!("✅ Registered {} (#{}) → {}", record.label, record.sequence_id, record.filename);
                    Ok(0)
                }
                Err(e @ RefError::DuplicateLabel { .. }) => {
                    eprintln!("❌ {}", e);
                    Ok(1)
                }
                Err(e) => Err(e.into()),
            }
        }

        Commands::Get { label } => match registry.get(&label) {
            Some(record) => {
                println!("{}", serde_json::to_string_pretty(&record)?);
                Ok(0)
            }
            None => {
                eprintln!("❌ No figure registered as {}", label);
                Ok(1)
            }
        },

        Commands::List { json } => {
            let records = registry.list_by_sequence();
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!("📊 {} figure(s) in {:?}\n", records.len(), registry.path());
                for record in &records {
                    println!("  {}  {:<24} {}", record.sequence_id, record.label, record.filename);
                    if let Some(section) = &record.section {
                        println!("       section: {}", section);
                    }
                }
            }
            Ok(0)
        }
    }
}
