//! Reference Validator CLI
//!
//! Validates links, labels and registered figures across a document tree.
//!
//! Exit codes: 0 clean, 1 issues found, 2 usage or I/O error.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use refgraph::{ArtifactRegistry, RefConfig, ReferenceValidator, ValidationReport};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ref-validator")]
#[command(about = "Validate cross-document references in a manuscript tree")]
struct Cli {
    /// Config file layered over refgraph.toml and REFGRAPH__* variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// List individual broken items
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate markdown links with <dir> as the root
    Markdown {
        dir: PathBuf,
    },

    /// Validate links across a repository and optionally write a report
    Links {
        /// Repository root
        #[arg(long, default_value = ".")]
        repo_root: PathBuf,
        /// Markdown report destination
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Links plus labels/references plus registered figures
    Integrity {
        dir: PathBuf,
        /// Figure registry store (defaults to the configured store under <dir>)
        #[arg(short, long)]
        registry: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli);
    if let Err(e) = &result {
        eprintln!("❌ Error: {:#}", e);
    }
    std::process::exit(exit_code(&result));
}

/// 0 clean, 1 issues found, 2 when the run itself failed
fn exit_code(result: &anyhow::Result<i32>) -> i32 {
    match result {
        Ok(code) => *code,
        Err(_) => 2,
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = RefConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    let report = match &cli.command {
        Commands::Markdown { dir } => {
            let dir = existing_dir(dir)?;
            ReferenceValidator::from_config(&config).scan(&dir)?
        }

        Commands::Links { repo_root, output } => {
            let root = existing_dir(repo_root)?;
            let report = ReferenceValidator::from_config(&config).scan(&root)?;
            if let Some(path) = output {
                std::fs::write(path, report.to_markdown())
                    .with_context(|| format!("writing report to {}", path.display()))?;
                eprintln!("✅ Report written to {:?}", path);
            }
            report
        }

        Commands::Integrity { dir, registry } => {
            let dir = existing_dir(dir)?;
            let store = registry.clone().unwrap_or_else(|| config.store_path(&dir));

            // Auditing never creates, resets or backs up a store.
            let registry = if store.exists() {
                Some(
                    ArtifactRegistry::open_read_only(&store)
                        .with_context(|| format!("reading registry {}", store.display()))?,
                )
            } else {
                None
            };

            let mut validator = ReferenceValidator::from_config(&config).with_symbols(true);
            if let Some(registry) = registry.as_ref() {
                validator = validator.with_registry(registry);
            }
            validator.scan(&dir)?
        }
    };

    match cli.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print_text_report(&report, cli.verbose, config.validation.max_listed),
    }

    Ok(report.exit_code())
}

fn existing_dir(path: &Path) -> anyhow::Result<PathBuf> {
    if !path.is_dir() {
        anyhow::bail!("directory not found: {}", path.display());
    }
    Ok(path.to_path_buf())
}

fn print_text_report(report: &ValidationReport, verbose: bool, max_listed: usize) {
    println!("🔍 Reference validation: {}\n", report.root);
    println!("   Files scanned: {}", report.files_scanned);
    println!("   Valid links:   {}", report.valid_links);
    println!("   Broken links:  {}", report.broken_links);

    if let Some(symbols) = &report.symbols {
        println!("   Labels:        {}", symbols.table.labels.len());
        println!("   Dangling refs: {}", symbols.dangling.len());
        println!("   Duplicates:    {}", symbols.duplicates.len());
    }
    if let Some(artifacts) = &report.artifacts {
        println!(
            "   Figures:       {} registered, {} missing",
            artifacts.registered,
            artifacts.missing.len()
        );
    }
    if let Some(fingerprint) = &report.fingerprint {
        println!("   Fingerprint:   {}", fingerprint.short());
    }

    for warning in &report.warnings {
        println!("   ⚠️  skipped {}: {}", warning.file, warning.message);
    }

    if verbose {
        let broken: Vec<String> = report
            .broken()
            .map(|l| {
                let hint = l
                    .suggestion
                    .as_ref()
                    .map(|s| format!(" (did you mean {}?)", s))
                    .unwrap_or_default();
                format!(
                    "{}:{} [{}]({}){}",
                    l.occurrence.source_file, l.occurrence.line, l.occurrence.text, l.occurrence.raw_target, hint
                )
            })
            .collect();
        print_capped("Broken links", &broken, max_listed);

        if let Some(symbols) = &report.symbols {
            let dangling: Vec<String> = symbols
                .dangling
                .iter()
                .map(|d| format!("{}:{} {}", d.location.file, d.location.line, d.name))
                .collect();
            print_capped("Dangling references", &dangling, max_listed);

            let duplicates: Vec<String> = symbols
                .duplicates
                .iter()
                .map(|d| {
                    format!(
                        "{} at {}:{} (first at {}:{})",
                        d.name, d.duplicate.file, d.duplicate.line, d.first.file, d.first.line
                    )
                })
                .collect();
            print_capped("Duplicate labels", &duplicates, max_listed);
        }

        if let Some(artifacts) = &report.artifacts {
            let missing: Vec<String> = artifacts
                .missing
                .iter()
                .map(|m| format!("{} → {}", m.label, m.filename))
                .collect();
            print_capped("Missing figures", &missing, max_listed);
        }
    }

    println!();
    if report.is_clean() {
        println!("✅ All references resolve");
    } else {
        println!("❌ {} issue(s) found", report.issue_count());
    }
}

fn print_capped(title: &str, items: &[String], max: usize) {
    for line in capped_lines(title, items, max) {
        println!("{}", line);
    }
}

/// A titled list showing at most `max` items, then a count of the rest
fn capped_lines(title: &str, items: &[String], max: usize) -> Vec<String> {
    if items.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![format!("\n{}:", title)];
    lines.extend(items.iter().take(max).map(|item| format!("  └─ {}", item)));
    if items.len() > max {
        lines.push(format!("  ... and {} more", items.len() - max));
    }
    lines
}
