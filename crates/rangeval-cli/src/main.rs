use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rangeval_cache::ValidatorCache;
use rangeval_catalog::{InMemoryStore, MetadataStore};
use rangeval_core::{Config, Diagnostic, DiagnosticCode, Location, Report, Severity};
use rangeval_engine::{Compiler, ContextFile, ValidationContext};

/// rangeval - validation rule compiler for case report forms
#[derive(Parser)]
#[command(name = "rangeval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: rangeval.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every rule in a data dictionary and report problems
    Check {
        /// Data dictionary JSON file
        dictionary: PathBuf,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,
    },

    /// Evaluate one submitted value against a field's rule
    Eval {
        /// Data dictionary JSON file
        dictionary: PathBuf,

        table: String,

        field: String,

        /// Submitted value (use "" for blank)
        value: String,

        /// JSON file with the rest of the record and session values
        #[arg(long)]
        context: Option<PathBuf>,
    },

    /// Show the rule, parse tree and program compiled for a field
    Explain {
        /// Data dictionary JSON file
        dictionary: PathBuf,

        table: String,

        field: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("rangeval.toml").exists() {
        Config::from_file(Path::new("rangeval.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    match cli.command {
        Commands::Check { dictionary, output } => {
            check_command(&config, &dictionary, &output, cli.verbose)
        }
        Commands::Eval { dictionary, table, field, value, context } => {
            eval_command(&config, &dictionary, &table, &field, &value, context.as_deref()).await
        }
        Commands::Explain { dictionary, table, field } => {
            explain_command(&config, &dictionary, &table, &field)
        }
    }
}

/// Log to stderr; RUST_LOG wins over `-v`
fn init_tracing(verbose: bool) {
    let default = if verbose { "rangeval=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_dictionary(path: &Path) -> Result<Arc<InMemoryStore>> {
    let store = InMemoryStore::from_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to load data dictionary: {}", e))?;
    tracing::info!(path = %path.display(), tables = store.table_names().len(), "Loaded data dictionary");
    Ok(Arc::new(store))
}

/// Check command - compile every field and collect diagnostics
fn check_command(config: &Config, dictionary: &Path, output: &Path, verbose: bool) -> Result<()> {
    let store = load_dictionary(dictionary)?;
    let compiler = Compiler::new(store.clone(), config.compiler.clone());
    let cache = ValidatorCache::new();
    let mut report = Report::new();

    for table in store.table_names() {
        if verbose {
            eprintln!("{} {}...", "Checking".cyan(), table);
        }

        for definition in store.table_fields(&table)? {
            if config.skip.is_skipped(&table, &definition.field) {
                continue;
            }

            match cache.get_or_compile(&compiler, &table, &definition.field) {
                Ok(validator) => {
                    report.record_field(true);
                    if validator.source().is_derived() {
                        let diag = Diagnostic::new(
                            DiagnosticCode::DefaultRuleDerived,
                            Severity::Info,
                            format!("Default rule derived: {}", validator.source().text),
                        )
                        .with_location(Location::new(&table, &definition.field));
                        add_diagnostic(&mut report, config, diag);
                    }
                }
                Err(e) => {
                    report.record_field(false);
                    add_diagnostic(&mut report, config, e.to_diagnostic(&table, &definition.field));
                }
            }
        }
    }

    if verbose {
        let stats = cache.stats();
        eprintln!(
            "Compiled {} validators ({} failed)",
            stats.compilations, stats.failures
        );
    }

    report.save_to_file(output)?;

    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    print_report_summary(&report);

    // Exit with error code if there are errors
    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn add_diagnostic(report: &mut Report, config: &Config, mut diag: Diagnostic) {
    diag.severity = config.severity.get_severity(diag.code, diag.severity);
    report.add_diagnostic(diag);
}

/// Eval command - run one value through a compiled validator
async fn eval_command(
    config: &Config,
    dictionary: &Path,
    table: &str,
    field: &str,
    value: &str,
    context: Option<&Path>,
) -> Result<()> {
    let store = load_dictionary(dictionary)?;
    let compiler = Compiler::new(store, config.compiler.clone());

    let validator = match compiler.compile_field(table, field) {
        Ok(validator) => validator,
        Err(e) => {
            print_diagnostic(&e.to_diagnostic(table, field));
            std::process::exit(1);
        }
    };

    let mut ctx = ValidationContext::from_config(config);
    if let Some(path) = context {
        let file = ContextFile::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load context {}: {}", path.display(), e))?;
        ctx = file.apply(ctx);
    }

    let verdict = validator.evaluate(value, &ctx).await;

    if verdict.accepted {
        println!("{} {}.{} = {:?}", "✓ Accepted".green().bold(), table, field, value);
    } else {
        println!("{} {}.{} = {:?}", "✗ Rejected".red().bold(), table, field, value);
        if let Some(message) = &verdict.message {
            println!("  {}", message);
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Explain command - show what a field compiles to
fn explain_command(config: &Config, dictionary: &Path, table: &str, field: &str) -> Result<()> {
    let store = load_dictionary(dictionary)?;
    let compiler = Compiler::new(store, config.compiler.clone());

    let explanation = match compiler.explain(table, field) {
        Ok(explanation) => explanation,
        Err(e) => {
            print_diagnostic(&e.to_diagnostic(table, field));
            std::process::exit(1);
        }
    };

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{} {}.{}", "Rule for".bold().bright_blue(), table, field);
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    match &explanation.source.derived {
        Some(steps) => {
            let steps: Vec<String> = steps.iter().map(|s| s.to_string()).collect();
            println!("{} derived ({})", "Source:".bold(), steps.join(", "));
        }
        None => println!("{} authored", "Source:".bold()),
    }
    println!("{} {}", "Rule:".bold(), explanation.source.text);
    println!("{} {}", "Normalized:".bold(), explanation.normalized);
    println!("{} {}", "Digest:".bold(), explanation.digest);
    println!();

    println!("{}", "Parse tree:".bold());
    for line in explanation.tree.lines() {
        println!("  {}", line);
    }
    println!();

    println!("{}", "Program:".bold());
    for line in explanation.program.lines() {
        println!("  {}", line);
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());

    Ok(())
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "ERROR".red().bold(),
        Severity::Warn => "WARN".yellow().bold(),
        Severity::Info => "INFO".cyan(),
    }
}

fn print_diagnostic(diag: &Diagnostic) {
    println!("  [{}] {}: {}", severity_label(diag.severity), diag.code, diag.message);

    if let Some(loc) = &diag.location {
        print!("    at {}.{}", loc.table, loc.field);
        if let Some(offset) = loc.offset {
            print!(" (position {})", offset);
        }
        println!();
    }

    if let Some(fragment) = &diag.fragment {
        println!("    near: {}", fragment);
    }
}

/// Print report summary to stdout
fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Rule Check Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Fields checked:      {}", report.summary.fields_checked);
    println!("  Validators compiled: {}", report.summary.validators_compiled);
    println!("  Total diagnostics:   {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:     {}", report.summary.info);
    println!();

    let problems: Vec<&Diagnostic> = report
        .diagnostics
        .iter()
        .filter(|d| d.severity != Severity::Info)
        .collect();

    if problems.is_empty() {
        println!("{}", "✓ All rules compile!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in problems {
            print_diagnostic(diag);
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}
