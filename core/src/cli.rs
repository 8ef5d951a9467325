use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use chrono::TimeDelta;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::init::InitBuilder;
use crate::interpreter::semantic_validator::{self, Severity as RuleSeverity};
use crate::interpreter::types::ast;
use crate::interpreter::{load_unit_file, Builder, Desc, Host};

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Sift - statement engine for network-analysis scripts", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a unit and report diagnostics and validator findings
    Check {
        /// Unit file (JSON AST)
        unit: PathBuf,
    },

    /// Print a unit's statement tree
    Describe {
        unit: PathBuf,

        /// Structural encoding instead of source-like text
        #[arg(long)]
        compact: bool,

        /// Include per-statement access stats
        #[arg(long)]
        stats: bool,
    },

    /// Execute a unit's body and drive its triggers
    Run {
        unit: PathBuf,

        /// Advance network time by this many seconds (repeatable)
        #[arg(long = "advance", value_name = "SECS")]
        advance: Vec<f64>,

        /// Print the statement tree with access stats afterwards
        #[arg(long)]
        stats: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

/// Run the CLI with provided arguments
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    let mut init = InitBuilder::new();
    if let Some(path) = &cli.config {
        init = init.config_path(path);
    }
    let config = init.init()?;

    match cli.command {
        Commands::Check { unit } => check(&unit),
        Commands::Describe {
            unit,
            compact,
            stats,
        } => {
            let unit = load_unit_file(&unit)?;
            let mut d = if compact {
                Desc::compact()
            } else {
                Desc::readable().with_stats(stats || config.engine.include_stats)
            };
            unit.body.describe(&mut d);
            println!("{}", d.as_str());
            Ok(())
        }
        Commands::Run {
            unit,
            advance,
            stats,
        } => run(&unit, &advance, stats, config),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn check(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: ast::Unit =
        serde_json::from_str(&text).with_context(|| format!("Invalid unit {}", path.display()))?;

    let unit = Builder::build_unit(&parsed);
    for diag in unit.diagnostics.iter() {
        println!("{}", diag);
    }
    if unit.diagnostics.has_errors() {
        bail!(
            "{}: {} construction error(s)",
            unit.name,
            unit.diagnostics.error_count()
        );
    }

    let findings = semantic_validator::validate_unit(&unit);
    for finding in &findings {
        println!("{}", finding);
    }
    let errors = findings
        .iter()
        .filter(|f| f.severity == RuleSeverity::Error)
        .count();
    if errors > 0 {
        bail!("{}: {} validation error(s)", unit.name, errors);
    }

    println!(
        "{}: ok ({} warning(s))",
        unit.name,
        unit.diagnostics.len() + findings.len()
    );
    Ok(())
}

fn run(path: &Path, advance: &[f64], stats: bool, config: &Config) -> Result<()> {
    let unit = load_unit_file(path)?;
    let host = Rc::new(Host::from_config(config));
    let frame = unit.new_frame(Rc::clone(&host));

    let (result, flow) = unit.run(&frame)?;
    tracing::debug!(unit = %unit.name, ?flow, "body finished");
    host.triggers().check_all(host.now());
    flush(&host);

    for secs in advance {
        let delta = TimeDelta::try_milliseconds((secs * 1000.0).round() as i64)
            .with_context(|| format!("Time step out of range: {}", secs))?;
        host.advance_time(host.now() + delta);
        flush(&host);
    }

    if let Some(v) = result {
        println!("=> {}", v);
    }

    let trigger_stats = host.triggers().stats();
    println!(
        "triggers: {} registered, {} fired, {} timed out, {} pending",
        trigger_stats.registered,
        trigger_stats.fired,
        trigger_stats.timed_out,
        host.triggers().pending_count()
    );

    if stats {
        let mut d = Desc::readable().with_stats(true);
        unit.body.describe(&mut d);
        println!("{}", d.as_str());
    }

    host.shutdown();
    Ok(())
}

fn flush(host: &Host) {
    for line in host.drain_output() {
        println!("{}", line);
    }
    for event in host.drain_events() {
        println!("event {}", event);
    }
}
