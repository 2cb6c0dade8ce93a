//! scriptctl - compile and evaluate VoltageEMS metering scripts

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use voltage_script::{EngineConfig, SamplePair, Script, ScriptEngine, ScriptRegistry, Unit};

#[derive(Parser)]
#[command(name = "scriptctl")]
#[command(about = "Compile and evaluate VoltageEMS metering scripts")]
#[command(long_about = "Compile and evaluate VoltageEMS metering scripts

Commands:
  check       Compile a script config and list every script
  eval        Evaluate output scripts over a sample pair

Examples:
  scriptctl check -c scripts.yaml
  scriptctl eval -c scripts.yaml -s interval.json
  scriptctl eval -c scripts.yaml -s interval.json --script import --unit kWh")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a script config and list every script
    Check {
        /// Config file (yaml, json or toml)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Evaluate output scripts over a sample pair
    Eval {
        /// Config file (yaml, json or toml)
        #[arg(short, long)]
        config: PathBuf,

        /// JSON file with `new` and optional `old` log records
        #[arg(short, long)]
        samples: PathBuf,

        /// Evaluate in this unit instead of each script's own
        #[arg(short, long)]
        unit: Option<String>,

        /// Only evaluate this script (outputs first, then integrations)
        #[arg(long)]
        script: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Eval {
            config,
            samples,
            unit,
            script,
        } => eval(&config, &samples, unit.as_deref(), script.as_deref()),
    }
}

fn load_engine(path: &Path) -> Result<ScriptEngine> {
    let config = EngineConfig::load_from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    config
        .build()
        .with_context(|| format!("Failed to compile scripts in {}", path.display()))
}

fn check(path: &Path) -> Result<()> {
    let engine = match load_engine(path) {
        Ok(engine) => engine,
        Err(e) => {
            println!("{} {}", "FAIL".red(), path.display());
            return Err(e);
        },
    };
    println!("{} {}", "OK".green(), path.display());

    print_section("Integrations", engine.integrations(), engine.integrations());
    print_section("Outputs", engine.outputs(), engine.integrations());
    Ok(())
}

fn print_section(title: &str, scripts: &ScriptRegistry, integrations: &ScriptRegistry) {
    println!();
    println!("{} ({})", title.bright_cyan(), scripts.len());
    for script in scripts {
        println!(
            "  {:<20} {:<6} p{} {}",
            script.name().bright_yellow(),
            script.unit(),
            script.precision(),
            script.formula_text(Some(integrations))
        );
    }
}

fn eval(path: &Path, samples: &Path, unit: Option<&str>, only: Option<&str>) -> Result<()> {
    let engine = load_engine(path)?;

    let json = std::fs::read_to_string(samples)
        .with_context(|| format!("Failed to read {}", samples.display()))?;
    let pair = SamplePair::from_json(&json)
        .with_context(|| format!("Invalid sample pair in {}", samples.display()))?;

    let unit = match unit {
        Some(name) => match Unit::from_name(name.trim()) {
            Some(unit) => Some(unit),
            None => bail!("Unknown unit: {}", name),
        },
        None => None,
    };

    if let Some(old) = &pair.old {
        engine.record_interval(old, &pair.new);
        debug!(
            from = old.unix_time,
            to = pair.new.unix_time,
            "Recorded interval into accumulation logs"
        );
    }

    let scripts: Vec<&Script> = match only {
        Some(name) => match engine.script(name) {
            Some(script) => vec![script],
            None => bail!("No script named '{}'", name),
        },
        None => engine.outputs().iter().collect(),
    };

    println!(
        "{} {:.4} h",
        "Interval:".bright_cyan(),
        pair.elapsed_hours()
    );
    for script in scripts {
        let unit = unit.unwrap_or(script.unit());
        let value = engine
            .evaluate(script.name(), pair.old.as_ref(), &pair.new, Some(unit))
            .unwrap_or(0.0);
        println!(
            "  {:<20} {} {}",
            script.name().bright_yellow(),
            unit.format_value(value),
            unit
        );
    }
    Ok(())
}
