//! ofilter - sanitize MongoDB-style query documents against a policy
//!
//! Usage:
//!   ofilter sanitize --policy policy.json --query query.json
//!   ofilter sanitize --policy policy.json --mode silent < query.json
//!   ofilter sanitize --policy policy.json --mode report --pretty
//!   ofilter check --policy policy.json --query query.json
//!
//! The policy file uses the same keys as the library's `ConfigOverride`:
//!
//! ```json
//! {
//!   "allowedFields": ["age", {"field": "results", "operators": {"$elemMatch": true}}],
//!   "topLevelOperators": {"$text": true},
//!   "errorHandling": {"throw": false}
//! }
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::debug;

use ouroboros_filter::{ConfigOverride, ErrorHandling, QueryFilter, Violation};

#[derive(Parser)]
#[command(name = "ofilter")]
#[command(about = "Schema-driven query permission filter", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the sanitized query
    Sanitize {
        #[command(flatten)]
        input: InputArgs,

        /// How violations are handled (defaults to the policy's setting)
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Pretty-print the sanitized query
        #[arg(long)]
        pretty: bool,
    },
    /// List the clauses the policy would remove; exits with 1 if any
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Policy file (JSON)
    #[arg(short, long)]
    policy: PathBuf,

    /// Query file (JSON); reads stdin when omitted
    #[arg(short, long)]
    query: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Fail on the first violation
    Throw,
    /// Print each violation to stderr and keep the allowed clauses
    Report,
    /// Keep the allowed clauses without reporting
    Silent,
}

impl Mode {
    fn error_handling(self) -> ErrorHandling {
        match self {
            Mode::Throw => ErrorHandling::raise(),
            Mode::Report => ErrorHandling::callback(|event| {
                eprintln!("rejected {}: {}", event.context.kind, event.message);
            }),
            Mode::Silent => ErrorHandling::silent(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Sanitize {
            input,
            mode,
            pretty,
        } => {
            let (policy, query) = load_inputs(&input)?;
            let policy = apply_mode(policy, mode);
            let filter = QueryFilter::from_override(&policy);

            let cleaned = filter.process(&query)?;
            let rendered = if pretty {
                serde_json::to_string_pretty(&cleaned)?
            } else {
                serde_json::to_string(&cleaned)?
            };
            println!("{}", rendered);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { input } => {
            let (policy, query) = load_inputs(&input)?;
            let outcome = QueryFilter::from_override(&policy).inspect(&query)?;

            for violation in &outcome.violations {
                eprintln!("{}", describe(violation));
            }
            debug!(violations = outcome.violations.len(), "Check finished");

            if outcome.is_clean() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
    }
}

fn load_inputs(input: &InputArgs) -> Result<(ConfigOverride, Value)> {
    let policy = read_policy(&input.policy)?;
    let query = match &input.query {
        Some(path) => read_json(path)?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read query from stdin")?;
            serde_json::from_str(&text).context("Query on stdin is not valid JSON")?
        }
    };
    Ok((policy, query))
}

fn read_policy(path: &Path) -> Result<ConfigOverride> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file {}", path.display()))?;
    ConfigOverride::from_json_str(&text)
        .with_context(|| format!("Invalid policy file {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn apply_mode(policy: ConfigOverride, mode: Option<Mode>) -> ConfigOverride {
    match mode {
        Some(mode) => policy.error_handling(mode.error_handling()),
        None => policy,
    }
}

fn describe(violation: &Violation) -> String {
    let context = &violation.context;
    match &context.rejected_operators {
        Some(operators) => format!(
            "{} {} [{}]: {}",
            context.kind,
            context.field_name,
            operators.join(", "),
            violation.message
        ),
        None => format!("{} {}: {}", context.kind, context.field_name, violation.message),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .try_init()
        .ok(); // Ignore error if already initialized
}
