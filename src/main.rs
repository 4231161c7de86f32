use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LogFormat, LoggingConfig};
use turnstile::{
    matcher, AdmissionEvaluator, DynamicListStore, LimiterRegistry, PolicyConfig, TurnstileConfig,
};

/// Per-client admission control for guarded operations.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate admission for a client and print one JSON decision per attempt
    Check {
        /// Client identity, typically a source address
        #[arg(long)]
        client: String,

        /// Operation whose policy applies; the default policy if omitted
        #[arg(long)]
        operation: Option<String>,

        /// Number of attempts
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Pause between attempts, in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
    /// Test a wildcard pattern against an address
    Match { pattern: String, address: String },
    /// Validate the configuration and list the registered operations
    Validate,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TurnstileConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => TurnstileConfig::default(),
    };

    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "Turnstile starting");

    match cli.command {
        Command::Check {
            client,
            operation,
            repeat,
            interval_ms,
        } => check(&config, &client, operation.as_deref(), repeat, interval_ms),
        Command::Match { pattern, address } => {
            matcher::validate_entry(&pattern)?;
            println!("{}", matcher::entry_matches(&pattern, &address));
            Ok(())
        }
        Command::Validate => {
            let catalog = config.catalog()?;
            config.seed_lists(&DynamicListStore::new())?;
            for operation in catalog.operations() {
                println!("{}", operation);
            }
            info!(operations = catalog.len(), "Configuration is valid");
            Ok(())
        }
    }
}

fn check(
    config: &TurnstileConfig,
    client: &str,
    operation: Option<&str>,
    repeat: u32,
    interval_ms: u64,
) -> anyhow::Result<()> {
    let catalog = config.catalog()?;
    let policy = match operation {
        Some(operation) => catalog.require(operation)?,
        None => Arc::new(PolicyConfig::default()),
    };

    let lists = Arc::new(DynamicListStore::new());
    config.seed_lists(&lists)?;
    let evaluator = AdmissionEvaluator::new(Arc::new(LimiterRegistry::new()), lists);

    for attempt in 1..=repeat {
        if attempt > 1 && interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(interval_ms));
        }
        let decision = evaluator.evaluate(&policy, client);
        println!(
            "{}",
            serde_json::json!({ "attempt": attempt, "outcome": decision })
        );
    }
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
