//! tolk - inspection CLI for the orchestration core
//!
//! Prints cache keys, batch plans and the effective configuration without
//! contacting any provider.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tolk::{Batcher, Config, generate_cache_key};

/// Tolk CLI
#[derive(Parser)]
#[command(name = "tolk")]
#[command(version)]
#[command(about = "Translation orchestration inspection tool")]
struct Args {
    /// Config file (default: ~/.tolk/config.toml, then /etc/tolk/config.toml)
    #[arg(short, long, env = "TOLK_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the cache key for a text (or stdin lines joined as one request)
    Key {
        /// Texts forming the request (or omit to read lines from stdin)
        texts: Vec<String>,
        #[arg(short, long, default_value = "en")]
        source: String,
        #[arg(short, long, default_value = "fi")]
        target: String,
        /// Provider label
        #[arg(short, long, default_value = "auto")]
        provider: String,
    },

    /// Print the batch plan for stdin lines as JSON
    Plan {
        /// Override the configured token budget per batch
        #[arg(long)]
        max_tokens: Option<u64>,
        /// Override the configured item limit per batch
        #[arg(long)]
        max_items: Option<usize>,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Key {
            texts,
            source,
            target,
            provider,
        } => {
            let texts = if texts.is_empty() {
                stdin_lines("key")?
            } else {
                texts
            };
            println!("{}", generate_cache_key(&texts, &source, &target, &provider));
        }

        Command::Plan {
            max_tokens,
            max_items,
        } => {
            let mut batch = config.batch.clone();
            if let Some(n) = max_tokens {
                batch.max_tokens = n;
            }
            if let Some(n) = max_items {
                batch.max_items = n;
            }
            let lines = stdin_lines("plan")?;
            let batches = Batcher::new(batch).batch_nodes(&lines);
            println!("{}", serde_json::to_string_pretty(&batches)?);
        }

        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Non-empty lines from piped stdin.
fn stdin_lines(command: &str) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    if io::stdin().is_terminal() {
        return Err(format!("{command}: no input provided (pass text as argument or via stdin)").into());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}
