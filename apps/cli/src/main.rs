//! Tether CLI - talk to tether servers from the command line.
//!
//! Every command that calls tools goes through the resilient client, so a
//! server that fails over mid-command is recovered transparently.

mod commands;

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{call, demo, health, resume, tools};

/// Tether CLI - session state that survives instance failover
#[derive(Parser, Debug)]
#[command(name = "tether", author, version, about = "Tether - failover-safe session client")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Server or load balancer base URL
    #[arg(short, long, default_value = "http://localhost:8000", global = true)]
    url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    timeout_secs: u64,

    /// Reconnect attempts per call before giving up
    #[arg(long, default_value_t = 3, global = true)]
    retries: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query the server's health probe
    Health {
        /// Output the raw report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the tools the server offers
    Tools,

    /// Call a tool
    Call {
        /// Tool name (e.g. increment_counter)
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Repeat the call this many times in one session
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,
    },

    /// Open a new session and resume a previous one into it
    Resume {
        /// Session to copy state from
        previous_session_id: String,
    },

    /// Run an in-process failover between two instances
    ///
    /// Needs no server: both instances share an in-memory store.
    Demo {
        /// Counter increments before the first instance fails
        #[arg(long, default_value_t = 3)]
        increments: u32,
    },
}

/// Connection options shared by every networked command.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: String,
    pub timeout: Duration,
    pub retries: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let target = Target {
        url: args.url,
        timeout: Duration::from_secs(args.timeout_secs),
        retries: args.retries,
    };

    match args.command {
        Command::Health { json } => health::execute(&target, json).await?,
        Command::Tools => tools::execute(&target).await?,
        Command::Call { tool, args, repeat } => call::execute(&target, &tool, &args, repeat).await?,
        Command::Resume { previous_session_id } => {
            resume::execute(&target, &previous_session_id).await?;
        }
        Command::Demo { increments } => demo::execute(increments, args.retries).await?,
    }

    Ok(())
}
