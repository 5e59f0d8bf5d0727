//! Listed CLI
//!
//! Command-line tools for Listed Sync.
//!
//! # Commands
//!
//! - `simulate` - Run replicas through a partition and report convergence
//! - `score` - Compute the election score of one metrics record
//! - `elect` - Pick the janitor among peer records

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use listed_sync::{FlushPolicy, TieBreak};
use tracing_subscriber::EnvFilter;

/// Listed Sync command-line tools.
#[derive(Parser)]
#[command(name = "listed")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run in-process replicas through a partition and report convergence
    Simulate {
        /// Number of replicas
        #[arg(short, long, default_value = "2")]
        replicas: usize,

        /// Edits made by the partitioned replica while offline
        #[arg(short, long, default_value = "3")]
        edits: usize,

        /// Seed for generated device metrics
        #[arg(long, default_value = "7")]
        seed: u64,

        /// What happens to buffered updates on reconnect
        #[arg(long, value_enum, default_value = "on-reconnect")]
        flush: FlushArg,

        /// How equal election scores are resolved
        #[arg(long, value_enum, default_value = "lowest-peer-id")]
        tie_break: TieBreakArg,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Compute the election score of one metrics record
    Score {
        /// Downlink bandwidth (-1 if unknown)
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        downlink: f64,

        /// Round-trip time (-1 if unknown)
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        rtt: f64,

        /// Device memory (-1 if unknown)
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        memory: f64,

        /// CPU pressure (nominal, fair, serious, critical)
        #[arg(long, default_value = "unknown")]
        pressure: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Pick the janitor among peer records
    Elect {
        /// Records as id:downlink:rtt:memory:pressure
        #[arg(required = true, allow_hyphen_values = true)]
        records: Vec<String>,

        /// How equal scores are resolved
        #[arg(long, value_enum, default_value = "lowest-peer-id")]
        tie_break: TieBreakArg,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum FlushArg {
    OnReconnect,
    Manual,
}

impl From<FlushArg> for FlushPolicy {
    fn from(arg: FlushArg) -> Self {
        match arg {
            FlushArg::OnReconnect => FlushPolicy::OnReconnect,
            FlushArg::Manual => FlushPolicy::Manual,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TieBreakArg {
    FirstSeen,
    LowestPeerId,
}

impl From<TieBreakArg> for TieBreak {
    fn from(arg: TieBreakArg) -> Self {
        match arg {
            TieBreakArg::FirstSeen => TieBreak::FirstSeen,
            TieBreakArg::LowestPeerId => TieBreak::LowestPeerId,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            replicas,
            edits,
            seed,
            flush,
            tie_break,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                replicas,
                edits,
                seed,
                flush_policy: flush.into(),
                tie_break: tie_break.into(),
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Score {
            downlink,
            rtt,
            memory,
            pressure,
            format,
        } => {
            commands::score::run(downlink, rtt, memory, &pressure, &format)?;
        }
        Commands::Elect {
            records,
            tie_break,
            format,
        } => {
            commands::elect::run(&records, tie_break.into(), &format)?;
        }
        Commands::Version => {
            println!("Listed CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
