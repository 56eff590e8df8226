//! logkv CLI
//!
//! Command-line interface for operating on a logkv data directory.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use logkv::record::RecordReader;
use logkv::{Config, LogKvError, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// logkv CLI
#[derive(Parser, Debug)]
#[command(name = "logkv-cli")]
#[command(about = "CLI for the logkv log-structured key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./logkv_data")]
    data_dir: PathBuf,

    /// Segment size limit in bytes before rotation
    #[arg(short, long, default_value_t = 10 * 1024 * 1024)]
    segment_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Merge all sealed segments
    Compact,

    /// Print store statistics
    Stats,

    /// List every record of a segment file in file order
    Dump {
        /// Path to a segment file
        segment: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,logkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        match e {
            LogKvError::KeyNotFound => eprintln!("(not found)"),
            e => tracing::error!("{}", e),
        }
        process::exit(1);
    }
}

fn run(args: Args) -> logkv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .segment_size_limit(args.segment_size)
        .build();

    match args.command {
        Commands::Get { key } => {
            let store = Store::open(config)?;
            let value = store.get(&key);
            store.close()?;
            println!("{}", value?);
        }
        Commands::Put { key, value } => {
            let store = Store::open(config)?;
            store.put(&key, &value)?;
            store.close()?;
            println!("OK");
        }
        Commands::Compact => {
            let store = Store::open(config)?;
            let result = store.compact()?;
            store.close()?;
            match result {
                Some(result) => println!(
                    "merged {} segments: {} records kept, {} dropped, {} -> {} bytes",
                    result.merged_segments,
                    result.records_written,
                    result.records_dropped,
                    result.bytes_before,
                    result.bytes_after
                ),
                None => println!("nothing to compact"),
            }
        }
        Commands::Stats => {
            let store = Store::open(config)?;
            let stats = store.stats();
            let report = store.recovery_report().clone();
            store.close()?;
            println!("segments:          {}", stats.segment_count);
            println!("active segment:    {}", stats.active_segment_id);
            println!("keys:              {}", stats.key_count);
            println!("bytes on disk:     {}", stats.total_bytes);
            println!("records recovered: {}", report.records_recovered());
            println!("records corrupted: {}", report.records_corrupted());
        }
        Commands::Dump { segment } => dump(&segment)?,
    }

    Ok(())
}

fn dump(path: &Path) -> logkv::Result<()> {
    for item in RecordReader::open(path)? {
        match item {
            Ok((offset, record)) => println!("{:>10}  {} = {}", offset, record.key, record.value),
            Err(e) => println!("{:>10}  <{}>", "-", e),
        }
    }
    Ok(())
}
