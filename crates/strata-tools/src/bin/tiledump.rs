//! Prints the contents of a serialized tile stream.
//!
//! # Usage
//!
//! ```bash
//! # Header, tuple count and every tuple
//! tiledump tile.bin
//!
//! # A header-less stream needs its schema spelled out
//! tiledump --no-header --schema "id:integer,name:varchar:32" tuples.bin
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use strata_tools::{dump_file, DumpOptions};

/// Dump a serialized Strata tile stream
#[derive(Parser, Debug)]
#[command(name = "tiledump", version, about = "Decode and print a serialized tile stream")]
struct Args {
    /// Stream file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// The file holds `[tuple_count][tuples]` without size or header
    #[arg(long)]
    no_header: bool,

    /// Column specs `name:type[:length]`, comma separated
    #[arg(short = 's', long)]
    schema: Option<String>,

    /// Print at most this many tuples
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = DumpOptions {
        no_header: args.no_header,
        schema: args.schema,
        limit: args.limit,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    dump_file(&args.file, &options, &mut out)?;
    out.flush()?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tiledump=debug,strata_tools=debug,strata_storage=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
