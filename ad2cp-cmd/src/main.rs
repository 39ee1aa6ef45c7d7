mod convert;
mod info;
mod mat;

use std::io::stderr;
use std::path::PathBuf;

use ad2cp::framing::{ReaderOpts, ResyncPolicy};
use ad2cp::DecodeOpts;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Log at debug level. Ignored if AD2CP_LOG is set.
    #[arg(short, long, global = true, action)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert AD2CP data files to a MATLAB level-4 MAT file.
    ///
    /// Inputs are decoded in the order given and combined into a single time series.
    /// All inputs must contain the same kind of data (burst/average or echo sounder)
    /// with the same number of beams and cells.
    Convert {
        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Fail if the inputs contain more than this many ensembles.
        #[arg(short, long, value_name = "count")]
        max_ensembles: Option<usize>,

        /// Drop frames with a bad header or data checksum.
        #[arg(long, action)]
        verify_checksums: bool,

        /// When the second sync byte does not match, re-examine it as the start of a
        /// new frame rather than skipping it.
        #[arg(long, action)]
        rewind: bool,

        /// Output file path.
        #[arg(short, long, value_name = "path")]
        output: PathBuf,

        /// Input AD2CP data files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Show information about AD2CP data files.
    Info {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Drop frames with a bad header or data checksum.
        #[arg(long, action)]
        verify_checksums: bool,

        /// Input AD2CP data files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// List the arrays in a MATLAB level-4 MAT file.
    Mat {
        /// Input MAT file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("AD2CP_LOG").unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Convert {
            clobber,
            max_ensembles,
            verify_checksums,
            rewind,
            output,
            inputs,
        } => {
            let resync = if *rewind {
                ResyncPolicy::Rewind
            } else {
                ResyncPolicy::SkipPair
            };
            let opts = DecodeOpts {
                capacity: *max_ensembles,
                reader: ReaderOpts::builder()
                    .verify_checksums(*verify_checksums)
                    .resync(resync)
                    .build(),
            };
            convert::convert(inputs, output, *clobber, opts)
        }
        Commands::Info {
            format,
            verify_checksums,
            inputs,
        } => info::info(inputs, format, *verify_checksums),
        Commands::Mat { input } => mat::list(input),
    }
}
