//! callsight - live argument registers at call sites
//!
//! Usage:
//!   callsight <infile>                 Analyze a binary, JSON on stdout
//!   callsight <infile> <outfile>       Write the JSON report to a file
//!   callsight --all-calls <infile>     Include calls to non-PLT targets
//!   callsight --compact-json <infile>  Minified output

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;

use callsight_analysis::{write_report, ReportOptions, DEFAULT_INDENT};
use callsight_core::AbiProfile;

const PROGRAM_NAME: &str = "callsight";

#[derive(Parser)]
#[command(name = PROGRAM_NAME)]
#[command(about = "Reports live argument registers at every call site of a binary")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Input binary to analyze
    infile: Option<PathBuf>,

    /// Output file (standard output when omitted)
    outfile: Option<PathBuf>,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Enable internal tracing
    #[arg(long)]
    debug: bool,

    /// Minify the JSON output
    #[arg(long)]
    compact_json: bool,

    /// Include calls to non-PLT targets
    #[arg(long)]
    all_calls: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp => {
                eprint!("{err}");
                process::exit(0);
            }
            _ => {
                eprintln!("ERROR: {PROGRAM_NAME}: {err}");
                process::exit(1);
            }
        },
    };

    if cli.version {
        eprintln!("{PROGRAM_NAME} version {}", env!("CARGO_PKG_VERSION"));
        process::exit(0);
    }

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if let Err(err) = run(cli) {
        eprintln!("ERROR: {PROGRAM_NAME}: {err:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let infile = cli
        .infile
        .context("binary input argument not specified")?;

    let program = callsight_loader::load(&infile)?;
    let abi = AbiProfile::for_architecture(program.architecture)?;

    let options = ReportOptions {
        only_plt_calls: !cli.all_calls,
        indent: if cli.compact_json { 0 } else { DEFAULT_INDENT },
    };

    match cli.outfile {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("error opening output file '{}'", path.display()))?;
            write_report(BufWriter::new(file), &program, &abi, &options)?;
        }
        None => {
            let stdout = io::stdout().lock();
            write_report(BufWriter::new(stdout), &program, &abi, &options)?;
        }
    }

    Ok(())
}
