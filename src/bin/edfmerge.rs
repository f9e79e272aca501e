//! edfmerge CLI
//!
//! ```text
//! # merge every container under a directory with its event sheets
//! edfmerge run ./recordings
//!
//! # see what would happen without touching anything
//! edfmerge --dry-run run ./recordings
//!
//! # put the originals back
//! edfmerge restore ./recordings
//!
//! # header, signals and duration check of one file
//! edfmerge inspect ./recordings/scan.edf
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use edfmerge::backup::restore_all;
use edfmerge::batch::find_event_sheets;
use edfmerge::pipeline::load_recording;
use edfmerge::report::Inspection;
use edfmerge::{run_batch, EdfError, EdfWriter, MergeConfig, Result, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "edfmerge")]
#[command(author, version, about = "Merge event sheets into EDF recordings as EDF+ annotations", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Report only; no file is moved or written
    #[arg(long, global = true)]
    dry_run: bool,

    /// Also write the log to log_edfmerge_<timestamp>.log
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge every container under a directory
    Run {
        /// Directory to search recursively
        dir: PathBuf,
    },

    /// Restore backed-up originals and clear sheet write-back columns
    Restore {
        dir: PathBuf,
    },

    /// Print header, signals and the duration check of one container
    Inspect {
        file: PathBuf,
    },
}

fn init_logging(verbose: bool, log_file: bool) -> Result<Option<PathBuf>> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder().with_env_filter(filter).with_target(false);

    let installed = if log_file {
        let name = format!(
            "log_edfmerge_{}.log",
            chrono::Local::now().format("%Y%m%d%H%M%S")
        );
        let file = Arc::new(File::create(&name)?);
        let subscriber = builder
            .with_ansi(false)
            .with_writer(std::io::stdout.and(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber).map(|_| Some(PathBuf::from(name)))
    } else {
        tracing::subscriber::set_global_default(builder.finish()).map(|_| None)
    };

    installed.map_err(|e| EdfError::Config(format!("logging: {}", e)))
}

fn load_config(path: Option<&Path>) -> Result<MergeConfig> {
    match path {
        Some(path) => MergeConfig::load(path),
        None => Ok(MergeConfig::default()),
    }
}

fn run(cli: Cli) -> Result<bool> {
    if let Some(name) = init_logging(cli.verbose, cli.log_file)? {
        info!("log file: {}", name.display());
    }
    info!("edfmerge v{}", edfmerge::version());

    let config = load_config(cli.config.as_deref())?;
    let options = RunOptions {
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Run { dir } => {
            let summary = run_batch(&dir, &config, &EdfWriter::new(), options)?;
            print!("{}", summary);
            Ok(summary.failed() == 0)
        }
        Commands::Restore { dir } => {
            let summary = restore_all(&dir, &config.sheet, options.dry_run)?;
            print!("{}", summary);
            Ok(summary.failures.is_empty())
        }
        Commands::Inspect { file } => {
            let loaded = load_recording(&file, &config)?;
            print!("{}", Inspection(&loaded));
            for sheet in find_event_sheets(&file, &config.sheet)? {
                println!("sheet:      {}", sheet.display());
            }
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
