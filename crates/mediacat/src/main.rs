//! mediacat command line
//!
//! - `catalog`: build or update a catalog from a directory tree
//! - `reconcile`: diff two catalogs
//! - `count`: event and path totals for a catalog

use clap::{Parser, Subcommand};
use mediacat_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "mediacat", version, about = "Event-sourced file catalogs")]
struct Cli {
    /// Enable verbose logging (debug to stderr and the log file)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build or update the catalog of a directory tree
    Catalog {
        /// Directory to catalog
        root: PathBuf,

        /// Catalog file (created if missing)
        #[arg(long, env = "MEDIACAT_DB")]
        db: Option<PathBuf>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Storage location tag for the new events
        #[arg(long)]
        location: Option<String>,

        /// Skip tombstoning files missing from disk
        #[arg(long)]
        no_deletions: bool,

        /// Events per write transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diff two catalogs
    Reconcile {
        /// Left-hand catalog (its full history is compared)
        lhs: PathBuf,

        /// Right-hand catalog (its current state is compared)
        rhs: PathBuf,

        /// Config file whose [reconcile] tables supply default path rewrites
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Prefix removed from left paths before lookup on the right
        #[arg(long)]
        lhs_strip: Option<String>,

        /// Prefix added to left paths before lookup on the right
        #[arg(long)]
        lhs_prefix: Option<String>,

        /// Path separator used by the left catalog, when not `/`
        #[arg(long)]
        lhs_separator: Option<String>,

        /// Prefix removed from right paths in the reverse pass
        #[arg(long)]
        rhs_strip: Option<String>,

        /// Prefix added to right paths in the reverse pass
        #[arg(long)]
        rhs_prefix: Option<String>,

        /// Path separator used by the right catalog, e.g. '\'
        #[arg(long)]
        rhs_separator: Option<String>,

        /// Also compare right history against the left
        #[arg(long)]
        reverse: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count events and paths in a catalog
    Count {
        db: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "mediacat",
        verbose: cli.verbose,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {:#}", err);
            None
        }
    };

    let result = run_command(cli.command);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Catalog {
            root,
            db,
            config,
            location,
            no_deletions,
            batch_size,
            json,
        } => cli::catalog::run(cli::catalog::CatalogArgs {
            root,
            db,
            config,
            location,
            no_deletions,
            batch_size,
            json,
        }),
        Commands::Reconcile {
            lhs,
            rhs,
            config,
            lhs_strip,
            lhs_prefix,
            lhs_separator,
            rhs_strip,
            rhs_prefix,
            rhs_separator,
            reverse,
            json,
        } => cli::reconcile::run(cli::reconcile::ReconcileArgs {
            lhs,
            rhs,
            config,
            lhs_strip,
            lhs_prefix,
            lhs_separator,
            rhs_strip,
            rhs_prefix,
            rhs_separator,
            reverse,
            json,
        }),
        Commands::Count { db, json } => cli::count::run(cli::count::CountArgs { db, json }),
    }
}
