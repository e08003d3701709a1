//! Fixpoint CLI
//!
//! Command-line interface for the recursive analysis engine: analyze a
//! project, apply fixes through the safety pipeline, train the
//! false-positive detector, and manage the pattern memory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{analyze, cycle, fix, prune, stats, train};

/// Exit code for a failed rollback: the tree may be inconsistent and
/// scripts must be able to tell this apart from an ordinary failure
pub const EXIT_ROLLBACK_FAILED: u8 = 3;

/// Fixpoint - recursive code analysis with persistent memory
#[derive(Parser)]
#[command(name = "fixpoint")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Analyze codebases, learn patterns across runs, and apply fixes safely")]
#[command(
    long_about = "Fixpoint analyzes a source tree with language-specific detectors, keeps what it \
                  learns in a persistent memory store, and applies fixes only after a multi-layer \
                  safety gauntlet: scoring, approval, emergency pattern validation, and a sandbox."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a project and store insights
    Analyze {
        /// Path to the project directory
        project_path: PathBuf,

        /// Save the analysis results as a JSON file
        #[arg(long)]
        output_file: Option<PathBuf>,

        /// Limit directory recursion depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Files per analysis batch
        #[arg(long, default_value_t = 50)]
        batch_size: usize,

        /// Show every issue, including low severity
        #[arg(long)]
        verbose: bool,

        /// Show only critical security issues and high-impact bugs
        #[arg(long)]
        quick: bool,
    },

    /// Apply fixes for previously detected issues
    Fix {
        /// Path to the project directory
        project_path: PathBuf,

        /// JSON file with the issues to address
        #[arg(long, required = true)]
        issues_file: PathBuf,

        /// Filter proposals by safety score before approval
        #[arg(long)]
        dynamic_approval: bool,

        /// Conservative level for dynamic approval (floored at 0.9)
        #[arg(long, default_value_t = 0.7)]
        conservative_level: f64,

        /// Review each proposal at the terminal
        #[arg(long)]
        interactive: bool,
    },

    /// Train the detector by flagging false positives
    Train {
        /// JSON file with analysis results
        #[arg(long, required = true)]
        issues_file: PathBuf,

        /// Review and label issues interactively
        #[arg(long)]
        interactive: bool,

        /// Batch file with pre-labeled false positives
        #[arg(long)]
        batch_file: Option<PathBuf>,
    },

    /// Show false-positive detection statistics
    Stats {
        /// Break down by issue type and context
        #[arg(long)]
        detailed: bool,
    },

    /// Prune the pattern memory
    Prune {
        /// Pruning strategy
        #[arg(long, default_value = "hybrid")]
        strategy: String,

        /// Preview what would be pruned without deleting anything
        #[arg(long)]
        dry_run: bool,

        /// Prune a single namespace
        #[arg(long)]
        namespace: Option<String>,

        /// Compress over-represented patterns aggressively
        #[arg(long)]
        aggressive: bool,
    },

    /// Track improvement cycles and detect manual fixes
    Cycle {
        /// Operation: manual_fixes, scan_comparison, patterns, cycle_metrics
        cycle_command: String,

        /// JSON file with the current scan
        #[arg(long)]
        issues_file: Option<PathBuf>,

        /// JSON file with the previous scan (for comparison)
        #[arg(long)]
        previous_issues_file: Option<PathBuf>,

        /// Path to the project being analyzed
        #[arg(long)]
        project_path: Option<PathBuf>,
    },
}


fn init_tracing() {
    let filter = fixpoint_core::config::log_filter()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Analyze {
            project_path,
            output_file,
            max_depth,
            batch_size,
            verbose,
            quick,
        } => analyze::run(analyze::AnalyzeArgs {
            project_path,
            output_file,
            max_depth,
            batch_size,
            verbose,
            quick,
        }),

        Commands::Fix {
            project_path,
            issues_file,
            dynamic_approval,
            conservative_level,
            interactive,
        } => fix::run(fix::FixArgs {
            project_path,
            issues_file,
            dynamic_approval,
            conservative_level,
            interactive,
        }),

        Commands::Train {
            issues_file,
            interactive,
            batch_file,
        } => train::run(issues_file, interactive, batch_file),

        Commands::Stats { detailed } => stats::run(detailed),

        Commands::Prune {
            strategy,
            dry_run,
            namespace,
            aggressive,
        } => prune::run(strategy, dry_run, namespace, aggressive),

        Commands::Cycle {
            cycle_command,
            issues_file,
            previous_issues_file,
            project_path,
        } => cycle::run(cycle_command, issues_file, previous_issues_file, project_path),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if let Some(fix_error) = error.downcast_ref::<fixpoint_core::FixError>() {
                if matches!(fix_error, fixpoint_core::FixError::RollbackFailed(_)) {
                    eprintln!("{} {error:#}", "rollback failed:".red().bold());
                    return ExitCode::from(EXIT_ROLLBACK_FAILED);
                }
            }
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
