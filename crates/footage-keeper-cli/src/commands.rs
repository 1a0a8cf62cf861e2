use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "footage-keeper")]
#[command(about = "Tiered retention for a date-organised camera archive", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to an optional ./Config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log every decision but delete nothing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Treat every video as unanalysed
    #[arg(long, global = true)]
    pub force_reevaluation: bool,

    /// Write one CSV row per removal outcome
    #[arg(long, global = true, value_name = "FILE")]
    pub report_csv: Option<PathBuf>,

    /// Append a summary row of the run to this CSV
    #[arg(long, global = true, value_name = "FILE")]
    pub history_csv: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyse new videos, then classify the archive and apply the plan
    Run,
    /// Show what a run would remove without touching the archive
    Plan,
    /// List videos that have not been analysed yet
    Pending,
    /// Print every folder's size and phase
    Sizes,
    /// Print configuration values
    PrintConfig,
    /// Remove every folder size cache artifact
    ClearCache {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
