use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(version)]
#[command(about = "Converge this machine to the catalog served for it", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (defaults to agent.toml in the config directory)
    #[arg(long, env = "STAGEHAND_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch the catalog for this node and apply it once
    Run(RunArgs),

    /// Show the effective settings
    Settings,

    /// Show the summary of the last stored run report
    Report,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Apply a catalog from a JSON file instead of fetching one
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Catalog server URL
    #[arg(long, env = "STAGEHAND_SERVER")]
    pub server: Option<String>,

    /// Node name to request the catalog for
    #[arg(long, env = "STAGEHAND_CERTNAME")]
    pub certname: Option<String>,

    /// Catalog fetch timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<String>,

    /// Never fall back to the cached catalog
    #[arg(long)]
    pub no_cache_fallback: bool,

    /// Print a summary after the run
    #[arg(long)]
    pub summarize: bool,

    /// Log error chains with backtraces
    #[arg(long)]
    pub trace: bool,

    /// Exit 2 when changes were made, 4 on failures, 6 on both
    #[arg(long)]
    pub detailed_exitcodes: bool,
}
