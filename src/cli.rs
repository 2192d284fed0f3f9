use clap::{Args, Parser, Subcommand};
use podup::resolver::UnlockMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "podup",
    about = "Find the newest pod versions your CocoaPods project can actually move to",
    version,
    author
)]
pub struct Cli {
    /// Path to the project directory (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    pub path: PathBuf,

    /// Configuration file (defaults to podup.toml in the project directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by the commands that talk to registries.
#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Consider prerelease versions (alpha, beta, RC)
    #[arg(long)]
    pub include_prerelease: bool,

    /// Which manifest requirements may move during resolution
    #[arg(long, value_enum)]
    pub unlock: Option<UnlockMode>,

    /// Print machine readable JSON instead of a summary
    #[arg(long)]
    pub json: bool,

    /// Do not read or write the on-disk listing cache
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check every pod (or one) for available updates without changing files
    Check {
        /// Only check this pod
        #[arg(long, value_name = "POD")]
        pod: Option<String>,

        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// List declared pods with their locked versions and sources
    List,

    /// Show how the Podfile requirements of a pod would be rewritten
    Requirements {
        /// Pod name (subspecs resolve to their root pod)
        #[arg(value_name = "POD")]
        pod: String,

        #[command(flatten)]
        resolve: ResolveArgs,
    },
}
