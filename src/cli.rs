use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge a machine to a declared set of resources, in dependency order", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a manifest and check it for structural errors and cycles
    Check(CheckArgs),

    /// Show the evaluation order or the graph of a manifest
    Graph(GraphArgs),

    /// Converge the machine to a manifest
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct CheckArgs {
    /// Manifest file
    pub manifest: PathBuf,
}

#[derive(Args)]
pub struct GraphArgs {
    /// Manifest file
    pub manifest: PathBuf,

    /// Print Graphviz DOT instead of the evaluation order
    #[arg(long)]
    pub dot: bool,

    /// Use the declared catalog graph instead of the relationship graph
    #[arg(long)]
    pub catalog: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Manifest file
    pub manifest: PathBuf,

    /// Report what would change without changing anything
    #[arg(long, env = "STAGEHAND_NOOP")]
    pub noop: bool,

    /// Evaluate resources regardless of their schedule
    #[arg(long)]
    pub ignore_schedules: bool,

    /// Only evaluate resources with one of these tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
