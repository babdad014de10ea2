//! CLI command definitions.

use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline
    Run(RunArgs),

    /// Validate a pipeline configuration
    Validate {
        /// Path to the pipeline file
        path: String,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the pipeline file
    pub config: String,

    /// Reference to build from (branch name or commit sha)
    #[arg(short, long, default_value = "develop")]
    pub reference: String,

    /// Tags to include
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Tags to exclude
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Keep dispatching independent tasks after a failure
    #[arg(long)]
    pub no_fast_fail: bool,

    /// Worker pool width
    #[arg(long, default_value_t = 20)]
    pub parallel: usize,
}
