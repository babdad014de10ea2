//! cascade CLI entrypoint.

use clap::Parser;
use console::style;

mod commands;
mod handlers;
mod notifier;

use commands::Commands;

#[derive(Parser)]
#[command(name = "cascade")]
#[command(author, version, about = "Release-train orchestration for Cloud Build triggers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run(args) => handlers::run(args).await,
        Commands::Validate { path } => handlers::validate(&path),
    };

    let code = match outcome {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("{} {}", style("✗").red(), err);
            if err.is_task_local() { 1 } else { 2 }
        }
    };
    std::process::exit(code);
}
