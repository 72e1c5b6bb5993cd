use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{ProjectArgs, cmd_build, cmd_watch};

#[derive(Parser)]
#[command(name = "fable-bridge")]
#[command(about = "Incremental F# to JavaScript compilation through the Fable daemon")]
#[command(version)]
#[command(after_help = "\
QUICK START:
  fable-bridge watch --fsproj src/App.fsproj      Compile, then recompile on every change
  fable-bridge build --out-dir dist               One-shot compile into dist/

CONFIGURATION:
  Settings are read from fable-bridge.toml in the project directory.
  RUST_LOG overrides the configured log level; FABLE_BRIDGE_DEBUG forces debug.")]
struct Cli {
  #[command(flatten)]
  project: ProjectArgs,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile the project, then recompile changed files and print hot updates as JSON lines
  Watch,
  /// Compile the project once
  Build {
    /// Write every compiled file below this directory
    #[arg(long)]
    out_dir: Option<PathBuf>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let ctx = cli.project.load(matches!(cli.command, Commands::Build { .. }))?;
  let _guard = logging::init_logging(&ctx.config.log);

  match cli.command {
    Commands::Watch => cmd_watch(ctx).await,
    Commands::Build { out_dir } => cmd_build(ctx, out_dir).await,
  }
}
