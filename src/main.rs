mod app;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use app::App;
use sosmed_offline::config::Config;
use sosmed_offline::logging;

#[derive(Parser, Debug)]
#[command(name = "sosmed")]
#[command(about = "Offline-first cache and sync engine for the story client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sosmed/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the network as unreachable for story loads
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Populate the current shell tier
  Install,
  /// Evict stale tiers
  Activate,
  /// Route one request through the fetch strategies
  Fetch {
    url: String,
    /// Treat the request as a top-level navigation
    #[arg(long)]
    navigate: bool,
    #[arg(long, default_value = "GET")]
    method: String,
  },
  /// Load the story feed
  Stories,
  /// Load one story
  Story { id: String },
  /// List cache tiers
  Tiers,
  /// Delete every story from the durable store
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _guard = logging::init(&Config::data_dir()?.join("logs"))?;

  let mut app = App::new(config, args.offline)?;
  app.run(args.command).await?;

  Ok(())
}
