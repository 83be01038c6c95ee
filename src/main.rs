use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kscribbler::cli::{status, sync};
use kscribbler::config::Config;
use kscribbler::store::MirrorStore;
use kscribbler::sync::RunOptions;

#[derive(Parser)]
#[command(name = "kscribbler")]
#[command(about = "Sync Kobo highlights to a Hardcover reading journal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, default_value = "kscribbler.yaml")]
    config: String,

    /// Mirror and resolve books, but upload nothing
    #[arg(long, global = true)]
    init_only: bool,

    /// Only upload quotes of the book last opened on the device
    #[arg(long, global = true)]
    current: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror, resolve and upload highlights (default)
    Sync,

    /// Show per-book reconciliation state from the mirror
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let options = RunOptions {
                init_only: cli.init_only,
                current_book_only: cli.current,
            };
            sync::run(&config, options).await?;
        }
        Commands::Status => {
            let store = MirrorStore::open(&config.mirror_path())?;
            status::run(&store)?;
        }
    }

    Ok(())
}
