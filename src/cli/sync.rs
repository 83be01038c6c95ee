//! Sync command implementation

use anyhow::{Context, Result};

use crate::config::Config;
use crate::remote::HardcoverClient;
use crate::source::KoboSource;
use crate::store::MirrorStore;
use crate::sync::{Reconciler, RunOptions, SyncOptions};

pub async fn run(config: &Config, options: RunOptions) -> Result<()> {
    let source = KoboSource::open(&config.source_path(), config.source.write_back_isbn)?;

    let mirror_path = config.mirror_path();
    let store = MirrorStore::open(&mirror_path)
        .with_context(|| format!("opening mirror at {}", mirror_path.display()))?;

    let client = HardcoverClient::from_config(config)?;

    let sync_options = SyncOptions {
        spoiler: config.journal.spoiler,
        privacy: config.journal.privacy,
        write_back_isbn: config.source.write_back_isbn,
    };
    let engine = Reconciler::new(&store, &source, &client, sync_options);

    println!("Syncing highlights from {}\n", source.path().display());
    let summary = engine.run(&options).await?;
    print!("{}", summary);

    if !summary.no_highlights {
        println!("\n✅ Sync complete!");
    }
    Ok(())
}
