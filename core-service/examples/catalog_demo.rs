//! Scan a music directory and print a summary.
//!
//! Run with:
//! ```bash
//! SETLIST_MUSIC_PATH=~/Music cargo run -p core-service --example catalog_demo -- "search words"
//! ```
//!
//! Set `LASTFM_API_KEY` to also look up tracks similar to the best hit.

use anyhow::Context;
use core_runtime::events::{EventSeverity, EventStream};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::Setlist;
use core_sync::ScanMode;
use std::env;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let query = env::args().nth(1).unwrap_or_default();
    let setlist = Setlist::open_from_env()
        .await
        .context("failed to open the catalog")?;

    let mut problems = EventStream::new(setlist.subscribe())
        .filter(|event| event.severity() >= EventSeverity::Warning);
    tokio::spawn(async move {
        while let Ok(event) = problems.recv().await {
            warn!(?event, "{}", event.description());
        }
    });

    let report = setlist.scan(ScanMode::Incremental).await?;
    info!(?report, "Scan finished");

    let stats = setlist.stats().await?;
    println!(
        "{} files ({} missing), {} artists, {} albums",
        stats.total_files, stats.missing_files, stats.artists, stats.albums
    );

    if !query.is_empty() {
        let hits = setlist.search(&query, Some(10)).await?;
        for file in &hits {
            println!("  {}", file.display_name());
        }

        if let Some(best) = hits.first() {
            if let (Some(artist), Some(title)) = (&best.artist, &best.title) {
                let similar = setlist.similar_tracks(artist, title).await.unwrap_or_empty();
                for track in similar.iter().take(5) {
                    println!("  ~ {} - {}", track.artist, track.title);
                }
            }
        }
    }

    setlist.close().await;
    Ok(())
}
