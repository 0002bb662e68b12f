//! Minimal broadcast loop: enqueue every video in a directory and stream
//! them in order until the queue drains or the process is signalled.
//!
//! ```bash
//! cargo run --example broadcast_loop -- ./videos
//! ```
//!
//! Expects `ffmpeg`/`ffprobe` on PATH and RTMP settings in
//! `state/settings.json` (written with defaults on first run — edit it and
//! restart, or use the handle's `update_settings`).

use std::sync::Arc;

use streamvisor::{Config, DirStore, JsonStore, LogWriter, Orchestrator, Subscribe};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let videos_dir = std::env::args().nth(1).unwrap_or_else(|| "videos".into());

    let assets = Arc::new(DirStore::new(&videos_dir).with_probe("ffprobe"));
    let persistence = Arc::new(JsonStore::new("state"));
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    let (orchestrator, handle) =
        Orchestrator::new(Config::default(), assets.clone(), persistence, subscribers).await?;
    let control = tokio::spawn(orchestrator.run());

    // Queue everything currently in the directory, newest last.
    let mut listing = assets.list().await?;
    listing.reverse();
    for asset in listing {
        match handle.enqueue(&asset.id).await {
            Ok(position) => println!("queued {} at #{position}", asset.id),
            Err(e) => eprintln!("skipping {}: {e}", asset.id),
        }
    }

    // The control loop owns the rest: auto-advance, retries, persistence.
    // Ctrl-C triggers a graceful stop that requeues the interrupted asset.
    control.await??;
    Ok(())
}
