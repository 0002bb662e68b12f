//! Operator-control walkthrough against a stub encoder: enqueue, watch
//! status, skip, halt, resume, and update settings — no ffmpeg required.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use streamvisor::{
    Config, DirStore, LogWriter, MemoryPersistence, Orchestrator, StreamSettings, Subscribe,
};

fn write_stub(dir: &Path) -> anyhow::Result<String> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("encoder.sh");
        std::fs::write(&path, "#!/bin/sh\nexec sleep 5\n")?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path.to_string_lossy().into_owned())
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
        anyhow::bail!("this demo uses a shell stub and only runs on unix");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("first.mp4"), b"demo")?;
    std::fs::write(dir.path().join("second.mp4"), b"demo")?;

    let cfg = Config {
        encoder_bin: write_stub(dir.path())?,
        ..Config::default()
    };
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let (orchestrator, handle) = Orchestrator::new(
        cfg,
        Arc::new(DirStore::new(dir.path())),
        Arc::new(MemoryPersistence::new()),
        subscribers,
    )
    .await?;
    let control = tokio::spawn(orchestrator.run());

    handle.enqueue("first.mp4").await?;
    handle.enqueue("second.mp4").await?;

    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("status: {:?}", handle.status().await?);

    // Skip the running asset; the queue advances on its own.
    handle.skip_current().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("after skip: {:?}", handle.status().await?);

    // Halt everything, retune, resume.
    handle.stop_all().await?;
    handle
        .update_settings(StreamSettings {
            stream_key: "retuned".into(),
            ..StreamSettings::default()
        })
        .await?;
    handle.resume().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("queue: {:?}", handle.list_queue().await?);

    handle.shutdown().await?;
    control.await??;
    Ok(())
}
