//! # Encoder command construction.
//!
//! Builds the FFmpeg invocation for one asset: read the file in real time,
//! transcode to H.264/AAC at the configured resolution/bitrate/fps, and
//! publish as FLV to the RTMP endpoint. `-progress pipe:2` makes the encoder
//! emit newline-terminated `key=value` progress records on stderr, which the
//! monitor parses for streaming confirmation and stall detection.

use std::process::Stdio;

use tokio::process::Command;

use crate::assets::ResolvedAsset;
use crate::config::StreamSettings;

/// Builds the encoder command for `asset` under `settings`.
///
/// stdout is discarded; stderr is piped to the session monitor.
pub(crate) fn encoder_command(
    bin: &str,
    asset: &ResolvedAsset,
    settings: &StreamSettings,
) -> Command {
    let bitrate = settings.bitrate_kbps;
    let mut cmd = Command::new(bin);
    cmd.arg("-re")
        .arg("-i")
        .arg(&asset.path)
        .arg("-c:v")
        .arg("libx264")
        .arg("-preset")
        .arg("veryfast")
        .arg("-b:v")
        .arg(format!("{bitrate}k"))
        .arg("-maxrate")
        .arg(format!("{bitrate}k"))
        .arg("-bufsize")
        .arg(format!("{}k", bitrate * 2))
        .arg("-pix_fmt")
        .arg("yuv420p")
        .arg("-g")
        .arg("50")
        .arg("-s")
        .arg(&settings.resolution)
        .arg("-r")
        .arg(settings.fps.to_string())
        .arg("-c:a")
        .arg("aac")
        .arg("-b:a")
        .arg("128k")
        .arg("-ar")
        .arg("44100")
        .arg("-f")
        .arg("flv")
        .arg("-nostats")
        .arg("-progress")
        .arg("pipe:2")
        .arg(settings.endpoint())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_command_carries_settings() {
        let asset = ResolvedAsset {
            id: "clip.mp4".into(),
            path: PathBuf::from("/videos/clip.mp4"),
            duration: None,
            size: 1,
        };
        let settings = StreamSettings {
            rtmp_url: "rtmp://ingest/live".into(),
            stream_key: "key".into(),
            resolution: "1280x720".into(),
            bitrate_kbps: 1800,
            fps: 25,
        };

        let cmd = encoder_command("ffmpeg", &asset, &settings);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.contains(&"-re".to_string()));
        assert!(args.contains(&"1800k".to_string()));
        assert!(args.contains(&"3600k".to_string()));
        assert!(args.contains(&"1280x720".to_string()));
        assert!(args.contains(&"25".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("rtmp://ingest/live/key"));
    }
}
