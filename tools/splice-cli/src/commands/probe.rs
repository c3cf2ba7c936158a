//! Show media metadata.

use std::path::PathBuf;

use splice_common::config::AppConfig;
use splice_common::format_hms;
use splice_export_engine::{FfprobeProbe, MediaProbe};

pub async fn run(config: &AppConfig, file: PathBuf) -> anyhow::Result<()> {
    let probe = FfprobeProbe::new(config.resolve_ffprobe()?);
    let limit = config.export.probe_timeout();
    let info = tokio::time::timeout(limit, probe.probe(&file))
        .await
        .map_err(|_| anyhow::anyhow!("ffprobe did not finish within {}s", limit.as_secs()))??;

    println!("File: {}", file.display());
    println!(
        "  Duration: {} ({:.3}s)",
        format_hms(info.duration_secs),
        info.duration_secs
    );
    println!("  Resolution: {}x{}", info.width, info.height);
    println!("  Codec: {}", info.codec);
    match info.frame_rate {
        Some(fps) => println!("  Frame rate: {fps:.3}"),
        None => println!("  Frame rate: unknown"),
    }
    println!("  Audio: {}", if info.has_audio { "yes" } else { "no" });

    tracing::debug!(info = %serde_json::to_string(&info)?, "Probe result");
    Ok(())
}
