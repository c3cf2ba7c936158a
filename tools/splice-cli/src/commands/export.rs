//! Export a timeline manifest to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use splice_common::config::AppConfig;
use splice_export_engine::{FfprobeProbe, ProcessInvoker, TimelineExporter};

pub async fn run(
    config: &AppConfig,
    manifest_path: PathBuf,
    output: Option<PathBuf>,
    probe: bool,
) -> anyhow::Result<()> {
    println!("Exporting timeline: {}", manifest_path.display());

    let (manifest, output_path) = super::load_timeline(&manifest_path, output)?;
    let ffmpeg = config.resolve_ffmpeg()?;

    println!("  Clips: {}", manifest.clips.len());
    println!("  Output: {}", output_path.display());
    println!("  Transcoder: {}", ffmpeg.display());

    let mut exporter =
        TimelineExporter::new(Arc::new(ProcessInvoker::new(ffmpeg)), config.export.clone());
    if probe {
        match config.resolve_ffprobe() {
            Ok(ffprobe) => exporter = exporter.with_probe(Arc::new(FfprobeProbe::new(ffprobe))),
            Err(e) => println!("  [WARN] Probing disabled: {e}"),
        }
    }

    let result = exporter
        .export(&manifest.clips, &output_path, |percent| {
            print!("\r  Progress: {percent:>3}%  ");
            let _ = std::io::stdout().flush();
        })
        .await;

    match result {
        Ok(path) => {
            println!("\nExport complete: {}", path.display());
            Ok(())
        }
        Err(e) => {
            println!("\nExport failed [{}]: {}", e.kind(), e.user_message());
            println!("  {e}");
            if let Some(diagnostics) = e.diagnostics() {
                println!("\nTranscoder output (tail):");
                for line in diagnostics.lines() {
                    println!("  | {line}");
                }
            }
            Err(anyhow::anyhow!("export failed: {}", e.kind()))
        }
    }
}
