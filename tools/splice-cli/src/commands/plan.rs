//! Print the transcoder invocations an export would run.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use splice_common::config::AppConfig;
use splice_export_engine::{ProcessInvoker, TimelineExporter};

#[derive(Serialize)]
struct PlannedStep {
    label: String,
    command: String,
    timeout_secs: u64,
    expected_duration_secs: f64,
}

pub fn run(
    config: &AppConfig,
    manifest_path: PathBuf,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let (manifest, output_path) = super::load_timeline(&manifest_path, output)?;

    // A plan is still useful on machines without ffmpeg.
    let ffmpeg = config
        .resolve_ffmpeg()
        .unwrap_or_else(|_| PathBuf::from("ffmpeg"));
    let invoker = ProcessInvoker::new(ffmpeg);
    let exporter = TimelineExporter::new(Arc::new(invoker.clone()), config.export.clone());

    let steps: Vec<PlannedStep> = exporter
        .plan(&manifest.clips, &output_path)?
        .into_iter()
        .map(|request| PlannedStep {
            command: invoker.command_line(&request),
            timeout_secs: request.timeout.as_secs(),
            expected_duration_secs: request.expected_duration_secs,
            label: request.label,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    println!("Export plan for: {}", manifest_path.display());
    println!("  Output: {}", output_path.display());
    for (index, step) in steps.iter().enumerate() {
        println!(
            "\n[{}/{}] {} ({:.3}s, timeout {}s)",
            index + 1,
            steps.len(),
            step.label,
            step.expected_duration_secs,
            step.timeout_secs
        );
        println!("  {}", step.command);
    }

    Ok(())
}
