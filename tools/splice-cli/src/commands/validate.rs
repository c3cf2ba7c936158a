//! Validate a timeline manifest.

use std::path::PathBuf;

use splice_common::format_hms;
use splice_timeline_model::{total_duration, TargetResolution};

pub fn run(manifest_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating timeline: {}", manifest_path.display());

    let (manifest, output) = super::load_timeline(&manifest_path, None)?;
    let clips = manifest.sorted_clips();

    println!("  Version: {}", manifest.version);
    println!("  Clips: {}", clips.len());
    for clip in &clips {
        println!(
            "    #{:<3} {} [{:.3}s -> {:.3}s] {}x{}",
            clip.order,
            clip.label(),
            clip.trim_start,
            clip.trim_end,
            clip.width,
            clip.height
        );
    }
    if let Some(target) = TargetResolution::from_clips(&clips) {
        println!("  Target resolution: {target}");
    }
    println!("  Total duration: {}", format_hms(total_duration(&clips)));
    println!("  Output: {}", output.display());

    let problems = manifest.validate();
    if problems.is_empty() {
        println!("\nTimeline is valid.");
        Ok(())
    } else {
        println!("\nValidation issues:");
        for problem in &problems {
            println!("  - {problem}");
        }
        Err(anyhow::anyhow!("{} issue(s) found", problems.len()))
    }
}
