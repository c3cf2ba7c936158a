pub mod check;
pub mod export;
pub mod plan;
pub mod probe;
pub mod validate;

use std::path::{Path, PathBuf};

use splice_timeline_model::TimelineManifest;

/// Load a manifest and decide where its export goes: the explicit `output`,
/// then the manifest's own, then `export.mp4` next to the manifest.
pub fn load_timeline(
    manifest_path: &Path,
    output: Option<PathBuf>,
) -> anyhow::Result<(TimelineManifest, PathBuf)> {
    let manifest = TimelineManifest::load(manifest_path)
        .map_err(|e| anyhow::anyhow!("Failed to load manifest: {e}"))?;

    let output = output
        .or_else(|| manifest.output.clone())
        .unwrap_or_else(|| {
            manifest_path
                .parent()
                .unwrap_or(Path::new("."))
                .join("export.mp4")
        });

    Ok((manifest, output))
}
