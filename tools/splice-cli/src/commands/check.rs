//! Check for the external media tools.

use splice_common::config::AppConfig;
use splice_export_engine::{ProcessInvoker, Transcoder};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Splice System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg_ok = match config.resolve_ffmpeg() {
        Ok(path) => {
            let invoker = ProcessInvoker::new(&path);
            if invoker.is_available() {
                println!("[OK] {}: {}", invoker.name(), path.display());
                true
            } else {
                println!("[FAIL] {}: {} is not a file", invoker.name(), path.display());
                false
            }
        }
        Err(e) => {
            println!("[FAIL] ffmpeg: {e}");
            false
        }
    };

    match config.resolve_ffprobe() {
        Ok(path) => println!("[OK] ffprobe: {}", path.display()),
        Err(e) => println!("[WARN] ffprobe: {e} (exports run without probing)"),
    }

    let temp_root = config.export.temp_root();
    if temp_root.is_dir() {
        println!("[OK] Intermediate directory: {}", temp_root.display());
    } else {
        println!("[WARN] Intermediate directory missing: {}", temp_root.display());
    }

    println!(
        "     Timeouts: {}s per segment, {}s for concatenation",
        config.export.segment_timeout_secs, config.export.concat_timeout_secs
    );

    println!();
    if ffmpeg_ok {
        println!("All required tools are available. Splice is ready.");
        Ok(())
    } else {
        println!("ffmpeg is required. Install it or set SPLICE_FFMPEG.");
        Err(anyhow::anyhow!("ffmpeg not available"))
    }
}
