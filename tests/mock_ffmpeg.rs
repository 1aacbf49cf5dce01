//! Stand-in encoder binary for integration tests (no real FFmpeg required).
//!
//! Mirrors the corpus's `ffui_mock_ffmpeg` harness=false test binary: reads
//! its own behavior from environment variables so each test controls exit
//! code, emitted progress, and a version banner without touching argv
//! parsing. Accepts and ignores every ordinary encoder flag.

use std::env;

fn main() {
    let argv: Vec<String> = env::args().skip(1).collect();

    if argv.iter().any(|a| a == "-version") {
        println!("ffmpeg version 6.1.1-mock Copyright (c) aura-studio test harness");
        std::process::exit(0);
    }

    if argv.iter().any(|a| a == "-hwaccels") {
        println!("Hardware acceleration methods:");
        println!("vdpau");
        println!("cuda");
        std::process::exit(0);
    }

    if env::var("MOCK_FFMPEG_EMIT_PROGRESS")
        .map(|v| v == "1")
        .unwrap_or(true)
    {
        eprintln!("out_time_ms=0");
        eprintln!("progress=continue");
        eprintln!("out_time_ms=1000000");
        eprintln!("progress=end");
    }

    // The last argument is conventionally the output path; touch it so
    // downstream artifact-size checks see a non-empty file.
    if let Some(out_path) = argv.last() {
        if !out_path.starts_with('-') {
            let _ = std::fs::write(out_path, b"mock-encoded-bytes");
        }
    }

    let exit_code: i32 = env::var("MOCK_FFMPEG_EXIT_CODE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    std::process::exit(exit_code);
}
