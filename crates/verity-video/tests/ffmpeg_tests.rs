use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use verity_base::Vec2;
use verity_video::{FfmpegSource, FrameSampler, FrameSource, check_tools};

/// Encode a synthetic test pattern, or `None` when ffmpeg is not installed.
fn test_clip(dir: &Path, frames: usize) -> Option<PathBuf> {
    if let Err(e) = check_tools() {
        eprintln!("skipping, ffmpeg unavailable: {e}");
        return None;
    }
    let path = dir.join(format!("testsrc-{frames}.mp4"));
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y", "-f", "lavfi", "-i"])
        .arg("testsrc=size=64x48:rate=10")
        .args(["-frames:v", &frames.to_string(), "-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());
    Some(path)
}

#[test]
fn test_decodes_every_frame_at_reported_size() {
    let dir = tempfile::tempdir().unwrap();
    let Some(path) = test_clip(dir.path(), 12) else {
        return;
    };

    let mut source = FfmpegSource::open(&path).unwrap();
    assert_eq!(source.size(), Vec2::new(64, 48));

    let mut count = 0;
    while let Some(frame) = source.next_frame().unwrap() {
        assert_eq!(frame.size, Vec2::new(64, 48));
        assert_eq!(frame.data.len(), 64 * 48 * 3);
        count += 1;
    }
    assert_eq!(count, 12);
    assert!(source.next_frame().unwrap().is_none());
}

#[test]
fn test_sample_file_reads_first_frames_then_stops() {
    let dir = tempfile::tempdir().unwrap();
    let Some(path) = test_clip(dir.path(), 300) else {
        return;
    };

    let start = Instant::now();
    let clip = FrameSampler::default().sample_file(&path);
    assert_eq!(clip.frames_read(), 15);
    assert_eq!(clip.padding(), 0);
    // the decoder is killed once enough frames are read
    assert!(start.elapsed() < Duration::from_secs(30));
}

#[test]
fn test_sample_file_matches_in_memory_decode() {
    let dir = tempfile::tempdir().unwrap();
    let Some(path) = test_clip(dir.path(), 8) else {
        return;
    };

    let a = FrameSampler::default().sample_file(&path);
    let b = FrameSampler::default().sample_file(&path);
    assert_eq!(a.frames_read(), 8);
    assert_eq!(a.to_tensor(), b.to_tensor());
}

#[test]
fn test_non_video_is_open_error_with_tools_present() {
    let dir = tempfile::tempdir().unwrap();
    if check_tools().is_err() {
        return;
    }
    let path = dir.path().join("notes.mp4");
    std::fs::write(&path, b"plain text, not a container").unwrap();
    assert!(FfmpegSource::open(&path).is_err());
}
