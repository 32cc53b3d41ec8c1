use crate::{FrameSource, VideoError};
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use verity_base::Vec2;
use verity_image::RgbImage;

/// Largest accepted frame side. Anything bigger is treated as a broken or
/// hostile container rather than allocated.
pub const MAX_FRAME_SIDE: usize = 8192;

/// Check that `ffmpeg` and `ffprobe` can be run.
pub fn check_tools() -> Result<(), VideoError> {
    for tool in ["ffmpeg", "ffprobe"] {
        let status = Command::new(tool)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| VideoError::Open(format!("cannot run {tool}: {e}")))?;
        if !status.success() {
            return Err(VideoError::Open(format!("{tool} -version exited with {status}")));
        }
    }
    Ok(())
}

/// Frames decoded by an `ffmpeg` child process as raw `rgb24`.
///
/// The stream dimensions come from `ffprobe`. Both binaries must be on `PATH`.
pub struct FfmpegSource {
    child: Child,
    stdout: BufReader<ChildStdout>,
    size: Vec2<usize>,
    frames_read: usize,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(VideoError::Open(format!("{} is not a file", path.display())));
        }

        let size = ffprobe_size(path)?;

        // rotation metadata is ignored so frames keep the ffprobe dimensions
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-pix_fmt", "rgb24", "-f", "rawvideo", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VideoError::Open(format!("failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VideoError::Open("failed to capture ffmpeg stdout".to_string()))?;

        log::debug!("decoding {} at {}x{}", path.display(), size.x, size.y);

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            size,
            frames_read: 0,
            finished: false,
        })
    }

    pub fn size(&self) -> Vec2<usize> {
        self.size
    }

}

// Fills `buf` completely, or returns the number of bytes read before EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// Decides how a stream that ended after `frames_read` whole frames and
// `partial` extra bytes should be reported.
fn end_of_stream(partial: usize, frames_read: usize, exited_ok: bool) -> Result<(), VideoError> {
    if partial > 0 {
        return Err(VideoError::Stream(format!(
            "truncated frame after {frames_read} frames ({partial} bytes)"
        )));
    }
    if !exited_ok && frames_read == 0 {
        return Err(VideoError::Decode("ffmpeg produced no frames".to_string()));
    }
    Ok(())
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        if self.finished {
            return Ok(None);
        }

        let mut data = vec![0u8; self.size.x * self.size.y * 3];
        let filled = read_full(&mut self.stdout, &mut data)?;
        if filled == data.len() {
            self.frames_read += 1;
            return Ok(Some(RgbImage::new(self.size, data)?));
        }

        self.finished = true;
        let status = self.child.wait()?;
        if !status.success() {
            log::debug!("ffmpeg exited with {status}");
        }
        end_of_stream(filled, self.frames_read, status.success())?;
        Ok(None)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn ffprobe_size(path: &Path) -> Result<Vec2<usize>, VideoError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| VideoError::Open(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(VideoError::Open(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_dimensions(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| VideoError::Open(format!("{} has no video stream", path.display())))
}

/// Parse ffprobe's `WIDTHxHEIGHT` line.
fn parse_dimensions(text: &str) -> Option<Vec2<usize>> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut parts = line.split('x').map(str::trim);
    let size = Vec2::new(parts.next()?.parse().ok()?, parts.next()?.parse().ok()?);
    if size.x == 0 || size.y == 0 || size.x > MAX_FRAME_SIDE || size.y > MAX_FRAME_SIDE {
        return None;
    }
    Some(size)
}
