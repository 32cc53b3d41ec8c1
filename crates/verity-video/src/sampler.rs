use crate::{FfmpegSource, FrameSource};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use verity_base::{Tensor, Vec2};
use verity_image::{IMAGENET_MEAN, IMAGENET_STD, RgbImage, resize_bilinear, to_normalized_chw};

/// Frames per clip the video model was trained on.
pub const CLIP_LENGTH: usize = 15;

/// Side of the square frame fed to the visual embedder.
pub const FRAME_SIZE: usize = 224;

/// A decoded frame paired with its model-ready form.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Full-resolution RGB frame.
    pub original: RgbImage,
    /// `[3, FRAME_SIZE, FRAME_SIZE]`, ImageNet-normalized.
    pub normalized: Tensor<f32>,
}

/// The first `length` frames of a video, plus how many slots are padding.
#[derive(Debug, Clone)]
pub struct SampledClip {
    frames: Vec<SampledFrame>,
    length: usize,
    frame_size: usize,
}

impl SampledClip {
    pub fn empty(length: usize, frame_size: usize) -> Self {
        Self {
            frames: Vec::new(),
            length,
            frame_size,
        }
    }

    /// Frames actually read from the source, in order.
    pub fn frames(&self) -> &[SampledFrame] {
        &self.frames
    }

    /// Fixed clip length, real frames plus padding.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn frames_read(&self) -> usize {
        self.frames.len()
    }

    /// Number of zero frames appended at the tail.
    pub fn padding(&self) -> usize {
        self.length - self.frames.len()
    }

    /// `[length, 3, frame_size, frame_size]`; padded slots are exactly zero.
    pub fn to_tensor(&self) -> Tensor<f32> {
        let plane = 3 * self.frame_size * self.frame_size;
        let mut data = Vec::with_capacity(self.length * plane);
        for frame in &self.frames {
            data.extend_from_slice(&frame.normalized.data);
        }
        data.resize(self.length * plane, 0.0);
        Tensor {
            shape: vec![self.length, 3, self.frame_size, self.frame_size],
            data,
        }
    }
}

/// Reads a fixed number of frames from a source in temporal order.
///
/// Frames past `length` are never decoded. A read error ends the clip early;
/// the missing slots become padding like any other short source.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    pub length: usize,
    pub frame_size: usize,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self {
            length: CLIP_LENGTH,
            frame_size: FRAME_SIZE,
        }
    }
}

impl FrameSampler {
    pub fn new(length: usize, frame_size: usize) -> Self {
        Self { length, frame_size }
    }

    pub fn prepare(&self, frame: RgbImage) -> SampledFrame {
        let resized = resize_bilinear(&frame, Vec2::new(self.frame_size, self.frame_size));
        SampledFrame {
            normalized: to_normalized_chw(&resized, IMAGENET_MEAN, IMAGENET_STD),
            original: frame,
        }
    }

    pub fn sample<S: FrameSource>(&self, source: S) -> SampledClip {
        self.sample_until(source, &AtomicBool::new(false))
    }

    /// Like [`sample`](Self::sample), but stops reading once `cancel` is set.
    pub fn sample_until<S: FrameSource>(&self, mut source: S, cancel: &AtomicBool) -> SampledClip {
        let mut clip = SampledClip::empty(self.length, self.frame_size);
        while clip.frames.len() < self.length {
            if cancel.load(Ordering::Relaxed) {
                log::warn!("sampling cancelled after {} frames", clip.frames.len());
                break;
            }
            match source.next_frame() {
                Ok(Some(frame)) => clip.frames.push(self.prepare(frame)),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("stopping after {} frames: {e}", clip.frames.len());
                    break;
                }
            }
        }
        log::debug!(
            "sampled {} frames, {} padded",
            clip.frames_read(),
            clip.padding()
        );
        clip
    }

    /// Sample a video file. A file that cannot be opened gives an all-padding clip.
    pub fn sample_file(&self, path: impl AsRef<Path>) -> SampledClip {
        self.sample_file_until(path, &AtomicBool::new(false))
    }

    pub fn sample_file_until(&self, path: impl AsRef<Path>, cancel: &AtomicBool) -> SampledClip {
        if cancel.load(Ordering::Relaxed) {
            return SampledClip::empty(self.length, self.frame_size);
        }
        match FfmpegSource::open(path.as_ref()) {
            Ok(source) => self.sample_until(source, cancel),
            Err(e) => {
                log::warn!("cannot open {}: {e}", path.as_ref().display());
                SampledClip::empty(self.length, self.frame_size)
            }
        }
    }
}
