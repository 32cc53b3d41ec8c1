//! Frame sources and fixed-length clip sampling.

pub mod error;
pub mod ffmpeg;
pub mod sampler;
pub mod source;

pub use error::VideoError;
pub use ffmpeg::{FfmpegSource, MAX_FRAME_SIDE, check_tools};
pub use sampler::{CLIP_LENGTH, FRAME_SIZE, FrameSampler, SampledClip, SampledFrame};
pub use source::{FrameList, FrameSource};
