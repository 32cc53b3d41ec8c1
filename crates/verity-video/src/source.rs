use crate::VideoError;
use verity_image::RgbImage;

/// Sequential reader of decoded frames.
///
/// `Ok(None)` marks the end of the stream. Frames come back at the source's
/// native resolution in RGB order.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError>;
}

/// In-memory frame source, mostly useful for tests and stills.
pub struct FrameList {
    frames: std::vec::IntoIter<RgbImage>,
}

impl FrameList {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl FrameSource for FrameList {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        Ok(self.frames.next())
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        (**self).next_frame()
    }
}
