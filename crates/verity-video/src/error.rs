use std::fmt;

#[derive(Debug)]
pub enum VideoError {
    Open(String),
    Stream(String),
    Decode(String),
    Image(verity_image::ImageError),
}

impl fmt::Display for VideoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoError::Open(msg) => write!(f, "open error: {msg}"),
            VideoError::Stream(msg) => write!(f, "stream error: {msg}"),
            VideoError::Decode(msg) => write!(f, "decode error: {msg}"),
            VideoError::Image(err) => write!(f, "image error: {err}"),
        }
    }
}

impl std::error::Error for VideoError {}

impl From<std::io::Error> for VideoError {
    fn from(err: std::io::Error) -> Self {
        VideoError::Stream(err.to_string())
    }
}

impl From<verity_image::ImageError> for VideoError {
    fn from(err: verity_image::ImageError) -> Self {
        VideoError::Image(err)
    }
}
