use std::fmt;

#[derive(Debug)]
pub enum InferError {
    Candle(String),
    Onnx(String),
    Shape(String),
    Io(String),
    Runtime(String),
    Cancelled,
    Video(verity_video::VideoError),
    Image(verity_image::ImageError),
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferError::Candle(msg) => write!(f, "candle error: {msg}"),
            InferError::Onnx(msg) => write!(f, "onnx error: {msg}"),
            InferError::Shape(msg) => write!(f, "shape error: {msg}"),
            InferError::Io(msg) => write!(f, "io error: {msg}"),
            InferError::Runtime(msg) => write!(f, "runtime error: {msg}"),
            InferError::Cancelled => write!(f, "cancelled"),
            InferError::Video(err) => write!(f, "video error: {err}"),
            InferError::Image(err) => write!(f, "image error: {err}"),
        }
    }
}

impl std::error::Error for InferError {}

impl From<candle_core::Error> for InferError {
    fn from(err: candle_core::Error) -> Self {
        InferError::Candle(err.to_string())
    }
}

impl From<ort::Error> for InferError {
    fn from(err: ort::Error) -> Self {
        InferError::Onnx(err.to_string())
    }
}

impl From<std::io::Error> for InferError {
    fn from(err: std::io::Error) -> Self {
        InferError::Io(err.to_string())
    }
}

impl From<verity_video::VideoError> for InferError {
    fn from(err: verity_video::VideoError) -> Self {
        InferError::Video(err)
    }
}

impl From<verity_image::ImageError> for InferError {
    fn from(err: verity_image::ImageError) -> Self {
        InferError::Image(err)
    }
}
