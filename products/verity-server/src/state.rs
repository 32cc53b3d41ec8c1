use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use verity_infer::{ImageClassifier, ImagePrediction, InferError, VideoClassifier, VideoPrediction};

/// Classifies uploaded image bytes.
pub trait ImagePredictor: Send + Sync {
    fn predict_image(&self, bytes: &[u8]) -> Result<ImagePrediction, InferError>;
}

/// Classifies a video already written to disk, giving up once `cancel` is set.
pub trait VideoPredictor: Send + Sync {
    fn predict_video(&self, path: &Path, cancel: &AtomicBool) -> Result<VideoPrediction, InferError>;
}

impl ImagePredictor for ImageClassifier {
    fn predict_image(&self, bytes: &[u8]) -> Result<ImagePrediction, InferError> {
        self.classify_bytes(bytes)
    }
}

impl VideoPredictor for VideoClassifier {
    fn predict_video(&self, path: &Path, cancel: &AtomicBool) -> Result<VideoPrediction, InferError> {
        self.classify_file_until(path, cancel)
    }
}

/// Loaded once at startup and shared by every request.
pub struct AppState {
    pub image: Arc<dyn ImagePredictor>,
    pub video: Arc<dyn VideoPredictor>,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}
