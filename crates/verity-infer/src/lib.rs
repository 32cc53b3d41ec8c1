pub mod checkpoint;
pub mod clip;
pub mod error;
pub mod face;
pub mod fusion;
pub mod image;
pub mod inference;
pub mod label;
pub mod swin;
pub mod temporal;
pub mod video;

pub use checkpoint::VideoCheckpoint;
pub use clip::ClipTensor;
pub use error::InferError;
pub use face::{FaceLandmarker, FaceLandmarks, LANDMARK_DIM, LandmarkExtractor};
pub use fusion::{AttentionFusion, WeightedSequence};
pub use image::{IMAGE_INPUT_SIZE, ImageClassifier, image_input};
pub use inference::Inference;
pub use label::{ImagePrediction, Label, VideoPrediction};
pub use swin::{SwinConfig, SwinModel, VisualEmbedder};
pub use temporal::{LstmConfig, TemporalClassifier, argmax};
pub use video::VideoClassifier;

// Re-exported so callers can build weights and tensors without a direct dependency.
pub use candle_core;
pub use candle_nn;
