use crate::face::{FaceLandmarks, LANDMARK_DIM};
use candle_core::{Device, Result, Tensor};

/// Fixed-length model input for one video: normalized frames and one
/// landmark outcome per slot. Padded slots are zero frames with
/// `NotDetected` landmarks.
#[derive(Debug, Clone)]
pub struct ClipTensor {
    /// `(N, 3, S, S)`
    pub frames: Tensor,
    pub landmarks: Vec<FaceLandmarks>,
    pub frames_read: usize,
}

impl ClipTensor {
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn faces_detected(&self) -> usize {
        self.landmarks.iter().filter(|l| l.is_detected()).count()
    }

    /// `(N, LANDMARK_DIM)`; rows without a face are zero.
    pub fn landmark_tensor(&self, device: &Device) -> Result<Tensor> {
        let data: Vec<f32> = self.landmarks.iter().flat_map(|l| l.to_vector()).collect();
        Tensor::from_vec(data, (self.landmarks.len(), LANDMARK_DIM), device)
    }
}
