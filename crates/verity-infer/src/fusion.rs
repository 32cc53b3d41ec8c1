use candle_core::{D, Result, Tensor};
use candle_nn::VarBuilder;

/// Per-frame features scaled by a softmax weight over the time axis.
#[derive(Debug, Clone)]
pub struct WeightedSequence {
    /// `(B, T, D)`
    pub features: Tensor,
    /// `(B, T)`; each row sums to one.
    pub weights: Tensor,
}

/// Temporal attention over concatenated appearance and landmark features.
///
/// Each frame's combined vector is scored against one learned vector; the
/// scores are softmaxed over time and used to rescale the frames.
#[derive(Debug)]
pub struct AttentionFusion {
    attention_weights: Tensor,
}

impl AttentionFusion {
    pub fn load(vb: VarBuilder, dim: usize) -> Result<Self> {
        Ok(Self {
            attention_weights: vb.get(dim, "attention_weights")?,
        })
    }

    pub fn dim(&self) -> usize {
        self.attention_weights.elem_count()
    }

    /// `appearance`: `(B, T, Da)`, `landmarks`: `(B, T, Dl)` with `Da + Dl == dim()`.
    pub fn forward(&self, appearance: &Tensor, landmarks: &Tensor) -> Result<WeightedSequence> {
        let combined = Tensor::cat(&[appearance, landmarks], D::Minus1)?;
        let scores = combined
            .broadcast_matmul(&self.attention_weights.unsqueeze(1)?)?
            .squeeze(D::Minus1)?;
        let weights = candle_nn::ops::softmax(&scores, 1)?;
        let features = combined.broadcast_mul(&weights.unsqueeze(D::Minus1)?)?;
        Ok(WeightedSequence { features, weights })
    }
}
