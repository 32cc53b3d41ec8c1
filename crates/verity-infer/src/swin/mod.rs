// Swin Transformer image encoder, laid out like the HuggingFace `SwinModel`
// so its checkpoints load by name.

mod blocks;
mod window;

pub use blocks::{PatchMerging, SwinBlock, SwinStage, WindowAttention};

use crate::InferError;
use candle_core::{Module, Result, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, LayerNorm, VarBuilder, conv2d, layer_norm};

/// Maps a batch of normalized frames to one appearance vector per frame.
pub trait VisualEmbedder: Send + Sync {
    /// Length of each appearance vector.
    fn embedding_dim(&self) -> usize;

    /// `(N, 3, H, W)` to `(N, embedding_dim)`.
    fn embed(&self, frames: &Tensor) -> std::result::Result<Tensor, InferError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwinConfig {
    pub image_size: usize,
    pub patch_size: usize,
    pub num_channels: usize,
    pub embed_dim: usize,
    pub depths: Vec<usize>,
    pub num_heads: Vec<usize>,
    pub window_size: usize,
    pub mlp_ratio: f64,
    pub layer_norm_eps: f64,
}

impl SwinConfig {
    /// `microsoft/swin-tiny-patch4-window7-224`
    pub fn tiny() -> Self {
        Self {
            image_size: 224,
            patch_size: 4,
            num_channels: 3,
            embed_dim: 96,
            depths: vec![2, 2, 6, 2],
            num_heads: vec![3, 6, 12, 24],
            window_size: 7,
            mlp_ratio: 4.0,
            layer_norm_eps: 1e-5,
        }
    }

    /// Channels of the last stage.
    pub fn hidden_size(&self) -> usize {
        self.embed_dim << self.depths.len().saturating_sub(1)
    }

    fn check(&self) -> std::result::Result<(), InferError> {
        if self.depths.is_empty() || self.depths.len() != self.num_heads.len() {
            return Err(InferError::Shape(format!(
                "depths {:?} and heads {:?} must be non-empty and equally long",
                self.depths, self.num_heads
            )));
        }
        let mut side = self.image_size / self.patch_size;
        if side * self.patch_size != self.image_size {
            return Err(InferError::Shape(format!(
                "image size {} is not a multiple of patch size {}",
                self.image_size, self.patch_size
            )));
        }
        for stage in 0..self.depths.len() {
            if side % self.window_size.min(side) != 0 {
                return Err(InferError::Shape(format!(
                    "stage {stage} resolution {side} is not a multiple of window {}",
                    self.window_size
                )));
            }
            if stage + 1 < self.depths.len() {
                if side % 2 != 0 {
                    return Err(InferError::Shape(format!(
                        "stage {stage} resolution {side} cannot be merged"
                    )));
                }
                side /= 2;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct SwinEmbeddings {
    projection: Conv2d,
    norm: LayerNorm,
}

impl Module for SwinEmbeddings {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        // (B, C, H, W) -> (B, H*W, C)
        xs.apply(&self.projection)?
            .flatten_from(2)?
            .transpose(1, 2)?
            .apply(&self.norm)
    }
}

#[derive(Debug)]
pub struct SwinModel {
    embeddings: SwinEmbeddings,
    stages: Vec<SwinStage>,
    layernorm: LayerNorm,
    config: SwinConfig,
}

impl SwinModel {
    pub fn load(vb: VarBuilder, config: &SwinConfig) -> std::result::Result<Self, InferError> {
        config.check()?;
        let eps = config.layer_norm_eps;

        let emb = vb.pp("embeddings");
        let projection = conv2d(
            config.num_channels,
            config.embed_dim,
            config.patch_size,
            Conv2dConfig {
                stride: config.patch_size,
                ..Default::default()
            },
            emb.pp("patch_embeddings").pp("projection"),
        )?;
        let embeddings = SwinEmbeddings {
            projection,
            norm: layer_norm(config.embed_dim, eps, emb.pp("norm"))?,
        };

        let mut stages = Vec::with_capacity(config.depths.len());
        let mut dim = config.embed_dim;
        let mut side = config.image_size / config.patch_size;
        for (i, (&depth, &heads)) in config.depths.iter().zip(&config.num_heads).enumerate() {
            let last = i + 1 == config.depths.len();
            stages.push(SwinStage::load(
                vb.pp(format!("encoder.layers.{i}")),
                dim,
                depth,
                heads,
                (side, side),
                config.window_size,
                config.mlp_ratio,
                eps,
                !last,
            )?);
            if !last {
                dim *= 2;
                side /= 2;
            }
        }

        let layernorm = layer_norm(dim, eps, vb.pp("layernorm"))?;
        Ok(Self {
            embeddings,
            stages,
            layernorm,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &SwinConfig {
        &self.config
    }
}

impl Module for SwinModel {
    /// Last hidden state, `(B, tokens, hidden_size)`.
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = self.embeddings.forward(xs)?;
        for stage in &self.stages {
            xs = stage.forward(&xs)?;
        }
        xs.apply(&self.layernorm)
    }
}

impl VisualEmbedder for SwinModel {
    fn embedding_dim(&self) -> usize {
        self.config.hidden_size()
    }

    fn embed(&self, frames: &Tensor) -> std::result::Result<Tensor, InferError> {
        let (_, _, h, w) = frames.dims4()?;
        if h != self.config.image_size || w != self.config.image_size {
            return Err(InferError::Shape(format!(
                "expected {0}x{0} frames, got {w}x{h}",
                self.config.image_size
            )));
        }
        // mean over tokens, no class token
        Ok(self.forward(frames)?.mean(1)?)
    }
}
