use super::window;
use candle_core::{D, Module, Result, Tensor};
use candle_nn::{LayerNorm, Linear, VarBuilder, layer_norm, linear, linear_no_bias};

/// Multi-head self-attention inside one window, with a learned relative
/// position bias.
#[derive(Debug)]
pub struct WindowAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    // (heads, N, N), already gathered from the bias table
    position_bias: Tensor,
    num_heads: usize,
    scale: f64,
}

impl WindowAttention {
    pub fn load(vb: VarBuilder, dim: usize, num_heads: usize, window_size: usize) -> Result<Self> {
        let sa = vb.pp("self");
        let query = linear(dim, dim, sa.pp("query"))?;
        let key = linear(dim, dim, sa.pp("key"))?;
        let value = linear(dim, dim, sa.pp("value"))?;
        let span = 2 * window_size - 1;
        let table = sa.get((span * span, num_heads), "relative_position_bias_table")?;
        let output = linear(dim, dim, vb.pp("output").pp("dense"))?;

        let n = window_size * window_size;
        let index = Tensor::from_vec(window::relative_position_index(window_size), n * n, table.device())?;
        let position_bias = table
            .index_select(&index, 0)?
            .reshape((n, n, num_heads))?
            .permute((2, 0, 1))?
            .contiguous()?;

        Ok(Self {
            query,
            key,
            value,
            output,
            position_bias,
            num_heads,
            scale: 1.0 / ((dim / num_heads) as f64).sqrt(),
        })
    }

    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (b, n, c) = x.dims3()?;
        x.reshape((b, n, self.num_heads, c / self.num_heads))?
            .transpose(1, 2)?
            .contiguous()
    }

    /// `x`: `(windows * batch, N, C)`. `mask`: `(windows, N, N)` for shifted blocks.
    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let (b, n, c) = x.dims3()?;
        let q = self.split_heads(&x.apply(&self.query)?)?;
        let k = self.split_heads(&x.apply(&self.key)?)?;
        let v = self.split_heads(&x.apply(&self.value)?)?;

        let scores = (q.matmul(&k.t()?.contiguous()?)? * self.scale)?;
        let scores = scores.broadcast_add(&self.position_bias.unsqueeze(0)?)?;
        let scores = match mask {
            Some(mask) => {
                let windows = mask.dim(0)?;
                scores
                    .reshape((b / windows, windows, self.num_heads, n, n))?
                    .broadcast_add(&mask.unsqueeze(1)?.unsqueeze(0)?)?
                    .reshape((b, self.num_heads, n, n))?
            }
            None => scores,
        };
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;

        probs
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((b, n, c))?
            .apply(&self.output)
    }
}

/// One transformer block; odd blocks in a stage use shifted windows.
#[derive(Debug)]
pub struct SwinBlock {
    norm_before: LayerNorm,
    attention: WindowAttention,
    norm_after: LayerNorm,
    intermediate: Linear,
    output: Linear,
    window_size: usize,
    shift: usize,
    mask: Option<Tensor>,
    resolution: (usize, usize),
}

impl SwinBlock {
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        vb: VarBuilder,
        dim: usize,
        num_heads: usize,
        resolution: (usize, usize),
        window_size: usize,
        shifted: bool,
        mlp_ratio: f64,
        eps: f64,
    ) -> Result<Self> {
        // a window never exceeds the feature map; such maps are not shifted
        let (window_size, shift) = if resolution.0.min(resolution.1) <= window_size {
            (resolution.0.min(resolution.1), 0)
        } else if shifted {
            (window_size, window_size / 2)
        } else {
            (window_size, 0)
        };

        let hidden = (dim as f64 * mlp_ratio) as usize;
        let mask = if shift > 0 {
            Some(window::shifted_window_mask(
                resolution.0,
                resolution.1,
                window_size,
                shift,
                vb.device(),
            )?)
        } else {
            None
        };

        Ok(Self {
            norm_before: layer_norm(dim, eps, vb.pp("layernorm_before"))?,
            attention: WindowAttention::load(vb.pp("attention"), dim, num_heads, window_size)?,
            norm_after: layer_norm(dim, eps, vb.pp("layernorm_after"))?,
            intermediate: linear(dim, hidden, vb.pp("intermediate").pp("dense"))?,
            output: linear(hidden, dim, vb.pp("output").pp("dense"))?,
            window_size,
            shift,
            mask,
            resolution,
        })
    }
}

impl Module for SwinBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, l, c) = xs.dims3()?;
        let (h, w) = self.resolution;
        let shift = self.shift as isize;

        let x = xs.apply(&self.norm_before)?.reshape((b, h, w, c))?;
        let x = if shift > 0 {
            window::roll(&window::roll(&x, -shift, 1)?, -shift, 2)?
        } else {
            x
        };
        let windows = window::partition(&x, self.window_size)?;
        let attended = self.attention.forward(&windows, self.mask.as_ref())?;
        let x = window::reverse(&attended, self.window_size, h, w)?;
        let x = if shift > 0 {
            window::roll(&window::roll(&x, shift, 1)?, shift, 2)?
        } else {
            x
        };
        let xs = (xs + x.reshape((b, l, c))?)?;

        let mlp = xs
            .apply(&self.norm_after)?
            .apply(&self.intermediate)?
            .gelu_erf()?
            .apply(&self.output)?;
        xs + mlp
    }
}

/// Halves the resolution and doubles the channels by concatenating 2x2
/// neighbourhoods.
#[derive(Debug)]
pub struct PatchMerging {
    norm: LayerNorm,
    reduction: Linear,
    resolution: (usize, usize),
}

impl PatchMerging {
    pub fn load(vb: VarBuilder, dim: usize, resolution: (usize, usize), eps: f64) -> Result<Self> {
        Ok(Self {
            norm: layer_norm(4 * dim, eps, vb.pp("norm"))?,
            reduction: linear_no_bias(4 * dim, 2 * dim, vb.pp("reduction"))?,
            resolution,
        })
    }
}

impl Module for PatchMerging {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, _, c) = xs.dims3()?;
        let (h, w) = self.resolution;
        let grid = xs.reshape((b, h / 2, 2, w / 2, 2, c))?;
        let pick = |row: usize, col: usize| -> Result<Tensor> {
            grid.narrow(2, row, 1)?
                .narrow(4, col, 1)?
                .reshape((b, h / 2, w / 2, c))
        };
        // (even, even), (odd, even), (even, odd), (odd, odd)
        let merged = Tensor::cat(&[pick(0, 0)?, pick(1, 0)?, pick(0, 1)?, pick(1, 1)?], D::Minus1)?;
        merged
            .reshape((b, (h / 2) * (w / 2), 4 * c))?
            .apply(&self.norm)?
            .apply(&self.reduction)
    }
}

/// A run of blocks at one resolution, optionally followed by a merge.
#[derive(Debug)]
pub struct SwinStage {
    blocks: Vec<SwinBlock>,
    downsample: Option<PatchMerging>,
}

impl SwinStage {
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        vb: VarBuilder,
        dim: usize,
        depth: usize,
        num_heads: usize,
        resolution: (usize, usize),
        window_size: usize,
        mlp_ratio: f64,
        eps: f64,
        downsample: bool,
    ) -> Result<Self> {
        let mut blocks = Vec::with_capacity(depth);
        for i in 0..depth {
            blocks.push(SwinBlock::load(
                vb.pp(format!("blocks.{i}")),
                dim,
                num_heads,
                resolution,
                window_size,
                i % 2 == 1,
                mlp_ratio,
                eps,
            )?);
        }
        let downsample = if downsample {
            Some(PatchMerging::load(vb.pp("downsample"), dim, resolution, eps)?)
        } else {
            None
        };
        Ok(Self { blocks, downsample })
    }
}

impl Module for SwinStage {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }
        match &self.downsample {
            Some(merge) => merge.forward(&xs),
            None => Ok(xs),
        }
    }
}
