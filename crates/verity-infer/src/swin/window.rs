// Shifted-window helpers shared by the Swin blocks.
//
// Tensors are channels-last: `(batch, height, width, channels)`.

use candle_core::{D, Device, Result, Tensor};

/// Cyclic shift along `dim`: `out[i] = x[(i - shift) mod n]`.
pub fn roll(x: &Tensor, shift: isize, dim: usize) -> Result<Tensor> {
    let n = x.dim(dim)?;
    let s = shift.rem_euclid(n as isize) as usize;
    if s == 0 {
        return Ok(x.clone());
    }
    Tensor::cat(&[x.narrow(dim, n - s, s)?, x.narrow(dim, 0, n - s)?], dim)
}

/// `(B, H, W, C)` to `(B * windows, ws * ws, C)`, windows in row-major order.
pub fn partition(x: &Tensor, ws: usize) -> Result<Tensor> {
    let (b, h, w, c) = x.dims4()?;
    let (nh, nw) = (h / ws, w / ws);
    x.reshape((b * nh, ws, nw, ws * c))?
        .transpose(1, 2)?
        .contiguous()?
        .reshape((b * nh * nw, ws * ws, c))
}

/// Inverse of [`partition`].
pub fn reverse(windows: &Tensor, ws: usize, h: usize, w: usize) -> Result<Tensor> {
    let c = windows.dim(D::Minus1)?;
    let (nh, nw) = (h / ws, w / ws);
    let b = windows.dim(0)? / (nh * nw);
    windows
        .reshape((b * nh, nw, ws, ws * c))?
        .transpose(1, 2)?
        .contiguous()?
        .reshape((b, h, w, c))
}

/// Index into the `(2ws-1)^2` bias table for every token pair of a window.
pub fn relative_position_index(ws: usize) -> Vec<u32> {
    let n = ws * ws;
    let span = 2 * ws - 1;
    let mut index = Vec::with_capacity(n * n);
    for i in 0..n {
        let (hi, wi) = (i / ws, i % ws);
        for j in 0..n {
            let (hj, wj) = (j / ws, j % ws);
            let dh = hi + ws - 1 - hj;
            let dw = wi + ws - 1 - wj;
            index.push((dh * span + dw) as u32);
        }
    }
    index
}

// Region id of one coordinate after the cyclic shift: 0 untouched, 1 and 2 wrapped.
fn region(pos: usize, len: usize, ws: usize, shift: usize) -> usize {
    if pos < len - ws {
        0
    } else if pos < len - shift {
        1
    } else {
        2
    }
}

/// `(windows, ws*ws, ws*ws)` additive mask that blocks attention between
/// tokens that were not neighbours before the shift.
pub fn shifted_window_mask(
    h: usize,
    w: usize,
    ws: usize,
    shift: usize,
    device: &Device,
) -> Result<Tensor> {
    let (nh, nw) = (h / ws, w / ws);
    let n = ws * ws;
    let mut mask = Vec::with_capacity(nh * nw * n * n);
    for wy in 0..nh {
        for wx in 0..nw {
            let ids: Vec<usize> = (0..n)
                .map(|t| {
                    let (y, x) = (wy * ws + t / ws, wx * ws + t % ws);
                    region(y, h, ws, shift) * 3 + region(x, w, ws, shift)
                })
                .collect();
            for i in 0..n {
                for j in 0..n {
                    mask.push(if ids[i] == ids[j] { 0f32 } else { -100f32 });
                }
            }
        }
    }
    Tensor::from_vec(mask, (nh * nw, n, n), device)
}
