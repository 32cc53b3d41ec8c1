// BlazeFace short-range face detector (front camera model).
// Weights follow hollance/BlazeFace-PyTorch with batch norm folded into the
// convolution biases.

use crate::InferError;
use candle_core::{DType, Device, Module, Result, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, VarBuilder, conv2d};
use std::path::Path;
use verity_base::{Rect, Vec2};
use verity_image::{RgbImage, resize_bilinear, to_signed_chw};

/// Side of the square detector input.
pub const INPUT_SIZE: usize = 128;

const NUM_ANCHORS: usize = 896;

// raw logits are clipped before the sigmoid
const SCORE_CLIP: f32 = 100.0;

const SCORE_THRESHOLD: f32 = 0.5;
const NMS_THRESHOLD: f32 = 0.3;

/// One face, in coordinates normalized to the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub bounds: Rect<f32>,
    pub score: f32,
}

#[derive(Debug)]
struct BlazeBlock {
    depthwise: Conv2d,
    pointwise: Conv2d,
    channel_pad: usize,
    stride: usize,
}

impl BlazeBlock {
    fn load(vb: VarBuilder, in_channels: usize, out_channels: usize, stride: usize) -> Result<Self> {
        let depthwise = conv2d(
            in_channels,
            in_channels,
            3,
            Conv2dConfig {
                stride,
                padding: if stride == 2 { 0 } else { 1 },
                groups: in_channels,
                ..Default::default()
            },
            vb.pp("depthwise"),
        )?;
        let pointwise = conv2d(
            in_channels,
            out_channels,
            1,
            Conv2dConfig::default(),
            vb.pp("pointwise"),
        )?;
        Ok(Self {
            depthwise,
            pointwise,
            channel_pad: out_channels.saturating_sub(in_channels),
            stride,
        })
    }
}

impl Module for BlazeBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (h, residual) = if self.stride == 2 {
            // TF "same" padding for stride 2 puts the extra row/column at the end
            let padded = xs.pad_with_zeros(2, 0, 2)?.pad_with_zeros(3, 0, 2)?;
            (padded, xs.max_pool2d(2)?)
        } else {
            (xs.clone(), xs.clone())
        };
        let h = h.apply(&self.depthwise)?.apply(&self.pointwise)?;
        let residual = if self.channel_pad > 0 {
            residual.pad_with_zeros(1, 0, self.channel_pad)?
        } else {
            residual
        };
        (h + residual)?.relu()
    }
}

// (in, out, stride)
const BACKBONE1: [(usize, usize, usize); 11] = [
    (24, 24, 1),
    (24, 28, 1),
    (28, 32, 2),
    (32, 36, 1),
    (36, 42, 1),
    (42, 48, 2),
    (48, 56, 1),
    (56, 64, 1),
    (64, 72, 1),
    (72, 80, 1),
    (80, 88, 1),
];

const BACKBONE2: [(usize, usize, usize); 5] = [
    (88, 96, 2),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
    (96, 96, 1),
];

#[derive(Debug)]
pub struct BlazeFace {
    conv0: Conv2d,
    backbone1: Vec<BlazeBlock>,
    backbone2: Vec<BlazeBlock>,
    classifier_16: Conv2d,
    regressor_16: Conv2d,
    classifier_8: Conv2d,
    regressor_8: Conv2d,
    // (x, y) centers, 896 entries
    anchors: Vec<Vec2<f32>>,
    device: Device,
}

impl BlazeFace {
    pub(crate) fn new(model_path: impl AsRef<Path>, device: Device) -> std::result::Result<Self, InferError> {
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_path.as_ref()], DType::F32, &device)?
        };
        Ok(Self::load(vb)?)
    }

    pub fn load(vb: VarBuilder) -> Result<Self> {
        let device = vb.device().clone();
        let conv0 = conv2d(
            3,
            24,
            5,
            Conv2dConfig {
                stride: 2,
                ..Default::default()
            },
            vb.pp("conv0"),
        )?;

        let backbone1 = BACKBONE1
            .iter()
            .enumerate()
            .map(|(i, &(c_in, c_out, s))| BlazeBlock::load(vb.pp(format!("backbone1.{i}")), c_in, c_out, s))
            .collect::<Result<Vec<_>>>()?;
        let backbone2 = BACKBONE2
            .iter()
            .enumerate()
            .map(|(i, &(c_in, c_out, s))| BlazeBlock::load(vb.pp(format!("backbone2.{i}")), c_in, c_out, s))
            .collect::<Result<Vec<_>>>()?;

        let head = |c_in: usize, c_out: usize, name: &str| {
            conv2d(c_in, c_out, 1, Conv2dConfig::default(), vb.pp(name))
        };

        Ok(Self {
            conv0,
            backbone1,
            backbone2,
            classifier_16: head(88, 2, "classifier_16")?,
            regressor_16: head(88, 32, "regressor_16")?,
            classifier_8: head(96, 6, "classifier_8")?,
            regressor_8: head(96, 96, "regressor_8")?,
            anchors: anchors(),
            device,
        })
    }

    /// `(1, 3, 128, 128)` input to raw `(scores (896), boxes (896 x 16))`.
    /// Only the box columns of the regressor output are decoded; the six
    /// keypoints that follow are ignored.
    fn forward(&self, xs: &Tensor) -> Result<(Vec<f32>, Vec<Vec<f32>>)> {
        let xs = xs.pad_with_zeros(2, 1, 2)?.pad_with_zeros(3, 1, 2)?;
        let mut h = xs.apply(&self.conv0)?.relu()?;
        for block in &self.backbone1 {
            h = block.forward(&h)?;
        }
        let features_16 = h.clone();
        for block in &self.backbone2 {
            h = block.forward(&h)?;
        }
        let features_8 = h;

        let flat = |t: Tensor, anchors: usize, width: usize| -> Result<Tensor> {
            t.permute((0, 2, 3, 1))?.reshape((anchors, width))
        };
        let scores = Tensor::cat(
            &[
                flat(features_16.apply(&self.classifier_16)?, 512, 1)?,
                flat(features_8.apply(&self.classifier_8)?, 384, 1)?,
            ],
            0,
        )?;
        let boxes = Tensor::cat(
            &[
                flat(features_16.apply(&self.regressor_16)?, 512, 16)?,
                flat(features_8.apply(&self.regressor_8)?, 384, 16)?,
            ],
            0,
        )?;
        Ok((scores.flatten_all()?.to_vec1()?, boxes.to_vec2()?))
    }

    /// Faces in `image`, best first, after non-maximum suppression.
    pub fn detect(&self, image: &RgbImage) -> std::result::Result<Vec<FaceDetection>, InferError> {
        let input = resize_bilinear(image, Vec2::new(INPUT_SIZE, INPUT_SIZE));
        let chw = to_signed_chw(&input);
        let xs = Tensor::from_vec(chw.data, (1, 3, INPUT_SIZE, INPUT_SIZE), &self.device)?;
        let (scores, boxes) = self.forward(&xs)?;
        Ok(self.decode(&scores, &boxes))
    }

    fn decode(&self, scores: &[f32], boxes: &[Vec<f32>]) -> Vec<FaceDetection> {
        let size = INPUT_SIZE as f32;
        let mut detections = Vec::new();
        for ((&logit, raw), anchor) in scores.iter().zip(boxes).zip(&self.anchors) {
            let score = sigmoid(logit.clamp(-SCORE_CLIP, SCORE_CLIP));
            if score < SCORE_THRESHOLD {
                continue;
            }
            let center = Vec2::new(anchor.x + raw[0] / size, anchor.y + raw[1] / size);
            let half = Vec2::new(raw[2] / size / 2.0, raw[3] / size / 2.0);
            let bounds = Rect::from_corners(
                Vec2::new(center.x - half.x, center.y - half.y),
                Vec2::new(center.x + half.x, center.y + half.y),
            );
            detections.push(FaceDetection { bounds, score });
        }
        non_max_suppression(detections, NMS_THRESHOLD)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// 2 anchors per cell on the 16x16 grid, then 6 per cell on the 8x8 grid.
fn anchors() -> Vec<Vec2<f32>> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (grid, per_cell) in [(16usize, 2usize), (8, 6)] {
        for y in 0..grid {
            for x in 0..grid {
                let center = Vec2::new(
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                );
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

/// Greedy suppression, highest score first.
pub fn non_max_suppression(mut detections: Vec<FaceDetection>, threshold: f32) -> Vec<FaceDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut keep: Vec<FaceDetection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| k.bounds.iou(&det.bounds) < threshold) {
            keep.push(det);
        }
    }
    keep
}
