use crate::RgbImage;
use verity_base::Tensor;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Channel order of an interleaved tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// `[3, H, W]` tensor of `(v / 255 - mean[c]) / std[c]`, channels in RGB order.
pub fn to_normalized_chw(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Tensor<f32> {
    let plane = image.size.x * image.size.y;
    let mut data = vec![0.0f32; plane * 3];
    for (i, px) in image.data.chunks_exact(3).enumerate() {
        for c in 0..3 {
            data[c * plane + i] = (px[c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }
    Tensor {
        shape: vec![3, image.size.y, image.size.x],
        data,
    }
}

/// `[3, H, W]` tensor scaled to `[-1, 1]`.
pub fn to_signed_chw(image: &RgbImage) -> Tensor<f32> {
    to_normalized_chw(image, [0.5; 3], [0.5; 3])
}

/// `[H, W, 3]` tensor scaled to `[0, 1]` in the requested channel order.
pub fn to_unit_hwc(image: &RgbImage, order: ChannelOrder) -> Tensor<f32> {
    let data = match order {
        ChannelOrder::Rgb => image.data.iter().map(|&v| v as f32 / 255.0).collect(),
        ChannelOrder::Bgr => image
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .map(|v| v as f32 / 255.0)
            .collect(),
    };
    Tensor {
        shape: vec![image.size.y, image.size.x, 3],
        data,
    }
}
