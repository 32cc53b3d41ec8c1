//! Image decoding and preprocessing for the verity models.
//!
//! Decoded images are 8-bit RGB in HWC layout. Preprocessing turns them into
//! `f32` tensors in the layouts the classifiers expect.

pub mod error;
pub mod normalize;
pub mod resize;
pub mod rgb;

pub use error::ImageError;
pub use normalize::{
    ChannelOrder, IMAGENET_MEAN, IMAGENET_STD, to_normalized_chw, to_signed_chw, to_unit_hwc,
};
pub use resize::{crop_resize, resize_bilinear};
pub use rgb::RgbImage;

use verity_base::Vec2;

/// Decode an image from memory into RGB.
///
/// Alpha is dropped and deeper formats are reduced to 8 bits per channel.
pub fn decode_image(data: &[u8]) -> Result<RgbImage, ImageError> {
    let rgb = crates_image::load_from_memory(data)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::Decode("image has no pixels".to_string()));
    }
    RgbImage::new(Vec2::new(width as usize, height as usize), rgb.into_raw())
}
