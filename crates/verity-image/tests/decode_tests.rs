use crates_image::ImageEncoder;
use verity_image::{ImageError, decode_image};

fn png_bytes(width: u32, height: u32, pixel: fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
    let img = crates_image::RgbaImage::from_fn(width, height, |x, y| crates_image::Rgba(pixel(x, y)));
    let mut buffer = Vec::new();
    crates_image::codecs::png::PngEncoder::new(&mut buffer)
        .write_image(img.as_raw(), width, height, crates_image::ExtendedColorType::Rgba8)
        .unwrap();
    buffer
}

#[test]
fn test_decode_png_drops_alpha() {
    let bytes = png_bytes(3, 2, |x, y| [x as u8 * 10, y as u8 * 20, 7, 128]);
    let image = decode_image(&bytes).unwrap();
    assert_eq!(image.width(), 3);
    assert_eq!(image.height(), 2);
    assert_eq!(image.data.len(), 3 * 2 * 3);
    assert_eq!(image.pixel(2, 1), [20, 20, 7]);
}

#[test]
fn test_decode_jpeg() {
    let img = crates_image::RgbImage::from_pixel(8, 8, crates_image::Rgb([200, 100, 50]));
    let mut buffer = Vec::new();
    crates_image::codecs::jpeg::JpegEncoder::new(&mut buffer)
        .encode_image(&img)
        .unwrap();

    let image = decode_image(&buffer).unwrap();
    assert_eq!((image.width(), image.height()), (8, 8));
    let [r, g, b] = image.pixel(4, 4);
    assert!((r as i32 - 200).abs() < 8);
    assert!((g as i32 - 100).abs() < 8);
    assert!((b as i32 - 50).abs() < 8);
}

#[test]
fn test_decode_garbage_is_decode_error() {
    let result = decode_image(b"definitely not an image");
    assert!(matches!(result, Err(ImageError::Decode(_))));
}

#[test]
fn test_decode_empty_is_decode_error() {
    assert!(matches!(decode_image(&[]), Err(ImageError::Decode(_))));
}

#[test]
fn test_decode_is_deterministic() {
    let bytes = png_bytes(4, 4, |x, y| [(x * y) as u8, 1, 2, 255]);
    assert_eq!(decode_image(&bytes).unwrap(), decode_image(&bytes).unwrap());
}
