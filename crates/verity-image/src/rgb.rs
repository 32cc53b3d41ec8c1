use crate::ImageError;
use verity_base::Vec2;

/// 8-bit RGB pixels in row-major HWC order.
#[derive(Clone, PartialEq)]
pub struct RgbImage {
    pub size: Vec2<usize>,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for RgbImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbImage").field("size", &self.size).finish()
    }
}

impl RgbImage {
    pub fn new(size: Vec2<usize>, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = size.x * size.y * 3;
        if data.len() != expected {
            return Err(ImageError::Size(format!(
                "{}x{} RGB needs {expected} bytes, got {}",
                size.x,
                size.y,
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    pub fn filled(size: Vec2<usize>, rgb: [u8; 3]) -> Self {
        let data = rgb.iter().copied().cycle().take(size.x * size.y * 3).collect();
        Self { size, data }
    }

    pub fn width(&self) -> usize {
        self.size.x
    }

    pub fn height(&self) -> usize {
        self.size.y
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.size.x + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}
