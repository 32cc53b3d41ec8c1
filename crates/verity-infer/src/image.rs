use crate::label::ImagePrediction;
use crate::InferError;
use ort::session::Session;
use ort::value::Tensor;
use std::sync::Mutex;
use verity_base::Vec2;
use verity_image::{ChannelOrder, RgbImage, decode_image, resize_bilinear, to_unit_hwc};

/// Side of the square classifier input.
pub const IMAGE_INPUT_SIZE: usize = 224;

/// Single-frame real/fake classifier exported to ONNX.
///
/// Input is `(1, 224, 224, 3)` in `[0, 1]` with BGR channel order, the
/// layout the network was trained on. Output is one sigmoid probability
/// that the image is real.
pub struct ImageClassifier {
    session: Mutex<Session>,
    output_names: Vec<String>,
}

impl std::fmt::Debug for ImageClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageClassifier")
            .field("outputs", &self.output_names)
            .finish()
    }
}

/// NHWC model input for one image.
pub fn image_input(image: &RgbImage) -> verity_base::Tensor<f32> {
    let resized = resize_bilinear(image, Vec2::new(IMAGE_INPUT_SIZE, IMAGE_INPUT_SIZE));
    let mut input = to_unit_hwc(&resized, ChannelOrder::Bgr);
    input.shape.insert(0, 1);
    input
}

impl ImageClassifier {
    pub(crate) fn new(session: Session) -> Self {
        let output_names = session
            .outputs()
            .iter()
            .map(|output| output.name().to_string())
            .collect();
        Self {
            session: Mutex::new(session),
            output_names,
        }
    }

    pub fn classify(&self, image: &RgbImage) -> Result<ImagePrediction, InferError> {
        let input = image_input(image);
        let input = Tensor::from_array((input.shape, input.data.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferError::Runtime("image session poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![input])?;

        let name = self
            .output_names
            .first()
            .ok_or_else(|| InferError::Shape("image model has no outputs".to_string()))?;
        let value = outputs
            .get(name.as_str())
            .ok_or_else(|| InferError::Runtime(format!("missing output '{name}'")))?;
        let (_, data) = value.try_extract_tensor::<f32>()?;
        let probability = *data
            .first()
            .ok_or_else(|| InferError::Shape("image model returned an empty tensor".to_string()))?;

        let prediction = ImagePrediction::from_probability(probability);
        log::info!(
            "image: {} ({:.2}%, p={probability:.4})",
            prediction.label,
            prediction.confidence
        );
        Ok(prediction)
    }

    /// Decode and classify. Undecodable bytes give `InferError::Image`.
    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<ImagePrediction, InferError> {
        let image = decode_image(bytes)?;
        self.classify(&image)
    }
}
