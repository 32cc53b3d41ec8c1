use crate::InferError;
use ort::session::Session;
use ort::value::Tensor;
use std::sync::Mutex;
use verity_base::Vec2;
use verity_image::{RgbImage, to_signed_chw};

/// Side of the square face-mesh input.
pub const MESH_INPUT_SIZE: usize = 192;

/// Points in the face mesh.
pub const MESH_POINTS: usize = 468;

/// Length of a flattened landmark vector, `x, y, z` per point.
pub const LANDMARK_DIM: usize = MESH_POINTS * 3;

/// MediaPipe face-landmark model running under ONNX Runtime.
///
/// Takes a `(1, 3, 192, 192)` crop in `[-1, 1]` and produces the 468 mesh
/// points in crop pixels plus a face-presence logit.
pub struct FaceMesh {
    session: Mutex<Session>,
    output_names: Vec<String>,
    presence_threshold: f32,
}

impl std::fmt::Debug for FaceMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceMesh")
            .field("outputs", &self.output_names)
            .field("presence_threshold", &self.presence_threshold)
            .finish()
    }
}

impl FaceMesh {
    pub(crate) fn new(session: Session) -> Self {
        let output_names = session
            .outputs()
            .iter()
            .map(|output| output.name().to_string())
            .collect();
        Self {
            session: Mutex::new(session),
            output_names,
            presence_threshold: 0.5,
        }
    }

    /// Mesh points for a `192x192` crop, normalized to the crop (`x, y` in
    /// `[0, 1]`, `z` in the same units as `x`). `None` when the model says
    /// there is no face.
    pub fn run(&self, crop: &RgbImage) -> Result<Option<Vec<f32>>, InferError> {
        if crop.size != Vec2::new(MESH_INPUT_SIZE, MESH_INPUT_SIZE) {
            return Err(InferError::Shape(format!(
                "face mesh expects a {MESH_INPUT_SIZE}x{MESH_INPUT_SIZE} crop, got {:?}",
                crop.size
            )));
        }
        let chw = to_signed_chw(crop);
        let input = Tensor::from_array((
            vec![1usize, 3, MESH_INPUT_SIZE, MESH_INPUT_SIZE],
            chw.data.into_boxed_slice(),
        ))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferError::Runtime("face mesh session poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![input])?;

        let mut results = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            if let Some(value) = outputs.get(name.as_str()) {
                let (_, data) = value.try_extract_tensor::<f32>()?;
                results.push(data.to_vec());
            }
        }
        let (points, presence) = split_outputs(results)?;

        if let Some(logit) = presence {
            let score = 1.0 / (1.0 + (-logit).exp());
            if score < self.presence_threshold {
                log::debug!("face mesh presence {score:.3} below threshold");
                return Ok(None);
            }
        }

        let scale = 1.0 / MESH_INPUT_SIZE as f32;
        Ok(Some(points.iter().map(|v| v * scale).collect()))
    }
}

/// Picks the landmark tensor (the first with at least 1404 values) and the
/// presence logit (the first single-value tensor) from the model outputs.
pub(crate) fn split_outputs(outputs: Vec<Vec<f32>>) -> Result<(Vec<f32>, Option<f32>), InferError> {
    let mut points = None;
    let mut presence = None;
    for data in outputs {
        if points.is_none() && data.len() >= LANDMARK_DIM {
            points = Some(data[..LANDMARK_DIM].to_vec());
        } else if presence.is_none() && data.len() == 1 {
            presence = Some(data[0]);
        }
    }
    let points = points.ok_or_else(|| {
        InferError::Shape(format!("face mesh produced no tensor with {LANDMARK_DIM} values"))
    })?;
    Ok((points, presence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_outputs_in_any_order() {
        let (points, presence) =
            split_outputs(vec![vec![2.5], vec![1.0; LANDMARK_DIM]]).unwrap();
        assert_eq!(points.len(), LANDMARK_DIM);
        assert_eq!(presence, Some(2.5));
    }

    #[test]
    fn test_split_outputs_truncates_extra_points() {
        // attention meshes append iris points
        let (points, presence) = split_outputs(vec![vec![0.5; 478 * 3]]).unwrap();
        assert_eq!(points.len(), LANDMARK_DIM);
        assert_eq!(presence, None);
    }

    #[test]
    fn test_split_outputs_requires_points() {
        assert!(matches!(
            split_outputs(vec![vec![1.0], vec![0.0; 10]]),
            Err(InferError::Shape(_))
        ));
    }
}
