mod blazeface;
mod mesh;

pub use blazeface::{BlazeFace, FaceDetection, INPUT_SIZE as DETECTOR_INPUT_SIZE, non_max_suppression};
pub use mesh::{FaceMesh, LANDMARK_DIM, MESH_INPUT_SIZE, MESH_POINTS};

use crate::InferError;
use verity_base::{Rect, Vec2};
use verity_image::{RgbImage, crop_resize};

/// Crop side relative to the detected box's longer side.
pub const ROI_SCALE: f32 = 1.5;

/// Landmark outcome for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceLandmarks {
    /// `LANDMARK_DIM` values, `x, y, z` per mesh point.
    Detected(Vec<f32>),
    NotDetected,
}

impl FaceLandmarks {
    pub fn is_detected(&self) -> bool {
        matches!(self, FaceLandmarks::Detected(_))
    }

    /// Flat vector for the fusion input; zeros when no face was found.
    pub fn to_vector(&self) -> Vec<f32> {
        match self {
            FaceLandmarks::Detected(v) => v.clone(),
            FaceLandmarks::NotDetected => vec![0.0; LANDMARK_DIM],
        }
    }
}

/// Produces exactly one landmark outcome per frame.
///
/// Implementations are stateless: the same frame always yields the same
/// outcome. Not finding a face is `Ok(NotDetected)`, never an error.
pub trait LandmarkExtractor: Send + Sync {
    fn extract(&self, frame: &RgbImage) -> Result<FaceLandmarks, InferError>;
}

/// BlazeFace detection followed by the face mesh on the best face.
#[derive(Debug)]
pub struct FaceLandmarker {
    detector: BlazeFace,
    mesh: FaceMesh,
}

impl FaceLandmarker {
    pub fn new(detector: BlazeFace, mesh: FaceMesh) -> Self {
        Self { detector, mesh }
    }
}

impl LandmarkExtractor for FaceLandmarker {
    fn extract(&self, frame: &RgbImage) -> Result<FaceLandmarks, InferError> {
        let Some(face) = self.detector.detect(frame)?.into_iter().next() else {
            return Ok(FaceLandmarks::NotDetected);
        };

        let roi = face_roi(&face.bounds, frame.size);
        let crop = crop_resize(frame, roi, Vec2::new(MESH_INPUT_SIZE, MESH_INPUT_SIZE));
        match self.mesh.run(&crop)? {
            Some(points) => Ok(FaceLandmarks::Detected(to_frame_coordinates(
                &points, &roi, frame.size,
            ))),
            None => Ok(FaceLandmarks::NotDetected),
        }
    }
}

/// Square crop in frame pixels around a detection given in normalized
/// coordinates.
pub fn face_roi(bounds: &Rect<f32>, frame: Vec2<usize>) -> Rect<f32> {
    let (w, h) = (frame.x as f32, frame.y as f32);
    let pixels = Rect::new(
        Vec2::new(bounds.origin.x * w, bounds.origin.y * h),
        Vec2::new(bounds.size.x * w, bounds.size.y * h),
    );
    pixels.square_around_center(ROI_SCALE)
}

/// Map crop-normalized mesh points to frame-normalized ones. `z` is scaled
/// like `x`.
pub fn to_frame_coordinates(points: &[f32], roi: &Rect<f32>, frame: Vec2<usize>) -> Vec<f32> {
    let (w, h) = (frame.x as f32, frame.y as f32);
    points
        .chunks_exact(3)
        .flat_map(|p| {
            [
                (roi.origin.x + p[0] * roi.size.x) / w,
                (roi.origin.y + p[1] * roi.size.y) / h,
                p[2] * roi.size.x / w,
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_detected_is_zero_vector() {
        let v = FaceLandmarks::NotDetected.to_vector();
        assert_eq!(v.len(), 1404);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_face_roi_is_enlarged_square() {
        let bounds = Rect::from_corners(Vec2::new(0.25, 0.25), Vec2::new(0.5, 0.75));
        let roi = face_roi(&bounds, Vec2::new(400, 200));
        // box is 100x100 pixels centered at (150, 100)
        assert!((roi.size.x - 150.0).abs() < 1e-4);
        assert!((roi.size.y - 150.0).abs() < 1e-4);
        assert!((roi.center().x - 150.0).abs() < 1e-4);
        assert!((roi.center().y - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_to_frame_coordinates() {
        let roi = Rect::new(Vec2::new(100.0, 50.0), Vec2::new(200.0, 200.0));
        let mapped = to_frame_coordinates(&[0.5, 0.5, 0.1], &roi, Vec2::new(400, 300));
        assert_eq!(mapped, vec![0.5, 0.5, 0.05]);
    }
}
