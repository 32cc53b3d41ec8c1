use crate::face::{BlazeFace, FaceLandmarker, FaceMesh};
use crate::{ImageClassifier, InferError, VideoClassifier};
use candle_core::Device;
use ort::session::Session as OrtSession;
use std::path::Path;
use std::sync::OnceLock;

static ORT_INIT: OnceLock<()> = OnceLock::new();

fn ensure_ort_init() {
    ORT_INIT.get_or_init(|| {
        let _ = ort::init().commit();
    });
}

#[derive(Debug)]
enum OnnxDevice {
    Cpu,
    #[allow(dead_code)]
    Cuda(usize),
}

/// Device selection shared by every model the process loads.
#[derive(Debug)]
pub struct Inference {
    device: Device,
    onnx_device: OnnxDevice,
}

impl Inference {
    pub fn cpu() -> Self {
        ensure_ort_init();
        log::info!("inference device: CPU");
        Self {
            device: Device::Cpu,
            onnx_device: OnnxDevice::Cpu,
        }
    }

    #[cfg(feature = "cuda")]
    pub fn cuda(ordinal: usize) -> Result<Self, InferError> {
        ensure_ort_init();
        let device = Device::new_cuda(ordinal)?;
        log::info!("inference device: CUDA (ordinal {ordinal})");
        Ok(Self {
            device,
            onnx_device: OnnxDevice::Cuda(ordinal),
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn onnx_session(&self, model_path: impl AsRef<Path>) -> Result<OrtSession, InferError> {
        let path = model_path.as_ref();
        if !path.is_file() {
            return Err(InferError::Io(format!("model not found: {}", path.display())));
        }
        let session = match &self.onnx_device {
            OnnxDevice::Cpu => OrtSession::builder()?
                .with_execution_providers([
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])?
                .commit_from_file(path)?,
            #[cfg(feature = "cuda")]
            OnnxDevice::Cuda(ordinal) => OrtSession::builder()?
                .with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(*ordinal as i32)
                        .build(),
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])?
                .commit_from_file(path)?,
            #[cfg(not(feature = "cuda"))]
            OnnxDevice::Cuda(_) => {
                return Err(InferError::Runtime("CUDA feature not enabled".to_string()));
            }
        };
        Ok(session)
    }

    pub fn use_face_landmarker(
        &self,
        detector_path: impl AsRef<Path>,
        mesh_path: impl AsRef<Path>,
    ) -> Result<FaceLandmarker, InferError> {
        let detector = BlazeFace::new(detector_path, self.device.clone())?;
        let mesh = FaceMesh::new(self.onnx_session(mesh_path)?);
        Ok(FaceLandmarker::new(detector, mesh))
    }

    pub fn use_video_classifier(
        &self,
        model_path: impl AsRef<Path>,
        detector_path: impl AsRef<Path>,
        mesh_path: impl AsRef<Path>,
    ) -> Result<VideoClassifier, InferError> {
        let landmarker = self.use_face_landmarker(detector_path, mesh_path)?;
        VideoClassifier::from_file(model_path, self.device.clone(), Box::new(landmarker))
    }

    pub fn use_image_classifier(
        &self,
        model_path: impl AsRef<Path>,
    ) -> Result<ImageClassifier, InferError> {
        Ok(ImageClassifier::new(self.onnx_session(model_path)?))
    }
}
