use verity_infer::{InferError, Inference};

#[test]
fn test_cpu_context_uses_cpu_device() {
    let inference = Inference::cpu();
    assert!(inference.device().is_cpu());
}

#[test]
fn test_missing_image_model_is_an_io_error() {
    let inference = Inference::cpu();
    let result = inference.use_image_classifier("/nonexistent/image_model.onnx");
    assert!(matches!(result, Err(InferError::Io(_))));
}

#[test]
fn test_missing_video_model_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let inference = Inference::cpu();
    let result = inference.use_video_classifier(
        dir.path().join("video.safetensors"),
        dir.path().join("blazeface.safetensors"),
        dir.path().join("face_landmark.onnx"),
    );
    assert!(result.is_err());
}
