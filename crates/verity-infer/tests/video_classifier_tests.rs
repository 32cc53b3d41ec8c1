use std::sync::atomic::{AtomicUsize, Ordering};
use verity_base::Vec2;
use verity_image::RgbImage;
use verity_infer::candle_core::{DType, Device};
use verity_infer::candle_nn::{VarBuilder, VarMap};
use verity_infer::{
    AttentionFusion, FaceLandmarks, InferError, LANDMARK_DIM, LandmarkExtractor, Label,
    LstmConfig, SwinConfig, SwinModel, TemporalClassifier, VideoCheckpoint, VideoClassifier,
};
use verity_video::{FrameList, FrameSampler};

struct NoFace;

impl LandmarkExtractor for NoFace {
    fn extract(&self, _frame: &RgbImage) -> Result<FaceLandmarks, InferError> {
        Ok(FaceLandmarks::NotDetected)
    }
}

/// Finds a face in every other frame and counts calls.
#[derive(Default)]
struct Alternating {
    calls: AtomicUsize,
}

impl LandmarkExtractor for Alternating {
    fn extract(&self, _frame: &RgbImage) -> Result<FaceLandmarks, InferError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n % 2 == 0 {
            Ok(FaceLandmarks::Detected(vec![0.25; LANDMARK_DIM]))
        } else {
            Ok(FaceLandmarks::NotDetected)
        }
    }
}

fn small_swin() -> SwinConfig {
    SwinConfig {
        embed_dim: 8,
        depths: vec![2, 1, 1],
        num_heads: vec![1, 1, 2],
        ..SwinConfig::tiny()
    }
}

fn small_lstm() -> LstmConfig {
    LstmConfig {
        input_size: small_swin().hidden_size() + LANDMARK_DIM,
        hidden_size: 4,
        num_layers: 2,
        num_classes: 2,
    }
}

/// Random weights in the checkpoint layout, saved to disk.
fn write_checkpoint(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    SwinModel::load(vb.pp("swin"), &small_swin()).unwrap();
    AttentionFusion::load(vb.pp("attention"), small_lstm().input_size).unwrap();
    TemporalClassifier::load(vb, small_lstm()).unwrap();
    let path = dir.path().join("video.safetensors");
    varmap.save(&path).unwrap();
    path
}

fn classifier(extractor: Box<dyn LandmarkExtractor>) -> (tempfile::TempDir, VideoClassifier) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_checkpoint(&dir);
    let checkpoint = VideoCheckpoint::inspect(&path).unwrap();
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[&path], DType::F32, &Device::Cpu).unwrap()
    };
    let model = VideoClassifier::load(vb, &checkpoint, extractor).unwrap();
    (dir, model)
}

fn frames(count: usize) -> Vec<RgbImage> {
    (0..count)
        .map(|i| RgbImage::filled(Vec2::new(64, 48), [(i * 20) as u8, 90, 160]))
        .collect()
}

#[test]
fn test_checkpoint_inspection_recovers_architecture() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_checkpoint(&dir);
    let checkpoint = VideoCheckpoint::inspect(&path).unwrap();
    assert_eq!(checkpoint.swin, small_swin());
    assert_eq!(checkpoint.lstm, small_lstm());
    assert_eq!(checkpoint.fusion_dim, 32 + LANDMARK_DIM);
}

#[test]
fn test_short_clip_without_faces_still_gets_a_label() {
    let (_dir, model) = classifier(Box::new(NoFace));
    let clip = model.sampler().sample(FrameList::new(frames(10)));
    let tensor = model.build_clip(&clip).unwrap();

    assert_eq!(tensor.len(), 15);
    assert_eq!(tensor.frames.dims(), &[15, 3, 224, 224]);
    assert_eq!(tensor.faces_detected(), 0);
    let padded = tensor.frames.narrow(0, 10, 5).unwrap().abs().unwrap().sum_all().unwrap();
    assert_eq!(padded.to_scalar::<f32>().unwrap(), 0.0);
    let landmarks = tensor.landmark_tensor(&Device::Cpu).unwrap();
    assert_eq!(landmarks.dims(), &[15, LANDMARK_DIM]);
    let total = landmarks.abs().unwrap().sum_all().unwrap();
    assert_eq!(total.to_scalar::<f32>().unwrap(), 0.0);

    let prediction = model.classify_clip(&tensor).unwrap();
    assert!(matches!(prediction.label, Label::Real | Label::Fake));
    assert_eq!(prediction.logits.len(), 2);
    assert_eq!(prediction.frames_read, 10);
    assert_eq!(prediction.faces_detected, 0);
}

#[test]
fn test_attention_weights_sum_to_one_over_clip() {
    let (_dir, model) = classifier(Box::new(NoFace));
    let clip = model.build_clip(&model.sampler().sample(FrameList::new(frames(15)))).unwrap();
    let weighted = model.fuse(&clip).unwrap();
    assert_eq!(weighted.features.dims(), &[1, 15, 32 + LANDMARK_DIM]);
    let sum = weighted.weights.sum_all().unwrap().to_scalar::<f32>().unwrap();
    assert!((sum - 1.0).abs() < 1e-4);
}

#[test]
fn test_same_input_same_prediction() {
    let (_dir, model) = classifier(Box::new(NoFace));
    let a = model.classify_source(FrameList::new(frames(12))).unwrap();
    let b = model.classify_source(FrameList::new(frames(12))).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_long_source_only_first_frames_are_examined() {
    let extractor = std::sync::Arc::new(Alternating::default());

    struct Shared(std::sync::Arc<Alternating>);
    impl LandmarkExtractor for Shared {
        fn extract(&self, frame: &RgbImage) -> Result<FaceLandmarks, InferError> {
            self.0.extract(frame)
        }
    }

    let (_dir, model) = classifier(Box::new(Shared(extractor.clone())));
    let prediction = model.classify_source(FrameList::new(frames(40))).unwrap();
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 15);
    assert_eq!(prediction.frames_read, 15);
    assert_eq!(prediction.faces_detected, 8);
}

#[test]
fn test_unreadable_file_is_classified_as_padding() {
    let (_dir, model) = classifier(Box::new(NoFace));
    let prediction = model.classify_file("/nonexistent/upload.mp4").unwrap();
    assert_eq!(prediction.frames_read, 0);
    assert_eq!(prediction.faces_detected, 0);
}

#[test]
fn test_mismatched_feature_sizes_are_rejected() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let swin = SwinModel::load(vb.pp("swin"), &small_swin()).unwrap();
    let fusion = AttentionFusion::load(vb.pp("attention"), 100).unwrap();
    let temporal = TemporalClassifier::load(vb, small_lstm()).unwrap();
    let result = VideoClassifier::new(
        Box::new(swin),
        Box::new(NoFace),
        fusion,
        temporal,
        Device::Cpu,
    );
    assert!(matches!(result, Err(InferError::Shape(_))));
}

#[test]
fn test_sampler_can_be_replaced() {
    let (_dir, model) = classifier(Box::new(NoFace));
    let model = model.with_sampler(FrameSampler::new(15, 224));
    assert_eq!(model.sampler().length, 15);
}

#[test]
fn test_cancelled_classification_returns_cancelled() {
    let (_dir, model) = classifier(Box::new(NoFace));
    let cancel = std::sync::atomic::AtomicBool::new(true);
    let result = model.classify_file_until("/nonexistent/upload.mp4", &cancel);
    assert!(matches!(result, Err(InferError::Cancelled)));
}

#[test]
fn test_cancel_stops_landmark_extraction() {
    /// Raises the flag on its second call.
    struct CancelOnSecond {
        calls: AtomicUsize,
        cancel: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl LandmarkExtractor for CancelOnSecond {
        fn extract(&self, _frame: &RgbImage) -> Result<FaceLandmarks, InferError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                self.cancel.store(true, Ordering::Relaxed);
            }
            Ok(FaceLandmarks::NotDetected)
        }
    }

    let cancel = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let extractor = std::sync::Arc::new(CancelOnSecond {
        calls: AtomicUsize::new(0),
        cancel: cancel.clone(),
    });

    struct Shared(std::sync::Arc<CancelOnSecond>);
    impl LandmarkExtractor for Shared {
        fn extract(&self, frame: &RgbImage) -> Result<FaceLandmarks, InferError> {
            self.0.extract(frame)
        }
    }

    let (_dir, model) = classifier(Box::new(Shared(extractor.clone())));
    let result = model.classify_source_until(FrameList::new(frames(15)), &cancel);
    assert!(matches!(result, Err(InferError::Cancelled)));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_uncancelled_flag_classifies_normally() {
    let (_dir, model) = classifier(Box::new(NoFace));
    let cancel = std::sync::atomic::AtomicBool::new(false);
    let a = model.classify_source_until(FrameList::new(frames(9)), &cancel).unwrap();
    let b = model.classify_source(FrameList::new(frames(9))).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.frames_read, 9);
}
