use crate::checkpoint::VideoCheckpoint;
use crate::clip::ClipTensor;
use crate::face::{FaceLandmarks, LANDMARK_DIM, LandmarkExtractor};
use crate::fusion::{AttentionFusion, WeightedSequence};
use crate::label::{Label, VideoPrediction};
use crate::swin::{SwinModel, VisualEmbedder};
use crate::temporal::{TemporalClassifier, argmax};
use crate::InferError;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use verity_video::{FrameSampler, FrameSource, SampledClip};

/// Deepfake classifier for short clips.
///
/// Samples a fixed number of frames, embeds each with the visual encoder,
/// extracts face landmarks from the full-resolution frames, fuses both with
/// temporal attention and classifies the sequence with a bidirectional LSTM.
pub struct VideoClassifier {
    sampler: FrameSampler,
    embedder: Box<dyn VisualEmbedder>,
    landmarks: Box<dyn LandmarkExtractor>,
    fusion: AttentionFusion,
    temporal: TemporalClassifier,
    device: Device,
}

impl std::fmt::Debug for VideoClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoClassifier")
            .field("sampler", &self.sampler)
            .field("embedding_dim", &self.embedder.embedding_dim())
            .field("device", &self.device)
            .finish()
    }
}

impl VideoClassifier {
    pub fn new(
        embedder: Box<dyn VisualEmbedder>,
        landmarks: Box<dyn LandmarkExtractor>,
        fusion: AttentionFusion,
        temporal: TemporalClassifier,
        device: Device,
    ) -> Result<Self, InferError> {
        let combined = embedder.embedding_dim() + LANDMARK_DIM;
        if fusion.dim() != combined || temporal.config().input_size != combined {
            return Err(InferError::Shape(format!(
                "embedding {} + landmarks {LANDMARK_DIM} does not match attention {} / lstm {}",
                embedder.embedding_dim(),
                fusion.dim(),
                temporal.config().input_size
            )));
        }
        Ok(Self {
            sampler: FrameSampler::default(),
            embedder,
            landmarks,
            fusion,
            temporal,
            device,
        })
    }

    /// Build from checkpoint weights laid out as `swin.*`, `attention.*`,
    /// `lstm.*` and `fc.*`.
    pub fn load(
        vb: VarBuilder,
        checkpoint: &VideoCheckpoint,
        landmarks: Box<dyn LandmarkExtractor>,
    ) -> Result<Self, InferError> {
        let device = vb.device().clone();
        let swin = SwinModel::load(vb.pp("swin"), &checkpoint.swin)?;
        let fusion = AttentionFusion::load(vb.pp("attention"), checkpoint.fusion_dim)?;
        let temporal = TemporalClassifier::load(vb, checkpoint.lstm)?;
        let sampler = FrameSampler {
            frame_size: checkpoint.swin.image_size,
            ..FrameSampler::default()
        };
        Ok(Self::new(Box::new(swin), landmarks, fusion, temporal, device)?.with_sampler(sampler))
    }

    pub(crate) fn from_file(
        model_path: impl AsRef<Path>,
        device: Device,
        landmarks: Box<dyn LandmarkExtractor>,
    ) -> Result<Self, InferError> {
        let checkpoint = VideoCheckpoint::inspect(&model_path)?;
        log::info!(
            "video model: swin depths {:?}, embed {}, lstm {}x{}",
            checkpoint.swin.depths,
            checkpoint.swin.embed_dim,
            checkpoint.lstm.num_layers,
            checkpoint.lstm.hidden_size
        );
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_path.as_ref()], DType::F32, &device)?
        };
        Self::load(vb, &checkpoint, landmarks)
    }

    pub fn with_sampler(mut self, sampler: FrameSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    /// Lower a sampled clip to model input, running the landmark extractor on
    /// every real frame.
    pub fn build_clip(&self, clip: &SampledClip) -> Result<ClipTensor, InferError> {
        self.build_clip_until(clip, &AtomicBool::new(false))
    }

    fn build_clip_until(&self, clip: &SampledClip, cancel: &AtomicBool) -> Result<ClipTensor, InferError> {
        let frames = clip.to_tensor();
        let frames = Tensor::from_vec(frames.data, frames.shape, &self.device)?;

        let mut landmarks = Vec::with_capacity(clip.len());
        for (index, frame) in clip.frames().iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                return Err(InferError::Cancelled);
            }
            let outcome = self.landmarks.extract(&frame.original)?;
            if !outcome.is_detected() {
                log::debug!("no face in frame {index}");
            }
            landmarks.push(outcome);
        }
        landmarks.resize(clip.len(), FaceLandmarks::NotDetected);

        Ok(ClipTensor {
            frames,
            landmarks,
            frames_read: clip.frames_read(),
        })
    }

    /// Attention-weighted features for a clip, batch of one.
    pub fn fuse(&self, clip: &ClipTensor) -> Result<WeightedSequence, InferError> {
        let appearance = self.embedder.embed(&clip.frames)?.unsqueeze(0)?;
        let landmarks = clip.landmark_tensor(&self.device)?.unsqueeze(0)?;
        Ok(self.fusion.forward(&appearance, &landmarks)?)
    }

    pub fn classify_clip(&self, clip: &ClipTensor) -> Result<VideoPrediction, InferError> {
        let weighted = self.fuse(clip)?;
        let logits: Vec<f32> = self
            .temporal
            .forward(&weighted.features)?
            .squeeze(0)?
            .to_vec1()?;
        let label = Label::from_index(argmax(&logits))
            .ok_or_else(|| InferError::Shape(format!("unexpected logits {logits:?}")))?;

        Ok(VideoPrediction {
            label,
            logits,
            frames_read: clip.frames_read,
            faces_detected: clip.faces_detected(),
        })
    }

    pub fn classify_sampled(&self, clip: &SampledClip) -> Result<VideoPrediction, InferError> {
        self.classify_clip(&self.build_clip(clip)?)
    }

    pub fn classify_source<S: FrameSource>(&self, source: S) -> Result<VideoPrediction, InferError> {
        self.classify_sampled(&self.sampler.sample(source))
    }

    pub fn classify_source_until<S: FrameSource>(
        &self,
        source: S,
        cancel: &AtomicBool,
    ) -> Result<VideoPrediction, InferError> {
        self.classify_sampled_until(&self.sampler.sample_until(source, cancel), cancel)
    }

    fn classify_sampled_until(
        &self,
        sampled: &SampledClip,
        cancel: &AtomicBool,
    ) -> Result<VideoPrediction, InferError> {
        let clip = self.build_clip_until(sampled, cancel)?;
        if cancel.load(Ordering::Relaxed) {
            return Err(InferError::Cancelled);
        }
        self.classify_clip(&clip)
    }

    /// Classify a video file. An unreadable file is classified as an
    /// all-padding clip rather than rejected.
    pub fn classify_file(&self, path: impl AsRef<Path>) -> Result<VideoPrediction, InferError> {
        self.classify_file_until(path, &AtomicBool::new(false))
    }

    /// Like [`classify_file`](Self::classify_file), but gives up with
    /// `InferError::Cancelled` once `cancel` is set. The flag is checked
    /// between frames.
    pub fn classify_file_until(
        &self,
        path: impl AsRef<Path>,
        cancel: &AtomicBool,
    ) -> Result<VideoPrediction, InferError> {
        let sampled = self.sampler.sample_file_until(path, cancel);
        let prediction = self.classify_sampled_until(&sampled, cancel)?;
        log::info!(
            "video: {} ({} frames, {} faces, logits {:?})",
            prediction.label,
            prediction.frames_read,
            prediction.faces_detected,
            prediction.logits
        );
        Ok(prediction)
    }
}
