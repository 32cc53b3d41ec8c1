use crate::face::LANDMARK_DIM;
use crate::swin::SwinConfig;
use crate::temporal::LstmConfig;
use crate::InferError;
use std::path::Path;

/// Architecture of a video checkpoint, read from its tensor shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoCheckpoint {
    pub swin: SwinConfig,
    pub fusion_dim: usize,
    pub lstm: LstmConfig,
}

impl VideoCheckpoint {
    pub fn inspect(path: impl AsRef<Path>) -> Result<Self, InferError> {
        use safetensors::SafeTensors;

        let file = std::fs::File::open(path.as_ref())?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| InferError::Io(format!("failed to memory-map safetensors file: {e}")))?;
        let tensors = SafeTensors::deserialize(&mmap)
            .map_err(|e| InferError::Io(format!("failed to deserialize safetensors: {e}")))?;

        Self::from_shapes(|name| tensors.tensor(name).ok().map(|view| view.shape().to_vec()))
    }

    /// Derive the architecture from a name-to-shape lookup.
    pub fn from_shapes(shape: impl Fn(&str) -> Option<Vec<usize>>) -> Result<Self, InferError> {
        let require = |name: &str, rank: usize| -> Result<Vec<usize>, InferError> {
            let dims = shape(name)
                .ok_or_else(|| InferError::Shape(format!("checkpoint has no tensor '{name}'")))?;
            if dims.len() != rank {
                return Err(InferError::Shape(format!(
                    "unexpected shape for {name}: {dims:?}"
                )));
            }
            Ok(dims)
        };

        // (out, in, k, k)
        let projection = require("swin.embeddings.patch_embeddings.projection.weight", 4)?;
        let mut swin = SwinConfig {
            embed_dim: projection[0],
            num_channels: projection[1],
            patch_size: projection[2],
            depths: Vec::new(),
            num_heads: Vec::new(),
            ..SwinConfig::tiny()
        };

        let block = |stage: usize, index: usize| {
            format!("swin.encoder.layers.{stage}.blocks.{index}.layernorm_before.weight")
        };
        while shape(&block(swin.depths.len(), 0)).is_some() {
            let stage = swin.depths.len();
            let depth = (0..).take_while(|&i| shape(&block(stage, i)).is_some()).count();
            let table = require(
                &format!(
                    "swin.encoder.layers.{stage}.blocks.0.attention.self.relative_position_bias_table"
                ),
                2,
            )?;
            let span = (table[0] as f64).sqrt().round() as usize;
            if span * span != table[0] || span % 2 == 0 {
                return Err(InferError::Shape(format!(
                    "relative position table of stage {stage} has {} rows",
                    table[0]
                )));
            }
            if stage == 0 {
                swin.window_size = span.div_ceil(2);
            }
            swin.depths.push(depth);
            swin.num_heads.push(table[1]);
        }
        if swin.depths.is_empty() {
            return Err(InferError::Shape("checkpoint has no swin encoder layers".to_string()));
        }

        let fusion_dim = require("attention.attention_weights", 1)?[0];
        let w_ih = require("lstm.weight_ih_l0", 2)?;
        let w_hh = require("lstm.weight_hh_l0", 2)?;
        let num_layers = (0..)
            .take_while(|k| shape(&format!("lstm.weight_ih_l{k}")).is_some())
            .count();
        let lstm = LstmConfig {
            input_size: w_ih[1],
            hidden_size: w_hh[1],
            num_layers,
            num_classes: require("fc.weight", 2)?[0],
        };

        let expected = swin.hidden_size() + LANDMARK_DIM;
        if fusion_dim != expected || lstm.input_size != fusion_dim {
            return Err(InferError::Shape(format!(
                "feature sizes disagree: swin {} + landmarks {LANDMARK_DIM}, attention {fusion_dim}, lstm input {}",
                swin.hidden_size(),
                lstm.input_size
            )));
        }
        if lstm.num_classes != 2 {
            return Err(InferError::Shape(format!(
                "expected a binary classifier head, got {} classes",
                lstm.num_classes
            )));
        }

        Ok(Self {
            swin,
            fusion_dim,
            lstm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tiny_shapes() -> HashMap<String, Vec<usize>> {
        let mut shapes = HashMap::new();
        shapes.insert(
            "swin.embeddings.patch_embeddings.projection.weight".to_string(),
            vec![96, 3, 4, 4],
        );
        for (stage, (&depth, &heads)) in [2usize, 2, 6, 2].iter().zip(&[3usize, 6, 12, 24]).enumerate() {
            for block in 0..depth {
                let prefix = format!("swin.encoder.layers.{stage}.blocks.{block}");
                shapes.insert(format!("{prefix}.layernorm_before.weight"), vec![96 << stage]);
                shapes.insert(
                    format!("{prefix}.attention.self.relative_position_bias_table"),
                    vec![169, heads],
                );
            }
        }
        shapes.insert("attention.attention_weights".to_string(), vec![2172]);
        for k in 0..2 {
            for suffix in ["", "_reverse"] {
                let input = if k == 0 { 2172 } else { 512 };
                shapes.insert(format!("lstm.weight_ih_l{k}{suffix}"), vec![1024, input]);
                shapes.insert(format!("lstm.weight_hh_l{k}{suffix}"), vec![1024, 256]);
            }
        }
        shapes.insert("fc.weight".to_string(), vec![2, 512]);
        shapes
    }

    #[test]
    fn test_detects_swin_tiny_video_model() {
        let shapes = tiny_shapes();
        let checkpoint = VideoCheckpoint::from_shapes(|n| shapes.get(n).cloned()).unwrap();
        assert_eq!(checkpoint.swin, SwinConfig::tiny());
        assert_eq!(checkpoint.fusion_dim, 2172);
        assert_eq!(checkpoint.lstm, LstmConfig::video());
    }

    #[test]
    fn test_rejects_mismatched_attention() {
        let mut shapes = tiny_shapes();
        shapes.insert("attention.attention_weights".to_string(), vec![768]);
        let result = VideoCheckpoint::from_shapes(|n| shapes.get(n).cloned());
        assert!(matches!(result, Err(InferError::Shape(_))));
    }

    #[test]
    fn test_rejects_missing_lstm() {
        let mut shapes = tiny_shapes();
        shapes.retain(|k, _| !k.starts_with("lstm."));
        let result = VideoCheckpoint::from_shapes(|n| shapes.get(n).cloned());
        assert!(matches!(result, Err(InferError::Shape(msg)) if msg.contains("lstm.weight_ih_l0")));
    }
}
