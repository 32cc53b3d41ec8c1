use candle_core::{D, Module, Result, Tensor};
use candle_nn::{Linear, VarBuilder, linear};
use candle_nn::ops::sigmoid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LstmConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub num_classes: usize,
}

impl LstmConfig {
    /// 768 appearance + 1404 landmark features, 2 layers of 256 per direction.
    pub fn video() -> Self {
        Self {
            input_size: 2172,
            hidden_size: 256,
            num_layers: 2,
            num_classes: 2,
        }
    }
}

/// One direction of one LSTM layer, PyTorch gate order (input, forget,
/// cell, output).
#[derive(Debug)]
struct LstmDirection {
    // transposed to (in, 4H) and (H, 4H)
    w_ih: Tensor,
    w_hh: Tensor,
    // b_ih + b_hh
    bias: Tensor,
    hidden_size: usize,
    reverse: bool,
}

impl LstmDirection {
    fn load(vb: &VarBuilder, layer: usize, input: usize, hidden: usize, reverse: bool) -> Result<Self> {
        let suffix = if reverse { "_reverse" } else { "" };
        let get = |shape: (usize, usize), name: &str| -> Result<Tensor> {
            vb.get(shape, &format!("{name}_l{layer}{suffix}"))?.t()?.contiguous()
        };
        let w_ih = get((4 * hidden, input), "weight_ih")?;
        let w_hh = get((4 * hidden, hidden), "weight_hh")?;
        let b_ih = vb.get(4 * hidden, &format!("bias_ih_l{layer}{suffix}"))?;
        let b_hh = vb.get(4 * hidden, &format!("bias_hh_l{layer}{suffix}"))?;
        Ok(Self {
            w_ih,
            w_hh,
            bias: (b_ih + b_hh)?,
            hidden_size: hidden,
            reverse,
        })
    }

    /// `(B, T, in)` to `(B, T, H)`, outputs in input time order.
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, t, _) = xs.dims3()?;
        let projected = xs.broadcast_matmul(&self.w_ih)?.broadcast_add(&self.bias)?;

        let mut h = Tensor::zeros((b, self.hidden_size), xs.dtype(), xs.device())?;
        let mut c = h.clone();
        let mut outputs = Vec::with_capacity(t);
        let steps: Box<dyn Iterator<Item = usize>> = if self.reverse {
            Box::new((0..t).rev())
        } else {
            Box::new(0..t)
        };
        for step in steps {
            let gates = (projected.narrow(1, step, 1)?.squeeze(1)? + h.matmul(&self.w_hh)?)?;
            let gates = gates.chunk(4, 1)?;
            let i = sigmoid(&gates[0])?;
            let f = sigmoid(&gates[1])?;
            let g = gates[2].tanh()?;
            let o = sigmoid(&gates[3])?;
            c = ((f * &c)? + (i * g)?)?;
            h = (o * c.tanh()?)?;
            outputs.push(h.clone());
        }
        if self.reverse {
            outputs.reverse();
        }
        Tensor::stack(&outputs, 1)
    }
}

/// Stacked bidirectional LSTM followed by a linear head on the last time step.
#[derive(Debug)]
pub struct TemporalClassifier {
    layers: Vec<(LstmDirection, LstmDirection)>,
    fc: Linear,
    config: LstmConfig,
}

impl TemporalClassifier {
    /// `vb` is the checkpoint root holding `lstm.*` and `fc.*`.
    pub fn load(vb: VarBuilder, config: LstmConfig) -> Result<Self> {
        let lstm = vb.pp("lstm");
        let mut layers = Vec::with_capacity(config.num_layers);
        for layer in 0..config.num_layers {
            let input = if layer == 0 {
                config.input_size
            } else {
                2 * config.hidden_size
            };
            layers.push((
                LstmDirection::load(&lstm, layer, input, config.hidden_size, false)?,
                LstmDirection::load(&lstm, layer, input, config.hidden_size, true)?,
            ));
        }
        let fc = linear(2 * config.hidden_size, config.num_classes, vb.pp("fc"))?;
        Ok(Self { layers, fc, config })
    }

    pub fn config(&self) -> &LstmConfig {
        &self.config
    }
}

impl Module for TemporalClassifier {
    /// `(B, T, input_size)` to `(B, num_classes)` logits.
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for (forward, backward) in &self.layers {
            xs = Tensor::cat(&[forward.forward(&xs)?, backward.forward(&xs)?], D::Minus1)?;
        }
        let t = xs.dim(1)?;
        xs.narrow(1, t - 1, 1)?.squeeze(1)?.apply(&self.fc)
    }
}

/// Index of the largest logit; ties go to the lower index.
pub fn argmax(logits: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in logits.iter().enumerate() {
        if v > logits[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use std::collections::HashMap;

    fn constant_lstm(config: LstmConfig, value: f32) -> TemporalClassifier {
        let device = Device::Cpu;
        let h4 = 4 * config.hidden_size;
        let mut tensors = HashMap::new();
        for layer in 0..config.num_layers {
            let input = if layer == 0 { config.input_size } else { 2 * config.hidden_size };
            for suffix in ["", "_reverse"] {
                let mut put = |name: String, shape: &[usize]| {
                    let t = (Tensor::ones(shape, DType::F32, &device).unwrap() * value as f64).unwrap();
                    tensors.insert(format!("lstm.{name}"), t);
                };
                put(format!("weight_ih_l{layer}{suffix}"), &[h4, input]);
                put(format!("weight_hh_l{layer}{suffix}"), &[h4, config.hidden_size]);
                put(format!("bias_ih_l{layer}{suffix}"), &[h4]);
                put(format!("bias_hh_l{layer}{suffix}"), &[h4]);
            }
        }
        let fc_w = Tensor::from_vec(
            vec![1f32; config.num_classes * 2 * config.hidden_size],
            (config.num_classes, 2 * config.hidden_size),
            &device,
        )
        .unwrap();
        tensors.insert("fc.weight".to_string(), fc_w);
        tensors.insert(
            "fc.bias".to_string(),
            Tensor::from_vec(vec![0f32, 1.0], 2, &device).unwrap(),
        );
        TemporalClassifier::load(VarBuilder::from_tensors(tensors, DType::F32, &device), config)
            .unwrap()
    }

    #[test]
    fn test_argmax_ties_go_to_zero() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1, 0.7]), 1);
        assert_eq!(argmax(&[0.9, -0.2]), 0);
    }

    #[test]
    fn test_zero_weights_give_known_state() {
        let config = LstmConfig {
            input_size: 3,
            hidden_size: 2,
            num_layers: 2,
            num_classes: 2,
        };
        let model = constant_lstm(config, 0.0);
        let xs = Tensor::ones((1, 5, 3), DType::F32, &Device::Cpu).unwrap();
        let logits = model.forward(&xs).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();

        // all gates are sigmoid(0) = 0.5 and g = 0, so c and h stay zero
        assert_eq!(logits, vec![0.0, 1.0]);
    }

    #[test]
    fn test_single_step_matches_hand_computation() {
        let config = LstmConfig {
            input_size: 1,
            hidden_size: 1,
            num_layers: 1,
            num_classes: 2,
        };
        let model = constant_lstm(config, 0.5);
        let xs = Tensor::ones((1, 1, 1), DType::F32, &Device::Cpu).unwrap();
        let logits = model.forward(&xs).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();

        // pre-activation = 0.5 * x + 0.5 + 0.5 = 1.5 for every gate
        let s = 1.0 / (1.0 + (-1.5f32).exp());
        let c = s * 1.5f32.tanh();
        let h = s * c.tanh();
        assert!((logits[0] - 2.0 * h).abs() < 1e-5);
        assert!((logits[1] - (2.0 * h + 1.0)).abs() < 1e-5);
    }

    #[test]
    fn test_output_shape_for_video_config() {
        let config = LstmConfig {
            input_size: 6,
            hidden_size: 4,
            ..LstmConfig::video()
        };
        let model = constant_lstm(config, 0.01);
        let xs = Tensor::ones((3, 15, 6), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(model.forward(&xs).unwrap().dims(), &[3, 2]);
    }
}
