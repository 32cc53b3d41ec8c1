use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    /// Class index of the video model: 0 is real, 1 is fake.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Label::Real),
            1 => Some(Label::Fake),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Real => "Real",
            Label::Fake => "Fake",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the video pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoPrediction {
    pub label: Label,
    /// Raw class scores, not calibrated.
    pub logits: Vec<f32>,
    pub frames_read: usize,
    pub faces_detected: usize,
}

/// Outcome of the image pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePrediction {
    pub label: Label,
    /// Percentage for the returned label, two decimals.
    pub confidence: f64,
}

impl ImagePrediction {
    /// `probability` is the model's sigmoid output, read as "real".
    /// Exactly 50% counts as fake.
    pub fn from_probability(probability: f32) -> Self {
        let score = probability as f64 * 100.0;
        let (label, confidence) = if score > 50.0 {
            (Label::Real, score)
        } else {
            (Label::Fake, 100.0 - score)
        };
        Self {
            label,
            confidence: (confidence * 100.0).round() / 100.0,
        }
    }
}
