use image::RgbImage;

use super::artifact::ModelArtifact;
use crate::error::{ArtifactError, ClassifierError};

/// Scores a preprocessed input, one score per class of the model artifact.
pub trait InferenceEngine: Send + Sync + 'static {
    fn infer(&self, input: &RgbImage) -> Result<Vec<f32>, ClassifierError>;
}

impl<F> InferenceEngine for F
where
    F: Fn(&RgbImage) -> Result<Vec<f32>, ClassifierError> + Send + Sync + 'static,
{
    fn infer(&self, input: &RgbImage) -> Result<Vec<f32>, ClassifierError> {
        self(input)
    }
}

// Softmax temperature over colour distance, in 8-bit channel units.
const TEMPERATURE: f32 = 32.0;

/// Nearest-prototype classifier over the mean colour of the input.
#[derive(Debug, Clone)]
pub struct PrototypeEngine {
    prototypes: Vec<[f32; 3]>,
}

impl PrototypeEngine {
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self, ArtifactError> {
        let prototypes = artifact
            .classes
            .iter()
            .map(|class| {
                class
                    .prototype
                    .map(|[r, g, b]| [r as f32, g as f32, b as f32])
                    .ok_or_else(|| {
                        ArtifactError::Invalid(format!(
                            "class '{}' has no colour prototype",
                            class.identifier
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { prototypes })
    }

    fn mean_colour(input: &RgbImage) -> Option<[f32; 3]> {
        let count = input.width() as usize * input.height() as usize;
        if count == 0 {
            return None;
        }
        let mut sum = [0u64; 3];
        for pixel in input.pixels() {
            for (acc, channel) in sum.iter_mut().zip(pixel.0) {
                *acc += channel as u64;
            }
        }
        Some(sum.map(|s| s as f32 / count as f32))
    }
}

impl InferenceEngine for PrototypeEngine {
    fn infer(&self, input: &RgbImage) -> Result<Vec<f32>, ClassifierError> {
        let mean = Self::mean_colour(input)
            .ok_or_else(|| ClassifierError::Inference("empty input tensor".to_string()))?;

        let logits: Vec<f32> = self
            .prototypes
            .iter()
            .map(|prototype| {
                let distance = prototype
                    .iter()
                    .zip(mean)
                    .map(|(p, m)| (p - m) * (p - m))
                    .sum::<f32>()
                    .sqrt();
                -distance / TEMPERATURE
            })
            .collect();

        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f32 = exps.iter().sum();
        Ok(exps.into_iter().map(|e| e / total).collect())
    }
}
