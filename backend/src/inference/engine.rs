//! Genre inference over an extracted feature vector.
//!
//! Standardizes the vector with the persisted scaler, runs the dense
//! forward pass, and decodes the winning class. The scaler is applied
//! exactly as fitted, never re-fit, and nothing here retries.

use ndarray::Array1;

use crate::artifacts::store::{Activation, ModelArtifacts};
use crate::audio::features::FeatureVector;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("model produced no class probabilities")]
    EmptyOutput,
    #[error("predicted class index {0} has no label")]
    LabelOutOfRange(usize),
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub genre: String,
    pub confidence: f32,
}

/// Runs the full inference chain on one feature vector.
pub fn predict(
    artifacts: &ModelArtifacts,
    features: &FeatureVector,
) -> Result<Prediction, InferenceError> {
    let x = Array1::from_vec(features.as_slice().to_vec());
    let scaled = (&x - &artifacts.scaler.mean) / &artifacts.scaler.scale;

    let mut activations = scaled;
    for layer in &artifacts.classifier.layers {
        let mut out = activations.dot(&layer.weights) + &layer.biases;
        if layer.activation == Activation::Relu {
            out.mapv_inplace(|v| v.max(0.0));
        }
        activations = out;
    }

    let probabilities = softmax(activations.as_slice().unwrap_or(&[]));
    let (index, confidence) = probabilities
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((i, p)),
        })
        .ok_or(InferenceError::EmptyOutput)?;

    let genre = artifacts
        .encoder
        .decode(index)
        .ok_or(InferenceError::LabelOutOfRange(index))?
        .to_string();

    log::debug!("Predicted {} with confidence {:.4}", genre, confidence);

    Ok(Prediction { genre, confidence })
}

/// Numerically stable softmax over raw logits.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::store::{
        DenseLayer, FeatureScaler, GenreClassifier, LabelEncoder,
    };
    use crate::audio::features::{FeatureVector, FEATURE_DIM};
    use ndarray::Array2;

    fn identity_scaler() -> FeatureScaler {
        FeatureScaler {
            mean: Array1::zeros(FEATURE_DIM),
            scale: Array1::ones(FEATURE_DIM),
        }
    }

    fn bias_only_artifacts(biases: Vec<f32>, classes: Vec<&str>) -> ModelArtifacts {
        let out = biases.len();
        ModelArtifacts {
            classifier: GenreClassifier {
                layers: vec![DenseLayer {
                    weights: Array2::zeros((FEATURE_DIM, out)),
                    biases: Array1::from_vec(biases),
                    activation: Activation::Linear,
                }],
            },
            scaler: identity_scaler(),
            encoder: LabelEncoder::new(classes.into_iter().map(String::from).collect()),
        }
    }

    fn features() -> FeatureVector {
        FeatureVector::assemble(vec![0.5; FEATURE_DIM]).unwrap()
    }

    #[test]
    fn test_argmax_and_label_decode() {
        let artifacts = bias_only_artifacts(vec![1.0, 3.0, 2.0], vec!["blues", "jazz", "rock"]);
        let prediction = predict(&artifacts, &features()).unwrap();
        assert_eq!(prediction.genre, "jazz");
        // softmax([1, 3, 2]) peaks at e^0 / (e^-2 + 1 + e^-1).
        assert!((prediction.confidence - 0.6652).abs() < 1e-3);
    }

    #[test]
    fn test_confidence_in_unit_interval() {
        let artifacts = bias_only_artifacts(vec![-5.0, 10.0], vec!["blues", "metal"]);
        let prediction = predict(&artifacts, &features()).unwrap();
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
    }

    #[test]
    fn test_scaler_shifts_decision() {
        // One input feeds the logits directly; standardization moves
        // it from favoring class 0 to class 1.
        let mut weights = Array2::zeros((FEATURE_DIM, 2));
        weights[[0, 0]] = -1.0;
        weights[[0, 1]] = 1.0;
        let mut scaler = identity_scaler();
        scaler.mean[0] = 1.0; // raw 0.5 standardizes to -0.5

        let artifacts = ModelArtifacts {
            classifier: GenreClassifier {
                layers: vec![DenseLayer {
                    weights,
                    biases: Array1::zeros(2),
                    activation: Activation::Linear,
                }],
            },
            scaler,
            encoder: LabelEncoder::new(vec!["a".into(), "b".into()]),
        };

        let prediction = predict(&artifacts, &features()).unwrap();
        assert_eq!(prediction.genre, "a");
    }

    #[test]
    fn test_relu_clamps_hidden_layer() {
        // Hidden layer drives one unit negative; relu zeroes it so the
        // output biases decide alone.
        let mut hidden_weights = Array2::zeros((FEATURE_DIM, 2));
        hidden_weights[[0, 0]] = -10.0;
        hidden_weights[[0, 1]] = -10.0;
        let mut out_weights = Array2::zeros((2, 2));
        out_weights[[0, 0]] = 5.0;
        out_weights[[1, 1]] = 5.0;

        let artifacts = ModelArtifacts {
            classifier: GenreClassifier {
                layers: vec![
                    DenseLayer {
                        weights: hidden_weights,
                        biases: Array1::zeros(2),
                        activation: Activation::Relu,
                    },
                    DenseLayer {
                        weights: out_weights,
                        biases: Array1::from_vec(vec![0.0, 1.0]),
                        activation: Activation::Linear,
                    },
                ],
            },
            scaler: identity_scaler(),
            encoder: LabelEncoder::new(vec!["a".into(), "b".into()]),
        };

        let prediction = predict(&artifacts, &features()).unwrap();
        assert_eq!(prediction.genre, "b");
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[0.1, 2.5, -1.0, 0.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_extreme_logits_stable() {
        let probs = softmax(&[1000.0, -1000.0]);
        assert!((probs[0] - 1.0).abs() < 1e-6);
        assert!(probs.iter().all(|p| p.is_finite()));
    }
}
