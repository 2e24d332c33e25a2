//! Persisted model artifacts.
//!
//! The classifier, feature scaler, and label encoder are versioned
//! JSON files loaded once at process start. Each loads independently
//! so a single bad file degrades the service instead of crashing it;
//! readiness reports the three outcomes separately.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use serde::Deserialize;

use crate::audio::features::FEATURE_DIM;

pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unsupported schema version {found} in {} (expected {ARTIFACT_SCHEMA_VERSION})", .path.display())]
    SchemaVersion { path: PathBuf, found: u32 },
    #[error("scaler width {found} does not match feature width {FEATURE_DIM}")]
    ScalerWidth { found: usize },
    #[error("scaler scale[{index}] is not a usable divisor")]
    ScalerScale { index: usize },
    #[error("model input width {found} does not match feature width {FEATURE_DIM}")]
    ModelInputWidth { found: usize },
    #[error("model has no layers")]
    NoLayers,
    #[error("layer {layer} weight shape is inconsistent")]
    LayerShape { layer: usize },
    #[error("label encoder has no classes")]
    NoClasses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Linear,
}

pub struct DenseLayer {
    /// `input_width x output_width`.
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
}

pub struct GenreClassifier {
    pub layers: Vec<DenseLayer>,
}

impl GenreClassifier {
    /// Width of the final layer, one logit per class.
    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.biases.len()).unwrap_or(0)
    }
}

pub struct FeatureScaler {
    pub mean: Array1<f32>,
    pub scale: Array1<f32>,
}

pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> LabelEncoder {
        LabelEncoder { classes }
    }

    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[derive(Deserialize)]
struct ModelFile {
    schema_version: u32,
    input_dim: usize,
    layers: Vec<LayerFile>,
}

#[derive(Deserialize)]
struct LayerFile {
    weights: Vec<Vec<f32>>,
    biases: Vec<f32>,
    activation: Activation,
}

#[derive(Deserialize)]
struct ScalerFile {
    schema_version: u32,
    mean: Vec<f32>,
    scale: Vec<f32>,
}

#[derive(Deserialize)]
struct LabelsFile {
    schema_version: u32,
    classes: Vec<String>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn check_version(path: &Path, found: u32) -> Result<(), ArtifactError> {
    if found != ARTIFACT_SCHEMA_VERSION {
        return Err(ArtifactError::SchemaVersion {
            path: path.to_path_buf(),
            found,
        });
    }
    Ok(())
}

pub fn load_classifier(path: &Path) -> Result<GenreClassifier, ArtifactError> {
    let file: ModelFile = read_json(path)?;
    check_version(path, file.schema_version)?;

    if file.input_dim != FEATURE_DIM {
        return Err(ArtifactError::ModelInputWidth {
            found: file.input_dim,
        });
    }
    if file.layers.is_empty() {
        return Err(ArtifactError::NoLayers);
    }

    let mut layers = Vec::with_capacity(file.layers.len());
    let mut width = file.input_dim;
    for (i, layer) in file.layers.into_iter().enumerate() {
        let out = layer.biases.len();
        if layer.weights.len() != width || layer.weights.iter().any(|row| row.len() != out) {
            return Err(ArtifactError::LayerShape { layer: i });
        }
        let flat: Vec<f32> = layer.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((width, out), flat)
            .map_err(|_| ArtifactError::LayerShape { layer: i })?;
        layers.push(DenseLayer {
            weights,
            biases: Array1::from_vec(layer.biases),
            activation: layer.activation,
        });
        width = out;
    }

    Ok(GenreClassifier { layers })
}

pub fn load_scaler(path: &Path) -> Result<FeatureScaler, ArtifactError> {
    let file: ScalerFile = read_json(path)?;
    check_version(path, file.schema_version)?;

    if file.mean.len() != FEATURE_DIM || file.scale.len() != FEATURE_DIM {
        return Err(ArtifactError::ScalerWidth {
            found: file.mean.len().max(file.scale.len()),
        });
    }
    if let Some(index) = file
        .scale
        .iter()
        .position(|&s| !s.is_finite() || s == 0.0)
    {
        return Err(ArtifactError::ScalerScale { index });
    }

    Ok(FeatureScaler {
        mean: Array1::from_vec(file.mean),
        scale: Array1::from_vec(file.scale),
    })
}

pub fn load_encoder(path: &Path) -> Result<LabelEncoder, ArtifactError> {
    let file: LabelsFile = read_json(path)?;
    check_version(path, file.schema_version)?;

    if file.classes.is_empty() {
        return Err(ArtifactError::NoClasses);
    }
    Ok(LabelEncoder {
        classes: file.classes,
    })
}

/// The three artifacts an inference needs, present only when every
/// load and the cross-artifact check succeeded.
pub struct ModelArtifacts {
    pub classifier: GenreClassifier,
    pub scaler: FeatureScaler,
    pub encoder: LabelEncoder,
}

#[derive(Debug, Clone, Copy)]
pub struct ArtifactStatus {
    pub model_loaded: bool,
    pub scaler_loaded: bool,
    pub encoder_loaded: bool,
}

pub struct ArtifactPaths {
    pub model: PathBuf,
    pub scaler: PathBuf,
    pub labels: PathBuf,
}

pub struct ArtifactStore {
    artifacts: Option<ModelArtifacts>,
    status: ArtifactStatus,
}

impl ArtifactStore {
    /// Loads all three artifacts, logging each outcome. Failures are
    /// recorded in the status, never propagated; the server starts in
    /// a degraded state and reports it per request.
    pub fn load(paths: &ArtifactPaths) -> ArtifactStore {
        let classifier = match load_classifier(&paths.model) {
            Ok(classifier) => {
                log::info!(
                    "Loaded classifier from {} ({} layers, {} classes out)",
                    paths.model.display(),
                    classifier.layers.len(),
                    classifier.output_dim()
                );
                Some(classifier)
            }
            Err(e) => {
                log::error!("Failed to load classifier: {}", e);
                None
            }
        };

        let scaler = match load_scaler(&paths.scaler) {
            Ok(scaler) => {
                log::info!("Loaded feature scaler from {}", paths.scaler.display());
                Some(scaler)
            }
            Err(e) => {
                log::error!("Failed to load scaler: {}", e);
                None
            }
        };

        let encoder = match load_encoder(&paths.labels) {
            Ok(encoder) => {
                log::info!(
                    "Loaded label encoder from {} ({} classes)",
                    paths.labels.display(),
                    encoder.len()
                );
                Some(encoder)
            }
            Err(e) => {
                log::error!("Failed to load label encoder: {}", e);
                None
            }
        };

        let status = ArtifactStatus {
            model_loaded: classifier.is_some(),
            scaler_loaded: scaler.is_some(),
            encoder_loaded: encoder.is_some(),
        };

        let artifacts = match (classifier, scaler, encoder) {
            (Some(classifier), Some(scaler), Some(encoder)) => {
                if classifier.output_dim() != encoder.len() {
                    log::error!(
                        "Classifier emits {} classes but encoder has {}; \
                         predictions could not be decoded, staying not ready",
                        classifier.output_dim(),
                        encoder.len()
                    );
                    None
                } else {
                    Some(ModelArtifacts {
                        classifier,
                        scaler,
                        encoder,
                    })
                }
            }
            _ => None,
        };

        ArtifactStore { artifacts, status }
    }

    pub fn status(&self) -> ArtifactStatus {
        self.status
    }

    /// The artifacts, if every load succeeded.
    pub fn ready(&self) -> Option<&ModelArtifacts> {
        self.artifacts.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn scaler_json() -> String {
        format!(
            r#"{{"schema_version":1,"mean":{},"scale":{}}}"#,
            serde_json::to_string(&vec![0.0f32; FEATURE_DIM]).unwrap(),
            serde_json::to_string(&vec![1.0f32; FEATURE_DIM]).unwrap()
        )
    }

    fn model_json(classes: usize) -> String {
        let weights: Vec<Vec<f32>> = vec![vec![0.01; classes]; FEATURE_DIM];
        format!(
            r#"{{"schema_version":1,"input_dim":58,"layers":[{{"weights":{},"biases":{},"activation":"linear"}}]}}"#,
            serde_json::to_string(&weights).unwrap(),
            serde_json::to_string(&vec![0.0f32; classes]).unwrap()
        )
    }

    #[test]
    fn test_load_all_ready() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths {
            model: write_file(dir.path(), "model.json", &model_json(3)),
            scaler: write_file(dir.path(), "scaler.json", &scaler_json()),
            labels: write_file(
                dir.path(),
                "labels.json",
                r#"{"schema_version":1,"classes":["blues","jazz","rock"]}"#,
            ),
        };

        let store = ArtifactStore::load(&paths);
        let status = store.status();
        assert!(status.model_loaded && status.scaler_loaded && status.encoder_loaded);
        assert!(store.ready().is_some());
    }

    #[test]
    fn test_missing_file_degrades_only_that_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths {
            model: dir.path().join("missing.json"),
            scaler: write_file(dir.path(), "scaler.json", &scaler_json()),
            labels: write_file(
                dir.path(),
                "labels.json",
                r#"{"schema_version":1,"classes":["blues"]}"#,
            ),
        };

        let store = ArtifactStore::load(&paths);
        let status = store.status();
        assert!(!status.model_loaded);
        assert!(status.scaler_loaded);
        assert!(status.encoder_loaded);
        assert!(store.ready().is_none());
    }

    #[test]
    fn test_scaler_wrong_width_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "scaler.json",
            r#"{"schema_version":1,"mean":[0.0,0.0],"scale":[1.0,1.0]}"#,
        );
        assert!(matches!(
            load_scaler(&path),
            Err(ArtifactError::ScalerWidth { found: 2 })
        ));
    }

    #[test]
    fn test_scaler_zero_scale_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut scale = vec![1.0f32; FEATURE_DIM];
        scale[5] = 0.0;
        let contents = format!(
            r#"{{"schema_version":1,"mean":{},"scale":{}}}"#,
            serde_json::to_string(&vec![0.0f32; FEATURE_DIM]).unwrap(),
            serde_json::to_string(&scale).unwrap()
        );
        let path = write_file(dir.path(), "scaler.json", &contents);
        assert!(matches!(
            load_scaler(&path),
            Err(ArtifactError::ScalerScale { index: 5 })
        ));
    }

    #[test]
    fn test_wrong_schema_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "labels.json",
            r#"{"schema_version":2,"classes":["blues"]}"#,
        );
        assert!(matches!(
            load_encoder(&path),
            Err(ArtifactError::SchemaVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_class_count_mismatch_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths {
            model: write_file(dir.path(), "model.json", &model_json(3)),
            scaler: write_file(dir.path(), "scaler.json", &scaler_json()),
            labels: write_file(
                dir.path(),
                "labels.json",
                r#"{"schema_version":1,"classes":["blues","jazz"]}"#,
            ),
        };

        let store = ArtifactStore::load(&paths);
        let status = store.status();
        assert!(status.model_loaded && status.scaler_loaded && status.encoder_loaded);
        assert!(store.ready().is_none());
    }

    #[test]
    fn test_layer_shape_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let weights: Vec<Vec<f32>> = vec![vec![0.0; 3]; 10]; // 10 rows, expects 58
        let contents = format!(
            r#"{{"schema_version":1,"input_dim":58,"layers":[{{"weights":{},"biases":[0.0,0.0,0.0],"activation":"linear"}}]}}"#,
            serde_json::to_string(&weights).unwrap()
        );
        let path = write_file(dir.path(), "model.json", &contents);
        assert!(matches!(
            load_classifier(&path),
            Err(ArtifactError::LayerShape { layer: 0 })
        ));
    }
}
