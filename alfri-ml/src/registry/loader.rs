//! Model loader
//!
//! Turns a descriptor into a [`LoadedModel`]. Neural-network artifacts are
//! decoded as layer stacks and warmed up once under the registry's inference
//! lock; everything else goes through generic deserialization, which accepts
//! either a logistic regression or a k-means artifact.

use ndarray::Array2;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

use super::resolver::ArtifactResolver;
use crate::inference::codec::{decode_artifact, CodecError};
use crate::inference::{
    FeedForwardNetwork, InferenceError, KMeansArtifact, KMeansModel, LoadedModel,
    LogisticArtifact, LogisticModel, ModelEngine, NetworkArtifact,
};
use crate::models::{ModelDescriptor, ModelKind};

/// Failure to load a single model
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("descriptor has no artifact path")]
    MissingPath,

    #[error("artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("invalid model in {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: InferenceError,
    },
}

/// Artifact accepted by generic deserialization
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenericArtifact {
    Logistic(LogisticArtifact),
    KMeans(KMeansArtifact),
}

impl TryFrom<GenericArtifact> for ModelEngine {
    type Error = InferenceError;

    fn try_from(artifact: GenericArtifact) -> Result<Self, Self::Error> {
        Ok(match artifact {
            GenericArtifact::Logistic(a) => ModelEngine::Logistic(LogisticModel::try_from(a)?),
            GenericArtifact::KMeans(a) => ModelEngine::KMeans(KMeansModel::try_from(a)?),
        })
    }
}

/// Decode an artifact payload into an engine according to its type tag
pub fn decode_engine(kind: &ModelKind, data: &[u8]) -> Result<ModelEngine, DecodeEngineError> {
    if kind.is_neural() {
        let artifact: NetworkArtifact = decode_artifact(data)?;
        return Ok(ModelEngine::Network(FeedForwardNetwork::try_from(artifact)?));
    }
    let artifact: GenericArtifact = decode_artifact(data)?;
    Ok(ModelEngine::try_from(artifact)?)
}

/// Payload-level decode failure (no path attached yet)
#[derive(Debug, Error)]
pub enum DecodeEngineError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Invalid(#[from] InferenceError),
}

/// Loads models and owns the lock handed to exclusive-inference models
#[derive(Debug, Clone)]
pub struct ModelLoader {
    resolver: ArtifactResolver,
    inference_lock: Arc<Mutex<()>>,
}

impl ModelLoader {
    pub fn new(resolver: ArtifactResolver, inference_lock: Arc<Mutex<()>>) -> Self {
        Self {
            resolver,
            inference_lock,
        }
    }

    /// Wrap an already-decoded engine the way a loaded artifact would be
    pub fn adopt(&self, engine: ModelEngine) -> LoadedModel {
        LoadedModel::new(engine, &self.inference_lock)
    }

    /// Load and warm up the model described by `descriptor`
    pub fn load(&self, name: &str, descriptor: &ModelDescriptor) -> Result<LoadedModel, LoadError> {
        let logical = descriptor.path.as_deref().ok_or(LoadError::MissingPath)?;
        let path = self.resolver.resolve(logical);
        debug!("Model {} ({}) resolved to {}", name, descriptor.kind, path.display());

        if !path.exists() {
            return Err(LoadError::NotFound(path));
        }

        let data = std::fs::read(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;

        let engine = decode_engine(&descriptor.kind, &data).map_err(|e| match e {
            DecodeEngineError::Codec(source) => LoadError::Decode {
                path: path.clone(),
                source,
            },
            DecodeEngineError::Invalid(source) => LoadError::Invalid {
                path: path.clone(),
                source,
            },
        })?;

        let model = self.adopt(engine);
        if descriptor.kind.is_neural() {
            self.warm_up(name, descriptor, &model);
        }
        Ok(model)
    }

    /// Run one zero-filled inference to surface shape errors early
    ///
    /// Failures are logged; the model stays loaded.
    pub fn warm_up(&self, name: &str, descriptor: &ModelDescriptor, model: &LoadedModel) {
        let width = descriptor
            .expected_input_length
            .unwrap_or_else(|| model.engine().input_width());
        let input = Array2::<f64>::zeros((1, width));

        match model.predict_proba(input.view()) {
            Ok(_) => debug!("Warm-up inference succeeded for {}", name),
            Err(e) => warn!(
                "Warm-up inference failed for {} (input width {}): {}",
                name, width, e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader(dir: &TempDir) -> ModelLoader {
        ModelLoader::new(
            ArtifactResolver::new(Some(dir.path().to_path_buf())).with_fallback_dir("/nonexistent"),
            Arc::new(Mutex::new(())),
        )
    }

    #[test]
    fn test_loads_json_logistic() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("chance.json"),
            r#"{"classes": [0, 1], "coef": [[0.5, 0.5]], "intercept": [0.0]}"#,
        )
        .unwrap();
        let descriptor = ModelDescriptor::new(ModelKind::Logistic).with_path("chance.json");

        let model = loader(&dir).load("chance", &descriptor).unwrap();
        assert_eq!(model.engine().engine_name(), "logistic");
        assert!(model.capabilities().can_produce_probabilities);
    }

    #[test]
    fn test_generic_decode_accepts_kmeans_under_any_tag() {
        let dir = TempDir::new().unwrap();
        let bytes = rmp_serde::to_vec_named(&KMeansArtifact {
            cluster_centers: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
            n_clusters: None,
        })
        .unwrap();
        std::fs::write(dir.path().join("clusters.msgpack"), bytes).unwrap();

        let descriptor = ModelDescriptor::new(ModelKind::Unknown("pickle".to_string()))
            .with_path("clusters.msgpack");
        let model = loader(&dir).load("clusters", &descriptor).unwrap();
        assert!(model.as_kmeans().is_some());
    }

    #[test]
    fn test_missing_path() {
        let dir = TempDir::new().unwrap();
        let descriptor = ModelDescriptor::new(ModelKind::Logistic);
        assert!(matches!(
            loader(&dir).load("x", &descriptor),
            Err(LoadError::MissingPath)
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let descriptor = ModelDescriptor::new(ModelKind::KMeans).with_path("nope.msgpack");
        let err = loader(&dir).load("x", &descriptor).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        assert!(err.to_string().contains("nope.msgpack"));
    }

    #[test]
    fn test_undecodable_artifact() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.bin"), b"definitely not a model").unwrap();
        let descriptor = ModelDescriptor::new(ModelKind::Logistic).with_path("bad.bin");
        assert!(matches!(
            loader(&dir).load("x", &descriptor),
            Err(LoadError::Decode { .. })
        ));
    }

    #[test]
    fn test_warm_up_failure_keeps_model_loaded() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("mark.json"),
            r#"{"layers": [{"weights": [[1.0, 0.0], [0.0, 1.0]], "activation": "softmax"}]}"#,
        )
        .unwrap();
        // Declared width disagrees with the network, so warm-up fails
        let descriptor = ModelDescriptor::new(ModelKind::Keras)
            .with_path("mark.json")
            .with_expected_input_length(5);

        let model = loader(&dir).load("mark", &descriptor).unwrap();
        assert!(model.gate().is_exclusive());
    }
}
