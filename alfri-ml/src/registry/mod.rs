//! Model registry
//!
//! The registry owns every loaded model for the life of the process. It is
//! populated once by [`RegistryBuilder::load_all`] and is read-only from then
//! on, so request handlers share it through an `Arc` without locking. The one
//! exception is neural-network inference, which must hold the registry's
//! inference lock; loaded network models carry that lock in their
//! [`InferenceGate`](crate::inference::InferenceGate).
//!
//! Lookups go through two indexes built at load time:
//! `(role, subject) → name` and `study program → name` (k-means only). When
//! the configuration contains duplicate keys the first descriptor in map order
//! wins and a warning is logged.

pub mod loader;
pub mod resolver;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::inference::{LoadedModel, ModelEngine};
use crate::models::{ModelDescriptor, ModelKind, ModelMap, ModelRole};
pub use loader::{LoadError, ModelLoader};
pub use resolver::ArtifactResolver;

/// A routed model together with its descriptor
#[derive(Debug, Clone, Copy)]
pub struct ModelHandle<'a> {
    pub name: &'a str,
    pub descriptor: &'a ModelDescriptor,
    pub model: &'a LoadedModel,
}

/// Per-model load outcome
#[derive(Debug, Clone, Serialize)]
pub struct ModelLoadReport {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_program_id: Option<i64>,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<&'static str>,
    pub load_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate load report served at `GET /api/v1/models`
#[derive(Debug, Clone, Serialize)]
pub struct RegistryReport {
    pub ready: bool,
    pub configured: usize,
    pub loaded: usize,
    pub failed: usize,
    pub models: Vec<ModelLoadReport>,
}

/// Loaded model set with timings, errors and routing indexes
#[derive(Debug)]
pub struct ModelRegistry {
    model_map: ModelMap,
    models: BTreeMap<String, LoadedModel>,
    timings: BTreeMap<String, Duration>,
    errors: BTreeMap<String, String>,
    inference_lock: Arc<Mutex<()>>,
    role_index: HashMap<(ModelRole, String), String>,
    program_index: HashMap<i64, String>,
}

impl ModelRegistry {
    pub fn builder(model_map: ModelMap) -> RegistryBuilder {
        RegistryBuilder::new(model_map)
    }

    /// Registry for a load that never completed
    ///
    /// Every configured model is recorded as failed with `reason`. An empty
    /// map records the reason under `model_loader` so the registry still
    /// reports an error and is never ready.
    pub fn load_failed(model_map: ModelMap, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut errors: BTreeMap<String, String> = model_map
            .keys()
            .map(|name| (name.clone(), reason.clone()))
            .collect();
        if errors.is_empty() {
            errors.insert("model_loader".to_string(), reason);
        }
        let (role_index, program_index) = build_indexes(&model_map);

        Self {
            model_map,
            models: BTreeMap::new(),
            timings: BTreeMap::new(),
            errors,
            inference_lock: Arc::new(Mutex::new(())),
            role_index,
            program_index,
        }
    }

    /// True iff every configured model loaded and nothing failed
    pub fn is_ready(&self) -> bool {
        self.errors.is_empty() && self.models.len() == self.model_map.len()
    }

    pub fn model_map(&self) -> &ModelMap {
        &self.model_map
    }

    pub fn loaded_count(&self) -> usize {
        self.models.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Lock that neural-network inference must hold
    pub fn inference_lock(&self) -> &Arc<Mutex<()>> {
        &self.inference_lock
    }

    pub fn get(&self, name: &str) -> Option<ModelHandle<'_>> {
        let (name, descriptor) = self.model_map.get_key_value(name)?;
        let model = self.models.get(name)?;
        Some(ModelHandle {
            name,
            descriptor,
            model,
        })
    }

    pub fn get_chance_model(&self, subject: &str) -> Option<ModelHandle<'_>> {
        self.by_role(ModelRole::Chance, subject)
    }

    pub fn get_mark_model(&self, subject: &str) -> Option<ModelHandle<'_>> {
        self.by_role(ModelRole::Mark, subject)
    }

    pub fn get_kmeans_model(&self, study_program_id: i64) -> Option<ModelHandle<'_>> {
        let name = self.program_index.get(&study_program_id)?;
        self.get(name)
    }

    fn by_role(&self, role: ModelRole, subject: &str) -> Option<ModelHandle<'_>> {
        let name = self.role_index.get(&(role, subject.to_string()))?;
        self.get(name)
    }

    pub fn report(&self) -> RegistryReport {
        let models = self
            .model_map
            .iter()
            .map(|(name, descriptor)| {
                let loaded = self.models.get(name);
                ModelLoadReport {
                    name: name.clone(),
                    kind: descriptor.kind.to_string(),
                    role: descriptor.role.as_ref().map(ToString::to_string),
                    subject: descriptor.subject.clone(),
                    study_program_id: descriptor.study_program_id,
                    loaded: loaded.is_some(),
                    engine: loaded.map(|m| m.engine().engine_name()),
                    load_time_ms: self
                        .timings
                        .get(name)
                        .map(|d| d.as_secs_f64() * 1000.0),
                    error: self.errors.get(name).cloned(),
                }
            })
            .collect();

        RegistryReport {
            ready: self.is_ready(),
            configured: self.model_map.len(),
            loaded: self.models.len(),
            failed: self.errors.len(),
            models,
        }
    }
}

fn build_indexes(
    model_map: &ModelMap,
) -> (HashMap<(ModelRole, String), String>, HashMap<i64, String>) {
    let mut role_index = HashMap::new();
    let mut program_index = HashMap::new();

    for (name, descriptor) in model_map {
        if let (Some(role), Some(subject)) = (&descriptor.role, &descriptor.subject) {
            let key = (role.clone(), subject.clone());
            if let Some(existing) = role_index.get(&key) {
                warn!(
                    "Models {} and {} both serve {} for '{}'; using {}",
                    existing, name, role, subject, existing
                );
            } else {
                role_index.insert(key, name.clone());
            }
        }

        if descriptor.kind == ModelKind::KMeans {
            if let Some(program) = descriptor.study_program_id {
                if let Some(existing) = program_index.get(&program) {
                    warn!(
                        "K-means models {} and {} both serve study program {}; using {}",
                        existing, name, program, existing
                    );
                } else {
                    program_index.insert(program, name.clone());
                }
            }
        }
    }

    (role_index, program_index)
}

/// Builds a [`ModelRegistry`] from a model map
///
/// Engines can be injected directly with [`RegistryBuilder::with_engine`];
/// every other descriptor is loaded from its artifact.
#[derive(Debug)]
pub struct RegistryBuilder {
    model_map: ModelMap,
    models_dir: Option<PathBuf>,
    fallback_dir: Option<PathBuf>,
    injected: BTreeMap<String, ModelEngine>,
}

impl RegistryBuilder {
    pub fn new(model_map: ModelMap) -> Self {
        Self {
            model_map,
            models_dir: None,
            fallback_dir: None,
            injected: BTreeMap::new(),
        }
    }

    pub fn models_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.models_dir = dir;
        self
    }

    pub fn fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    /// Register an in-memory engine under `name` with its descriptor
    pub fn with_engine(
        mut self,
        name: impl Into<String>,
        descriptor: ModelDescriptor,
        engine: ModelEngine,
    ) -> Self {
        let name = name.into();
        self.model_map.insert(name.clone(), descriptor);
        self.injected.insert(name, engine);
        self
    }

    /// Load every descriptor, recording successes, timings and failures
    ///
    /// Never stops early: one model's failure does not prevent the others
    /// from loading.
    pub fn load_all(self) -> ModelRegistry {
        let inference_lock = Arc::new(Mutex::new(()));
        let mut resolver = ArtifactResolver::new(self.models_dir);
        if let Some(dir) = self.fallback_dir {
            resolver = resolver.with_fallback_dir(dir);
        }
        let loader = ModelLoader::new(resolver, Arc::clone(&inference_lock));

        let mut injected = self.injected;
        let mut models = BTreeMap::new();
        let mut timings = BTreeMap::new();
        let mut errors = BTreeMap::new();

        info!("Loading {} model(s)", self.model_map.len());

        for (name, descriptor) in &self.model_map {
            let started = Instant::now();
            let result = match injected.remove(name) {
                Some(engine) => {
                    let model = loader.adopt(engine);
                    if descriptor.kind.is_neural() {
                        loader.warm_up(name, descriptor, &model);
                    }
                    Ok(model)
                }
                None => loader.load(name, descriptor),
            };
            let elapsed = started.elapsed();
            timings.insert(name.clone(), elapsed);

            match result {
                Ok(model) => {
                    info!(
                        "Loaded model {} ({}, {}) in {:.1} ms",
                        name,
                        descriptor.kind,
                        model.engine().engine_name(),
                        elapsed.as_secs_f64() * 1000.0
                    );
                    models.insert(name.clone(), model);
                }
                Err(e) => {
                    error!("Failed to load model {} ({}): {}", name, descriptor.kind, e);
                    errors.insert(name.clone(), e.to_string());
                }
            }
        }

        let (role_index, program_index) = build_indexes(&self.model_map);

        let registry = ModelRegistry {
            model_map: self.model_map,
            models,
            timings,
            errors,
            inference_lock,
            role_index,
            program_index,
        };

        if registry.is_ready() {
            info!("All {} model(s) loaded", registry.loaded_count());
        } else {
            warn!(
                "Model load finished with {} error(s); {} of {} model(s) available",
                registry.error_count(),
                registry.loaded_count(),
                registry.model_map.len()
            );
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{
        Activation, DenseLayerArtifact, FeedForwardNetwork, KMeansArtifact, KMeansModel,
        LogisticArtifact, LogisticModel, NetworkArtifact,
    };

    fn logistic() -> ModelEngine {
        ModelEngine::Logistic(
            LogisticModel::try_from(LogisticArtifact {
                classes: vec![0, 1],
                coef: vec![vec![1.0]],
                intercept: vec![0.0],
                probability: true,
            })
            .unwrap(),
        )
    }

    fn kmeans() -> ModelEngine {
        ModelEngine::KMeans(
            KMeansModel::try_from(KMeansArtifact {
                cluster_centers: vec![vec![0.0], vec![1.0]],
                n_clusters: None,
            })
            .unwrap(),
        )
    }

    fn network() -> ModelEngine {
        ModelEngine::Network(
            FeedForwardNetwork::try_from(NetworkArtifact {
                layers: vec![DenseLayerArtifact {
                    weights: vec![vec![1.0]],
                    bias: vec![],
                    activation: Activation::Sigmoid,
                }],
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_lookup_by_role_and_program() {
        let registry = ModelRegistry::builder(ModelMap::new())
            .with_engine(
                "math_chance",
                ModelDescriptor::new(ModelKind::Logistic).with_role(ModelRole::Chance, "math"),
                logistic(),
            )
            .with_engine(
                "math_mark",
                ModelDescriptor::new(ModelKind::Keras).with_role(ModelRole::Mark, "math"),
                network(),
            )
            .with_engine(
                "kmeans_inf",
                ModelDescriptor::new(ModelKind::KMeans).with_study_program(3),
                kmeans(),
            )
            .load_all();

        assert!(registry.is_ready());
        assert_eq!(registry.get_chance_model("math").unwrap().name, "math_chance");
        assert_eq!(registry.get_mark_model("math").unwrap().name, "math_mark");
        assert!(registry.get_chance_model("physics").is_none());
        assert_eq!(registry.get_kmeans_model(3).unwrap().name, "kmeans_inf");
        assert!(registry.get_kmeans_model(4).is_none());
    }

    #[test]
    fn test_one_failure_makes_registry_not_ready() {
        let mut map = ModelMap::new();
        map.insert(
            "broken".to_string(),
            ModelDescriptor::new(ModelKind::Logistic)
                .with_role(ModelRole::Chance, "physics")
                .with_path("does/not/exist.msgpack"),
        );

        let registry = ModelRegistry::builder(map)
            .fallback_dir("/nonexistent")
            .with_engine(
                "math_chance",
                ModelDescriptor::new(ModelKind::Logistic).with_role(ModelRole::Chance, "math"),
                logistic(),
            )
            .load_all();

        assert!(!registry.is_ready());
        assert_eq!(registry.loaded_count(), 1);
        assert_eq!(registry.error_count(), 1);
        assert!(registry.errors().contains_key("broken"));
        // Healthy models stay usable, failed ones report as missing
        assert!(registry.get_chance_model("math").is_some());
        assert!(registry.get_chance_model("physics").is_none());

        let report = registry.report();
        assert!(!report.ready);
        let broken = report.models.iter().find(|m| m.name == "broken").unwrap();
        assert!(!broken.loaded);
        assert!(broken.error.is_some());
        assert!(broken.load_time_ms.is_some());
    }

    #[test]
    fn test_first_descriptor_wins_on_duplicates() {
        let registry = ModelRegistry::builder(ModelMap::new())
            .with_engine(
                "a_chance",
                ModelDescriptor::new(ModelKind::Logistic).with_role(ModelRole::Chance, "math"),
                logistic(),
            )
            .with_engine(
                "b_chance",
                ModelDescriptor::new(ModelKind::Logistic).with_role(ModelRole::Chance, "math"),
                logistic(),
            )
            .load_all();
        assert_eq!(registry.get_chance_model("math").unwrap().name, "a_chance");
    }

    #[test]
    fn test_only_kmeans_descriptors_are_program_indexed() {
        let registry = ModelRegistry::builder(ModelMap::new())
            .with_engine(
                "not_kmeans",
                ModelDescriptor::new(ModelKind::Logistic).with_study_program(3),
                logistic(),
            )
            .load_all();
        assert!(registry.get_kmeans_model(3).is_none());
    }

    #[test]
    fn test_load_failed_records_every_model() {
        let mut map = ModelMap::new();
        map.insert(
            "math_chance".to_string(),
            ModelDescriptor::new(ModelKind::Logistic).with_role(ModelRole::Chance, "math"),
        );
        map.insert(
            "kmeans_inf".to_string(),
            ModelDescriptor::new(ModelKind::KMeans).with_study_program(3),
        );

        let registry = ModelRegistry::load_failed(map, "loader panicked");
        assert!(!registry.is_ready());
        assert_eq!(registry.loaded_count(), 0);
        assert_eq!(registry.error_count(), 2);
        assert_eq!(registry.errors()["kmeans_inf"], "loader panicked");
        assert!(registry.get_chance_model("math").is_none());
        assert!(registry.get_kmeans_model(3).is_none());

        let report = registry.report();
        assert_eq!(report.failed, 2);
        assert!(report.models.iter().all(|m| !m.loaded && m.error.is_some()));
    }

    #[test]
    fn test_load_failed_with_empty_map_is_not_ready() {
        let registry = ModelRegistry::load_failed(ModelMap::new(), "loader panicked");
        assert!(!registry.is_ready());
        assert_eq!(registry.error_count(), 1);
        assert!(registry.errors().contains_key("model_loader"));
    }

    #[test]
    fn test_network_models_share_registry_lock() {
        let registry = ModelRegistry::builder(ModelMap::new())
            .with_engine(
                "mark",
                ModelDescriptor::new(ModelKind::Keras).with_role(ModelRole::Mark, "math"),
                network(),
            )
            .load_all();
        let handle = registry.get_mark_model("math").unwrap();
        let lock = Arc::clone(registry.inference_lock());
        assert!(handle.model.gate().run(|| lock.try_lock().is_err()));
    }
}
