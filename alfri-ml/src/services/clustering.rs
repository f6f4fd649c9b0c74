//! Direct clustering and cluster labelling
//!
//! Two modes for `similar-subjects` requests:
//! - a string study program runs ad-hoc k-means over the posted vectors and
//!   applies the legacy string-based offset
//! - an integer study program predicts with the program's pre-trained k-means
//!   model and applies the program's configured offset

use alfri_common::db::Subject;
use alfri_common::focus::mean_vector;
use ndarray::Array2;
use rand::seq::index::sample;
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::features::coerce_value;
use crate::config::{LegacyOffsets, StudyProgram};
use crate::inference::{InferenceError, KMeansModel};
use crate::models::{ClusteredSubject, SimilarSubjectsResponse};
use crate::registry::ModelRegistry;

/// Iteration cap for ad-hoc k-means
pub const MAX_ITERATIONS: usize = 200;

/// Default cluster count cap when none is requested
pub const DEFAULT_CLUSTERS: usize = 3;

#[derive(Debug, Error)]
pub enum ClusteringError {
    /// Malformed clustering payload
    #[error("{0}")]
    Invalid(String),

    #[error("unknown study program {0}")]
    UnknownProgram(i64),

    #[error("model registry not available")]
    NotReady,

    #[error("no k-means model loaded for study program {0}")]
    ModelMissing(i64),

    #[error("failed to fetch subjects: {0}")]
    Source(#[from] alfri_common::Error),

    #[error("no subjects found for study program {0}")]
    NoSubjects(i64),

    #[error("Subject ID {subject_id} not found in study program {study_program_id}")]
    SubjectNotFound {
        subject_id: i64,
        study_program_id: i64,
    },

    #[error("no candidate subjects to recommend")]
    NoCandidates,

    #[error("cluster prediction failed: {0}")]
    Prediction(#[from] InferenceError),
}

/// Study program identifier as sent by the client
#[derive(Debug, Clone, PartialEq)]
pub enum StudyProgramRef {
    /// Free-text identifier (ad-hoc clustering)
    Named(String),
    /// Numeric identifier (pre-trained model)
    Id(i64),
}

impl StudyProgramRef {
    pub fn from_value(value: Option<&Value>) -> Result<Self, ClusteringError> {
        match value {
            Some(Value::String(s)) if !s.is_empty() => Ok(StudyProgramRef::Named(s.clone())),
            Some(Value::Number(n)) => n.as_i64().map(StudyProgramRef::Id).ok_or_else(|| {
                ClusteringError::Invalid("studyProgramId must be an integer".to_string())
            }),
            _ => Err(ClusteringError::Invalid(
                "studyProgramId must be a non-empty string or an integer".to_string(),
            )),
        }
    }
}

/// Validate `focusVectors`: non-empty, numeric, equal dimensionality
pub fn parse_focus_vectors(value: Option<&Value>) -> Result<Vec<Vec<f64>>, ClusteringError> {
    let vectors = match value {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => {
            return Err(ClusteringError::Invalid(
                "focusVectors must be a non-empty array of numeric vectors".to_string(),
            ))
        }
    };

    let mut parsed: Vec<Vec<f64>> = Vec::with_capacity(vectors.len());
    for item in vectors {
        let vector = match item {
            Value::Array(values) if !values.is_empty() => values
                .iter()
                .map(coerce_value)
                .collect::<Option<Vec<f64>>>(),
            _ => None,
        }
        .ok_or_else(|| {
            ClusteringError::Invalid(
                "Each focus vector must be a non-empty list of numeric values".to_string(),
            )
        })?;

        if let Some(first) = parsed.first() {
            if first.len() != vector.len() {
                return Err(ClusteringError::Invalid(
                    "All focus vectors must have the same dimensionality".to_string(),
                ));
            }
        }
        parsed.push(vector);
    }
    Ok(parsed)
}

/// Cluster count: `min(3, n)` by default, any request clamped to `[1, n]`
pub fn resolve_cluster_count(value: Option<&Value>, n_points: usize) -> Result<usize, ClusteringError> {
    let requested = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_CLUSTERS.min(n_points).max(1)),
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Bool(b)) => Some(i64::from(*b)),
        _ => None,
    }
    .ok_or_else(|| ClusteringError::Invalid("n_clusters must be an integer".to_string()))?;

    Ok(requested.clamp(1, n_points.max(1) as i64) as usize)
}

/// Result of an ad-hoc k-means fit
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub iterations: usize,
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d: f64 = c.iter().zip(point).map(|(a, b)| (a - b).powi(2)).sum();
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

/// Lloyd's k-means with random distinct seeds
///
/// Stops when no assignment changes or after `max_iter` rounds. An empty
/// cluster is re-seeded with a random input point.
pub fn fit_kmeans<R: Rng + ?Sized>(
    vectors: &[Vec<f64>],
    k: usize,
    max_iter: usize,
    rng: &mut R,
) -> KMeansFit {
    let n = vectors.len();
    if n == 0 {
        return KMeansFit {
            labels: Vec::new(),
            centroids: Vec::new(),
            iterations: 0,
        };
    }
    let k = k.clamp(1, n);
    let dims = vectors[0].len();

    let mut centroids: Vec<Vec<f64>> = sample(rng, n, k)
        .into_iter()
        .map(|i| vectors[i].clone())
        .collect();
    let mut labels = vec![0usize; n];
    let mut iterations = 0;

    for _ in 0..max_iter {
        iterations += 1;
        let mut changed = false;
        for (idx, point) in vectors.iter().enumerate() {
            let best = nearest(point, &centroids);
            if labels[idx] != best {
                labels[idx] = best;
                changed = true;
            }
        }

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in vectors.iter().zip(&labels) {
            counts[label] += 1;
            for (acc, v) in sums[label].iter_mut().zip(point) {
                *acc += v;
            }
        }
        for (c, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
            centroids[c] = if count == 0 {
                vectors[rng.gen_range(0..n)].clone()
            } else {
                sum.into_iter().map(|v| v / count as f64).collect()
            };
        }

        if !changed {
            break;
        }
    }

    KMeansFit {
        labels,
        centroids,
        iterations,
    }
}

/// Predict raw cluster labels for a batch of vectors
pub fn predict_labels(model: &KMeansModel, vectors: &[&[f64]]) -> Result<Vec<i64>, ClusteringError> {
    let dims = vectors.first().map_or(0, |v| v.len());
    let flat: Vec<f64> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
    let input = Array2::from_shape_vec((vectors.len(), dims), flat)
        .map_err(|e| ClusteringError::Invalid(e.to_string()))?;
    Ok(model.predict(input.view())?)
}

/// Handles `similar-subjects` requests
pub struct DirectClustering<'a> {
    registry: Option<&'a ModelRegistry>,
    programs: &'a [StudyProgram],
    legacy_offsets: LegacyOffsets,
}

impl<'a> DirectClustering<'a> {
    pub fn new(
        registry: Option<&'a ModelRegistry>,
        programs: &'a [StudyProgram],
        legacy_offsets: LegacyOffsets,
    ) -> Self {
        Self {
            registry,
            programs,
            legacy_offsets,
        }
    }

    pub fn cluster<R: Rng + ?Sized>(
        &self,
        payload: &Value,
        rng: &mut R,
    ) -> Result<SimilarSubjectsResponse, ClusteringError> {
        let Value::Object(fields) = payload else {
            return Err(ClusteringError::Invalid(
                "Invalid payload: expected JSON object".to_string(),
            ));
        };

        let vectors = parse_focus_vectors(fields.get("focusVectors"))?;
        let program = StudyProgramRef::from_value(fields.get("studyProgramId"))?;
        let k = resolve_cluster_count(fields.get("n_clusters"), vectors.len())?;
        let centroid = mean_vector(&vectors);

        let (offset, raw_labels) = match &program {
            StudyProgramRef::Named(name) => {
                let fit = fit_kmeans(&vectors, k, MAX_ITERATIONS, rng);
                let labels = fit.labels.into_iter().map(|l| l as i64).collect();
                (self.legacy_offsets.offset_for(name), labels)
            }
            StudyProgramRef::Id(id) => {
                let program = self
                    .programs
                    .iter()
                    .find(|p| p.id == *id)
                    .ok_or(ClusteringError::UnknownProgram(*id))?;
                let registry = self.registry.ok_or(ClusteringError::NotReady)?;
                let handle = registry
                    .get_kmeans_model(*id)
                    .ok_or(ClusteringError::ModelMissing(*id))?;
                let model = handle
                    .model
                    .as_kmeans()
                    .ok_or(ClusteringError::ModelMissing(*id))?;
                // Vectors share one width after parsing, so the first decides
                if vectors[0].len() != model.dims() {
                    return Err(ClusteringError::Invalid(format!(
                        "focus vectors must have {} dimensions",
                        model.dims()
                    )));
                }
                let rows: Vec<&[f64]> = vectors.iter().map(Vec::as_slice).collect();
                let labels = handle.model.gate().run(|| predict_labels(model, &rows))?;
                (program.cluster_offset, labels)
            }
        };

        Ok(SimilarSubjectsResponse {
            study_program_id: match program {
                StudyProgramRef::Named(name) => Value::String(name),
                StudyProgramRef::Id(id) => Value::from(id),
            },
            offset_applied: offset,
            cluster_indices: raw_labels.into_iter().map(|l| l + offset).collect(),
            centroid,
        })
    }
}

/// Label every subject of a program with its predicted (raw) cluster
pub fn label_subjects(
    registry: &ModelRegistry,
    study_program_id: i64,
    subjects: Vec<Subject>,
) -> Result<Vec<ClusteredSubject>, ClusteringError> {
    let handle = registry
        .get_kmeans_model(study_program_id)
        .ok_or(ClusteringError::ModelMissing(study_program_id))?;
    let model = handle
        .model
        .as_kmeans()
        .ok_or(ClusteringError::ModelMissing(study_program_id))?;

    let rows: Vec<&[f64]> = subjects.iter().map(|s| s.focus_vector.as_slice()).collect();
    let labels = handle.model.gate().run(|| predict_labels(model, &rows))?;

    Ok(subjects
        .into_iter()
        .zip(labels)
        .map(|(s, cluster_label)| ClusteredSubject {
            id: s.id,
            name: s.name,
            code: s.code,
            abbreviation: s.abbreviation,
            focus_vector: s.focus_vector,
            cluster_label,
            study_program_id,
        })
        .collect())
}

/// Number of clusters of a program's pre-trained model
pub fn program_cluster_count(registry: &ModelRegistry, study_program_id: i64) -> Result<usize, ClusteringError> {
    registry
        .get_kmeans_model(study_program_id)
        .and_then(|handle| handle.model.as_kmeans())
        .map(KMeansModel::n_clusters)
        .ok_or(ClusteringError::ModelMissing(study_program_id))
}

/// Subject count per cluster label
pub fn cluster_distribution(subjects: &[ClusteredSubject]) -> BTreeMap<i64, usize> {
    let mut distribution = BTreeMap::new();
    for subject in subjects {
        *distribution.entry(subject.cluster_label).or_insert(0) += 1;
    }
    distribution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_study_programs;
    use crate::inference::{KMeansArtifact, ModelEngine};
    use crate::models::{ModelDescriptor, ModelKind, ModelMap};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn registry() -> ModelRegistry {
        ModelRegistry::builder(ModelMap::new())
            .with_engine(
                "kmeans_management",
                ModelDescriptor::new(ModelKind::KMeans).with_study_program(4),
                ModelEngine::KMeans(
                    KMeansModel::try_from(KMeansArtifact {
                        cluster_centers: vec![vec![0.0, 0.0], vec![5.0, 5.0], vec![10.0, 10.0]],
                        n_clusters: None,
                    })
                    .unwrap(),
                ),
            )
            .load_all()
    }

    #[test]
    fn test_pretrained_labels_get_program_offset() {
        let registry = registry();
        let programs = default_study_programs();
        let service = DirectClustering::new(Some(&registry), &programs, LegacyOffsets::default());
        let payload = json!({"focusVectors": [[9.5, 10.0]], "studyProgramId": 4});

        let response = service.cluster(&payload, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(response.offset_applied, 87);
        assert_eq!(response.cluster_indices, vec![89]);
        assert_eq!(response.study_program_id, json!(4));
        assert_eq!(response.centroid, vec![9.5, 10.0]);
    }

    #[test]
    fn test_named_program_uses_legacy_offset() {
        let programs = default_study_programs();
        let service = DirectClustering::new(None, &programs, LegacyOffsets::default());
        let payload = json!({
            "focusVectors": [[0.0, 0.0], [0.1, 0.0], [10.0, 10.0], [10.1, 10.0]],
            "studyProgramId": "Management",
            "n_clusters": 2
        });

        let response = service.cluster(&payload, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(response.offset_applied, 1);
        assert_eq!(response.cluster_indices.len(), 4);
        assert!(response.cluster_indices.iter().all(|i| (1..=2).contains(i)));
        // The two well-separated pairs end up in different clusters
        assert_eq!(response.cluster_indices[0], response.cluster_indices[1]);
        assert_eq!(response.cluster_indices[2], response.cluster_indices[3]);
        assert_ne!(response.cluster_indices[0], response.cluster_indices[2]);
    }

    #[test]
    fn test_validation_errors() {
        let programs = default_study_programs();
        let service = DirectClustering::new(None, &programs, LegacyOffsets::default());
        let mut rng = StdRng::seed_from_u64(1);
        let invalid = |payload: Value, rng: &mut StdRng| {
            matches!(service.cluster(&payload, rng), Err(ClusteringError::Invalid(_)))
        };

        assert!(invalid(json!([1, 2]), &mut rng));
        assert!(invalid(json!({"focusVectors": [], "studyProgramId": "inf"}), &mut rng));
        assert!(invalid(json!({"focusVectors": [[1.0], [1.0, 2.0]], "studyProgramId": "inf"}), &mut rng));
        assert!(invalid(json!({"focusVectors": [["a"]], "studyProgramId": "inf"}), &mut rng));
        assert!(invalid(json!({"focusVectors": [[1.0]], "studyProgramId": ""}), &mut rng));
        assert!(invalid(json!({"focusVectors": [[1.0]], "studyProgramId": "inf", "n_clusters": "many"}), &mut rng));
    }

    #[test]
    fn test_integer_program_requirements() {
        let registry = registry();
        let programs = default_study_programs();
        let mut rng = StdRng::seed_from_u64(1);

        let without_registry = DirectClustering::new(None, &programs, LegacyOffsets::default());
        assert!(matches!(
            without_registry.cluster(&json!({"focusVectors": [[1.0, 1.0]], "studyProgramId": 4}), &mut rng),
            Err(ClusteringError::NotReady)
        ));

        let service = DirectClustering::new(Some(&registry), &programs, LegacyOffsets::default());
        assert!(matches!(
            service.cluster(&json!({"focusVectors": [[1.0, 1.0]], "studyProgramId": 9}), &mut rng),
            Err(ClusteringError::UnknownProgram(9))
        ));
        assert!(matches!(
            service.cluster(&json!({"focusVectors": [[1.0, 1.0]], "studyProgramId": 3}), &mut rng),
            Err(ClusteringError::ModelMissing(3))
        ));
        assert!(matches!(
            service.cluster(&json!({"focusVectors": [[1.0, 1.0, 1.0]], "studyProgramId": 4}), &mut rng),
            Err(ClusteringError::Invalid(msg)) if msg == "focus vectors must have 2 dimensions"
        ));
    }

    #[test]
    fn test_cluster_count_resolution() {
        assert_eq!(resolve_cluster_count(None, 10).unwrap(), 3);
        assert_eq!(resolve_cluster_count(None, 2).unwrap(), 2);
        assert_eq!(resolve_cluster_count(Some(&json!(0)), 5).unwrap(), 1);
        assert_eq!(resolve_cluster_count(Some(&json!(50)), 5).unwrap(), 5);
        assert_eq!(resolve_cluster_count(Some(&json!("4")), 5).unwrap(), 4);
        assert!(resolve_cluster_count(Some(&json!([2])), 5).is_err());
    }

    #[test]
    fn test_fit_indices_stay_in_range() {
        let vectors: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        for seed in 0..10 {
            let fit = fit_kmeans(&vectors, 4, MAX_ITERATIONS, &mut StdRng::seed_from_u64(seed));
            assert_eq!(fit.labels.len(), 20);
            assert_eq!(fit.centroids.len(), 4);
            assert!(fit.labels.iter().all(|l| *l < 4));
            assert!(fit.iterations <= MAX_ITERATIONS);
        }
    }

    #[test]
    fn test_fit_clamps_k_to_point_count() {
        let vectors = vec![vec![1.0], vec![2.0]];
        let fit = fit_kmeans(&vectors, 10, MAX_ITERATIONS, &mut StdRng::seed_from_u64(3));
        assert_eq!(fit.centroids.len(), 2);
    }

    #[test]
    fn test_label_subjects_and_distribution() {
        use alfri_common::{FocusVector, FOCUS_DIMENSION_COUNT};

        let mut centers = vec![vec![0.0; FOCUS_DIMENSION_COUNT]; 2];
        centers[1][0] = 10.0;
        let registry = ModelRegistry::builder(ModelMap::new())
            .with_engine(
                "kmeans_inf",
                ModelDescriptor::new(ModelKind::KMeans).with_study_program(3),
                ModelEngine::KMeans(
                    KMeansModel::try_from(KMeansArtifact {
                        cluster_centers: centers,
                        n_clusters: Some(2),
                    })
                    .unwrap(),
                ),
            )
            .load_all();

        let subject = |id: i64, first: f64| {
            let mut values = [0.0; FOCUS_DIMENSION_COUNT];
            values[0] = first;
            Subject {
                id,
                name: format!("Subject {}", id),
                code: format!("S{}", id),
                abbreviation: None,
                focus_vector: FocusVector::new(values),
            }
        };
        let labeled = label_subjects(
            &registry,
            3,
            vec![subject(1, 1.0), subject(2, 9.0), subject(3, 8.0)],
        )
        .unwrap();

        let labels: Vec<i64> = labeled.iter().map(|s| s.cluster_label).collect();
        assert_eq!(labels, vec![0, 1, 1]);
        assert!(labeled.iter().all(|s| s.study_program_id == 3));
        assert_eq!(program_cluster_count(&registry, 3).unwrap(), 2);
        assert!(matches!(
            program_cluster_count(&registry, 4),
            Err(ClusteringError::ModelMissing(4))
        ));

        let distribution = cluster_distribution(&labeled);
        assert_eq!(distribution.get(&0), Some(&1));
        assert_eq!(distribution.get(&1), Some(&2));
    }
}
