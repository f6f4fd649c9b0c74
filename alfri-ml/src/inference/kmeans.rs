//! Pre-trained k-means model (inference only)
//!
//! Centres are fitted offline; prediction assigns each row to its nearest
//! centre by Euclidean distance, ties going to the lowest cluster index.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::InferenceError;

/// Serialized form of a k-means model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansArtifact {
    #[serde(alias = "cluster_centers_")]
    pub cluster_centers: Vec<Vec<f64>>,
    #[serde(default)]
    pub n_clusters: Option<usize>,
}

/// Validated k-means model
#[derive(Debug, Clone)]
pub struct KMeansModel {
    centers: Array2<f64>,
}

impl TryFrom<KMeansArtifact> for KMeansModel {
    type Error = InferenceError;

    fn try_from(artifact: KMeansArtifact) -> Result<Self, Self::Error> {
        let k = artifact.cluster_centers.len();
        if k == 0 {
            return Err(InferenceError::InvalidModel(
                "k-means model has no cluster centres".to_string(),
            ));
        }
        if let Some(declared) = artifact.n_clusters {
            if declared != k {
                return Err(InferenceError::InvalidModel(format!(
                    "n_clusters is {} but {} centres were stored",
                    declared, k
                )));
            }
        }
        let dims = artifact.cluster_centers[0].len();
        if dims == 0 || artifact.cluster_centers.iter().any(|c| c.len() != dims) {
            return Err(InferenceError::InvalidModel(
                "cluster centres must be non-empty and equally sized".to_string(),
            ));
        }
        let flat: Vec<f64> = artifact.cluster_centers.into_iter().flatten().collect();
        let centers = Array2::from_shape_vec((k, dims), flat)
            .map_err(|e| InferenceError::InvalidModel(e.to_string()))?;
        Ok(Self { centers })
    }
}

impl KMeansModel {
    pub fn n_clusters(&self) -> usize {
        self.centers.nrows()
    }

    pub fn dims(&self) -> usize {
        self.centers.ncols()
    }

    pub fn centers(&self) -> &Array2<f64> {
        &self.centers
    }

    fn nearest(&self, point: ArrayView1<f64>) -> usize {
        let mut best = 0;
        let mut best_d = f64::INFINITY;
        for (i, center) in self.centers.axis_iter(Axis(0)).enumerate() {
            let d: f64 = center
                .iter()
                .zip(point.iter())
                .map(|(c, p)| (c - p).powi(2))
                .sum();
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }

    /// Cluster index per row
    pub fn predict(&self, input: ArrayView2<f64>) -> Result<Vec<i64>, InferenceError> {
        if input.nrows() == 0 {
            return Err(InferenceError::EmptyInput);
        }
        if input.ncols() != self.dims() {
            return Err(InferenceError::ShapeMismatch {
                expected: self.dims(),
                got: input.ncols(),
            });
        }
        Ok(input
            .axis_iter(Axis(0))
            .map(|row| self.nearest(row) as i64)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn model() -> KMeansModel {
        KMeansModel::try_from(KMeansArtifact {
            cluster_centers: vec![vec![0.0, 0.0], vec![10.0, 10.0], vec![0.0, 10.0]],
            n_clusters: Some(3),
        })
        .unwrap()
    }

    #[test]
    fn test_predicts_nearest_centre() {
        let labels = model()
            .predict(array![[1.0, 1.0], [9.0, 9.5], [1.0, 8.0]].view())
            .unwrap();
        assert_eq!(labels, vec![0, 1, 2]);
    }

    #[test]
    fn test_tie_goes_to_lowest_index() {
        let labels = model().predict(array![[5.0, 5.0]].view()).unwrap();
        // Equidistant from all three centres
        assert_eq!(labels, vec![0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = model().predict(array![[1.0, 2.0, 3.0]].view()).unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { expected: 2, got: 3 }));
    }

    #[test]
    fn test_sklearn_attribute_alias() {
        let json = r#"{"cluster_centers_": [[1.0, 2.0]]}"#;
        let artifact: KMeansArtifact = serde_json::from_str(json).unwrap();
        let model = KMeansModel::try_from(artifact).unwrap();
        assert_eq!(model.n_clusters(), 1);
        assert_eq!(model.dims(), 2);
    }

    #[test]
    fn test_declared_cluster_count_must_match() {
        let artifact = KMeansArtifact {
            cluster_centers: vec![vec![1.0]],
            n_clusters: Some(2),
        };
        assert!(KMeansModel::try_from(artifact).is_err());
    }
}
