//! Nearest-centroid subject recommendations

use alfri_common::focus::euclidean_distance;
use alfri_common::FocusVector;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use super::clustering::ClusteringError;
use crate::config::StudyProgram;
use crate::models::{
    ClusteredSubject, RecommendMethod, Recommendation, RecommendationResponse, SelectedSubject,
};

pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 10;

/// Validated `recommend` request
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendParams {
    pub subject_ids: Vec<i64>,
    pub study_program_id: i64,
    pub max_recommendations: usize,
    pub method: RecommendMethod,
}

fn invalid(message: impl Into<String>) -> ClusteringError {
    ClusteringError::Invalid(message.into())
}

impl RecommendParams {
    pub fn from_payload(payload: &Value, programs: &[StudyProgram]) -> Result<Self, ClusteringError> {
        let Value::Object(fields) = payload else {
            return Err(invalid("Invalid payload: expected JSON object"));
        };

        let subject_ids = match fields.get("subjectIds") {
            Some(Value::Array(items)) if !items.is_empty() => items
                .iter()
                .map(Value::as_i64)
                .collect::<Option<Vec<i64>>>()
                .ok_or_else(|| invalid("subjectIds must contain only integers"))?,
            _ => return Err(invalid("subjectIds must be a non-empty array")),
        };

        let study_program_id = fields
            .get("studyProgramId")
            .and_then(Value::as_i64)
            .filter(|id| programs.iter().any(|p| p.id == *id))
            .ok_or_else(|| {
                let known: Vec<String> = programs
                    .iter()
                    .map(|p| format!("{} ({})", p.id, p.code))
                    .collect();
                invalid(format!("studyProgramId must be one of {}", known.join(", ")))
            })?;

        let max_recommendations = match fields.get("maxRecommendations") {
            None | Some(Value::Null) => DEFAULT_MAX_RECOMMENDATIONS,
            Some(value) => value
                .as_u64()
                .filter(|n| *n >= 1)
                .map(|n| n as usize)
                .ok_or_else(|| invalid("maxRecommendations must be a positive integer"))?,
        };

        let method = match fields.get("method") {
            None | Some(Value::Null) => RecommendMethod::default(),
            Some(Value::String(s)) => RecommendMethod::parse(s)
                .ok_or_else(|| invalid("method must be 'cluster' or 'distance'"))?,
            Some(_) => return Err(invalid("method must be 'cluster' or 'distance'")),
        };

        Ok(Self {
            subject_ids,
            study_program_id,
            max_recommendations,
            method,
        })
    }
}

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Similarity in `(0, 1]`, 1.0 at distance zero
pub fn similarity(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

/// Score candidates against a centroid, best first, at most `limit`
///
/// Sorting uses unrounded similarity and is stable, so equally distant
/// candidates keep their input order.
pub fn rank_candidates(
    centroid: &[f64],
    candidates: &[&ClusteredSubject],
    limit: usize,
) -> Vec<Recommendation> {
    let mut scored: Vec<(f64, f64, &ClusteredSubject)> = candidates
        .iter()
        .map(|s| {
            let d = euclidean_distance(centroid, s.focus_vector.as_slice());
            (similarity(d), d, *s)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    scored
        .into_iter()
        .take(limit)
        .map(|(score, distance, s)| Recommendation {
            id: s.id,
            name: s.name.clone(),
            code: s.code.clone(),
            abbreviation: s.abbreviation.clone(),
            cluster_label: s.cluster_label,
            similarity_score: round_to(score, 4),
            distance: round_to(distance, 4),
        })
        .collect()
}

/// Build recommendations from a program's labelled subjects
pub fn recommend(
    labeled: &[ClusteredSubject],
    params: &RecommendParams,
) -> Result<RecommendationResponse, ClusteringError> {
    // Duplicate ids are kept and weigh twice in the centroid
    let selected: Vec<&ClusteredSubject> = params
        .subject_ids
        .iter()
        .map(|id| {
            labeled
                .iter()
                .find(|s| s.id == *id)
                .ok_or(ClusteringError::SubjectNotFound {
                    subject_id: *id,
                    study_program_id: params.study_program_id,
                })
        })
        .collect::<Result<_, _>>()?;

    let centroid = FocusVector::mean(selected.iter().map(|s| &s.focus_vector))
        .map(|c| c.to_vec())
        .unwrap_or_default();
    let selected_clusters: BTreeSet<i64> = selected.iter().map(|s| s.cluster_label).collect();
    let selected_ids: HashSet<i64> = params.subject_ids.iter().copied().collect();

    let candidates: Vec<&ClusteredSubject> = labeled
        .iter()
        .filter(|s| !selected_ids.contains(&s.id))
        .filter(|s| match params.method {
            RecommendMethod::Cluster => selected_clusters.contains(&s.cluster_label),
            RecommendMethod::Distance => true,
        })
        .collect();
    if candidates.is_empty() {
        return Err(ClusteringError::NoCandidates);
    }

    let recommendations = rank_candidates(&centroid, &candidates, params.max_recommendations);

    Ok(RecommendationResponse {
        study_program_id: params.study_program_id,
        method: params.method,
        selected_subjects: selected
            .iter()
            .map(|s| SelectedSubject {
                id: s.id,
                name: s.name.clone(),
                code: s.code.clone(),
                cluster_label: s.cluster_label,
            })
            .collect(),
        centroid: centroid.into_iter().map(|v| round_to(v, 2)).collect(),
        selected_clusters: selected_clusters.into_iter().collect(),
        recommendations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_study_programs;
    use alfri_common::FOCUS_DIMENSION_COUNT;
    use serde_json::json;

    fn subject(id: i64, first: f64, cluster_label: i64) -> ClusteredSubject {
        let mut values = [0.0; FOCUS_DIMENSION_COUNT];
        values[0] = first;
        ClusteredSubject {
            id,
            name: format!("Subject {}", id),
            code: format!("S{}", id),
            abbreviation: None,
            focus_vector: FocusVector::new(values),
            cluster_label,
            study_program_id: 4,
        }
    }

    fn params(ids: Vec<i64>, method: RecommendMethod) -> RecommendParams {
        RecommendParams {
            subject_ids: ids,
            study_program_id: 4,
            max_recommendations: 10,
            method,
        }
    }

    #[test]
    fn test_similarity_ranking() {
        // Selected subject sits at the origin; A is 1 away, B is 3 away
        let labeled = vec![subject(1, 0.0, 0), subject(3, 3.0, 0), subject(2, 1.0, 0)];
        let response = recommend(&labeled, &params(vec![1], RecommendMethod::Cluster)).unwrap();

        let ids: Vec<i64> = response.recommendations.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(response.recommendations[0].similarity_score, 0.5);
        assert_eq!(response.recommendations[0].distance, 1.0);
        assert_eq!(response.recommendations[1].similarity_score, 0.25);
        assert_eq!(response.recommendations[1].distance, 3.0);
    }

    #[test]
    fn test_cluster_method_filters_candidates() {
        let labeled = vec![subject(1, 0.0, 0), subject(2, 5.0, 1), subject(3, 9.0, 0)];

        let by_cluster = recommend(&labeled, &params(vec![1], RecommendMethod::Cluster)).unwrap();
        assert_eq!(by_cluster.recommendations.len(), 1);
        assert_eq!(by_cluster.recommendations[0].id, 3);
        assert_eq!(by_cluster.selected_clusters, vec![0]);

        let by_distance = recommend(&labeled, &params(vec![1], RecommendMethod::Distance)).unwrap();
        let ids: Vec<i64> = by_distance.recommendations.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_selection_summary() {
        let labeled = vec![subject(1, 1.0, 2), subject(2, 2.0, 0), subject(3, 9.0, 0)];
        let response = recommend(&labeled, &params(vec![1, 2], RecommendMethod::Cluster)).unwrap();
        assert_eq!(response.selected_clusters, vec![0, 2]);
        assert_eq!(response.selected_subjects.len(), 2);
        assert_eq!(response.centroid[0], 1.5);
        assert_eq!(response.centroid.len(), FOCUS_DIMENSION_COUNT);
    }

    #[test]
    fn test_limit_truncates() {
        let labeled: Vec<ClusteredSubject> = (0..20).map(|i| subject(i, i as f64, 0)).collect();
        let mut p = params(vec![0], RecommendMethod::Distance);
        p.max_recommendations = 5;
        let response = recommend(&labeled, &p).unwrap();
        assert_eq!(response.recommendations.len(), 5);
        assert_eq!(response.recommendations[0].id, 1);
    }

    #[test]
    fn test_unknown_subject_and_empty_candidates() {
        let labeled = vec![subject(1, 0.0, 0), subject(2, 1.0, 1)];
        assert!(matches!(
            recommend(&labeled, &params(vec![99], RecommendMethod::Cluster)),
            Err(ClusteringError::SubjectNotFound { subject_id: 99, .. })
        ));
        assert!(matches!(
            recommend(&labeled, &params(vec![1], RecommendMethod::Cluster)),
            Err(ClusteringError::NoCandidates)
        ));
    }

    #[test]
    fn test_params_parsing() {
        let programs = default_study_programs();
        let parsed = RecommendParams::from_payload(
            &json!({"subjectIds": [1, 2], "studyProgramId": 3}),
            &programs,
        )
        .unwrap();
        assert_eq!(parsed.max_recommendations, DEFAULT_MAX_RECOMMENDATIONS);
        assert_eq!(parsed.method, RecommendMethod::Cluster);

        let rejects = [
            json!({"subjectIds": [], "studyProgramId": 3}),
            json!({"subjectIds": ["a"], "studyProgramId": 3}),
            json!({"subjectIds": [1], "studyProgramId": 7}),
            json!({"subjectIds": [1], "studyProgramId": 3, "maxRecommendations": 0}),
            json!({"subjectIds": [1], "studyProgramId": 3, "method": "random"}),
        ];
        for payload in rejects {
            assert!(matches!(
                RecommendParams::from_payload(&payload, &programs),
                Err(ClusteringError::Invalid(_))
            ));
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(2.345, 1), 2.3);
        assert_eq!(round_to(1.0, 2), 1.0);
    }
}
