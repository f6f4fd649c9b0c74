//! Focus vectors
//!
//! A focus vector is the 12-dimension profile describing how much weight a
//! subject puts on each study area. Every vector compared or clustered
//! together shares this fixed dimensionality.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of focus dimensions
pub const FOCUS_DIMENSION_COUNT: usize = 12;

/// Focus dimension names, in vector order
pub const FOCUS_DIMENSIONS: [&str; FOCUS_DIMENSION_COUNT] = [
    "mathFocus",
    "logicFocus",
    "programmingFocus",
    "designFocus",
    "economicsFocus",
    "managementFocus",
    "hardwareFocus",
    "networkFocus",
    "dataFocus",
    "testingFocus",
    "languageFocus",
    "physicalFocus",
];

/// 12-dimension subject focus profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FocusVector([f64; FOCUS_DIMENSION_COUNT]);

impl FocusVector {
    pub fn new(values: [f64; FOCUS_DIMENSION_COUNT]) -> Self {
        Self(values)
    }

    /// Build from a slice, rejecting anything that is not exactly 12 long
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let array: [f64; FOCUS_DIMENSION_COUNT] = values.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "focus vector must have {} dimensions, got {}",
                FOCUS_DIMENSION_COUNT,
                values.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn zeros() -> Self {
        Self([0.0; FOCUS_DIMENSION_COUNT])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.to_vec()
    }

    /// Euclidean distance to another focus vector
    pub fn distance(&self, other: &FocusVector) -> f64 {
        euclidean_distance(&self.0, &other.0)
    }

    /// Component-wise mean of a set of focus vectors (None when empty)
    pub fn mean<'a, I>(vectors: I) -> Option<FocusVector>
    where
        I: IntoIterator<Item = &'a FocusVector>,
    {
        let mut sum = [0.0; FOCUS_DIMENSION_COUNT];
        let mut count = 0usize;
        for vector in vectors {
            for (acc, value) in sum.iter_mut().zip(vector.0.iter()) {
                *acc += value;
            }
            count += 1;
        }
        if count == 0 {
            return None;
        }
        for acc in sum.iter_mut() {
            *acc /= count as f64;
        }
        Some(FocusVector(sum))
    }
}

impl From<[f64; FOCUS_DIMENSION_COUNT]> for FocusVector {
    fn from(values: [f64; FOCUS_DIMENSION_COUNT]) -> Self {
        Self(values)
    }
}

/// Euclidean distance between two equally sized vectors
///
/// Extra trailing components of the longer slice are ignored.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Component-wise mean of equally sized vectors (empty when no vectors)
pub fn mean_vector(vectors: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let mut out = vec![0.0; first.len()];
    for vector in vectors {
        for (acc, value) in out.iter_mut().zip(vector.iter()) {
            *acc += value;
        }
    }
    let n = vectors.len() as f64;
    out.iter_mut().for_each(|v| *v /= n);
    out
}
