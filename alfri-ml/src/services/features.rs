//! Feature vector coercion and re-encoding

use ndarray::{Array1, Array2, Axis};
use serde_json::Value;

/// Number of grade categories used by the one-hot re-encoding
pub const NUM_GRADES: usize = 6;

/// Coerce one JSON value to a finite float
///
/// Numbers, booleans and numeric strings are accepted.
pub fn coerce_value(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// Coerce every feature, failing if any one is not numeric
pub fn coerce_features(values: &[Value]) -> Option<Vec<f64>> {
    values.iter().map(coerce_value).collect()
}

/// Single-row input matrix
pub fn single_row(features: &[f64]) -> Array2<f64> {
    Array1::from(features.to_vec()).insert_axis(Axis(0))
}

/// Re-encode ordinal grade values as concatenated one-hot blocks
///
/// Each value `v` is truncated to an integer and becomes a block of
/// [`NUM_GRADES`] indicators with a 1 at position `v`; values outside
/// `0..NUM_GRADES` give an all-zero block.
pub fn one_hot_encode(features: &[f64]) -> Vec<f64> {
    let mut encoded = vec![0.0; features.len() * NUM_GRADES];
    for (i, value) in features.iter().enumerate() {
        let grade = value.trunc();
        if grade >= 0.0 && grade < NUM_GRADES as f64 {
            encoded[i * NUM_GRADES + grade as usize] = 1.0;
        }
    }
    encoded
}
