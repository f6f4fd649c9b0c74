//! Model artifact codec
//!
//! Artifacts are decoded with MessagePack first (compact, fast) and fall back
//! to JSON when the binary decode fails, so either format can be dropped into
//! the models directory.

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Artifact decode failure
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("artifact is empty")]
    Empty,

    /// Both decoders rejected the payload
    #[error("cannot decode artifact (msgpack: {binary}; json: {json})")]
    Undecodable { binary: String, json: String },
}

/// Decode an artifact, preferring MessagePack and falling back to JSON
pub fn decode_artifact<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Empty);
    }

    match rmp_serde::from_slice::<T>(data) {
        Ok(value) => Ok(value),
        Err(binary_err) => serde_json::from_slice::<T>(data).map_err(|json_err| {
            CodecError::Undecodable {
                binary: binary_err.to_string(),
                json: json_err.to_string(),
            }
        }),
    }
}
