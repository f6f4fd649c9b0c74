//! Artifact path resolution
//!
//! Resolution order for a logical model path:
//! 1. The path itself, when absolute and present on disk
//! 2. `<models_dir>/<path>`
//! 3. `<fallback_dir>/<path>` (defaults to the `models/` directory shipped
//!    next to the crate)
//! 4. The unresolved path, so the eventual open failure names it

use std::path::{Path, PathBuf};
use tracing::debug;

/// Built-in fallback directory next to the package
pub fn default_fallback_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models")
}

#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    models_dir: Option<PathBuf>,
    fallback_dir: PathBuf,
}

impl Default for ArtifactResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ArtifactResolver {
    pub fn new(models_dir: Option<PathBuf>) -> Self {
        Self {
            models_dir,
            fallback_dir: default_fallback_dir(),
        }
    }

    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = dir.into();
        self
    }

    pub fn resolve(&self, logical_path: &str) -> PathBuf {
        let path = Path::new(logical_path);

        if path.is_absolute() && path.exists() {
            return path.to_path_buf();
        }

        if let Some(dir) = &self.models_dir {
            let candidate = dir.join(path);
            if candidate.exists() {
                return candidate;
            }
        }

        let candidate = self.fallback_dir.join(path);
        if candidate.exists() {
            return candidate;
        }

        debug!("Artifact {} not found in any models directory", logical_path);
        path.to_path_buf()
    }
}
