//! alfri-ml service configuration
//!
//! Loaded from TOML (see [`alfri_common::config`] for file resolution), then
//! overlaid with the `MODEL_MAP` environment variable and command-line
//! overrides.
//!
//! ```toml
//! models_dir = "/var/lib/alfri/models"
//! database_url = "postgres://alfri@localhost/alfri"
//!
//! [models.math101_chance]
//! type = "logistic"
//! path = "chance/math101.msgpack"
//! role = "chance"
//! subject = "math101"
//! expected_input_len = 3
//!
//! [[study_programs]]
//! id = 4
//! code = "MANAGEMENT"
//! name = "Management"
//! cluster_offset = 87
//! ```

use alfri_common::config::parse_json_env;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use crate::models::ModelMap;

/// Environment variable holding a JSON model map
pub const MODEL_MAP_ENV: &str = "MODEL_MAP";

/// Study program known to the clustering endpoints
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StudyProgram {
    pub id: i64,
    pub code: String,
    #[serde(default)]
    pub name: String,
    /// Added to raw k-means labels to align them with the program's label space
    #[serde(default)]
    pub cluster_offset: i64,
}

pub fn default_study_programs() -> Vec<StudyProgram> {
    vec![
        StudyProgram {
            id: 3,
            code: "INF".to_string(),
            name: "Informatics".to_string(),
            cluster_offset: 0,
        },
        StudyProgram {
            id: 4,
            code: "MANAGEMENT".to_string(),
            name: "Management".to_string(),
            cluster_offset: 87,
        },
    ]
}

/// Offsets for direct clustering requests that name the program by string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LegacyOffsets {
    /// Program names containing "management"
    pub management: i64,
    /// Program names starting with "inf"
    pub inf: i64,
}

impl Default for LegacyOffsets {
    fn default() -> Self {
        Self {
            management: 1,
            inf: 0,
        }
    }
}

impl LegacyOffsets {
    /// Offset for a free-text study program identifier
    pub fn offset_for(&self, study_program: &str) -> i64 {
        let program = study_program.trim().to_lowercase();
        if program.contains("management") {
            self.management
        } else if program.starts_with("inf") {
            self.inf
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub models_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Subject metadata JSON files, used when no database is configured
    pub subjects_metadata: Vec<PathBuf>,
    pub log_level: String,
    pub models: ModelMap,
    pub study_programs: Vec<StudyProgram>,
    pub legacy_offsets: LegacyOffsets,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            models_dir: None,
            database_url: None,
            database_max_connections: 10,
            subjects_metadata: Vec::new(),
            log_level: "info".to_string(),
            models: ModelMap::new(),
            study_programs: default_study_programs(),
            legacy_offsets: LegacyOffsets::default(),
        }
    }
}

impl ServiceConfig {
    /// Overlay descriptors from the `MODEL_MAP` environment variable
    ///
    /// Entries replace TOML descriptors of the same name. Invalid JSON is a
    /// configuration error.
    pub fn apply_model_map_env(&mut self) -> alfri_common::Result<()> {
        if let Some(map) = parse_json_env::<ModelMap>(MODEL_MAP_ENV)? {
            info!("{} supplies {} model descriptor(s)", MODEL_MAP_ENV, map.len());
            self.models.extend(map);
        }
        Ok(())
    }

    pub fn study_program(&self, id: i64) -> Option<&StudyProgram> {
        self.study_programs.iter().find(|p| p.id == id)
    }
}
