//! PostgreSQL subject store
//!
//! Reads subjects and their focus profiles from the advising database. The
//! service never writes; only the two read queries below are issued.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, error, info};

use super::models::Subject;
use super::source::SubjectSource;
use crate::focus::FocusVector;
use crate::Result;

const SUBJECT_COLUMNS: &str = r#"
    s.subject_id::int8 AS id,
    s.name::text AS name,
    s.code::text AS code,
    s.abbreviation::text AS abbreviation,
    COALESCE(f.math_focus, 0)::float8 AS math_focus,
    COALESCE(f.logic_focus, 0)::float8 AS logic_focus,
    COALESCE(f.programming_focus, 0)::float8 AS programming_focus,
    COALESCE(f.design_focus, 0)::float8 AS design_focus,
    COALESCE(f.economics_focus, 0)::float8 AS economics_focus,
    COALESCE(f.management_focus, 0)::float8 AS management_focus,
    COALESCE(f.hardware_focus, 0)::float8 AS hardware_focus,
    COALESCE(f.network_focus, 0)::float8 AS network_focus,
    COALESCE(f.data_focus, 0)::float8 AS data_focus,
    COALESCE(f.testing_focus, 0)::float8 AS testing_focus,
    COALESCE(f.language_focus, 0)::float8 AS language_focus,
    COALESCE(f.physical_focus, 0)::float8 AS physical_focus
"#;

/// One row of the subject/focus join
#[derive(Debug, sqlx::FromRow)]
struct SubjectRow {
    id: i64,
    name: String,
    code: String,
    abbreviation: Option<String>,
    math_focus: f64,
    logic_focus: f64,
    programming_focus: f64,
    design_focus: f64,
    economics_focus: f64,
    management_focus: f64,
    hardware_focus: f64,
    network_focus: f64,
    data_focus: f64,
    testing_focus: f64,
    language_focus: f64,
    physical_focus: f64,
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Subject {
            id: row.id,
            name: row.name,
            code: row.code,
            abbreviation: row.abbreviation,
            focus_vector: FocusVector::new([
                row.math_focus,
                row.logic_focus,
                row.programming_focus,
                row.design_focus,
                row.economics_focus,
                row.management_focus,
                row.hardware_focus,
                row.network_focus,
                row.data_focus,
                row.testing_focus,
                row.language_focus,
                row.physical_focus,
            ]),
        }
    }
}

/// Subject store backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgSubjectStore {
    pool: PgPool,
}

impl PgSubjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool with the given upper bound on connections
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        info!(
            "Database connection pool initialized (1-{} connections)",
            max_connections.max(1)
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `SELECT 1` round trip
    pub async fn test_connection(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await {
            Ok(v) => v == 1,
            Err(e) => {
                error!("Database connection test failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl SubjectSource for PgSubjectStore {
    fn source_id(&self) -> &'static str {
        "postgres"
    }

    async fn subjects_with_focus(&self, study_program_id: i64) -> Result<Vec<Subject>> {
        let sql = format!(
            "SELECT {} FROM subject s \
             INNER JOIN focus f ON s.subject_id = f.subject_id \
             INNER JOIN study_program_subject sps ON s.subject_id = sps.subject_id \
             WHERE sps.study_program_id = $1 \
             ORDER BY s.subject_id",
            SUBJECT_COLUMNS
        );

        let rows = sqlx::query_as::<_, SubjectRow>(&sql)
            .bind(study_program_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Error fetching subjects: {}", e);
                e
            })?;

        debug!(
            "Fetched {} subjects for study program {}",
            rows.len(),
            study_program_id
        );
        Ok(rows.into_iter().map(Subject::from).collect())
    }

    async fn subject_by_id(&self, subject_id: i64) -> Result<Option<Subject>> {
        let sql = format!(
            "SELECT {} FROM subject s \
             INNER JOIN focus f ON s.subject_id = f.subject_id \
             WHERE s.subject_id = $1",
            SUBJECT_COLUMNS
        );

        let row = sqlx::query_as::<_, SubjectRow>(&sql)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Error fetching subject {}: {}", subject_id, e);
                e
            })?;

        Ok(row.map(Subject::from))
    }
}
