use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::PgPool;

use crate::db::queries;
use crate::models::outcome::KpiResultUpdate;

/// Records the KPI outcome on an execution record owned elsewhere.
///
/// `Ok(false)` means no record matched the id/team pair.
pub trait ResultSink: Send + Sync {
    fn record<'a>(
        &'a self,
        execution_result_id: &'a str,
        team_id: &'a str,
        update: &'a KpiResultUpdate,
    ) -> BoxFuture<'a, Result<bool, SinkError>>;
}

/// Writes outcomes onto `execution_results` rows in PostgreSQL.
pub struct PgResultSink {
    pool: PgPool,
}

impl PgResultSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ResultSink for PgResultSink {
    fn record<'a>(
        &'a self,
        execution_result_id: &'a str,
        team_id: &'a str,
        update: &'a KpiResultUpdate,
    ) -> BoxFuture<'a, Result<bool, SinkError>> {
        async move {
            let updated =
                queries::update_execution_result_kpi(&self.pool, execution_result_id, team_id, update)
                    .await?;
            Ok(updated)
        }
        .boxed()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
