use sqlx::PgPool;

use crate::models::outcome::KpiResultUpdate;

/// Write a KPI outcome onto an existing execution result.
/// Returns false when no row matches the id within the team.
pub async fn update_execution_result_kpi(
    pool: &PgPool,
    execution_result_id: &str,
    team_id: &str,
    update: &KpiResultUpdate,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE execution_results
        SET kpi_measurement_success = $1,
            kpi_measurement_ms = $2,
            kpi_measurement_error = $3,
            updated_at = NOW()
        WHERE id::text = $4 AND team_id::text = $5
        "#,
    )
    .bind(update.success)
    .bind(update.duration_ms)
    .bind(update.error.as_deref())
    .bind(execution_result_id)
    .bind(team_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
