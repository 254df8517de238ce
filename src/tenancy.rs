use sqlx::PgPool;

use crate::error::{AppError, AppResult};

/// Organizations eligible for a KPI run. Inactive tenants are skipped
/// entirely rather than producing empty snapshot sets.
pub async fn list_active_org_ids(pool: &PgPool) -> AppResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT id::text FROM organizations WHERE is_active = true ORDER BY id LIMIT 1000",
    )
    .fetch_all(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Could not list organizations: {error}")))?;

    Ok(rows
        .into_iter()
        .map(|(id,)| id)
        .filter(|id| !id.is_empty())
        .collect())
}

/// Resolve that an organization exists and is active before computing for
/// it. Failure here aborts only that organization's run.
pub async fn assert_org_active(pool: &PgPool, org_id: &str) -> AppResult<()> {
    let active = sqlx::query_scalar::<_, bool>(
        "SELECT COALESCE(
             (SELECT is_active FROM organizations WHERE id = $1::uuid),
             false
         )",
    )
    .bind(org_id)
    .fetch_one(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Could not resolve organization: {error}")))?;

    if active {
        Ok(())
    } else {
        Err(AppError::NotFound(format!(
            "Organization {org_id} is unknown or inactive."
        )))
    }
}
