//! Persistence for computed KPI snapshots. Insert-only: a run never
//! mutates or deletes rows, and a collision on the snapshot key means an
//! overlapping run already wrote the same bucket, a benign no-op.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardTheme {
    Distance,
    Trips,
    Revenue,
    Profit,
    Fuel,
    Utilization,
}

impl CardTheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Distance => "distance",
            Self::Trips => "trips",
            Self::Revenue => "revenue",
            Self::Profit => "profit",
            Self::Fuel => "fuel",
            Self::Utilization => "utilization",
        }
    }
}

/// A computed metric ready for persistence. The organization id and
/// computation bucket are stamped by the store so a generator cannot tag a
/// card with a foreign tenant.
#[derive(Debug, Clone)]
pub struct CardDraft {
    pub metric_key: &'static str,
    pub title: String,
    pub value_human: String,
    pub payload: Value,
    pub theme: CardTheme,
}

/// A metric that failed to compute or persist for one organization.
#[derive(Debug, Clone, Serialize)]
pub struct MetricFailure {
    pub metric_key: String,
    pub message: String,
}

/// Persisted snapshot row, as read back for the dashboard.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct KpiSnapshot {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub metric_key: String,
    pub title: String,
    pub value_human: String,
    pub payload: Value,
    pub theme: String,
    pub computed_at: DateTime<Utc>,
}

/// All snapshots of one run share a computation bucket: the run timestamp
/// truncated to the hour. Overlapping invocations inside the same hour
/// collide on the snapshot key and dedupe instead of double-writing.
pub fn computation_bucket(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(Duration::hours(1)).unwrap_or(now)
}

/// Insert the drafts for one organization. Returns how many rows were
/// actually written (duplicates from overlapping runs count zero) plus any
/// per-card failures; one bad card never blocks its siblings.
pub async fn persist_cards(
    pool: &PgPool,
    org_id: &str,
    computed_at: DateTime<Utc>,
    drafts: &[CardDraft],
) -> (u32, Vec<MetricFailure>) {
    let mut inserted = 0u32;
    let mut failures = Vec::new();

    for draft in drafts {
        if draft.value_human.trim().is_empty() {
            failures.push(MetricFailure {
                metric_key: draft.metric_key.to_string(),
                message: "Computed card has an empty display value.".to_string(),
            });
            continue;
        }

        let result = sqlx::query(
            "INSERT INTO kpi_snapshots
                 (organization_id, metric_key, title, value_human, payload, theme, computed_at)
             VALUES ($1::uuid, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (organization_id, metric_key, computed_at) DO NOTHING",
        )
        .bind(org_id)
        .bind(draft.metric_key)
        .bind(&draft.title)
        .bind(&draft.value_human)
        .bind(&draft.payload)
        .bind(draft.theme.as_str())
        .bind(computed_at)
        .execute(pool)
        .await;

        match result {
            Ok(outcome) => inserted += outcome.rows_affected() as u32,
            Err(error) => {
                tracing::warn!(
                    org_id,
                    metric_key = draft.metric_key,
                    error = %error,
                    "Snapshot insert failed"
                );
                failures.push(MetricFailure {
                    metric_key: draft.metric_key.to_string(),
                    message: format!("Snapshot insert failed: {error}"),
                });
            }
        }
    }

    (inserted, failures)
}

/// Latest snapshot per metric key for one organization. This is the
/// dashboard read contract.
pub async fn latest_cards(pool: &PgPool, org_id: &str) -> AppResult<Vec<KpiSnapshot>> {
    sqlx::query_as::<_, KpiSnapshot>(
        "SELECT DISTINCT ON (metric_key)
                id, organization_id, metric_key, title, value_human, payload, theme, computed_at
         FROM kpi_snapshots
         WHERE organization_id = $1::uuid
         ORDER BY metric_key, computed_at DESC",
    )
    .bind(org_id)
    .fetch_all(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Snapshot read failed: {error}")))
}

#[cfg(test)]
mod tests {
    use super::computation_bucket;
    use chrono::{DateTime, Utc};

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().expect("valid timestamp")
    }

    #[test]
    fn bucket_truncates_to_the_hour() {
        assert_eq!(
            computation_bucket(at("2026-08-07T10:59:59Z")),
            at("2026-08-07T10:00:00Z")
        );
        assert_eq!(
            computation_bucket(at("2026-08-07T10:00:00Z")),
            at("2026-08-07T10:00:00Z")
        );
    }

    #[test]
    fn overlapping_runs_share_a_bucket() {
        // A scheduled run and a manual trigger two minutes apart dedupe.
        let scheduled = computation_bucket(at("2026-08-07T10:01:12Z"));
        let manual = computation_bucket(at("2026-08-07T10:03:40Z"));
        assert_eq!(scheduled, manual);

        let next_hour = computation_bucket(at("2026-08-07T11:00:01Z"));
        assert_ne!(scheduled, next_hour);
    }
}
