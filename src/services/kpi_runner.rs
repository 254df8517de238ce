//! One full KPI run across all active organizations. Organizations are
//! processed by a bounded worker pool; each one has its own error boundary
//! and timeout, and nothing is shared between them except the read-only
//! pool handle, so one tenant's failure can never leak into another's run.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::task::JoinSet;

use crate::error::{AppError, AppResult};
use crate::services::kpi_basic::generate_basic_cards;
use crate::services::kpi_comparative::generate_comparative_cards;
use crate::services::kpi_store::{computation_bucket, persist_cards, MetricFailure};
use crate::services::windows::business_today;
use crate::state::AppState;
use crate::tenancy;

#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub organization_id: String,
    /// Absent for organization-level failures (timeout, unknown org).
    pub metric_key: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub organizations_processed: u32,
    pub cards_created: u32,
    pub errors: Vec<RunError>,
}

#[derive(Debug)]
struct OrgOutcome {
    org_id: String,
    cards_created: u32,
    metric_failures: Vec<MetricFailure>,
    org_error: Option<String>,
}

/// Entrypoint for both the background scheduler and `POST /kpi/run`.
pub async fn run_all_organizations(state: &AppState) -> AppResult<RunReport> {
    let pool = state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })?;

    let today = business_today(state.config.reporting_timezone);
    let computed_at = computation_bucket(Utc::now());
    let org_ids = tenancy::list_active_org_ids(pool).await?;

    tracing::info!(
        organizations = org_ids.len(),
        %computed_at,
        run_date = %today,
        "KPI run started"
    );

    let parallelism = state.config.kpi_org_parallelism.max(1);
    let org_timeout = Duration::from_secs(state.config.kpi_org_timeout_seconds.max(1));

    let mut outcomes = Vec::with_capacity(org_ids.len());
    let mut workers: JoinSet<OrgOutcome> = JoinSet::new();

    for org_id in org_ids {
        while workers.len() >= parallelism {
            if let Some(joined) = workers.join_next().await {
                outcomes.push(resolve_join(joined));
            }
        }

        let pool = pool.clone();
        workers.spawn(async move {
            match tokio::time::timeout(
                org_timeout,
                run_for_organization(&pool, &org_id, today, computed_at),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(org_id, timeout_secs = org_timeout.as_secs(), "KPI run timed out");
                    OrgOutcome {
                        org_id,
                        cards_created: 0,
                        metric_failures: Vec::new(),
                        org_error: Some(format!(
                            "Run exceeded the {}s per-organization timeout.",
                            org_timeout.as_secs()
                        )),
                    }
                }
            }
        });
    }

    while let Some(joined) = workers.join_next().await {
        outcomes.push(resolve_join(joined));
    }

    let report = assemble_report(outcomes);
    tracing::info!(
        organizations = report.organizations_processed,
        cards_created = report.cards_created,
        errors = report.errors.len(),
        success = report.success,
        "KPI run completed"
    );
    Ok(report)
}

async fn run_for_organization(
    pool: &PgPool,
    org_id: &str,
    today: NaiveDate,
    computed_at: DateTime<Utc>,
) -> OrgOutcome {
    if let Err(error) = tenancy::assert_org_active(pool, org_id).await {
        return OrgOutcome {
            org_id: org_id.to_string(),
            cards_created: 0,
            metric_failures: Vec::new(),
            org_error: Some(error.to_string()),
        };
    }

    let (mut drafts, mut metric_failures) = generate_basic_cards(pool, org_id, today).await;
    let (comparative, comparative_failures) =
        generate_comparative_cards(pool, org_id, today).await;
    drafts.extend(comparative);
    metric_failures.extend(comparative_failures);

    let (cards_created, store_failures) =
        persist_cards(pool, org_id, computed_at, &drafts).await;
    metric_failures.extend(store_failures);

    OrgOutcome {
        org_id: org_id.to_string(),
        cards_created,
        metric_failures,
        org_error: None,
    }
}

fn resolve_join(joined: Result<OrgOutcome, tokio::task::JoinError>) -> OrgOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(error) => {
            tracing::error!(error = %error, "KPI worker task aborted");
            OrgOutcome {
                org_id: String::new(),
                cards_created: 0,
                metric_failures: Vec::new(),
                org_error: Some(format!("Worker task aborted: {error}")),
            }
        }
    }
}

/// Fold per-organization outcomes into the run report. `success` means a
/// fully clean run; callers distinguish "no data" from "all failed" via
/// the error list and card count.
fn assemble_report(outcomes: Vec<OrgOutcome>) -> RunReport {
    let mut report = RunReport {
        success: true,
        organizations_processed: 0,
        cards_created: 0,
        errors: Vec::new(),
    };

    for outcome in outcomes {
        report.organizations_processed += 1;
        report.cards_created += outcome.cards_created;

        if let Some(message) = outcome.org_error {
            report.errors.push(RunError {
                organization_id: outcome.org_id.clone(),
                metric_key: None,
                message,
            });
        }
        for failure in outcome.metric_failures {
            report.errors.push(RunError {
                organization_id: outcome.org_id.clone(),
                metric_key: Some(failure.metric_key),
                message: failure.message,
            });
        }
    }

    report.success = report.errors.is_empty();
    report
}

#[cfg(test)]
mod tests {
    use super::{assemble_report, OrgOutcome};
    use crate::services::kpi_store::MetricFailure;

    fn clean(org_id: &str, cards: u32) -> OrgOutcome {
        OrgOutcome {
            org_id: org_id.to_string(),
            cards_created: cards,
            metric_failures: Vec::new(),
            org_error: None,
        }
    }

    #[test]
    fn clean_run_reports_success_and_totals() {
        let report = assemble_report(vec![clean("org-a", 16), clean("org-b", 16)]);
        assert!(report.success);
        assert_eq!(report.organizations_processed, 2);
        assert_eq!(report.cards_created, 32);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn one_failed_organization_does_not_erase_the_others() {
        let mut failed = clean("org-b", 0);
        failed.org_error = Some("Organization org-b is unknown or inactive.".to_string());

        let report = assemble_report(vec![clean("org-a", 16), failed]);
        assert!(!report.success);
        assert_eq!(report.organizations_processed, 2);
        assert_eq!(report.cards_created, 16);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].organization_id, "org-b");
        assert_eq!(report.errors[0].metric_key, None);
    }

    #[test]
    fn metric_failures_carry_org_and_metric_context() {
        let mut outcome = clean("org-a", 15);
        outcome.metric_failures.push(MetricFailure {
            metric_key: "mtd.revenue".to_string(),
            message: "Trip aggregate failed: malformed row".to_string(),
        });

        let report = assemble_report(vec![outcome]);
        assert!(!report.success);
        assert_eq!(report.cards_created, 15);
        assert_eq!(
            report.errors[0].metric_key.as_deref(),
            Some("mtd.revenue")
        );
        assert_eq!(report.errors[0].organization_id, "org-a");
    }

    #[test]
    fn idempotent_rerun_reports_zero_new_cards_without_errors() {
        // Second run in the same bucket: every insert was a benign no-op.
        let report = assemble_report(vec![clean("org-a", 0)]);
        assert!(report.success);
        assert_eq!(report.cards_created, 0);
    }
}
