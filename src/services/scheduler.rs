use std::time::Duration;

use tokio::time::sleep;

use crate::services::kpi_runner::run_all_organizations;
use crate::state::AppState;

/// Background loop that triggers a full KPI run every
/// `KPI_RUN_INTERVAL_HOURS`. Each run executes in its own `tokio::spawn`
/// so a failure never crashes the scheduler loop. Overlapping with a
/// manual `POST /kpi/run` is harmless because the snapshot key dedupes
/// writes inside the same computation bucket.
pub async fn run_background_scheduler(state: AppState) {
    if !state.config.scheduler_enabled {
        tracing::info!("Scheduler disabled (SCHEDULER_ENABLED=false), external cron owns runs");
        return;
    }
    if state.db_pool.is_none() {
        tracing::warn!("Scheduler: no database pool configured, exiting");
        return;
    }

    let interval =
        Duration::from_secs(state.config.kpi_run_interval_hours.max(1) * 3600);
    tracing::info!(
        interval_hours = state.config.kpi_run_interval_hours.max(1),
        "Background KPI scheduler started"
    );

    // First run shortly after boot so a fresh deployment has cards before
    // the first full interval elapses.
    let mut next_run = tokio::time::Instant::now() + Duration::from_secs(60);

    loop {
        sleep(Duration::from_secs(15)).await;

        if tokio::time::Instant::now() < next_run {
            continue;
        }
        next_run = tokio::time::Instant::now() + interval;

        let state = state.clone();
        tokio::spawn(async move {
            match run_all_organizations(&state).await {
                Ok(report) => {
                    tracing::info!(
                        organizations = report.organizations_processed,
                        cards_created = report.cards_created,
                        errors = report.errors.len(),
                        "Scheduler: KPI run completed"
                    );
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Scheduler: KPI run failed to start");
                }
            }
        });
    }
}
