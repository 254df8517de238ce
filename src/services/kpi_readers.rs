//! Read-only aggregate queries over the operational tables. Every reader
//! is scoped to one organization and one time window, and every aggregate
//! is `COALESCE`d in SQL so callers always receive defined numbers, never
//! a missing result.

use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::services::windows::TimeWindow;

/// Trip statuses that count toward operational aggregates. Draft and
/// cancelled trips are invisible to the KPI engine.
const REPORTABLE_TRIP_STATUSES: &str = "('in_transit', 'completed', 'closed')";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TripTotals {
    pub trip_count: i64,
    pub distance_km: f64,
    pub revenue: f64,
    pub cost: f64,
    pub fuel_litres: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetCounts {
    pub total_vehicles: i64,
    pub vehicles_with_trips: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverCounts {
    pub total_drivers: i64,
    pub drivers_with_trips: i64,
}

/// Per-entity profit aggregate used by the ranking metrics. Rows arrive
/// pre-sorted by profit descending, entity id ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityProfit {
    pub entity_id: String,
    pub label: String,
    pub profit: f64,
}

pub async fn trip_totals(
    pool: &PgPool,
    org_id: &str,
    window: &TimeWindow,
) -> AppResult<TripTotals> {
    let sql = format!(
        "SELECT COUNT(*)::bigint,
                COALESCE(SUM(distance_km), 0)::float8,
                COALESCE(SUM(revenue), 0)::float8,
                COALESCE(SUM(cost), 0)::float8,
                COALESCE(SUM(fuel_litres), 0)::float8
         FROM trips
         WHERE organization_id = $1::uuid
           AND trip_date >= $2 AND trip_date < $3
           AND status IN {REPORTABLE_TRIP_STATUSES}"
    );
    let (trip_count, distance_km, revenue, cost, fuel_litres) =
        sqlx::query_as::<_, (i64, f64, f64, f64, f64)>(&sql)
            .bind(org_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_one(pool)
            .await
            .map_err(|error| AppError::Dependency(format!("Trip aggregate failed: {error}")))?;

    Ok(TripTotals {
        trip_count,
        distance_km,
        revenue,
        cost,
        fuel_litres,
    })
}

pub async fn maintenance_cost(
    pool: &PgPool,
    org_id: &str,
    window: &TimeWindow,
) -> AppResult<f64> {
    sqlx::query_scalar::<_, f64>(
        "SELECT COALESCE(SUM(cost), 0)::float8
         FROM maintenance_tasks
         WHERE organization_id = $1::uuid
           AND status = 'done'
           AND completed_on >= $2 AND completed_on < $3",
    )
    .bind(org_id)
    .bind(window.start)
    .bind(window.end)
    .fetch_one(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Maintenance aggregate failed: {error}")))
}

/// Non-retired fleet size plus how many of those vehicles recorded at
/// least one reportable trip inside the window.
pub async fn fleet_counts(
    pool: &PgPool,
    org_id: &str,
    window: &TimeWindow,
) -> AppResult<FleetCounts> {
    let sql = format!(
        "SELECT (SELECT COUNT(*) FROM vehicles
                  WHERE organization_id = $1::uuid AND status <> 'retired')::bigint,
                (SELECT COUNT(DISTINCT vehicle_id) FROM trips
                  WHERE organization_id = $1::uuid
                    AND vehicle_id IS NOT NULL
                    AND trip_date >= $2 AND trip_date < $3
                    AND status IN {REPORTABLE_TRIP_STATUSES})::bigint"
    );
    let (total_vehicles, vehicles_with_trips) = sqlx::query_as::<_, (i64, i64)>(&sql)
        .bind(org_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_one(pool)
        .await
        .map_err(|error| AppError::Dependency(format!("Fleet counts failed: {error}")))?;

    Ok(FleetCounts {
        total_vehicles,
        vehicles_with_trips,
    })
}

pub async fn driver_counts(
    pool: &PgPool,
    org_id: &str,
    window: &TimeWindow,
) -> AppResult<DriverCounts> {
    let sql = format!(
        "SELECT (SELECT COUNT(*) FROM drivers
                  WHERE organization_id = $1::uuid AND status <> 'inactive')::bigint,
                (SELECT COUNT(DISTINCT driver_id) FROM trips
                  WHERE organization_id = $1::uuid
                    AND driver_id IS NOT NULL
                    AND trip_date >= $2 AND trip_date < $3
                    AND status IN {REPORTABLE_TRIP_STATUSES})::bigint"
    );
    let (total_drivers, drivers_with_trips) = sqlx::query_as::<_, (i64, i64)>(&sql)
        .bind(org_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_one(pool)
        .await
        .map_err(|error| AppError::Dependency(format!("Driver counts failed: {error}")))?;

    Ok(DriverCounts {
        total_drivers,
        drivers_with_trips,
    })
}

pub async fn vehicle_profits(
    pool: &PgPool,
    org_id: &str,
    window: &TimeWindow,
) -> AppResult<Vec<EntityProfit>> {
    let sql = format!(
        "SELECT v.id::text,
                COALESCE(NULLIF(TRIM(v.registration_no), ''), v.id::text),
                COALESCE(SUM(t.revenue - t.cost), 0)::float8 AS profit
         FROM trips t
         JOIN vehicles v ON v.id = t.vehicle_id AND v.organization_id = t.organization_id
         WHERE t.organization_id = $1::uuid
           AND t.trip_date >= $2 AND t.trip_date < $3
           AND t.status IN {REPORTABLE_TRIP_STATUSES}
         GROUP BY v.id, v.registration_no
         ORDER BY profit DESC, v.id ASC
         LIMIT 50"
    );
    entity_profits(pool, org_id, window, &sql, "Vehicle profit aggregate").await
}

pub async fn driver_profits(
    pool: &PgPool,
    org_id: &str,
    window: &TimeWindow,
) -> AppResult<Vec<EntityProfit>> {
    let sql = format!(
        "SELECT d.id::text,
                COALESCE(NULLIF(TRIM(d.full_name), ''), d.id::text),
                COALESCE(SUM(t.revenue - t.cost), 0)::float8 AS profit
         FROM trips t
         JOIN drivers d ON d.id = t.driver_id AND d.organization_id = t.organization_id
         WHERE t.organization_id = $1::uuid
           AND t.trip_date >= $2 AND t.trip_date < $3
           AND t.status IN {REPORTABLE_TRIP_STATUSES}
         GROUP BY d.id, d.full_name
         ORDER BY profit DESC, d.id ASC
         LIMIT 50"
    );
    entity_profits(pool, org_id, window, &sql, "Driver profit aggregate").await
}

async fn entity_profits(
    pool: &PgPool,
    org_id: &str,
    window: &TimeWindow,
    sql: &str,
    context: &str,
) -> AppResult<Vec<EntityProfit>> {
    let rows = sqlx::query_as::<_, (String, String, f64)>(sql)
        .bind(org_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(pool)
        .await
        .map_err(|error| AppError::Dependency(format!("{context} failed: {error}")))?;

    Ok(rows
        .into_iter()
        .map(|(entity_id, label, profit)| EntityProfit {
            entity_id,
            label,
            profit,
        })
        .collect())
}
