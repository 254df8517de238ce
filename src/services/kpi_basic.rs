//! Absolute-metric snapshots: today / this-week / month-to-date figures
//! for one organization. Each metric reads its window, resolves defaults
//! through the arithmetic layer, and renders its display string last.

use serde_json::json;
use sqlx::PgPool;

use crate::error::AppError;
use crate::services::kpi_math::{format_count, format_inr, format_km, format_percent, ratio};
use crate::services::kpi_readers::{
    driver_counts, fleet_counts, maintenance_cost, trip_totals, DriverCounts, FleetCounts,
    TripTotals,
};
use crate::services::kpi_store::{CardDraft, CardTheme, MetricFailure};
use crate::services::windows::TimeWindow;

/// Compute every absolute metric for one organization. A failure in one
/// metric group is logged and recorded; the remaining groups still run.
pub async fn generate_basic_cards(
    pool: &PgPool,
    org_id: &str,
    today: chrono::NaiveDate,
) -> (Vec<CardDraft>, Vec<MetricFailure>) {
    let mut cards = Vec::new();
    let mut failures = Vec::new();

    let mtd = TimeWindow::month_to_date(today);

    match trip_totals(pool, org_id, &TimeWindow::single_day(today)).await {
        Ok(totals) => {
            cards.push(distance_today_card(&totals));
            cards.push(trips_today_card(&totals));
        }
        Err(error) => record_failures(
            &mut failures,
            org_id,
            &["today.distance", "today.trips"],
            &error,
        ),
    }

    match trip_totals(pool, org_id, &TimeWindow::week_to_date(today)).await {
        Ok(totals) => cards.push(distance_week_card(&totals)),
        Err(error) => record_failures(&mut failures, org_id, &["week.distance"], &error),
    }

    match trip_totals(pool, org_id, &mtd).await {
        Ok(totals) => {
            cards.push(trips_mtd_card(&totals));
            cards.push(revenue_mtd_card(&totals));

            match maintenance_cost(pool, org_id, &mtd).await {
                Ok(maintenance) => cards.push(net_profit_mtd_card(&totals, maintenance)),
                Err(error) => record_failures(&mut failures, org_id, &["mtd.net_profit"], &error),
            }
        }
        Err(error) => record_failures(
            &mut failures,
            org_id,
            &["mtd.trips", "mtd.revenue", "mtd.net_profit"],
            &error,
        ),
    }

    match fleet_counts(pool, org_id, &mtd).await {
        Ok(counts) => cards.push(fleet_utilization_card(&counts)),
        Err(error) => record_failures(&mut failures, org_id, &["fleet.utilization"], &error),
    }

    match driver_counts(pool, org_id, &mtd).await {
        Ok(counts) => cards.push(active_drivers_card(&counts)),
        Err(error) => record_failures(&mut failures, org_id, &["drivers.active_ratio"], &error),
    }

    (cards, failures)
}

fn record_failures(
    failures: &mut Vec<MetricFailure>,
    org_id: &str,
    metric_keys: &[&str],
    error: &AppError,
) {
    for metric_key in metric_keys {
        tracing::warn!(org_id, metric_key, error = %error, "Basic KPI metric failed");
        failures.push(MetricFailure {
            metric_key: (*metric_key).to_string(),
            message: error.to_string(),
        });
    }
}

fn distance_today_card(totals: &TripTotals) -> CardDraft {
    CardDraft {
        metric_key: "today.distance",
        title: "Distance Today".to_string(),
        value_human: format_km(totals.distance_km),
        payload: json!({ "distance_km": totals.distance_km }),
        theme: CardTheme::Distance,
    }
}

fn trips_today_card(totals: &TripTotals) -> CardDraft {
    CardDraft {
        metric_key: "today.trips",
        title: "Trips Today".to_string(),
        value_human: format_count(totals.trip_count, "trips"),
        payload: json!({ "trip_count": totals.trip_count }),
        theme: CardTheme::Trips,
    }
}

fn distance_week_card(totals: &TripTotals) -> CardDraft {
    CardDraft {
        metric_key: "week.distance",
        title: "Distance This Week".to_string(),
        value_human: format_km(totals.distance_km),
        payload: json!({ "distance_km": totals.distance_km }),
        theme: CardTheme::Distance,
    }
}

fn trips_mtd_card(totals: &TripTotals) -> CardDraft {
    CardDraft {
        metric_key: "mtd.trips",
        title: "Trips This Month".to_string(),
        value_human: format_count(totals.trip_count, "trips"),
        payload: json!({ "trip_count": totals.trip_count }),
        theme: CardTheme::Trips,
    }
}

fn revenue_mtd_card(totals: &TripTotals) -> CardDraft {
    CardDraft {
        metric_key: "mtd.revenue",
        title: "Revenue (MTD)".to_string(),
        value_human: format_inr(totals.revenue),
        payload: json!({ "revenue": totals.revenue }),
        theme: CardTheme::Revenue,
    }
}

fn net_profit_mtd_card(totals: &TripTotals, maintenance: f64) -> CardDraft {
    let net_profit = totals.revenue - totals.cost - maintenance;
    CardDraft {
        metric_key: "mtd.net_profit",
        title: "Net Profit (MTD)".to_string(),
        value_human: format_inr(net_profit),
        payload: json!({
            "revenue": totals.revenue,
            "trip_cost": totals.cost,
            "maintenance_cost": maintenance,
            "net_profit": net_profit,
        }),
        theme: CardTheme::Profit,
    }
}

fn fleet_utilization_card(counts: &FleetCounts) -> CardDraft {
    let percent = ratio(counts.vehicles_with_trips as f64, counts.total_vehicles as f64) * 100.0;
    CardDraft {
        metric_key: "fleet.utilization",
        title: "Fleet Utilization".to_string(),
        value_human: format_percent(percent),
        payload: json!({
            "vehicles_with_trips": counts.vehicles_with_trips,
            "total_vehicles": counts.total_vehicles,
            "utilization_pct": percent,
        }),
        theme: CardTheme::Utilization,
    }
}

fn active_drivers_card(counts: &DriverCounts) -> CardDraft {
    let percent = ratio(counts.drivers_with_trips as f64, counts.total_drivers as f64) * 100.0;
    CardDraft {
        metric_key: "drivers.active_ratio",
        title: "Active Drivers".to_string(),
        value_human: format_percent(percent),
        payload: json!({
            "drivers_with_trips": counts.drivers_with_trips,
            "total_drivers": counts.total_drivers,
            "active_pct": percent,
        }),
        theme: CardTheme::Utilization,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_data_renders_neutral_values_not_errors() {
        let totals = TripTotals::default();
        assert_eq!(distance_today_card(&totals).value_human, "0 km");
        assert_eq!(trips_today_card(&totals).value_human, "0 trips");
        assert_eq!(revenue_mtd_card(&totals).value_human, "₹0");
        assert_eq!(net_profit_mtd_card(&totals, 0.0).value_human, "₹0");

        let fleet = FleetCounts::default();
        assert_eq!(fleet_utilization_card(&fleet).value_human, "0.0%");
        let drivers = DriverCounts::default();
        assert_eq!(active_drivers_card(&drivers).value_human, "0.0%");
    }

    #[test]
    fn month_with_distance_but_no_recorded_income() {
        // 10 trips totalling 2,089 km with income not yet entered.
        let totals = TripTotals {
            trip_count: 10,
            distance_km: 2089.0,
            revenue: 0.0,
            cost: 0.0,
            fuel_litres: 0.0,
        };
        let distance = distance_week_card(&totals);
        assert_eq!(distance.value_human, "2,089 km");
        assert_eq!(revenue_mtd_card(&totals).value_human, "₹0");
        assert_eq!(trips_mtd_card(&totals).value_human, "10 trips");
    }

    #[test]
    fn net_profit_subtracts_trip_and_maintenance_cost() {
        let totals = TripTotals {
            trip_count: 42,
            distance_km: 10500.0,
            revenue: 250000.0,
            cost: 90000.0,
            fuel_litres: 1200.0,
        };
        let card = net_profit_mtd_card(&totals, 35000.0);
        assert_eq!(card.value_human, "₹1,25,000");
        assert_eq!(card.payload["net_profit"], 125000.0);

        let loss = net_profit_mtd_card(&totals, 200000.0);
        assert_eq!(loss.value_human, "-₹40,000");
    }

    #[test]
    fn utilization_ratio_is_percentage_of_fleet() {
        let counts = FleetCounts {
            total_vehicles: 8,
            vehicles_with_trips: 5,
        };
        let card = fleet_utilization_card(&counts);
        assert_eq!(card.value_human, "62.5%");
        assert_eq!(card.payload["total_vehicles"], 8);
    }

    #[test]
    fn every_basic_card_has_a_nonempty_display_value() {
        let cards = [
            distance_today_card(&TripTotals::default()),
            trips_today_card(&TripTotals::default()),
            distance_week_card(&TripTotals::default()),
            trips_mtd_card(&TripTotals::default()),
            revenue_mtd_card(&TripTotals::default()),
            net_profit_mtd_card(&TripTotals::default(), 0.0),
            fleet_utilization_card(&FleetCounts::default()),
            active_drivers_card(&DriverCounts::default()),
        ];
        for card in &cards {
            assert!(!card.value_human.trim().is_empty(), "{}", card.metric_key);
        }
    }
}
