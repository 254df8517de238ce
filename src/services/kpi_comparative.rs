//! Period-over-period, ranking, and efficiency snapshots for one
//! organization. Comparisons pair the current window with its equivalent
//! span in the prior period; rankings order by profit with a fixed
//! entity-id tie-break so identical source data always ranks identically.

use serde_json::json;
use sqlx::PgPool;

use crate::error::AppError;
use crate::services::kpi_math::{
    compare, format_count, format_inr, format_inr_per_km, format_km, format_km_per_litre,
    format_with_change, ratio, Comparison,
};
use crate::services::kpi_readers::{
    driver_profits, maintenance_cost, trip_totals, vehicle_profits, EntityProfit, TripTotals,
};
use crate::services::kpi_store::{CardDraft, CardTheme, MetricFailure};
use crate::services::windows::TimeWindow;

const RANKING_TOP_N: usize = 3;

pub async fn generate_comparative_cards(
    pool: &PgPool,
    org_id: &str,
    today: chrono::NaiveDate,
) -> (Vec<CardDraft>, Vec<MetricFailure>) {
    let mut cards = Vec::new();
    let mut failures = Vec::new();

    let mtd = TimeWindow::month_to_date(today);
    let prior_month = TimeWindow::prior_month_equivalent(today);

    // MTD vs. the same day span of the prior month.
    let mtd_totals = match trip_totals(pool, org_id, &mtd).await {
        Ok(totals) => Some(totals),
        Err(error) => {
            record_failures(
                &mut failures,
                org_id,
                &[
                    "comparison.mtd_distance_vs_last_month",
                    "comparison.mtd_revenue_vs_last_month",
                    "comparison.mtd_trips_vs_last_month",
                    "efficiency.fuel",
                    "efficiency.cost_per_km",
                ],
                &error,
            );
            None
        }
    };

    if let Some(current) = mtd_totals {
        match trip_totals(pool, org_id, &prior_month).await {
            Ok(previous) => {
                cards.push(distance_vs_last_month_card(&current, &previous));
                cards.push(revenue_vs_last_month_card(&current, &previous));
                cards.push(trips_vs_last_month_card(&current, &previous));
            }
            Err(error) => record_failures(
                &mut failures,
                org_id,
                &[
                    "comparison.mtd_distance_vs_last_month",
                    "comparison.mtd_revenue_vs_last_month",
                    "comparison.mtd_trips_vs_last_month",
                ],
                &error,
            ),
        }

        cards.push(fuel_efficiency_card(&current));

        match maintenance_cost(pool, org_id, &mtd).await {
            Ok(maintenance) => cards.push(cost_per_km_card(&current, maintenance)),
            Err(error) => {
                record_failures(&mut failures, org_id, &["efficiency.cost_per_km"], &error)
            }
        }
    }

    // Week-to-date vs. the same weekday span of the prior week.
    let week = TimeWindow::week_to_date(today);
    let prior_week = TimeWindow::prior_week_equivalent(today);
    match week_pair(pool, org_id, &week, &prior_week).await {
        Ok((current, previous)) => cards.push(wow_distance_card(&current, &previous)),
        Err(error) => record_failures(&mut failures, org_id, &["comparison.wow_distance"], &error),
    }

    match vehicle_profits(pool, org_id, &mtd).await {
        Ok(profits) => cards.push(top_vehicle_card(profits)),
        Err(error) => record_failures(
            &mut failures,
            org_id,
            &["ranking.top_vehicle_by_profit"],
            &error,
        ),
    }

    match driver_profits(pool, org_id, &mtd).await {
        Ok(profits) => cards.push(top_driver_card(profits)),
        Err(error) => record_failures(
            &mut failures,
            org_id,
            &["ranking.top_driver_by_profit"],
            &error,
        ),
    }

    (cards, failures)
}

async fn week_pair(
    pool: &PgPool,
    org_id: &str,
    week: &TimeWindow,
    prior_week: &TimeWindow,
) -> Result<(TripTotals, TripTotals), AppError> {
    let current = trip_totals(pool, org_id, week).await?;
    let previous = trip_totals(pool, org_id, prior_week).await?;
    Ok((current, previous))
}

fn record_failures(
    failures: &mut Vec<MetricFailure>,
    org_id: &str,
    metric_keys: &[&str],
    error: &AppError,
) {
    for metric_key in metric_keys {
        tracing::warn!(org_id, metric_key, error = %error, "Comparative KPI metric failed");
        failures.push(MetricFailure {
            metric_key: (*metric_key).to_string(),
            message: error.to_string(),
        });
    }
}

fn comparison_payload(comparison: &Comparison) -> serde_json::Value {
    json!({
        "current": comparison.current,
        "previous": comparison.previous,
        "change_pct": comparison.change_pct,
        "capped": comparison.capped,
        "trend": comparison.trend.as_str(),
    })
}

fn distance_vs_last_month_card(current: &TripTotals, previous: &TripTotals) -> CardDraft {
    let comparison = compare(current.distance_km, previous.distance_km);
    CardDraft {
        metric_key: "comparison.mtd_distance_vs_last_month",
        title: "Distance vs Last Month".to_string(),
        value_human: format_with_change(&format_km(comparison.current), comparison.change_pct),
        payload: comparison_payload(&comparison),
        theme: CardTheme::Distance,
    }
}

fn revenue_vs_last_month_card(current: &TripTotals, previous: &TripTotals) -> CardDraft {
    let comparison = compare(current.revenue, previous.revenue);
    CardDraft {
        metric_key: "comparison.mtd_revenue_vs_last_month",
        title: "Revenue vs Last Month".to_string(),
        value_human: format_with_change(&format_inr(comparison.current), comparison.change_pct),
        payload: comparison_payload(&comparison),
        theme: CardTheme::Revenue,
    }
}

fn trips_vs_last_month_card(current: &TripTotals, previous: &TripTotals) -> CardDraft {
    let comparison = compare(current.trip_count as f64, previous.trip_count as f64);
    CardDraft {
        metric_key: "comparison.mtd_trips_vs_last_month",
        title: "Trips vs Last Month".to_string(),
        value_human: format_with_change(
            &format_count(current.trip_count, "trips"),
            comparison.change_pct,
        ),
        payload: comparison_payload(&comparison),
        theme: CardTheme::Trips,
    }
}

fn wow_distance_card(current: &TripTotals, previous: &TripTotals) -> CardDraft {
    let comparison = compare(current.distance_km, previous.distance_km);
    CardDraft {
        metric_key: "comparison.wow_distance",
        title: "Distance Week-over-Week".to_string(),
        value_human: format_with_change(&format_km(comparison.current), comparison.change_pct),
        payload: comparison_payload(&comparison),
        theme: CardTheme::Distance,
    }
}

fn fuel_efficiency_card(totals: &TripTotals) -> CardDraft {
    let km_per_litre = ratio(totals.distance_km, totals.fuel_litres);
    CardDraft {
        metric_key: "efficiency.fuel",
        title: "Fuel Efficiency (MTD)".to_string(),
        value_human: format_km_per_litre(km_per_litre),
        payload: json!({
            "distance_km": totals.distance_km,
            "fuel_litres": totals.fuel_litres,
            "km_per_litre": km_per_litre,
        }),
        theme: CardTheme::Fuel,
    }
}

fn cost_per_km_card(totals: &TripTotals, maintenance: f64) -> CardDraft {
    let total_cost = totals.cost + maintenance;
    let cost_per_km = ratio(total_cost, totals.distance_km);
    CardDraft {
        metric_key: "efficiency.cost_per_km",
        title: "Cost per km (MTD)".to_string(),
        value_human: format_inr_per_km(cost_per_km),
        payload: json!({
            "trip_cost": totals.cost,
            "maintenance_cost": maintenance,
            "distance_km": totals.distance_km,
            "cost_per_km": cost_per_km,
        }),
        theme: CardTheme::Fuel,
    }
}

/// Order by profit descending; equal profits fall back to entity id
/// ascending so repeated runs over identical data rank identically.
fn rank_top(mut entries: Vec<EntityProfit>, top_n: usize) -> Vec<EntityProfit> {
    entries.sort_by(|left, right| {
        right
            .profit
            .total_cmp(&left.profit)
            .then_with(|| left.entity_id.cmp(&right.entity_id))
    });
    entries.truncate(top_n);
    entries
}

fn ranking_card(
    metric_key: &'static str,
    title: &str,
    empty_label: &str,
    entries: Vec<EntityProfit>,
) -> CardDraft {
    let ranked = rank_top(entries, RANKING_TOP_N);
    let value_human = match ranked.first() {
        Some(leader) => format!("{} · {}", leader.label, format_inr(leader.profit)),
        None => empty_label.to_string(),
    };
    let items: Vec<serde_json::Value> = ranked
        .iter()
        .map(|entry| {
            json!({
                "entity_id": entry.entity_id,
                "label": entry.label,
                "profit": entry.profit,
            })
        })
        .collect();
    CardDraft {
        metric_key,
        title: title.to_string(),
        value_human,
        payload: json!({ "ranked": items }),
        theme: CardTheme::Profit,
    }
}

fn top_vehicle_card(entries: Vec<EntityProfit>) -> CardDraft {
    ranking_card(
        "ranking.top_vehicle_by_profit",
        "Top Vehicle (MTD Profit)",
        "No vehicle trips this month",
        entries,
    )
}

fn top_driver_card(entries: Vec<EntityProfit>) -> CardDraft {
    ranking_card(
        "ranking.top_driver_by_profit",
        "Top Driver (MTD Profit)",
        "No driver trips this month",
        entries,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profits(entries: &[(&str, &str, f64)]) -> Vec<EntityProfit> {
        entries
            .iter()
            .map(|(entity_id, label, profit)| EntityProfit {
                entity_id: (*entity_id).to_string(),
                label: (*label).to_string(),
                profit: *profit,
            })
            .collect()
    }

    #[test]
    fn collapsed_week_renders_full_decline_not_null() {
        // Zero km this window against 8,215 km in the prior one.
        let current = TripTotals::default();
        let previous = TripTotals {
            trip_count: 31,
            distance_km: 8215.0,
            revenue: 410000.0,
            cost: 120000.0,
            fuel_litres: 900.0,
        };
        let card = wow_distance_card(&current, &previous);
        assert_eq!(card.value_human, "0 km (-100%)");
        assert_eq!(card.payload["trend"], "down");
    }

    #[test]
    fn growth_from_zero_baseline_is_capped_and_flagged() {
        let current = TripTotals {
            trip_count: 4,
            distance_km: 512.0,
            revenue: 20500.0,
            cost: 6000.0,
            fuel_litres: 60.0,
        };
        let card = revenue_vs_last_month_card(&current, &TripTotals::default());
        assert_eq!(card.value_human, "₹20,500 (+999.9%)");
        assert_eq!(card.payload["capped"], true);
        assert_eq!(card.payload["trend"], "up");
    }

    #[test]
    fn flat_comparison_renders_zero_change() {
        let totals = TripTotals {
            trip_count: 10,
            distance_km: 1000.0,
            revenue: 50000.0,
            cost: 10000.0,
            fuel_litres: 100.0,
        };
        let card = distance_vs_last_month_card(&totals, &totals);
        assert_eq!(card.value_human, "1,000 km (0%)");
        assert_eq!(card.payload["trend"], "flat");
    }

    #[test]
    fn ranking_breaks_profit_ties_by_entity_id() {
        let entries = profits(&[
            ("v3", "KA-03", 300.0),
            ("v2", "KA-02", 500.0),
            ("v1", "KA-01", 500.0),
        ]);
        let ranked = rank_top(entries, 3);
        let order: Vec<&str> = ranked.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(order, vec!["v1", "v2", "v3"]);

        // Same data in another arrival order ranks identically.
        let shuffled = profits(&[
            ("v1", "KA-01", 500.0),
            ("v3", "KA-03", 300.0),
            ("v2", "KA-02", 500.0),
        ]);
        let reranked = rank_top(shuffled, 3);
        let reorder: Vec<&str> = reranked.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(order, reorder);
    }

    #[test]
    fn ranking_card_takes_top_three_and_names_the_leader() {
        let entries = profits(&[
            ("v1", "KA-01-AB-1234", 45000.0),
            ("v2", "KA-02-CD-5678", 31000.0),
            ("v3", "KA-03-EF-9012", 28000.0),
            ("v4", "KA-04-GH-3456", 1000.0),
        ]);
        let card = top_vehicle_card(entries);
        assert_eq!(card.value_human, "KA-01-AB-1234 · ₹45,000");
        assert_eq!(card.payload["ranked"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn empty_ranking_is_a_neutral_card_not_an_error() {
        let card = top_driver_card(Vec::new());
        assert_eq!(card.value_human, "No driver trips this month");
        assert_eq!(card.payload["ranked"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn efficiency_ratios_survive_zero_denominators() {
        let card = fuel_efficiency_card(&TripTotals::default());
        assert_eq!(card.value_human, "0.0 km/L");

        let cost_card = cost_per_km_card(&TripTotals::default(), 0.0);
        assert_eq!(cost_card.value_human, "₹0.00/km");

        let totals = TripTotals {
            trip_count: 20,
            distance_km: 4200.0,
            revenue: 0.0,
            cost: 42000.0,
            fuel_litres: 500.0,
        };
        assert_eq!(fuel_efficiency_card(&totals).value_human, "8.4 km/L");
        assert_eq!(cost_per_km_card(&totals, 0.0).value_human, "₹10.00/km");
    }

    #[test]
    fn every_comparative_card_has_a_nonempty_display_value() {
        let zero = TripTotals::default();
        let cards = [
            distance_vs_last_month_card(&zero, &zero),
            revenue_vs_last_month_card(&zero, &zero),
            trips_vs_last_month_card(&zero, &zero),
            wow_distance_card(&zero, &zero),
            fuel_efficiency_card(&zero),
            cost_per_km_card(&zero, 0.0),
            top_vehicle_card(Vec::new()),
            top_driver_card(Vec::new()),
        ];
        for card in &cards {
            assert!(!card.value_human.trim().is_empty(), "{}", card.metric_key);
        }
    }
}
