//! Null-safe arithmetic and display formatting for KPI cards.
//!
//! Every division, ratio, and percentage in the engine goes through this
//! module so a zero or missing operand always resolves to a defined number
//! before anything is formatted. Formatting functions take plain numerics,
//! never options.

use serde::Serialize;

/// Product convention for percentage change against a zero baseline:
/// the change is reported as this cap (with the sign of the current value)
/// and flagged via [`Comparison::capped`]. `0 → 0` is a 0% change.
pub const MAX_PERCENT_CHANGE: f64 = 999.9;

/// Changes within this many percentage points of zero render as flat.
pub const FLAT_EPSILON: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Flat => "flat",
        }
    }
}

/// Resolved period-over-period comparison. Both operands are already
/// defaulted; `change_pct` is always finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub current: f64,
    pub previous: f64,
    pub change_pct: f64,
    pub capped: bool,
    pub trend: Trend,
}

pub fn compare(current: f64, previous: f64) -> Comparison {
    let (change_pct, capped) = percentage_change(current, previous);
    Comparison {
        current,
        previous,
        change_pct,
        capped,
        trend: trend_of(change_pct),
    }
}

/// Percentage change of `current` over `previous`, defined for every pair
/// of finite inputs. Returns the change and whether the zero-baseline cap
/// was applied.
pub fn percentage_change(current: f64, previous: f64) -> (f64, bool) {
    if previous == 0.0 {
        if current == 0.0 {
            return (0.0, false);
        }
        let capped = MAX_PERCENT_CHANGE.copysign(current);
        return (capped, true);
    }
    let change = (current - previous) / previous.abs() * 100.0;
    (round1(change), false)
}

/// Division that treats a zero denominator as "no data", not an error.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

pub fn trend_of(change_pct: f64) -> Trend {
    if change_pct.abs() < FLAT_EPSILON {
        Trend::Flat
    } else if change_pct > 0.0 {
        Trend::Up
    } else {
        Trend::Down
    }
}

/// Whole-rupee amount with Indian digit grouping: `₹12,34,567`.
pub fn format_inr(amount: f64) -> String {
    let rounded = amount.round();
    if rounded < 0.0 {
        format!("-₹{}", group_digits(-rounded as u64))
    } else {
        format!("₹{}", group_digits(rounded as u64))
    }
}

pub fn format_km(km: f64) -> String {
    let rounded = km.round();
    if rounded < 0.0 {
        format!("-{} km", group_digits(-rounded as u64))
    } else {
        format!("{} km", group_digits(rounded as u64))
    }
}

pub fn format_count(count: i64, noun: &str) -> String {
    format!("{} {noun}", group_digits(count.unsigned_abs()))
}

pub fn format_percent(percent: f64) -> String {
    format!("{:.1}%", round1(percent))
}

pub fn format_km_per_litre(value: f64) -> String {
    format!("{:.1} km/L", value)
}

pub fn format_inr_per_km(value: f64) -> String {
    format!("₹{:.2}/km", value)
}

/// Render a base value with its signed change, e.g. `"0 km (-100%)"`.
/// Whole-number changes drop the decimal to read naturally on cards.
pub fn format_with_change(base: &str, change_pct: f64) -> String {
    let rounded = round1(change_pct);
    let sign = if rounded > 0.0 { "+" } else { "" };
    if rounded.fract() == 0.0 {
        format!("{base} ({sign}{:.0}%)", rounded)
    } else {
        format!("{base} ({sign}{:.1}%)", rounded)
    }
}

/// Indian digit grouping: last three digits, then groups of two.
fn group_digits(mut value: u64) -> String {
    if value < 1000 {
        return value.to_string();
    }
    let tail = value % 1000;
    value /= 1000;
    let mut groups = Vec::new();
    while value > 0 {
        groups.push(value % 100);
        value /= 100;
    }
    let mut out = String::new();
    for (index, group) in groups.iter().rev().enumerate() {
        if index == 0 {
            out.push_str(&group.to_string());
        } else {
            out.push_str(&format!("{:02}", group));
        }
        out.push(',');
    }
    out.push_str(&format!("{:03}", tail));
    out
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_change_is_zero_when_both_operands_are_zero() {
        assert_eq!(percentage_change(0.0, 0.0), (0.0, false));
    }

    #[test]
    fn percentage_change_against_zero_baseline_is_capped_and_finite() {
        assert_eq!(percentage_change(250.0, 0.0), (MAX_PERCENT_CHANGE, true));
        assert_eq!(percentage_change(-40.0, 0.0), (-MAX_PERCENT_CHANGE, true));
        for current in [-1.0e12, -1.0, 0.0, 0.5, 3.7e9] {
            let (change, _) = percentage_change(current, 0.0);
            assert!(change.is_finite());
        }
    }

    #[test]
    fn percentage_change_handles_declines_and_negative_baselines() {
        assert_eq!(percentage_change(0.0, 8215.0), (-100.0, false));
        assert_eq!(percentage_change(150.0, 100.0), (50.0, false));
        // Loss shrinking from -200 to -100 is an improvement.
        assert_eq!(percentage_change(-100.0, -200.0), (50.0, false));
    }

    #[test]
    fn ratio_with_zero_denominator_is_zero() {
        assert_eq!(ratio(100.0, 0.0), 0.0);
        assert_eq!(ratio(0.0, 0.0), 0.0);
        assert_eq!(ratio(90.0, 30.0), 3.0);
    }

    #[test]
    fn trend_uses_flat_epsilon() {
        assert_eq!(trend_of(0.0), Trend::Flat);
        assert_eq!(trend_of(0.04), Trend::Flat);
        assert_eq!(trend_of(0.06), Trend::Up);
        assert_eq!(trend_of(-12.5), Trend::Down);
    }

    #[test]
    fn formats_rupees_with_indian_grouping() {
        assert_eq!(format_inr(0.0), "₹0");
        assert_eq!(format_inr(999.0), "₹999");
        assert_eq!(format_inr(2089.0), "₹2,089");
        assert_eq!(format_inr(1234567.0), "₹12,34,567");
        assert_eq!(format_inr(100000.0), "₹1,00,000");
        assert_eq!(format_inr(-45200.0), "-₹45,200");
    }

    #[test]
    fn formats_distance_and_counts() {
        assert_eq!(format_km(2089.0), "2,089 km");
        assert_eq!(format_km(0.0), "0 km");
        assert_eq!(format_count(10, "trips"), "10 trips");
        assert_eq!(format_percent(62.5), "62.5%");
        assert_eq!(format_km_per_litre(8.42), "8.4 km/L");
        assert_eq!(format_inr_per_km(12.5), "₹12.50/km");
    }

    #[test]
    fn formats_change_suffix() {
        assert_eq!(format_with_change("0 km", -100.0), "0 km (-100%)");
        assert_eq!(format_with_change("2,089 km", 12.46), "2,089 km (+12.5%)");
        assert_eq!(format_with_change("₹0", 0.0), "₹0 (0%)");
    }

    #[test]
    fn compare_assembles_trend_and_cap() {
        let comparison = compare(0.0, 8215.0);
        assert_eq!(comparison.change_pct, -100.0);
        assert_eq!(comparison.trend, Trend::Down);
        assert!(!comparison.capped);

        let fresh = compare(500.0, 0.0);
        assert_eq!(fresh.change_pct, MAX_PERCENT_CHANGE);
        assert!(fresh.capped);
        assert_eq!(fresh.trend, Trend::Up);
    }
}
