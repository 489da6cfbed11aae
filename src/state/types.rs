//! The hydration record and the numeric coercion rules that guard it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_INTERVAL_MIN: u32 = 30;
pub const MIN_INTERVAL_MIN: u32 = 5;
pub const MAX_INTERVAL_MIN: u32 = 240;

pub const DEFAULT_GOAL_ML: u32 = 2000;
pub const MIN_GOAL_ML: u32 = 500;
pub const MAX_GOAL_ML: u32 = 10_000;

pub const DEFAULT_DRINK_ML: u32 = 250;
pub const MIN_DRINK_ML: u32 = 10;
pub const MAX_DRINK_ML: u32 = 2000;

/// The day's hydration state (persisted under the storage key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationState {
    /// Fluid logged today, in ml.
    pub total_ml: u32,
    /// Reminder period in minutes, within [5, 240].
    pub interval_min: u32,
    /// Daily target in ml, within [500, 10000].
    pub goal_ml: u32,
    /// Whether reminders are running.
    pub active: bool,
    /// The calendar day `total_ml` applies to.
    pub today: NaiveDate,
}

impl HydrationState {
    /// Fresh state for `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            total_ml: 0,
            interval_min: DEFAULT_INTERVAL_MIN,
            goal_ml: DEFAULT_GOAL_ML,
            active: false,
            today,
        }
    }

    /// Percent of the goal reached, rounded and capped at 100.
    pub fn percent_of_goal(&self) -> u32 {
        let goal = self.goal_ml.max(1) as f64;
        let pct = (self.total_ml as f64 / goal * 100.0).round();
        pct.min(100.0) as u32
    }
}

/// Parse user-supplied numeric text.
///
/// Blank or non-numeric text yields `None`. Non-finite values are rejected
/// as well so that `inf` and `nan` are treated like any other garbage.
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Default, floor, then clamp a numeric input into `[min, max]`.
///
/// Missing values and zero fall back to `default` before flooring.
pub fn coerce(value: Option<f64>, default: u32, min: u32, max: u32) -> u32 {
    let n = match value {
        Some(v) if v != 0.0 && !v.is_nan() => v,
        _ => default as f64,
    };
    n.floor().clamp(min as f64, max as f64) as u32
}

/// Coerce interval input (minutes).
pub fn interval_from_input(raw: &str) -> u32 {
    coerce(
        parse_number(raw),
        DEFAULT_INTERVAL_MIN,
        MIN_INTERVAL_MIN,
        MAX_INTERVAL_MIN,
    )
}

/// Coerce goal input (ml).
pub fn goal_from_input(raw: &str) -> u32 {
    coerce(parse_number(raw), DEFAULT_GOAL_ML, MIN_GOAL_ML, MAX_GOAL_ML)
}

/// Coerce a drink amount (ml).
pub fn drink_from_input(raw: &str) -> u32 {
    coerce(parse_number(raw), DEFAULT_DRINK_ML, MIN_DRINK_ML, MAX_DRINK_ML)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_defaults() {
        let s = HydrationState::new(day("2024-01-01"));
        assert_eq!(s.total_ml, 0);
        assert_eq!(s.interval_min, 30);
        assert_eq!(s.goal_ml, 2000);
        assert!(!s.active);
    }

    #[test]
    fn test_serializes_camel_case() {
        let s = HydrationState::new(day("2024-01-01"));
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(
            json,
            r#"{"totalMl":0,"intervalMin":30,"goalMl":2000,"active":false,"today":"2024-01-01"}"#
        );
    }

    #[test]
    fn test_percent_of_goal() {
        let mut s = HydrationState::new(day("2024-01-01"));
        s.total_ml = 1000;
        assert_eq!(s.percent_of_goal(), 50);
        s.total_ml = 2500;
        assert_eq!(s.percent_of_goal(), 100);
        s.total_ml = 10;
        s.goal_ml = 2000;
        assert_eq!(s.percent_of_goal(), 1); // 0.5 rounds up
        s.total_ml = 0;
        assert_eq!(s.percent_of_goal(), 0);
    }

    #[test]
    fn test_interval_in_range() {
        assert_eq!(interval_from_input("10"), 10);
        assert_eq!(interval_from_input("45.9"), 45);
        assert_eq!(interval_from_input("5"), 5);
        assert_eq!(interval_from_input("240"), 240);
    }

    #[test]
    fn test_interval_clamped() {
        assert_eq!(interval_from_input("1"), 5);
        assert_eq!(interval_from_input("-20"), 5);
        assert_eq!(interval_from_input("999"), 240);
        assert_eq!(interval_from_input("1e9"), 240);
    }

    #[test]
    fn test_interval_non_numeric_defaults() {
        assert_eq!(interval_from_input("abc"), 30);
        assert_eq!(interval_from_input(""), 30);
        assert_eq!(interval_from_input("0"), 30);
        assert_eq!(interval_from_input("infinity"), 30);
        assert_eq!(interval_from_input("nan"), 30);
    }

    #[test]
    fn test_interval_always_within_bounds() {
        for raw in ["-1e300", "-5", "0.1", "4.99", "5", "17", "239.999", "241", "1e300"] {
            let m = interval_from_input(raw);
            assert!((5..=240).contains(&m), "raw {raw} gave {m}");
        }
    }

    #[test]
    fn test_goal_coercion() {
        assert_eq!(goal_from_input("2500"), 2500);
        assert_eq!(goal_from_input("100"), 500);
        assert_eq!(goal_from_input("50000"), 10_000);
        assert_eq!(goal_from_input("lots"), 2000);
    }

    #[test]
    fn test_drink_coercion() {
        assert_eq!(drink_from_input("330"), 330);
        assert_eq!(drink_from_input("1"), 10);
        assert_eq!(drink_from_input("5000"), 2000);
        assert_eq!(drink_from_input("a glass"), 250);
        assert_eq!(drink_from_input(""), 250);
    }
}
