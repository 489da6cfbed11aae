//! Hydration state persistence with day rollover.
//!
//! The record lives under a single storage key as camelCase JSON. A second
//! key, `<key>_welcomed`, remembers that the first-run greeting was shown.

use super::types::{
    DEFAULT_GOAL_ML, DEFAULT_INTERVAL_MIN, HydrationState, MAX_GOAL_ML, MAX_INTERVAL_MIN,
    MIN_GOAL_ML, MIN_INTERVAL_MIN, coerce,
};
use crate::storage::Storage;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};

/// Default storage key for the hydration record.
pub const STORAGE_KEY: &str = "aqua-buddy-v1";

/// Lenient view of a persisted record. Every field is optional and numbers
/// are read as floats so that hand-edited files still load.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    total_ml: Option<f64>,
    #[serde(default)]
    interval_min: Option<f64>,
    #[serde(default)]
    goal_ml: Option<f64>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    today: Option<String>,
}

/// Loads and saves the [`HydrationState`] through a [`Storage`] backend.
pub struct StateStore {
    storage: Box<dyn Storage>,
    key: String,
}

impl StateStore {
    pub fn new(storage: Box<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Restore the state for `today`.
    ///
    /// Missing or corrupt records yield defaults. A record from another day
    /// keeps only the interval and goal; the total restarts at zero and
    /// reminders come back stopped.
    pub fn load(&self, today: NaiveDate) -> HydrationState {
        let defaults = HydrationState::new(today);

        let Some(raw) = self.storage.get(&self.key) else {
            debug!(target: "store", key = %self.key, "no saved state, using defaults");
            return defaults;
        };

        let saved: PersistedState = match serde_json::from_str(&raw) {
            Ok(saved) => saved,
            Err(e) => {
                warn!(target: "store", key = %self.key, error = %e, "saved state unreadable, using defaults");
                return defaults;
            }
        };

        let interval_min = coerce(
            saved.interval_min,
            DEFAULT_INTERVAL_MIN,
            MIN_INTERVAL_MIN,
            MAX_INTERVAL_MIN,
        );
        let goal_ml = coerce(saved.goal_ml, DEFAULT_GOAL_ML, MIN_GOAL_ML, MAX_GOAL_ML);

        let same_day = saved.today.as_deref() == Some(today.to_string().as_str());
        if !same_day {
            debug!(
                target: "store",
                saved_day = saved.today.as_deref().unwrap_or("none"),
                %today,
                "day rollover, resetting total"
            );
            return HydrationState {
                total_ml: 0,
                interval_min,
                goal_ml,
                active: false,
                today,
            };
        }

        HydrationState {
            total_ml: saved
                .total_ml
                .filter(|n| n.is_finite())
                .map(|n| n.floor().max(0.0) as u32)
                .unwrap_or(defaults.total_ml),
            interval_min,
            goal_ml,
            active: saved.active.unwrap_or(defaults.active),
            today,
        }
    }

    /// Persist `state`, replacing whatever was stored.
    pub fn save(&mut self, state: &HydrationState) -> std::io::Result<()> {
        let json = serde_json::to_string(state).map_err(std::io::Error::other)?;
        self.storage.set(&self.key, &json)
    }

    /// Whether the first-run greeting has already been shown.
    pub fn is_welcomed(&self) -> bool {
        self.storage.get(&self.welcomed_key()).is_some()
    }

    /// Remember that the greeting was shown.
    pub fn mark_welcomed(&mut self) -> std::io::Result<()> {
        let key = self.welcomed_key();
        self.storage.set(&key, "1")
    }

    fn welcomed_key(&self) -> String {
        format!("{}_welcomed", self.key)
    }
}
