//! Hydration state: the daily record and its persistence.

pub mod store;
pub mod types;

pub use store::{STORAGE_KEY, StateStore};
pub use types::HydrationState;
