//! Readiness tracking for deployed pods

pub mod prober;
pub mod state;
