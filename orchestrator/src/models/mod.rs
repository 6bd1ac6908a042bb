//! Data models

pub mod outcome;
pub mod plan;
pub mod unit;
