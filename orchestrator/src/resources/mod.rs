//! Exclusive hardware resources

pub mod discovery;
pub mod pool;
