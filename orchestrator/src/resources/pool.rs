//! Exclusive resource pool
//!
//! A pool holds the identifiers of the accelerator devices that were free when
//! the deployment attempt started. Reservation is all-or-nothing and removes
//! the identifiers for the rest of the attempt; nothing is ever released back.

use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::UnitError;

/// Pool of exclusive resource identifiers shared by all tasks of an attempt
#[derive(Debug)]
pub struct ResourcePool {
    available: Mutex<Vec<String>>,
    capacity: usize,
}

impl ResourcePool {
    /// Create a pool from discovered identifiers, dropping duplicates
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut available: Vec<String> = Vec::new();
        for id in ids {
            let id = id.into();
            if !available.contains(&id) {
                available.push(id);
            }
        }
        let capacity = available.len();
        Self {
            available: Mutex::new(available),
            capacity,
        }
    }

    /// A pool with nothing in it
    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Number of identifiers the pool started with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of identifiers not yet reserved
    pub async fn available(&self) -> usize {
        self.available.lock().await.len()
    }

    /// Reserve `count` identifiers
    ///
    /// Zero is always satisfied without taking the lock. A request larger than
    /// what is left fails and reserves nothing.
    pub async fn reserve(&self, count: usize) -> Result<Vec<String>, UnitError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut available = self.available.lock().await;
        if count > available.len() {
            return Err(UnitError::InsufficientResources {
                requested: count,
                available: available.len(),
            });
        }

        let reserved: Vec<String> = available.drain(..count).collect();
        debug!(
            "Reserved {} resource(s): {:?} ({} left)",
            count,
            reserved,
            available.len()
        );
        Ok(reserved)
    }
}
