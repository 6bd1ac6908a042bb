//! Deployment module

pub mod annotations;
pub mod scheduler;
pub mod unit;

pub use scheduler::LayerScheduler;
pub use unit::{DeployContext, UnitDeployer};
