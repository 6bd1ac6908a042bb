//! Error types for podlayer
//!
//! Errors come in three scopes. [`RuntimeError`] is what a container runtime
//! backend reports for a single primitive call. [`UnitError`] is the cause of
//! one workload unit failing to deploy, and [`DeployError`] pins that cause to
//! the unit's name. [`OrchestratorError`] is what a whole deployment attempt
//! returns, either a pre-flight failure or the aggregate [`LayerFailure`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::models::outcome::LayerResult;

/// Main error type for a deployment attempt
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient resources: {required} required, {available} available")]
    InsufficientResources { required: usize, available: usize },

    #[error("Resource discovery error: {0}")]
    ResourceDiscovery(String),

    #[error("Runtime query error: {0}")]
    RuntimeQuery(#[from] RuntimeError),

    #[error(transparent)]
    LayerFailed(#[from] LayerFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}

/// Errors reported by a container runtime backend
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Why a single workload unit failed to deploy
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("invalid annotation {key}={value}: {reason}")]
    InvalidAnnotation {
        key: String,
        value: String,
        reason: String,
    },

    #[error("insufficient resources: {requested} requested, {available} available")]
    InsufficientResources { requested: usize, available: usize },

    #[error("failed to render manifest: {0}")]
    Render(String),

    #[error("failed pod creation: {0}")]
    Submission(#[source] RuntimeError),

    #[error(
        "timed out after {timeout:?} waiting for {expected} containers in pod {pod} (observed {observed})"
    )]
    ContainerCreationTimeout {
        pod: String,
        expected: usize,
        observed: usize,
        timeout: Duration,
    },

    #[error("readiness check failed: container {container} not healthy after {timeout:?} (last status: {last_status})")]
    HealthTimeout {
        container: String,
        timeout: Duration,
        last_status: String,
    },

    #[error("runtime query failed: {0}")]
    RuntimeQuery(#[source] RuntimeError),

    #[error("runtime returned pod {0} which the manifest does not declare")]
    UnknownPod(String),

    #[error("deployment task aborted: {0}")]
    TaskAborted(String),
}

impl UnitError {
    /// Whether this failure is a readiness deadline being exceeded
    pub fn is_readiness_timeout(&self) -> bool {
        matches!(
            self,
            UnitError::ContainerCreationTimeout { .. } | UnitError::HealthTimeout { .. }
        )
    }
}

/// A unit-scoped failure tagged with the unit's name
#[derive(Error, Debug)]
#[error("{unit}: {source}")]
pub struct DeployError {
    pub unit: String,
    #[source]
    pub source: UnitError,
}

impl DeployError {
    pub fn new(unit: impl Into<String>, source: UnitError) -> Self {
        Self {
            unit: unit.into(),
            source,
        }
    }
}

/// Aggregate error for a layer in which at least one unit failed
///
/// Carries the results of the layers that completed before it so the caller
/// can report what was left deployed.
#[derive(Debug)]
pub struct LayerFailure {
    /// Zero-based index of the failed layer
    pub layer: usize,

    /// Every failed unit in the layer, sorted by unit name
    pub failures: Vec<DeployError>,

    /// Outcomes of the failed layer itself
    pub result: LayerResult,

    /// Results of the layers that completed before the failure
    pub completed: Vec<LayerResult>,
}

impl fmt::Display for LayerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layer {} failed ({} unit(s)):",
            self.layer + 1,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  - {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for LayerFailure {}
