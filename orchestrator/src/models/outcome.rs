//! Deployment outcome models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one workload unit during a deployment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum DeploymentOutcome {
    /// Already present in the runtime, left untouched
    Skipped,

    /// Submitted and ready
    Deployed,

    /// Failed with the given reason
    Failed(String),
}

impl DeploymentOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DeploymentOutcome::Failed(_))
    }
}

/// Outcomes of one layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerResult {
    /// Zero-based layer index
    pub index: usize,

    /// Outcome per unit name
    pub outcomes: BTreeMap<String, DeploymentOutcome>,

    /// Aggregate error message when any unit in the layer failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_error: Option<String>,
}

impl LayerResult {
    pub fn count(&self, wanted: fn(&DeploymentOutcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| wanted(o)).count()
    }
}

/// Summary of a successful deployment attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    /// Application instance name
    pub application: String,

    /// Unique id of this attempt, also recorded on the tracing span
    pub attempt_id: String,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    /// Every declared unit was already present; no layer was executed
    pub all_present: bool,

    pub layers: Vec<LayerResult>,
}

impl DeploymentReport {
    /// Outcome of a unit across all layers
    pub fn outcome(&self, unit: &str) -> Option<&DeploymentOutcome> {
        self.layers.iter().find_map(|layer| layer.outcomes.get(unit))
    }

    pub fn deployed(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.count(|o| *o == DeploymentOutcome::Deployed))
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.count(|o| *o == DeploymentOutcome::Skipped))
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.count(DeploymentOutcome::is_failed))
            .sum()
    }
}
