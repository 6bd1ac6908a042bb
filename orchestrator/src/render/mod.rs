//! Manifest rendering

pub mod placeholder;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::UnitError;
use crate::models::unit::WorkloadUnit;

pub use placeholder::PlaceholderRenderer;

/// Per-container environment bindings, container name to key/value pairs
pub type EnvBindings = BTreeMap<String, BTreeMap<String, String>>;

/// Values a unit's template is rendered with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderBindings {
    /// Application instance name
    pub app_name: String,

    /// Name of the application template the instance was created from
    pub app_template: String,

    pub version: String,

    /// Template values, user params layered over the application defaults
    pub values: BTreeMap<String, String>,

    /// Resolved resource bindings per container
    pub env: EnvBindings,
}

/// A pod declared by a rendered manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodManifest {
    pub name: String,
    pub containers: Vec<String>,
}

/// Rendered manifest of one workload unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Unit the manifest was rendered for
    pub unit: String,

    /// Document submitted to the runtime
    pub body: String,

    /// Pods the document declares
    pub pods: Vec<PodManifest>,
}

impl Manifest {
    /// Declared pod matching a materialized pod name
    ///
    /// Names are matched exactly. When the manifest declares one pod and the
    /// runtime materialized one pod (`materialized == 1`), that pod matches
    /// whatever name the runtime gave it.
    pub fn pod(&self, name: &str, materialized: usize) -> Option<&PodManifest> {
        if let Some(pod) = self.pods.iter().find(|p| p.name == name) {
            return Some(pod);
        }
        match self.pods.as_slice() {
            [only] if materialized == 1 => Some(only),
            _ => None,
        }
    }
}

/// Turns a unit template plus bindings into a submittable manifest
pub trait ManifestRenderer: Send + Sync {
    fn render(
        &self,
        unit: &WorkloadUnit,
        bindings: &RenderBindings,
    ) -> Result<Manifest, UnitError>;
}
