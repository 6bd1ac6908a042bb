//! Application description
//!
//! An application template is described by a JSON file:
//!
//! ```json
//! {
//!   "name": "rag",
//!   "version": "1.0.0",
//!   "values": {"UI_PORT": "3000"},
//!   "layers": [["vector-db"], ["api", "ui"]],
//!   "units": [
//!     {
//!       "name": "api",
//!       "template_file": "api.yaml",
//!       "containers": ["api-server"],
//!       "annotations": {"ai-services.io/api-server--accelerators": "2"}
//!     }
//!   ]
//! }
//! ```
//!
//! Unit templates are given inline (`template`) or as a path relative to the
//! description file (`template_file`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::OrchestratorError;
use crate::filesys::File;
use crate::models::unit::{PodLayout, WorkloadUnit};

/// Application template as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSpec {
    /// Template name
    pub name: String,

    #[serde(default)]
    pub version: String,

    /// Default template values, overridden by user params
    #[serde(default)]
    pub values: BTreeMap<String, String>,

    /// Execution plan, one list of unit names per layer
    pub layers: Vec<Vec<String>>,

    pub units: Vec<UnitSpec>,
}

/// One workload unit as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,

    pub containers: Vec<String>,

    /// Pods of a multi-pod template, see [`WorkloadUnit::pods`]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pods: Vec<PodLayout>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// An application instance ready to orchestrate
#[derive(Debug, Clone)]
pub struct Application {
    /// Instance name, also the value of the application label on its pods
    pub id: String,

    /// Template the instance is created from
    pub template: String,

    pub version: String,

    pub values: BTreeMap<String, String>,

    pub layers: Vec<Vec<String>>,

    pub units: Vec<WorkloadUnit>,
}

impl ApplicationSpec {
    /// Load a description file
    pub async fn load(file: &File) -> Result<Self, OrchestratorError> {
        let spec: ApplicationSpec = file.read_json().await?;
        debug!(
            "Loaded application template {} ({} units) from {}",
            spec.name,
            spec.units.len(),
            file.path().display()
        );
        Ok(spec)
    }

    /// Resolve unit templates and bind the spec to an instance name
    pub async fn instantiate(
        self,
        id: impl Into<String>,
        base_dir: &Path,
    ) -> Result<Application, OrchestratorError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "application name must not be empty".to_string(),
            ));
        }

        let mut units = Vec::with_capacity(self.units.len());
        for unit in self.units {
            let template = unit.resolve_template(base_dir).await?;
            let mut workload = WorkloadUnit::new(unit.name, template).with_containers(unit.containers);
            workload.pods = unit.pods;
            workload.annotations = unit.annotations;
            units.push(workload);
        }

        Ok(Application {
            id,
            template: self.name,
            version: self.version,
            values: self.values,
            layers: self.layers,
            units,
        })
    }
}

impl UnitSpec {
    async fn resolve_template(&self, base_dir: &Path) -> Result<String, OrchestratorError> {
        match (&self.template, &self.template_file) {
            (Some(template), None) => Ok(template.clone()),
            (None, Some(path)) => File::new(base_dir.join(path)).read_string().await,
            (Some(_), Some(_)) => Err(OrchestratorError::Configuration(format!(
                "unit '{}' sets both template and template_file",
                self.name
            ))),
            (None, None) => Err(OrchestratorError::Configuration(format!(
                "unit '{}' has no template",
                self.name
            ))),
        }
    }
}

impl Application {
    /// Load and instantiate a description file
    pub async fn load(id: impl Into<String>, file: &File) -> Result<Self, OrchestratorError> {
        ApplicationSpec::load(file)
            .await?
            .instantiate(id, &file.dir())
            .await
    }
}
