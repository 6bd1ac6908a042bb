//! Workload unit model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named deployable group of containers with a shared lifecycle
///
/// Declared statically by the application and immutable once the execution
/// plan is built. The template is opaque here; it is handed to a
/// [`ManifestRenderer`](crate::render::ManifestRenderer) together with the
/// resolved bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadUnit {
    /// Unique name within an application instance (also the pod name)
    pub name: String,

    /// Manifest template
    pub template: String,

    /// Declared internal container names
    pub containers: Vec<String>,

    /// Pods the template declares when it holds more than one
    ///
    /// Empty means a single pod named after the unit holding every container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pods: Vec<PodLayout>,

    /// Unit annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// One pod of a multi-pod unit
///
/// `name` is a template itself, rendered with the same bindings as the
/// manifest so it matches the name the runtime reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodLayout {
    pub name: String,
    pub containers: Vec<String>,
}

impl WorkloadUnit {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            containers: Vec::new(),
            pods: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_containers<I, S>(mut self, containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.containers = containers.into_iter().map(Into::into).collect();
        self
    }

    /// Declare one more pod; its containers join the unit's container list
    pub fn with_pod<I, S>(mut self, name: impl Into<String>, containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let containers: Vec<String> = containers.into_iter().map(Into::into).collect();
        for container in &containers {
            if !self.containers.contains(container) {
                self.containers.push(container.clone());
            }
        }
        self.pods.push(PodLayout {
            name: name.into(),
            containers,
        });
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}
