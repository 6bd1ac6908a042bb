//! Container runtime capability interface
//!
//! The orchestrator only ever talks to a runtime through [`ContainerRuntime`].
//! Each backend maps its own response shapes onto the typed handles and
//! statuses defined here.

pub mod podman;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RuntimeError;
use crate::render::Manifest;

/// Health status reported by a container whose health check passed
pub const HEALTHY: &str = "healthy";

/// A pod materialized by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodHandle {
    pub id: String,
    pub name: String,
}

/// A container inside a pod
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Observed state of a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStatus {
    pub handle: PodHandle,
    pub containers: Vec<ContainerHandle>,

    /// The runtime has finished creating the pod itself; its container list
    /// is only meaningful once this is set
    pub created: bool,
}

/// Declared health check of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheck {
    pub start_period: Duration,
}

/// Observed state of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    /// Runtime state, e.g. `running` or `created`
    pub state: String,

    /// Health check declared in the container config, if any
    pub health_check: Option<HealthCheck>,

    /// Current health status, if the runtime reports one
    pub health: Option<String>,
}

impl ContainerStatus {
    pub fn is_healthy(&self) -> bool {
        self.health.as_deref() == Some(HEALTHY)
    }
}

/// Whether the runtime launches a unit's containers after creating them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    On,
    Off,
}

impl StartMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "on" => Some(StartMode::On),
            "off" => Some(StartMode::Off),
            _ => None,
        }
    }
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartMode::On => write!(f, "on"),
            StartMode::Off => write!(f, "off"),
        }
    }
}

/// Options passed along with a manifest submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Start gating; `None` leaves the runtime default
    pub start: Option<StartMode>,

    /// Port publish entries, `hostPort:containerPort` or a bare container port
    pub publish: Vec<String>,
}

impl SubmitOptions {
    /// Publish entries in their comma-separated wire form
    pub fn publish_list(&self) -> String {
        self.publish.join(",")
    }
}

/// Label selector used to find an application's pods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    pub key: String,
    pub value: String,
}

impl LabelSelector {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Primitives the orchestrator needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Create the pods described by a rendered manifest
    async fn submit(
        &self,
        manifest: &Manifest,
        options: &SubmitOptions,
    ) -> Result<Vec<PodHandle>, RuntimeError>;

    async fn inspect_pod(&self, pod: &PodHandle) -> Result<PodStatus, RuntimeError>;

    async fn inspect_container(
        &self,
        container: &ContainerHandle,
    ) -> Result<ContainerStatus, RuntimeError>;

    /// List pods carrying the given label
    async fn list_by_label(&self, selector: &LabelSelector)
        -> Result<Vec<PodHandle>, RuntimeError>;
}
