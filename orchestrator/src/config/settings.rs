//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for log files; stdout only when absent
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Container runtime configuration
    #[serde(default)]
    pub runtime: RuntimeSettings,

    /// Annotation grammar
    #[serde(default)]
    pub annotations: AnnotationSettings,

    /// Readiness waits
    #[serde(default)]
    pub readiness: ReadinessSettings,

    /// Resource discovery
    #[serde(default)]
    pub resources: ResourceSettings,

    /// Cap on concurrently deploying units
    #[serde(default)]
    pub max_parallel_units: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            json_logs: false,
            runtime: RuntimeSettings::default(),
            annotations: AnnotationSettings::default(),
            readiness: ReadinessSettings::default(),
            resources: ResourceSettings::default(),
            max_parallel_units: None,
        }
    }
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Runtime CLI binary
    #[serde(default = "default_runtime_binary")]
    pub binary: String,

    /// Label key marking a pod's application
    #[serde(default = "default_application_label")]
    pub application_label: String,
}

fn default_runtime_binary() -> String {
    "podman".to_string()
}

fn default_application_label() -> String {
    "ai-services.io/application".to_string()
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            binary: default_runtime_binary(),
            application_label: default_application_label(),
        }
    }
}

/// Annotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationSettings {
    #[serde(default = "default_annotation_prefix")]
    pub prefix: String,

    #[serde(default = "default_resource_suffix")]
    pub resource_suffix: String,

    #[serde(default = "default_resource_env_key")]
    pub resource_env_key: String,
}

fn default_annotation_prefix() -> String {
    "ai-services.io".to_string()
}

fn default_resource_suffix() -> String {
    "accelerators".to_string()
}

fn default_resource_env_key() -> String {
    "PCI_ADDRESSES".to_string()
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        Self {
            prefix: default_annotation_prefix(),
            resource_suffix: default_resource_suffix(),
            resource_env_key: default_resource_env_key(),
        }
    }
}

/// Readiness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSettings {
    #[serde(default = "default_creation_poll_interval")]
    pub creation_poll_interval_secs: u64,

    #[serde(default = "default_creation_timeout")]
    pub creation_timeout_secs: u64,

    #[serde(default = "default_health_poll_interval")]
    pub health_poll_interval_secs: u64,

    #[serde(default = "default_health_grace_period")]
    pub health_grace_period_secs: u64,

    /// Containers the runtime injects into every pod
    #[serde(default = "default_sidecar_containers")]
    pub sidecar_containers: usize,
}

fn default_creation_poll_interval() -> u64 {
    10
}

fn default_creation_timeout() -> u64 {
    600
}

fn default_health_poll_interval() -> u64 {
    2
}

fn default_health_grace_period() -> u64 {
    300
}

fn default_sidecar_containers() -> usize {
    1
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            creation_poll_interval_secs: default_creation_poll_interval(),
            creation_timeout_secs: default_creation_timeout(),
            health_poll_interval_secs: default_health_poll_interval(),
            health_grace_period_secs: default_health_grace_period(),
            sidecar_containers: default_sidecar_containers(),
        }
    }
}

/// How free resources are found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryKind {
    /// Scan VFIO groups on the host
    #[default]
    Vfio,

    /// Use `static_ids`
    Static,
}

/// Resource discovery settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSettings {
    #[serde(default)]
    pub discovery: DiscoveryKind,

    /// Identifiers used by static discovery
    #[serde(default)]
    pub static_ids: Vec<String>,
}
