//! Orchestrator configuration options

use std::time::Duration;

use crate::config::settings::Settings;

/// Main orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Label key carrying the application name on every pod
    pub application_label: String,

    /// Annotation grammar
    pub annotations: AnnotationOptions,

    /// Readiness waits
    pub readiness: ReadinessOptions,

    /// Cap on concurrently deploying units; `None` means layer width
    pub max_parallel_units: Option<usize>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            application_label: "ai-services.io/application".to_string(),
            annotations: AnnotationOptions::default(),
            readiness: ReadinessOptions::default(),
            max_parallel_units: None,
        }
    }
}

impl From<&Settings> for OrchestratorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            application_label: settings.runtime.application_label.clone(),
            annotations: AnnotationOptions {
                prefix: settings.annotations.prefix.clone(),
                resource_suffix: settings.annotations.resource_suffix.clone(),
                resource_env_key: settings.annotations.resource_env_key.clone(),
            },
            readiness: ReadinessOptions {
                creation_poll_interval: Duration::from_secs(
                    settings.readiness.creation_poll_interval_secs,
                ),
                creation_timeout: Duration::from_secs(settings.readiness.creation_timeout_secs),
                health_poll_interval: Duration::from_secs(
                    settings.readiness.health_poll_interval_secs,
                ),
                health_grace_period: Duration::from_secs(
                    settings.readiness.health_grace_period_secs,
                ),
                sidecar_containers: settings.readiness.sidecar_containers,
            },
            max_parallel_units: settings.max_parallel_units.filter(|n| *n > 0),
        }
    }
}

/// Annotation keys understood on workload units
#[derive(Debug, Clone)]
pub struct AnnotationOptions {
    /// Key prefix, e.g. `ai-services.io`
    pub prefix: String,

    /// Suffix of per-container resource count keys
    pub resource_suffix: String,

    /// Env key under which reserved identifiers are bound
    pub resource_env_key: String,
}

impl Default for AnnotationOptions {
    fn default() -> Self {
        Self {
            prefix: "ai-services.io".to_string(),
            resource_suffix: "accelerators".to_string(),
            resource_env_key: "PCI_ADDRESSES".to_string(),
        }
    }
}

/// Readiness wait options
#[derive(Debug, Clone)]
pub struct ReadinessOptions {
    /// Interval between pod inspections while containers materialize
    pub creation_poll_interval: Duration,

    /// Deadline for every expected container to exist
    pub creation_timeout: Duration,

    /// Interval between health inspections
    pub health_poll_interval: Duration,

    /// Added to a container's declared start period
    pub health_grace_period: Duration,

    /// Containers the runtime adds to every pod beyond the declared ones
    pub sidecar_containers: usize,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            creation_poll_interval: Duration::from_secs(10),
            creation_timeout: Duration::from_secs(600),       // 10 minutes
            health_poll_interval: Duration::from_secs(2),
            health_grace_period: Duration::from_secs(300),    // 5 minutes
            sidecar_containers: 1,
        }
    }
}
