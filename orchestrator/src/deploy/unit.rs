//! Single workload unit deployment
//!
//! A unit is deployed in one pass: reserve its resources, resolve its port
//! and start annotations, render and submit the manifest, then wait for every
//! pod it produced to become ready. Nothing here is retried; the first error
//! fails the unit.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::app::options::OrchestratorOptions;
use crate::config::params::Params;
use crate::deploy::annotations::{AnnotationScheme, ResourceDemand};
use crate::errors::{DeployError, UnitError};
use crate::models::unit::WorkloadUnit;
use crate::readiness::prober::ReadinessProber;
use crate::readiness::state::ReadinessFsm;
use crate::render::{EnvBindings, ManifestRenderer, RenderBindings};
use crate::resources::pool::ResourcePool;
use crate::runtime::{ContainerRuntime, PodHandle, SubmitOptions};

/// Per-attempt values shared by every unit of an application
#[derive(Debug, Clone, Default)]
pub struct DeployContext {
    /// Application instance name
    pub app_name: String,

    /// Template the instance was created from
    pub app_template: String,

    pub version: String,

    /// Template values with user params applied
    pub values: BTreeMap<String, String>,

    /// User params, consulted for host ports
    pub params: Params,
}

/// Deploys one workload unit at a time; shared by all tasks of an attempt
pub struct UnitDeployer {
    runtime: Arc<dyn ContainerRuntime>,
    renderer: Arc<dyn ManifestRenderer>,
    prober: ReadinessProber,
    scheme: AnnotationScheme,
    resource_env_key: String,
    sidecar_containers: usize,
    creation_timeout: Duration,
    context: DeployContext,
}

impl UnitDeployer {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        renderer: Arc<dyn ManifestRenderer>,
        scheme: AnnotationScheme,
        options: &OrchestratorOptions,
        context: DeployContext,
    ) -> Self {
        Self {
            prober: ReadinessProber::new(runtime.clone(), options.readiness.clone()),
            runtime,
            renderer,
            scheme,
            resource_env_key: options.annotations.resource_env_key.clone(),
            sidecar_containers: options.readiness.sidecar_containers,
            creation_timeout: options.readiness.creation_timeout,
            context,
        }
    }

    /// Deploy a unit and wait until it is ready
    pub async fn deploy(&self, unit: &WorkloadUnit, pool: &ResourcePool) -> Result<(), DeployError> {
        self.deploy_unit(unit, pool)
            .await
            .map_err(|e| DeployError::new(unit.name.clone(), e))
    }

    async fn deploy_unit(&self, unit: &WorkloadUnit, pool: &ResourcePool) -> Result<(), UnitError> {
        info!(unit = %unit.name, "Deploying unit");

        let demand = self.scheme.resource_demand(&unit.annotations)?;
        let env = self.bind_resources(unit, &demand, pool).await?;

        let options = SubmitOptions {
            start: self.scheme.start_mode(&unit.annotations),
            publish: self
                .scheme
                .publish_entries(&unit.annotations, &self.context.params),
        };

        let bindings = RenderBindings {
            app_name: self.context.app_name.clone(),
            app_template: self.context.app_template.clone(),
            version: self.context.version.clone(),
            values: self.context.values.clone(),
            env,
        };
        let manifest = self.renderer.render(unit, &bindings)?;

        debug!(
            unit = %unit.name,
            "Submitting manifest to {} (start: {:?}, publish: [{}])",
            self.runtime.name(),
            options.start,
            options.publish_list()
        );
        let pods = self
            .runtime
            .submit(&manifest, &options)
            .await
            .map_err(UnitError::Submission)?;
        info!(unit = %unit.name, "Created {} pod(s)", pods.len());

        for pod in &pods {
            let declared = manifest
                .pod(&pod.name, pods.len())
                .ok_or_else(|| UnitError::UnknownPod(pod.name.clone()))?;
            self.await_pod_ready(pod, declared.containers.len()).await?;
        }

        info!(unit = %unit.name, "Unit is ready");
        Ok(())
    }

    /// Reserve the unit's resources and bind them to the requesting containers
    async fn bind_resources(
        &self,
        unit: &WorkloadUnit,
        demand: &ResourceDemand,
        pool: &ResourcePool,
    ) -> Result<EnvBindings, UnitError> {
        let mut env: EnvBindings = unit
            .containers
            .iter()
            .map(|container| (container.clone(), BTreeMap::new()))
            .collect();

        let mut reserved = pool.reserve(demand.total()).await?.into_iter();
        for (container, count) in &demand.per_container {
            let ids: Vec<String> = reserved.by_ref().take(*count).collect();
            debug!(unit = %unit.name, "Binding {:?} to container {}", ids, container);
            env.entry(container.clone())
                .or_default()
                .insert(self.resource_env_key.clone(), ids.join(" "));
        }

        Ok(env)
    }

    async fn await_pod_ready(&self, pod: &PodHandle, declared: usize) -> Result<(), UnitError> {
        let expected = declared + self.sidecar_containers;
        let mut fsm = ReadinessFsm::new();

        let status = self
            .prober
            .await_containers_created(pod, expected, self.creation_timeout, &mut fsm)
            .await?;

        for container in &status.containers {
            let mut container_fsm = fsm.clone();
            self.prober
                .await_container_healthy(container, &mut container_fsm)
                .await?;
        }

        Ok(())
    }
}
