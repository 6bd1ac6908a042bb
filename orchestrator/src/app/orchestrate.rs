//! Deployment attempt entry point

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::app::options::OrchestratorOptions;
use crate::config::application::Application;
use crate::config::params::Params;
use crate::deploy::annotations::AnnotationScheme;
use crate::deploy::{DeployContext, LayerScheduler, UnitDeployer};
use crate::errors::{OrchestratorError, UnitError};
use crate::models::outcome::DeploymentReport;
use crate::models::plan::ExecutionPlan;
use crate::render::ManifestRenderer;
use crate::resources::discovery::ResourceDiscovery;
use crate::resources::pool::ResourcePool;
use crate::runtime::{ContainerRuntime, LabelSelector};

/// Separator between application and unit in conventional pod names
const POD_NAME_SEPARATOR: &str = "--";

/// Drives deployment attempts against one container runtime
pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    renderer: Arc<dyn ManifestRenderer>,
    discovery: Arc<dyn ResourceDiscovery>,
    scheme: AnnotationScheme,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        renderer: Arc<dyn ManifestRenderer>,
        discovery: Arc<dyn ResourceDiscovery>,
        options: OrchestratorOptions,
    ) -> Result<Self, OrchestratorError> {
        let scheme = AnnotationScheme::new(&options.annotations).map_err(|e| {
            OrchestratorError::Configuration(format!("invalid annotation settings: {}", e))
        })?;

        Ok(Self {
            runtime,
            renderer,
            discovery,
            scheme,
            options,
        })
    }

    /// Names of the pods already carrying the application's label
    ///
    /// A unit counts as deployed when one of these is its own name or
    /// `<application>--<unit>`.
    pub async fn names_already_deployed(
        &self,
        application_id: &str,
    ) -> Result<HashSet<String>, OrchestratorError> {
        let selector = LabelSelector::new(self.options.application_label.clone(), application_id);
        let pods = self.runtime.list_by_label(&selector).await?;
        Ok(pods.into_iter().map(|pod| pod.name).collect())
    }

    /// Deploy every unit of `app` that is not running yet
    ///
    /// Pre-flight checks (plan validation, resource demand) run before any
    /// unit is touched. A failed layer is returned as
    /// [`OrchestratorError::LayerFailed`]; nothing is rolled back.
    pub async fn orchestrate(
        &self,
        app: &Application,
        params: &Params,
    ) -> Result<DeploymentReport, OrchestratorError> {
        let attempt_id = Uuid::new_v4().to_string();
        let span = info_span!("orchestrate", app = %app.id, attempt = %attempt_id);
        self.run_attempt(app, params, attempt_id).instrument(span).await
    }

    async fn run_attempt(
        &self,
        app: &Application,
        params: &Params,
        attempt_id: String,
    ) -> Result<DeploymentReport, OrchestratorError> {
        let started_at = Utc::now();
        let plan = ExecutionPlan::new(app.layers.clone(), app.units.clone())?;

        let present = self.names_already_deployed(&app.id).await?;
        let already_deployed: HashSet<String> = plan
            .units()
            .filter(|unit| {
                present.contains(&unit.name)
                    || present.contains(&format!("{}{}{}", app.id, POD_NAME_SEPARATOR, unit.name))
            })
            .map(|unit| unit.name.clone())
            .collect();

        if already_deployed.len() == plan.unit_count() {
            info!("All units of {} are already deployed", app.id);
            return Ok(DeploymentReport {
                application: app.id.clone(),
                attempt_id,
                started_at,
                finished_at: Utc::now(),
                all_present: true,
                layers: Vec::new(),
            });
        }

        let pool = Arc::new(self.prepare_pool(&plan, &already_deployed).await?);

        let context = DeployContext {
            app_name: app.id.clone(),
            app_template: app.template.clone(),
            version: app.version.clone(),
            values: params.merged_over(&app.values),
            params: params.clone(),
        };
        let deployer = Arc::new(UnitDeployer::new(
            self.runtime.clone(),
            self.renderer.clone(),
            self.scheme.clone(),
            &self.options,
            context,
        ));
        let scheduler = LayerScheduler::new(deployer, self.options.max_parallel_units);

        let layers = scheduler.run(&plan, pool, &already_deployed).await?;
        info!("Application {} deployed", app.id);

        Ok(DeploymentReport {
            application: app.id.clone(),
            attempt_id,
            started_at,
            finished_at: Utc::now(),
            all_present: false,
            layers,
        })
    }

    /// Check total demand against discovered resources and seed the pool
    async fn prepare_pool(
        &self,
        plan: &ExecutionPlan,
        already_deployed: &HashSet<String>,
    ) -> Result<ResourcePool, OrchestratorError> {
        let mut required = 0;
        for unit in plan.units().filter(|u| !already_deployed.contains(&u.name)) {
            let demand = self
                .scheme
                .resource_demand(&unit.annotations)
                .map_err(|e| match e {
                    UnitError::InvalidAnnotation { .. } => {
                        OrchestratorError::Configuration(format!("unit '{}': {}", unit.name, e))
                    }
                    other => OrchestratorError::Internal(other.to_string()),
                })?;
            required += demand.total();
        }

        if required == 0 {
            return Ok(ResourcePool::empty());
        }

        let ids = self.discovery.discover().await?;
        let pool = ResourcePool::new(ids);
        info!(
            "{} resource(s) required, {} available",
            required,
            pool.capacity()
        );
        if pool.capacity() < required {
            return Err(OrchestratorError::InsufficientResources {
                required,
                available: pool.capacity(),
            });
        }

        Ok(pool)
    }
}
