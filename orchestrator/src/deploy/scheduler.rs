//! Layered fan-out/fan-in scheduler
//!
//! Layers run strictly in order. Within a layer every unit gets its own task;
//! all of them run to completion even when a sibling fails, and their errors
//! are gathered through a channel sized to the layer. A layer with any error
//! stops the run before the next layer starts.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{self, JoinSet};
use tracing::{error, info};

use crate::deploy::unit::UnitDeployer;
use crate::errors::{DeployError, LayerFailure, UnitError};
use crate::models::outcome::{DeploymentOutcome, LayerResult};
use crate::models::plan::{ExecutionPlan, Layer};
use crate::resources::pool::ResourcePool;

/// Runs an execution plan layer by layer
pub struct LayerScheduler {
    deployer: Arc<UnitDeployer>,
    limit: Option<Arc<Semaphore>>,
}

impl LayerScheduler {
    /// `max_parallel_units` caps concurrent deployments across a layer
    pub fn new(deployer: Arc<UnitDeployer>, max_parallel_units: Option<usize>) -> Self {
        Self {
            deployer,
            limit: max_parallel_units
                .filter(|n| *n > 0)
                .map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Execute every layer, skipping units in `already_deployed`
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        pool: Arc<ResourcePool>,
        already_deployed: &HashSet<String>,
    ) -> Result<Vec<LayerResult>, LayerFailure> {
        let mut completed = Vec::with_capacity(plan.layers().len());

        for layer in plan.layers() {
            info!(
                layer = layer.index() + 1,
                "Executing layer {}: {:?}",
                layer.index() + 1,
                layer.unit_names()
            );

            let (result, failures) = self.run_layer(layer, &pool, already_deployed).await;
            if !failures.is_empty() {
                let mut failure = LayerFailure {
                    layer: layer.index(),
                    failures,
                    result,
                    completed,
                };
                failure.result.aggregate_error = Some(failure.to_string());
                error!(layer = layer.index() + 1, "{}", failure);
                return Err(failure);
            }

            info!(layer = layer.index() + 1, "Layer {} completed", layer.index() + 1);
            completed.push(result);
        }

        Ok(completed)
    }

    async fn run_layer(
        &self,
        layer: &Layer,
        pool: &Arc<ResourcePool>,
        already_deployed: &HashSet<String>,
    ) -> (LayerResult, Vec<DeployError>) {
        let (tx, mut rx) = mpsc::channel::<DeployError>(layer.len().max(1));
        let mut outcomes = BTreeMap::new();
        let mut tasks = JoinSet::new();
        let mut task_units = HashMap::new();

        for unit in layer.units() {
            if already_deployed.contains(&unit.name) {
                info!(unit = %unit.name, "Unit is already deployed, skipping");
                outcomes.insert(unit.name.clone(), DeploymentOutcome::Skipped);
                continue;
            }

            let unit = unit.clone();
            let deployer = self.deployer.clone();
            let pool = pool.clone();
            let limit = self.limit.clone();
            let tx = tx.clone();

            let name = unit.name.clone();
            let handle = tasks.spawn(async move {
                let _permit = match limit {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };

                let result = AssertUnwindSafe(deployer.deploy(&unit, &pool))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(DeployError::new(
                            unit.name.clone(),
                            UnitError::TaskAborted(panic_message(panic.as_ref())),
                        ))
                    });

                let outcome = match result {
                    Ok(()) => DeploymentOutcome::Deployed,
                    Err(e) => {
                        error!(unit = %unit.name, "Deployment failed: {}", e.source);
                        let reason = e.source.to_string();
                        if tx.send(e).await.is_err() {
                            error!(unit = %unit.name, "Error channel closed");
                        }
                        DeploymentOutcome::Failed(reason)
                    }
                };
                (unit.name.clone(), outcome)
            });
            task_units.insert(handle.id(), name);
        }
        drop(tx);

        let mut failures = join_units(tasks, task_units, &mut outcomes).await;
        while let Some(failure) = rx.recv().await {
            failures.push(failure);
        }
        failures.sort_by(|a, b| a.unit.cmp(&b.unit));

        let result = LayerResult {
            index: layer.index(),
            outcomes,
            aggregate_error: None,
        };
        (result, failures)
    }
}

/// Drain a layer's tasks into `outcomes`
///
/// Tasks report their own failures through the error channel. A task that
/// ends in a `JoinError` never got to, so its failure is returned here.
async fn join_units(
    mut tasks: JoinSet<(String, DeploymentOutcome)>,
    mut task_units: HashMap<task::Id, String>,
    outcomes: &mut BTreeMap<String, DeploymentOutcome>,
) -> Vec<DeployError> {
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, (name, outcome))) => {
                outcomes.insert(name, outcome);
            }
            Err(e) => {
                let name = task_units
                    .remove(&e.id())
                    .unwrap_or_else(|| format!("task-{}", e.id()));
                error!(unit = %name, "Deployment task did not complete: {}", e);
                let cause = UnitError::TaskAborted(e.to_string());
                outcomes.insert(name.clone(), DeploymentOutcome::Failed(cause.to_string()));
                failures.push(DeployError::new(name, cause));
            }
        }
    }
    failures
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
