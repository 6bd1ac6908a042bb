//! Two-phase readiness waits
//!
//! A pod is ready once the runtime reports every expected container, and each
//! of those containers either declares no health check or reports healthy.
//! Both waits poll on a fixed interval against their own deadline and never
//! retry past it. They hold no resources between polls, so dropping the
//! returned future (for example from a `tokio::time::timeout` or a `select!`
//! in the caller) cancels the wait.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::app::options::ReadinessOptions;
use crate::errors::UnitError;
use crate::readiness::state::{ReadinessEvent, ReadinessFsm};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerStatus, PodHandle, PodStatus};

/// Polls the runtime until pods and containers converge
#[derive(Clone)]
pub struct ReadinessProber {
    runtime: Arc<dyn ContainerRuntime>,
    options: ReadinessOptions,
}

impl ReadinessProber {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, options: ReadinessOptions) -> Self {
        Self { runtime, options }
    }

    /// Wait until the pod holds exactly `expected` containers
    ///
    /// `expected` already includes any runtime-injected sidecar. Returns the
    /// last observed status so the caller can walk its containers.
    pub async fn await_containers_created(
        &self,
        pod: &PodHandle,
        expected: usize,
        timeout: Duration,
        fsm: &mut ReadinessFsm,
    ) -> Result<PodStatus, UnitError> {
        advance(fsm, ReadinessEvent::AwaitContainers);
        let deadline = Instant::now() + timeout;

        loop {
            let status = match self.runtime.inspect_pod(pod).await {
                Ok(status) => status,
                Err(e) => {
                    advance(fsm, ReadinessEvent::Error(e.to_string()));
                    return Err(UnitError::RuntimeQuery(e));
                }
            };

            let observed = if status.created {
                status.containers.len()
            } else {
                0
            };
            if status.created && observed == expected {
                advance(fsm, ReadinessEvent::ContainersObserved);
                debug!("Pod {} has all {} containers", pod.id, expected);
                return Ok(status);
            }

            if Instant::now() >= deadline {
                advance(fsm, ReadinessEvent::DeadlineExceeded);
                return Err(UnitError::ContainerCreationTimeout {
                    pod: pod_label(pod),
                    expected,
                    observed,
                    timeout,
                });
            }

            debug!(
                "Pod {}: {}/{} containers created, checking again in {:?}",
                pod.id, observed, expected, self.options.creation_poll_interval
            );
            sleep(self.options.creation_poll_interval).await;
        }
    }

    /// Wait for one container to become healthy
    ///
    /// The timeout is the container's declared start period plus the configured
    /// grace period. A container without a health check is ready at once.
    pub async fn await_container_healthy(
        &self,
        container: &ContainerHandle,
        fsm: &mut ReadinessFsm,
    ) -> Result<(), UnitError> {
        let status = self.inspect(container, fsm).await?;

        let Some(check) = status.health_check else {
            info!(
                "No health check is set for container {}, skipping readiness check",
                container_label(container)
            );
            advance(fsm, ReadinessEvent::NoHealthCheck);
            advance(fsm, ReadinessEvent::Converged);
            return Ok(());
        };

        advance(fsm, ReadinessEvent::HealthCheckDeclared);
        let timeout = check.start_period + self.options.health_grace_period;
        info!(
            "Waiting up to {:?} for container {} to become healthy",
            timeout,
            container_label(container)
        );
        self.wait_until_healthy(container, status, timeout, fsm).await
    }

    /// Poll health status until healthy or `timeout` elapses
    pub async fn wait_until_healthy(
        &self,
        container: &ContainerHandle,
        mut status: ContainerStatus,
        timeout: Duration,
        fsm: &mut ReadinessFsm,
    ) -> Result<(), UnitError> {
        let deadline = Instant::now() + timeout;

        loop {
            if status.is_healthy() {
                advance(fsm, ReadinessEvent::Converged);
                info!("Container {} is ready", container_label(container));
                return Ok(());
            }

            if Instant::now() >= deadline {
                advance(fsm, ReadinessEvent::DeadlineExceeded);
                return Err(UnitError::HealthTimeout {
                    container: container_label(container),
                    timeout,
                    last_status: status.health.unwrap_or(status.state),
                });
            }

            sleep(self.options.health_poll_interval).await;
            status = self.inspect(container, fsm).await?;
        }
    }

    async fn inspect(
        &self,
        container: &ContainerHandle,
        fsm: &mut ReadinessFsm,
    ) -> Result<ContainerStatus, UnitError> {
        self.runtime
            .inspect_container(container)
            .await
            .map_err(|e| {
                advance(fsm, ReadinessEvent::Error(e.to_string()));
                UnitError::RuntimeQuery(e)
            })
    }
}

fn advance(fsm: &mut ReadinessFsm, event: ReadinessEvent) {
    if let Err(e) = fsm.process(event) {
        warn!("Readiness tracking out of step: {}", e);
    }
}

fn pod_label(pod: &PodHandle) -> String {
    if pod.name.is_empty() {
        pod.id.clone()
    } else {
        pod.name.clone()
    }
}

fn container_label(container: &ContainerHandle) -> String {
    if container.name.is_empty() {
        container.id.clone()
    } else {
        container.name.clone()
    }
}
