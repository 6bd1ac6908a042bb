//! Finite state machine for pod readiness

use serde::{Deserialize, Serialize};

/// Readiness state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    /// Submitted to the runtime, nothing observed yet
    Created,

    /// Waiting for the runtime to materialize every container
    ContainersPending,

    /// Every expected container exists
    ContainersCreated,

    /// No health check declared; presumed healthy
    NoHealthCheckDeclared,

    /// Health check declared, waiting for it to pass
    HealthCheckPending,

    /// Ready
    Ready,

    /// A readiness deadline elapsed
    TimedOut,

    /// The runtime could not be queried
    Failed,
}

impl ReadinessState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReadinessState::Ready | ReadinessState::TimedOut | ReadinessState::Failed
        )
    }
}

/// Readiness event
#[derive(Debug, Clone)]
pub enum ReadinessEvent {
    /// Start waiting for containers
    AwaitContainers,

    /// Expected container count observed
    ContainersObserved,

    /// Container declares no health check
    NoHealthCheck,

    /// Container declares a health check
    HealthCheckDeclared,

    /// Container is healthy (or presumed so)
    Converged,

    /// Deadline elapsed
    DeadlineExceeded,

    /// Runtime error
    Error(String),
}

/// Readiness FSM
#[derive(Debug, Clone)]
pub struct ReadinessFsm {
    state: ReadinessState,
    error: Option<String>,
}

impl ReadinessFsm {
    /// Create a new FSM in created state
    pub fn new() -> Self {
        Self {
            state: ReadinessState::Created,
            error: None,
        }
    }

    pub fn state(&self) -> &ReadinessState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ReadinessEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (ReadinessState::Created, ReadinessEvent::AwaitContainers) => {
                ReadinessState::ContainersPending
            }

            (ReadinessState::ContainersPending, ReadinessEvent::ContainersObserved) => {
                ReadinessState::ContainersCreated
            }
            (ReadinessState::ContainersPending, ReadinessEvent::DeadlineExceeded) => {
                ReadinessState::TimedOut
            }

            (ReadinessState::ContainersCreated, ReadinessEvent::NoHealthCheck) => {
                ReadinessState::NoHealthCheckDeclared
            }
            (ReadinessState::ContainersCreated, ReadinessEvent::HealthCheckDeclared) => {
                ReadinessState::HealthCheckPending
            }

            (ReadinessState::NoHealthCheckDeclared, ReadinessEvent::Converged) => {
                ReadinessState::Ready
            }

            (ReadinessState::HealthCheckPending, ReadinessEvent::Converged) => ReadinessState::Ready,
            (ReadinessState::HealthCheckPending, ReadinessEvent::DeadlineExceeded) => {
                ReadinessState::TimedOut
            }

            (state, ReadinessEvent::Error(err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                ReadinessState::Failed
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for ReadinessFsm {
    fn default() -> Self {
        Self::new()
    }
}
