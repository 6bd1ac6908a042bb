//! Podman backend driven through the `podman` CLI

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::RuntimeError;
use crate::render::Manifest;
use crate::runtime::{
    ContainerHandle, ContainerRuntime, ContainerStatus, HealthCheck, LabelSelector, PodHandle,
    PodStatus, StartMode, SubmitOptions,
};

/// Podman runtime
#[derive(Debug, Clone)]
pub struct PodmanRuntime {
    binary: String,
}

impl PodmanRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[String], stdin: Option<&[u8]>) -> Result<Vec<u8>, RuntimeError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Running: {}", command);

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if let (Some(body), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(body)
                .await
                .map_err(|source| RuntimeError::Spawn {
                    command: command.clone(),
                    source,
                })?;
            // Closing stdin lets the child see EOF
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    async fn list_pod_containers(&self, pod_id: &str) -> Result<Vec<ContainerHandle>, RuntimeError> {
        let stdout = self
            .run(
                &[
                    "ps".to_string(),
                    "-a".to_string(),
                    "--filter".to_string(),
                    format!("pod={}", pod_id),
                    "--format".to_string(),
                    "json".to_string(),
                ],
                None,
            )
            .await?;
        parse_ps_output(&stdout)
    }
}

impl Default for PodmanRuntime {
    fn default() -> Self {
        Self::new("podman")
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    fn name(&self) -> &str {
        "podman"
    }

    async fn submit(
        &self,
        manifest: &Manifest,
        options: &SubmitOptions,
    ) -> Result<Vec<PodHandle>, RuntimeError> {
        let stdout = self
            .run(&play_args(options), Some(manifest.body.as_bytes()))
            .await?;
        info!("Successfully ran podman kube play for {}", manifest.unit);

        let mut pods = Vec::new();
        for id in extract_pod_ids(&String::from_utf8_lossy(&stdout)) {
            let status = self
                .inspect_pod(&PodHandle {
                    id: id.clone(),
                    name: String::new(),
                })
                .await?;
            pods.push(status.handle);
        }
        Ok(pods)
    }

    async fn inspect_pod(&self, pod: &PodHandle) -> Result<PodStatus, RuntimeError> {
        let stdout = self
            .run(
                &[
                    "pod".to_string(),
                    "inspect".to_string(),
                    pod.id.clone(),
                    "--format".to_string(),
                    "json".to_string(),
                ],
                None,
            )
            .await?;
        let mut status = parse_pod_inspect(&stdout)?;

        // Older podman versions omit the container list from pod inspect
        if status.containers.is_empty() {
            status.containers = self.list_pod_containers(&status.handle.id).await?;
        }
        Ok(status)
    }

    async fn inspect_container(
        &self,
        container: &ContainerHandle,
    ) -> Result<ContainerStatus, RuntimeError> {
        let stdout = self
            .run(
                &[
                    "container".to_string(),
                    "inspect".to_string(),
                    container.id.clone(),
                    "--format".to_string(),
                    "json".to_string(),
                ],
                None,
            )
            .await?;
        parse_container_inspect(&stdout)
    }

    async fn list_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<PodHandle>, RuntimeError> {
        let stdout = self
            .run(
                &[
                    "pod".to_string(),
                    "ps".to_string(),
                    "--filter".to_string(),
                    format!("label={}", selector),
                    "--format".to_string(),
                    "json".to_string(),
                ],
                None,
            )
            .await?;
        parse_pod_list(&stdout)
    }
}

/// Arguments for `podman kube play`, reading the manifest from stdin
fn play_args(options: &SubmitOptions) -> Vec<String> {
    let mut args = vec!["kube".to_string(), "play".to_string()];

    match options.start {
        Some(StartMode::On) => args.push("--start=true".to_string()),
        Some(StartMode::Off) => args.push("--start=false".to_string()),
        None => {}
    }

    for mapping in options.publish.iter().filter(|m| !m.is_empty()) {
        args.push(format!("--publish={}", mapping));
    }

    args.push("-".to_string());
    args
}

/// Pod ids from kube play output
///
/// The output holds one `Pod:` block per pod, each followed by its
/// `Container:`/`Containers:` block and possibly `Volumes:` or `Secrets:`.
/// Only lines inside a `Pod` block are ids.
fn extract_pod_ids(output: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut in_pods = false;
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_suffix(':') {
            in_pods = header == "Pod" || header == "Pods";
            continue;
        }
        if in_pods {
            ids.push(line.to_string());
        }
    }
    ids
}

#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(alias = "ID", alias = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
}

fn parse_ps_output(stdout: &[u8]) -> Result<Vec<ContainerHandle>, RuntimeError> {
    let entries: Vec<PsEntry> = serde_json::from_slice(stdout).map_err(|e| RuntimeError::Parse {
        what: "podman ps output".to_string(),
        reason: e.to_string(),
    })?;
    Ok(entries
        .into_iter()
        .map(|e| ContainerHandle {
            name: e.names.into_iter().next().unwrap_or_else(|| e.id.clone()),
            id: e.id,
        })
        .collect())
}

/// Podman 5 wraps inspect results in an array, earlier versions do not
fn first_object(value: Value, what: &str) -> Result<Value, RuntimeError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::NotFound(what.to_string())),
        other => Ok(other),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn parse_pod_inspect(stdout: &[u8]) -> Result<PodStatus, RuntimeError> {
    let value: Value = serde_json::from_slice(stdout).map_err(|e| RuntimeError::Parse {
        what: "podman pod inspect output".to_string(),
        reason: e.to_string(),
    })?;
    let pod = first_object(value, "pod")?;

    let containers: Vec<ContainerHandle> = pod
        .get("Containers")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|c| ContainerHandle {
                    id: str_field(c, "Id").to_string(),
                    name: str_field(c, "Name").to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let id = str_field(&pod, "Id").to_string();
    Ok(PodStatus {
        created: !id.is_empty(),
        handle: PodHandle {
            id,
            name: str_field(&pod, "Name").to_string(),
        },
        containers,
    })
}

fn parse_container_inspect(stdout: &[u8]) -> Result<ContainerStatus, RuntimeError> {
    let value: Value = serde_json::from_slice(stdout).map_err(|e| RuntimeError::Parse {
        what: "podman container inspect output".to_string(),
        reason: e.to_string(),
    })?;
    let container = first_object(value, "container")?;

    let state = container.get("State").cloned().unwrap_or(Value::Null);
    let health = state
        .get("Health")
        .map(|h| str_field(h, "Status").to_string())
        .filter(|s| !s.is_empty());

    let health_check = container
        .get("Config")
        .and_then(|c| c.get("Healthcheck"))
        .filter(|h| !h.is_null())
        .map(|h| HealthCheck {
            start_period: Duration::from_nanos(
                h.get("StartPeriod").and_then(Value::as_u64).unwrap_or(0),
            ),
        });

    Ok(ContainerStatus {
        state: str_field(&state, "Status").to_string(),
        health_check,
        health,
    })
}

fn parse_pod_list(stdout: &[u8]) -> Result<Vec<PodHandle>, RuntimeError> {
    // `podman pod ps` prints `null` rather than `[]` when nothing matches
    let value: Value = serde_json::from_slice(stdout).map_err(|e| RuntimeError::Parse {
        what: "podman pod ps output".to_string(),
        reason: e.to_string(),
    })?;
    Ok(value
        .as_array()
        .map(|pods| {
            pods.iter()
                .map(|p| PodHandle {
                    id: str_field(p, "Id").to_string(),
                    name: str_field(p, "Name").to_string(),
                })
                .collect()
        })
        .unwrap_or_default())
}
