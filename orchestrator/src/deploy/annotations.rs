//! Unit annotation grammar
//!
//! Three kinds of annotation are read off a workload unit, all under a common
//! prefix:
//!
//! - `<prefix>/<container>--<resource>`: number of exclusive resources the
//!   container needs
//! - `<prefix>/<container>--port-<name>`: a container port to publish; the
//!   host port comes from the params entry called `<name>`
//! - `<prefix>/start`: `on` or `off`

use std::collections::BTreeMap;

use regex::Regex;

use crate::app::options::AnnotationOptions;
use crate::config::params::Params;
use crate::errors::UnitError;
use crate::runtime::StartMode;

/// Host port value meaning "do not publish"
const DO_NOT_EXPOSE: &str = "0";

/// Compiled annotation grammar
#[derive(Debug, Clone)]
pub struct AnnotationScheme {
    resource: Regex,
    port: Regex,
    start_key: String,
}

/// Per-container resource demand
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDemand {
    /// Container name to requested count, zero counts omitted
    pub per_container: BTreeMap<String, usize>,
}

impl ResourceDemand {
    pub fn total(&self) -> usize {
        self.per_container.values().sum()
    }
}

impl AnnotationScheme {
    pub fn new(options: &AnnotationOptions) -> Result<Self, regex::Error> {
        let prefix = regex::escape(&options.prefix);
        let resource = Regex::new(&format!(
            r"^{}/(.+)--{}$",
            prefix,
            regex::escape(&options.resource_suffix)
        ))?;
        let port = Regex::new(&format!(r"^{}/(.+)--port-(.+)$", prefix))?;

        Ok(Self {
            resource,
            port,
            start_key: format!("{}/start", options.prefix),
        })
    }

    /// Sum the resource counts declared per container
    pub fn resource_demand(
        &self,
        annotations: &BTreeMap<String, String>,
    ) -> Result<ResourceDemand, UnitError> {
        let mut demand = ResourceDemand::default();

        for (key, value) in annotations {
            let Some(captures) = self.resource.captures(key) else {
                continue;
            };
            let count: usize = value.trim().parse().map_err(|_| UnitError::InvalidAnnotation {
                key: key.clone(),
                value: value.clone(),
                reason: "expected a non-negative integer".to_string(),
            })?;
            if count > 0 {
                *demand
                    .per_container
                    .entry(captures[1].to_string())
                    .or_default() += count;
            }
        }

        Ok(demand)
    }

    /// Publish entries for the unit's exposed ports
    ///
    /// An explicit host port gives `host:container`; a missing or empty one
    /// leaves the host side to the runtime; `"0"` drops the port.
    pub fn publish_entries(
        &self,
        annotations: &BTreeMap<String, String>,
        params: &Params,
    ) -> Vec<String> {
        let mut entries = Vec::new();

        for (key, container_port) in annotations {
            let Some(captures) = self.port.captures(key) else {
                continue;
            };
            let port_name = &captures[2];
            let container_port = container_port.trim();

            match params.get(port_name).map(str::trim) {
                Some(DO_NOT_EXPOSE) => continue,
                Some(host_port) if !host_port.is_empty() => {
                    entries.push(format!("{}:{}", host_port, container_port))
                }
                _ => entries.push(container_port.to_string()),
            }
        }

        entries
    }

    /// Start gating; anything but `on`/`off` leaves the runtime default
    pub fn start_mode(&self, annotations: &BTreeMap<String, String>) -> Option<StartMode> {
        annotations
            .get(&self.start_key)
            .and_then(|value| StartMode::parse(value.trim()))
    }
}
