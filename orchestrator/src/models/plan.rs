//! Execution plan model

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::errors::OrchestratorError;
use crate::models::unit::WorkloadUnit;

/// A set of units eligible to deploy concurrently
#[derive(Debug, Clone)]
pub struct Layer {
    index: usize,
    units: Vec<Arc<WorkloadUnit>>,
}

impl Layer {
    /// Zero-based position of the layer in the plan
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn units(&self) -> &[Arc<WorkloadUnit>] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }
}

/// Ordered layers covering every declared unit exactly once
///
/// Construction validates the plan against the declared units, so a value of
/// this type is always consistent. It is read-only afterwards and shared by
/// every deployment task through the `Arc`ed units.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    layers: Vec<Layer>,
}

impl ExecutionPlan {
    /// Build a plan from layer names and the declared units
    pub fn new(
        layers: Vec<Vec<String>>,
        units: Vec<WorkloadUnit>,
    ) -> Result<Self, OrchestratorError> {
        if units.is_empty() {
            return Err(OrchestratorError::Configuration(
                "application declares no workload units".to_string(),
            ));
        }

        let mut declared: HashMap<String, Arc<WorkloadUnit>> = HashMap::new();
        for unit in units {
            if unit.containers.is_empty() {
                return Err(OrchestratorError::Configuration(format!(
                    "unit '{}' declares no containers",
                    unit.name
                )));
            }
            if let Some((pod, container)) = unit.pods.iter().find_map(|pod| {
                pod.containers
                    .iter()
                    .find(|c| !unit.containers.contains(c))
                    .map(|c| (&pod.name, c))
            }) {
                return Err(OrchestratorError::Configuration(format!(
                    "pod '{}' of unit '{}' holds undeclared container '{}'",
                    pod, unit.name, container
                )));
            }
            let name = unit.name.clone();
            if declared.insert(name.clone(), Arc::new(unit)).is_some() {
                return Err(OrchestratorError::Configuration(format!(
                    "unit '{}' is declared more than once",
                    name
                )));
            }
        }

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut plan_layers = Vec::with_capacity(layers.len());

        for (index, names) in layers.into_iter().enumerate() {
            if names.is_empty() {
                return Err(OrchestratorError::Configuration(format!(
                    "layer {} is empty",
                    index + 1
                )));
            }

            let mut layer_units = Vec::with_capacity(names.len());
            for name in names {
                if !seen.insert(name.clone()) {
                    return Err(OrchestratorError::Configuration(format!(
                        "unit '{}' appears more than once in the execution plan",
                        name
                    )));
                }
                let unit = declared.get(&name).ok_or_else(|| {
                    OrchestratorError::Configuration(format!(
                        "execution plan references unknown unit '{}'",
                        name
                    ))
                })?;
                layer_units.push(unit.clone());
            }

            plan_layers.push(Layer {
                index,
                units: layer_units,
            });
        }

        let mut missing: Vec<&str> = declared
            .keys()
            .filter(|name| !seen.contains(*name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(OrchestratorError::Configuration(format!(
                "execution plan does not schedule declared unit(s): {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            layers: plan_layers,
        })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Iterate over every unit in plan order
    pub fn units(&self) -> impl Iterator<Item = &Arc<WorkloadUnit>> {
        self.layers.iter().flat_map(|layer| layer.units.iter())
    }

    pub fn unit_count(&self) -> usize {
        self.layers.iter().map(Layer::len).sum()
    }
}
