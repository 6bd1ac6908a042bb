//! User-supplied `key=value` parameters
//!
//! Params are passed explicitly into every orchestration call. They supply
//! template values and the host side of published ports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` items; each item may itself be a comma-separated list
    pub fn parse<I, S>(items: I) -> Result<Self, OrchestratorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = BTreeMap::new();
        for item in items {
            for pair in item.as_ref().split(',') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    OrchestratorError::Configuration(format!(
                        "invalid param '{}': expected key=value",
                        pair
                    ))
                })?;
                let key = key.trim();
                if key.is_empty() {
                    return Err(OrchestratorError::Configuration(format!(
                        "invalid param '{}': empty key",
                        pair
                    )));
                }
                params.insert(key.to_string(), value.trim().to_string());
            }
        }
        Ok(Self(params))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Layer these params over `defaults`
    pub fn merged_over(&self, defaults: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = defaults.clone();
        merged.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}
