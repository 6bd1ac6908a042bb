//! `{{placeholder}}` substitution renderer

use crate::errors::UnitError;
use crate::models::unit::WorkloadUnit;
use crate::render::{Manifest, ManifestRenderer, PodManifest, RenderBindings};

/// Renders templates by substituting `{{name}}` placeholders
///
/// Recognized names: `AppName`, `AppTemplate`, `Version`, `Unit`,
/// `values.KEY` and `env.CONTAINER.KEY`. Unknown names and missing values are
/// render errors; an `env` entry that was never bound renders empty, since
/// containers without resources get no bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl PlaceholderRenderer {
    fn resolve(
        &self,
        name: &str,
        unit: &WorkloadUnit,
        bindings: &RenderBindings,
    ) -> Result<String, UnitError> {
        match name {
            "AppName" => return Ok(bindings.app_name.clone()),
            "AppTemplate" => return Ok(bindings.app_template.clone()),
            "Version" => return Ok(bindings.version.clone()),
            "Unit" => return Ok(unit.name.clone()),
            _ => {}
        }

        if let Some(key) = name.strip_prefix("values.") {
            return bindings
                .values
                .get(key)
                .cloned()
                .ok_or_else(|| UnitError::Render(format!("no value for '{}'", key)));
        }

        if let Some(rest) = name.strip_prefix("env.") {
            let (container, key) = rest.split_once('.').ok_or_else(|| {
                UnitError::Render(format!("malformed env placeholder '{}'", name))
            })?;
            return Ok(bindings
                .env
                .get(container)
                .and_then(|vars| vars.get(key))
                .cloned()
                .unwrap_or_default());
        }

        Err(UnitError::Render(format!("unknown placeholder '{}'", name)))
    }

    fn substitute(
        &self,
        template: &str,
        unit: &WorkloadUnit,
        bindings: &RenderBindings,
    ) -> Result<String, UnitError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                UnitError::Render(format!("unterminated placeholder in template of {}", unit.name))
            })?;
            out.push_str(&self.resolve(after[..end].trim(), unit, bindings)?);
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl ManifestRenderer for PlaceholderRenderer {
    fn render(
        &self,
        unit: &WorkloadUnit,
        bindings: &RenderBindings,
    ) -> Result<Manifest, UnitError> {
        let body = self.substitute(&unit.template, unit, bindings)?;

        let pods = if unit.pods.is_empty() {
            vec![PodManifest {
                name: unit.name.clone(),
                containers: unit.containers.clone(),
            }]
        } else {
            unit.pods
                .iter()
                .map(|pod| {
                    Ok(PodManifest {
                        name: self.substitute(&pod.name, unit, bindings)?,
                        containers: pod.containers.clone(),
                    })
                })
                .collect::<Result<Vec<_>, UnitError>>()?
        };

        Ok(Manifest {
            unit: unit.name.clone(),
            body,
            pods,
        })
    }
}
