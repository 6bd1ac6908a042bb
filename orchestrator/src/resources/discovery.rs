//! Discovery of free accelerator devices

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;

/// Source of the resource identifiers that seed a [`ResourcePool`](super::pool::ResourcePool)
#[async_trait]
pub trait ResourceDiscovery: Send + Sync {
    /// List identifiers of resources that are currently free
    async fn discover(&self) -> Result<Vec<String>, OrchestratorError>;
}

/// Fixed identifier list, typically from the settings file
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    ids: Vec<String>,
}

impl StaticDiscovery {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ResourceDiscovery for StaticDiscovery {
    async fn discover(&self) -> Result<Vec<String>, OrchestratorError> {
        Ok(self.ids.clone())
    }
}

/// Finds VFIO-bound devices whose group file can still be opened
///
/// Each group under the VFIO directory other than the `vfio` control node is
/// opened; a group that cannot be opened is held by another process and is
/// skipped. Free groups are resolved to the PCI address of their device via
/// the IOMMU group's `devices` directory.
#[derive(Debug, Clone)]
pub struct VfioDiscovery {
    vfio_dir: PathBuf,
    iommu_groups_dir: PathBuf,
}

impl VfioDiscovery {
    pub fn new(vfio_dir: impl Into<PathBuf>, iommu_groups_dir: impl Into<PathBuf>) -> Self {
        Self {
            vfio_dir: vfio_dir.into(),
            iommu_groups_dir: iommu_groups_dir.into(),
        }
    }

    async fn device_address(&self, group: &str) -> Result<Option<String>, OrchestratorError> {
        let devices_dir = self.iommu_groups_dir.join(group).join("devices");
        let mut entries = fs::read_dir(&devices_dir).await.map_err(|e| {
            OrchestratorError::ResourceDiscovery(format!(
                "failed to read {}: {}",
                devices_dir.display(),
                e
            ))
        })?;

        let mut addresses = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            addresses.push(entry.file_name().to_string_lossy().into_owned());
        }
        addresses.sort();

        if addresses.len() > 1 {
            debug!(
                "IOMMU group {} holds {} devices, using {}",
                group,
                addresses.len(),
                addresses[0]
            );
        }
        Ok(addresses.into_iter().next())
    }
}

impl Default for VfioDiscovery {
    fn default() -> Self {
        Self::new("/dev/vfio", "/sys/kernel/iommu_groups")
    }
}

#[async_trait]
impl ResourceDiscovery for VfioDiscovery {
    async fn discover(&self) -> Result<Vec<String>, OrchestratorError> {
        let mut entries = fs::read_dir(&self.vfio_dir).await.map_err(|e| {
            OrchestratorError::ResourceDiscovery(format!(
                "failed to check device files under {}: {}",
                self.vfio_dir.display(),
                e
            ))
        })?;

        let mut groups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != "vfio" {
                groups.push(name);
            }
        }
        groups.sort();

        let mut free = Vec::new();
        for group in groups {
            // The handle is dropped right away; only openability matters
            if let Err(e) = fs::File::open(self.vfio_dir.join(&group)).await {
                debug!("VFIO group {} is busy, skipping: {}", group, e);
                continue;
            }

            match self.device_address(&group).await? {
                Some(address) => free.push(address),
                None => warn!("IOMMU group {} has no devices", group),
            }
        }

        info!("Discovered {} free device(s): {}", free.len(), free.join(", "));
        Ok(free)
    }
}
