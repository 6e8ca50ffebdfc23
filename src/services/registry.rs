//! Container registry provisioning.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::catalog::Manifest;
use crate::domain::{Setup, Tag, default_tags};
use crate::gateways::{RegistryApi, RegistrySpec};

use super::{manifest_file, read_manifest_config};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryManifestConfig {
    pub region: String,
    pub registry_id: String,
    #[serde(default)]
    pub image_scanning_configuration: ImageScanning,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageScanning {
    #[serde(default)]
    pub scan_on_push: bool,
}

#[derive(Debug, Clone)]
pub struct RegistryData {
    /// Repository name: the application slug.
    pub name: String,
    /// Raw `policy.json` applied to the repository.
    pub policy: String,
    pub config: RegistryManifestConfig,
    pub tags: Vec<Tag>,
}

pub struct RegistryService {
    api: Arc<dyn RegistryApi>,
}

impl RegistryService {
    pub fn new(api: Arc<dyn RegistryApi>) -> Self {
        Self { api }
    }

    pub fn load_data(
        &self,
        setup: &Setup,
        manifest: &Manifest,
        templates_root: &Path,
    ) -> Result<RegistryData> {
        let policy_path = manifest_file(templates_root, manifest, "policy.json");
        let policy = std::fs::read_to_string(&policy_path)
            .with_context(|| format!("failed to read {}", policy_path.display()))?;
        let config: RegistryManifestConfig = read_manifest_config(templates_root, manifest)?;
        Ok(RegistryData {
            name: setup.slug.clone(),
            policy,
            config,
            tags: default_tags(setup),
        })
    }

    /// Create the repository (pre-existing is fine) and return its URL.
    pub async fn create(&self, data: &RegistryData) -> Result<String> {
        let spec = RegistrySpec {
            region: data.config.region.clone(),
            registry_id: data.config.registry_id.clone(),
            scan_on_push: data.config.image_scanning_configuration.scan_on_push,
        };
        let url = self
            .api
            .create(&data.name, &data.policy, &spec, &data.tags)
            .await?;
        Ok(url)
    }
}
