//! Secret scaffolding: one blank KV entry per selected environment.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::catalog::Manifest;
use crate::domain::{Setup, SetupEnv, Tag, default_tags};
use crate::gateways::SecretsApi;

use super::{pre_substitute, read_manifest_config};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretManifestConfig {
    pub secret_path: String,
    pub root_path: String,
}

impl SecretManifestConfig {
    /// The vault mount for one environment.
    pub fn root_path(&self, env: &SetupEnv) -> String {
        self.root_path
            .replace("<environmentMountPath>", &env.env.secrets_path)
    }

    /// The secret path within the mount for one environment.
    pub fn secret_path(&self, env: &SetupEnv) -> String {
        self.secret_path
            .replace("<environmentMountPath>", &env.env.secrets_path)
    }
}

#[derive(Debug, Clone)]
pub struct SecretData {
    pub config: SecretManifestConfig,
    pub tags: Vec<Tag>,
}

pub struct SecretService {
    api: Arc<dyn SecretsApi>,
}

impl SecretService {
    pub fn new(api: Arc<dyn SecretsApi>) -> Self {
        Self { api }
    }

    pub fn load_data(
        &self,
        setup: &Setup,
        manifest: &Manifest,
        templates_root: &Path,
    ) -> Result<SecretData> {
        let mut config: SecretManifestConfig = read_manifest_config(templates_root, manifest)?;
        config.root_path = pre_substitute(&config.root_path, setup);
        config.secret_path = pre_substitute(&config.secret_path, setup);
        Ok(SecretData {
            config,
            tags: default_tags(setup),
        })
    }

    pub async fn setup_new_secret(&self, data: &SecretData, env: &SetupEnv) -> Result<()> {
        self.api
            .create_blank(&data.config.root_path(env), &data.config.secret_path(env))
            .await?;
        Ok(())
    }
}
