//! Documentation page for the new service plus the services index refresh.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::catalog::Manifest;
use crate::config::GitConfig;
use crate::domain::{CreatedData, EnvironmentCreated, Setup, Tag, default_tags};
use crate::gateways::{WikiApi, WikiPageRef};
use crate::render::Renderer;

use super::read_manifest_config;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiManifestConfig {
    pub template_page_path: String,
    pub template_service_path: String,
    pub space_id: String,
    pub services_page_id: String,
    #[serde(default)]
    pub services_page_title: String,
}

#[derive(Debug, Clone)]
pub struct WikiData {
    pub config: WikiManifestConfig,
    pub tags: Vec<Tag>,
}

/// Values rendered (HTML-safe) into the service page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WikiServiceValues {
    application_name: String,
    git_repository: String,
    squad: String,
    environments: Vec<EnvironmentCreated>,
    exposed: bool,
    health_check: String,
    port: i32,
    registry_url: String,
    git_ops_url: String,
    config_map_url: String,
    template: String,
}

/// Values rendered (HTML-safe) into the services index page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WikiPagesValues {
    pages: Vec<WikiPageRef>,
}

pub struct WikiService {
    git_cfg: GitConfig,
    api: Arc<dyn WikiApi>,
    renderer: Arc<Renderer>,
}

impl WikiService {
    pub fn new(git_cfg: GitConfig, api: Arc<dyn WikiApi>, renderer: Arc<Renderer>) -> Self {
        Self {
            git_cfg,
            api,
            renderer,
        }
    }

    pub fn load_data(
        &self,
        setup: &Setup,
        manifest: &Manifest,
        templates_root: &Path,
    ) -> Result<WikiData> {
        let config: WikiManifestConfig = read_manifest_config(templates_root, manifest)?;
        Ok(WikiData {
            config,
            tags: default_tags(setup),
        })
    }

    /// Create the service page under the services parent, then rebuild the
    /// index page from the current list of sub-pages. Returns the new page's
    /// public URL as extra-data.
    pub async fn setup_wiki(
        &self,
        setup: &Setup,
        created: &CreatedData,
        data: &WikiData,
        templates_root: &Path,
    ) -> Result<Vec<String>> {
        let values = WikiServiceValues {
            application_name: setup.application_name().to_string(),
            git_repository: self.git_cfg.repository_url(setup.application_name()),
            squad: setup.squad.label.clone(),
            environments: created.environments.clone(),
            exposed: setup.template.ingress_defaults.enabled,
            health_check: setup.application_health_check_path(),
            port: setup.application.port,
            registry_url: created.registry_url.clone(),
            git_ops_url: created.git_ops_path.clone(),
            config_map_url: created.config_map_path.clone(),
            template: setup.template.label.clone(),
        };
        let page = self.renderer.load_template(
            &templates_root.join(&data.config.template_service_path),
            &values,
            true,
        )?;

        let title = format!(
            "[{}] {}",
            setup.squad.label.to_uppercase(),
            setup.slug.to_uppercase()
        );
        let url = self
            .api
            .create_page(&title, &data.config.space_id, &data.config.services_page_id, &page)
            .await?;

        let pages = self
            .api
            .list_sub_pages(&data.config.space_id, &data.config.services_page_id)
            .await?;
        let index = self.renderer.load_template(
            &templates_root.join(&data.config.template_page_path),
            &WikiPagesValues { pages },
            true,
        )?;
        let message = format!(
            "Add [{}] {}",
            setup.squad.label.to_uppercase(),
            setup.slug.to_uppercase()
        );
        self.api
            .update_page(&data.config.services_page_id, &index, &message)
            .await?;

        Ok(vec![url])
    }
}
