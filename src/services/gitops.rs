//! k8s manifest and GitOps (Argo-style) manifest rendering.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::catalog::Manifest;
use crate::config::SetupConfig;
use crate::domain::{
    CreatedData, EnvironmentCreated, Setup, SetupEnv, Tag, default_tags, format_cpu, format_memory,
};
use crate::render::Renderer;

use super::{pre_substitute, read_manifest_config};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsManifestConfig {
    // k8s base templates
    pub k8s_base_templates_path: String,
    pub k8s_base_destination_path: String,
    // k8s namespace utilities templates
    pub k8s_namespace_utilities_templates_path: String,
    pub k8s_namespace_utilities_destination_path: String,
    // k8s application templates
    pub k8s_application_templates_path: String,
    pub k8s_application_destination_path: String,
    // k8s configmap templates
    #[serde(default)]
    pub k8s_config_map_templates_path: String,
    #[serde(default)]
    pub k8s_config_map_destination_path: String,
    // GitOps app templates
    pub git_ops_kustomization_template_path: String,
    pub git_ops_app_templates_path: String,
    pub git_ops_app_namespace_utilities_templates_path: String,
    pub git_ops_base_destination_path: String,
}

impl GitOpsManifestConfig {
    /// The per-environment apps directory inside the GitOps-tools repo.
    pub fn git_ops_apps_destination(&self, env_code: &str) -> String {
        self.git_ops_base_destination_path
            .replace("<environment>", env_code)
    }

    fn substitute_paths(&mut self, setup: &Setup) {
        for path in [
            &mut self.k8s_base_destination_path,
            &mut self.k8s_namespace_utilities_destination_path,
            &mut self.k8s_application_destination_path,
            &mut self.k8s_config_map_destination_path,
            &mut self.git_ops_base_destination_path,
        ] {
            *path = pre_substitute(path, setup);
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitOpsData {
    pub config: GitOpsManifestConfig,
    pub tags: Vec<Tag>,
}

/// Values rendered into the k8s application manifests.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ApplicationValues {
    namespace: String,
    application_name: String,
    application_port: i32,
    application_cpu_limit: String,
    application_memory_limit: String,
    application_cpu_request: String,
    application_memory_request: String,
    application_health_check_path: String,
    application_initial_delay_seconds: i32,
    application_second_delay_seconds: i32,
    application_health_check_period_seconds: i32,
    ingress_strip_path: bool,
    ingress_authentication: bool,
    ingress_frontend: bool,
    ingress_custom_path: String,
    ingress_host: String,
    ingress_path: String,
    default_image_name: String,
    default_image_tag: String,
    application_min_replicas: i32,
    application_max_replicas: i32,
    environment_mount_path: String,
}

/// Values rendered into the Argo application and kustomization manifests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GitOpsManifestValues {
    namespace: String,
    application_name: String,
    environment: String,
    destination_cluster: String,
    project: String,
    k8s_application_path: String,
    k8s_namespace_utilities_path: String,
    git_ops_tools_repository: String,
    git_ops_repository: String,
    config_map_path: String,
    config_map_repository: String,
}

pub struct GitOpsService {
    setup_cfg: SetupConfig,
    renderer: Arc<Renderer>,
}

impl GitOpsService {
    pub fn new(setup_cfg: SetupConfig, renderer: Arc<Renderer>) -> Self {
        Self { setup_cfg, renderer }
    }

    pub fn load_data(
        &self,
        setup: &Setup,
        manifest: &Manifest,
        templates_root: &Path,
    ) -> Result<GitOpsData> {
        let mut config: GitOpsManifestConfig = read_manifest_config(templates_root, manifest)?;
        config.substitute_paths(setup);
        Ok(GitOpsData {
            config,
            tags: default_tags(setup),
        })
    }

    /// Shared cluster utilities: copied once, never re-rendered. A
    /// pre-existing destination is left untouched.
    pub fn setup_base_utilities(
        &self,
        data: &GitOpsData,
        templates_root: &Path,
        gitops_root: &Path,
    ) -> Result<()> {
        let src = templates_root.join(&data.config.k8s_base_templates_path);
        let dst = gitops_root.join(&data.config.k8s_base_destination_path);
        self.copy_tree_once(&src, &dst)
    }

    /// Namespace-scoped utilities, rendered with the squad's namespace. A
    /// pre-existing destination is left untouched.
    pub fn setup_namespaced_utilities(
        &self,
        setup: &Setup,
        data: &GitOpsData,
        templates_root: &Path,
        gitops_root: &Path,
    ) -> Result<()> {
        let src = templates_root.join(&data.config.k8s_namespace_utilities_templates_path);
        let dst = gitops_root.join(&data.config.k8s_namespace_utilities_destination_path);
        if !self.copy_tree_missing_only(&src, &dst)? {
            return Ok(());
        }

        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct NamespaceValues {
            namespace: String,
        }
        self.renderer.apply_template_recursively(
            &dst,
            &NamespaceValues {
                namespace: setup.squad.code.clone(),
            },
        )?;
        Ok(())
    }

    /// The application's own k8s manifests: `base/` plus one overlay per
    /// selected environment, mirrored into the external ConfigMap tree when
    /// one is configured. Fails when the destination already exists.
    pub fn setup_k8s_manifests(
        &self,
        setup: &Setup,
        data: &GitOpsData,
        created: &mut CreatedData,
        templates_root: &Path,
        gitops_root: &Path,
        config_map_root: &Path,
    ) -> Result<Vec<String>> {
        let cm_templates = templates_root.join(&data.config.k8s_config_map_templates_path);
        let app_templates = templates_root.join(&data.config.k8s_application_templates_path);
        let dst = gitops_root.join(&data.config.k8s_application_destination_path);

        if self.renderer.exists(&dst) {
            bail!("k8s manifests already exist for application");
        }
        self.renderer.create_dir(&dst)?;
        self.renderer
            .copy_dir(&app_templates.join("base"), &dst.join("base"))?;

        let mut values = self.application_values(setup);
        tracing::debug!(path = %dst.join("base").display(), "applying template recursively");
        self.renderer
            .apply_template_recursively(&dst.join("base"), &values)?;
        self.renderer.create_dir(&dst.join("overlays"))?;

        let mut extra_data = vec!["Application ingresses:".to_string()];
        for env in &setup.envs {
            let overlay_dst = dst.join("overlays").join(&env.env.code);
            self.renderer
                .copy_dir(&app_templates.join("overlays/overlay"), &overlay_dst)?;
            values.ingress_host = setup.ingress_host(&env.env.code);
            values.ingress_path = setup.ingress_path(&env.env.code);
            values.application_min_replicas = env.replicas.min;
            values.application_max_replicas = env.replicas.max;
            values.environment_mount_path = env.env.secrets_path.clone();
            self.renderer.apply_template_recursively(&overlay_dst, &values)?;

            extra_data.push(format!(
                " -- {}: {}",
                env.env.label,
                setup.ingress_full(&env.env.code)
            ));
            created.environments.push(EnvironmentCreated {
                label: env.env.label.clone(),
                code: env.env.code.clone(),
                url: setup.ingress_full(&env.env.code),
                application_name: setup.application_name().to_string(),
            });

            if !self.setup_cfg.external_config_map {
                continue;
            }
            let cm_dst = config_map_root.join(&data.config.k8s_config_map_destination_path);
            self.renderer.create_dir(&cm_dst)?;
            let cm_env_dst = cm_dst.join(&env.env.code);
            self.renderer
                .copy_dir(&cm_templates.join("overlay"), &cm_env_dst)?;
            self.renderer.apply_template_recursively(&cm_env_dst, &values)?;
        }
        Ok(extra_data)
    }

    /// The Argo application definitions for one environment: environment and
    /// squad kustomizations (ensured idempotently) plus `_base.yaml` and the
    /// application's own file.
    pub fn setup_gitops_manifests(
        &self,
        setup: &Setup,
        data: &GitOpsData,
        templates_root: &Path,
        gitops_tools_root: &Path,
        env: &SetupEnv,
    ) -> Result<()> {
        let base_dst = gitops_tools_root.join(data.config.git_ops_apps_destination(&env.env.code));
        let namespace_dst = base_dst.join(&setup.squad.code);
        if !self.renderer.exists(&namespace_dst) {
            self.renderer.create_dir(&namespace_dst)?;
        }

        let kustomization_template =
            templates_root.join(&data.config.git_ops_kustomization_template_path);
        let app_template = templates_root.join(&data.config.git_ops_app_templates_path);
        let utilities_template =
            templates_root.join(&data.config.git_ops_app_namespace_utilities_templates_path);
        let values = GitOpsManifestValues {
            namespace: setup.squad.code.clone(),
            application_name: setup.slug.clone(),
            environment: env.env.code.clone(),
            destination_cluster: env.env.destination_cluster.clone(),
            project: env.env.project.clone(),
            k8s_application_path: format!(
                "{}/overlays/{}",
                data.config.k8s_application_destination_path, env.env.code
            ),
            k8s_namespace_utilities_path: format!(
                "{}/overlays/{}",
                data.config.k8s_namespace_utilities_destination_path, env.env.code
            ),
            git_ops_tools_repository: self.setup_cfg.git_ops_tools_repository.clone(),
            git_ops_repository: self.setup_cfg.git_ops_repository.clone(),
            config_map_path: format!(
                "{}/{}",
                data.config.k8s_config_map_destination_path, env.env.code
            ),
            config_map_repository: self.setup_cfg.config_map_repository.clone(),
        };

        // Environment kustomization lists the squad directory.
        let base_kustomization = base_dst.join("kustomization.yaml");
        self.copy_file_once(&kustomization_template, &base_kustomization)?;
        self.renderer
            .ensure_line(&base_kustomization, &format!("- {}/", values.namespace))?;

        // Squad kustomization lists the shared utilities and the app.
        let namespace_kustomization = namespace_dst.join("kustomization.yaml");
        self.copy_file_once(&kustomization_template, &namespace_kustomization)?;
        self.renderer.ensure_line(&namespace_kustomization, "- _base.yaml")?;
        self.renderer.ensure_line(
            &namespace_kustomization,
            &format!("- {}.yaml", values.application_name),
        )?;

        let utilities_dst = namespace_dst.join("_base.yaml");
        self.copy_file_once(&utilities_template, &utilities_dst)?;
        self.renderer.apply_template(&utilities_dst, &values)?;

        let app_dst = namespace_dst.join(format!("{}.yaml", values.application_name));
        self.copy_file_once(&app_template, &app_dst)?;
        self.renderer.apply_template(&app_dst, &values)?;
        Ok(())
    }

    fn application_values(&self, setup: &Setup) -> ApplicationValues {
        let defaults = &setup.template.application_defaults;
        ApplicationValues {
            namespace: setup.squad.code.clone(),
            application_name: setup.application_name().to_string(),
            application_port: setup.application.port,
            application_cpu_limit: format_cpu(setup.application.resources.cpu.max),
            application_memory_limit: format_memory(setup.application.resources.memory.max),
            application_cpu_request: format_cpu(setup.application.resources.cpu.min),
            application_memory_request: format_memory(setup.application.resources.memory.min),
            application_health_check_path: setup.application_health_check_path(),
            application_initial_delay_seconds: defaults.health_check_initial_delay_seconds,
            application_second_delay_seconds: defaults.health_check_second_delay_seconds,
            application_health_check_period_seconds: defaults.health_check_period_seconds,
            ingress_strip_path: setup.ingress_strip_path(),
            ingress_authentication: setup.ingress.authentication,
            ingress_frontend: setup.template.ingress_defaults.frontend,
            ingress_custom_path: setup.ingress_custom_path().to_string(),
            default_image_name: self.setup_cfg.default_image_name.clone(),
            default_image_tag: self.setup_cfg.default_image_tag.clone(),
            ..ApplicationValues::default()
        }
    }

    /// Copy a tree unless the destination already exists; creates the parent
    /// directory when missing. Returns whether a copy happened.
    fn copy_tree_missing_only(&self, src: &Path, dst: &Path) -> Result<bool> {
        if let Some(parent) = dst.parent()
            && !self.renderer.exists(parent)
        {
            self.renderer.create_dir(parent)?;
        }
        if self.renderer.exists(dst) {
            return Ok(false);
        }
        self.renderer.copy_dir(src, dst)?;
        Ok(true)
    }

    fn copy_tree_once(&self, src: &Path, dst: &Path) -> Result<()> {
        self.copy_tree_missing_only(src, dst)?;
        Ok(())
    }

    fn copy_file_once(&self, src: &Path, dst: &Path) -> Result<()> {
        if !self.renderer.exists(dst) {
            self.renderer.copy_dir(src, dst)?;
        }
        Ok(())
    }
}
