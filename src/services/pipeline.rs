//! Repository pipeline scaffolding: pipeline files rendered into the
//! application repo plus the variable sets pushed to the git host.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::catalog::Manifest;
use crate::domain::{Setup, Tag, default_tags};
use crate::gateways::{EnvironmentVariables, RepoVariable};
use crate::render::Renderer;

use super::{pre_substitute, read_manifest_config};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTrigger {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub deployment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineVariable {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEnvironment {
    #[serde(default)]
    pub triggers: Vec<PipelineTrigger>,
    #[serde(default)]
    pub variables: Vec<PipelineVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineManifestConfig {
    pub templates_path: String,
    pub destination_path: String,
    #[serde(default)]
    pub initial_pipeline: String,
    #[serde(default)]
    pub environments: HashMap<String, PipelineEnvironment>,
    #[serde(default)]
    pub default_variables: Vec<PipelineVariable>,
}

#[derive(Debug, Clone)]
pub struct PipelineData {
    pub config: PipelineManifestConfig,
    pub tags: Vec<Tag>,
}

/// Values rendered into the pipeline files: the selected environments and
/// the repository-wide defaults.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PipelineValues {
    environments: HashMap<String, PipelineEnvironment>,
    default_variables: Vec<PipelineVariable>,
}

pub struct PipelineService {
    renderer: Arc<Renderer>,
}

impl PipelineService {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self { renderer }
    }

    pub fn load_data(
        &self,
        setup: &Setup,
        manifest: &Manifest,
        templates_root: &Path,
    ) -> Result<PipelineData> {
        let mut config: PipelineManifestConfig = read_manifest_config(templates_root, manifest)?;
        config.destination_path = pre_substitute(&config.destination_path, setup);
        for variable in &mut config.default_variables {
            variable.value = pre_substitute(&variable.value, setup);
        }
        for environment in config.environments.values_mut() {
            for variable in &mut environment.variables {
                variable.value = pre_substitute(&variable.value, setup);
            }
        }
        Ok(PipelineData {
            config,
            tags: default_tags(setup),
        })
    }

    /// Copy the pipeline templates into the application checkout and render
    /// them with the selected environments. Fails when the destination
    /// already exists.
    pub fn setup_pipeline(
        &self,
        setup: &Setup,
        data: &PipelineData,
        templates_root: &Path,
        application_root: &Path,
    ) -> Result<()> {
        let src = templates_root.join(&data.config.templates_path);
        let dst = application_root.join(&data.config.destination_path);
        if self.renderer.exists(&dst) {
            bail!("pipeline already exists: {}", dst.display());
        }
        self.renderer.copy_dir(&src, &dst)?;

        let environments: HashMap<String, PipelineEnvironment> = data
            .config
            .environments
            .iter()
            .filter(|(code, _)| setup.envs.iter().any(|e| &e.env.code == *code))
            .map(|(code, env)| (code.clone(), env.clone()))
            .collect();
        let values = PipelineValues {
            environments,
            default_variables: data.config.default_variables.clone(),
        };
        self.renderer.apply_template_recursively(&dst, &values)?;
        Ok(())
    }

    /// Repository-level variables for the git host, from the manifest's
    /// defaults.
    pub fn repository_variables(&self, data: &PipelineData) -> Vec<RepoVariable> {
        to_repo_variables(&data.config.default_variables)
    }

    /// Per-environment variable sets for every selected environment that has
    /// a config entry.
    pub fn environment_variables(
        &self,
        setup: &Setup,
        data: &PipelineData,
    ) -> Vec<EnvironmentVariables> {
        setup
            .envs
            .iter()
            .filter_map(|env| {
                data.config.environments.get(&env.env.code).map(|entry| EnvironmentVariables {
                    name: env.env.code.clone(),
                    variables: to_repo_variables(&entry.variables),
                })
            })
            .collect()
    }
}

fn to_repo_variables(variables: &[PipelineVariable]) -> Vec<RepoVariable> {
    variables
        .iter()
        .map(|v| RepoVariable {
            key: v.name.clone(),
            value: v.value.clone(),
            secure: v.secure,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ManifestKind};
    use crate::domain::setup::test_support::sample_setup;
    use std::fs;
    use tempfile::tempdir;

    const CONFIG_YAML: &str = "\
templatesPath: pipeline/templates
destinationPath: .
initialPipeline: build
defaultVariables:
  - name: IMAGE_NAME
    value: <applicationName>
  - name: AWS_REGION
    value: sa-east-1
    secure: false
environments:
  qa:
    triggers:
      - name: deploy-qa
        branch: develop
        deployment: qa
    variables:
      - name: NAMESPACE
        value: <namespace>
  prd:
    variables:
      - name: NAMESPACE
        value: <namespace>
";

    fn manifest() -> Manifest {
        Manifest {
            code: "bitbucket-pipelines".to_string(),
            label: "Bitbucket pipelines".to_string(),
            kind: ManifestKind::Pipeline,
            dir: "manifests/pipeline/bitbucket-pipelines/spring-boot".to_string(),
        }
    }

    fn write_bundle(root: &Path) {
        let manifest_dir = root.join("manifests/pipeline/bitbucket-pipelines/spring-boot");
        fs::create_dir_all(&manifest_dir).unwrap();
        fs::write(manifest_dir.join("config.yaml"), CONFIG_YAML).unwrap();

        fs::create_dir_all(root.join("pipeline/templates")).unwrap();
        fs::write(
            root.join("pipeline/templates/bitbucket-pipelines.yml"),
            "image: builder\n{{#each Environments}}# env {{@key}}\n{{/each}}{{#each DefaultVariables}}# var {{name}}={{value}}\n{{/each}}",
        )
        .unwrap();
    }

    #[test]
    fn load_data_substitutes_variable_values() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path());
        let catalog = Catalog::builtin();
        let setup = sample_setup(&catalog);
        let service = PipelineService::new(Arc::new(Renderer::new()));

        let data = service.load_data(&setup, &manifest(), dir.path()).unwrap();
        assert_eq!(data.config.default_variables[0].value, "orders-svc");
        assert_eq!(data.config.environments["qa"].variables[0].value, "cd");
    }

    #[test]
    fn setup_pipeline_renders_into_application_checkout() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path());
        let app = tempdir().unwrap();
        let app_root = app.path().join("checkout");
        let catalog = Catalog::builtin();
        let setup = sample_setup(&catalog);
        let service = PipelineService::new(Arc::new(Renderer::new()));
        let data = service.load_data(&setup, &manifest(), dir.path()).unwrap();

        service
            .setup_pipeline(&setup, &data, dir.path(), &app_root)
            .unwrap();
        let rendered = fs::read_to_string(app_root.join("bitbucket-pipelines.yml")).unwrap();
        // qa is selected, prd is not
        assert!(rendered.contains("# env qa"));
        assert!(!rendered.contains("# env prd"));
        assert!(rendered.contains("# var IMAGE_NAME=orders-svc"));
    }

    #[test]
    fn setup_pipeline_fails_when_destination_exists() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path());
        let app = tempdir().unwrap();
        let catalog = Catalog::builtin();
        let setup = sample_setup(&catalog);
        let service = PipelineService::new(Arc::new(Renderer::new()));
        let data = service.load_data(&setup, &manifest(), dir.path()).unwrap();

        // destinationPath "." resolves to the (existing) checkout root
        let err = service
            .setup_pipeline(&setup, &data, dir.path(), app.path())
            .unwrap_err();
        assert!(err.to_string().contains("pipeline already exists"));
    }

    #[test]
    fn environment_variables_cover_selected_envs_with_entries_only() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path());
        let catalog = Catalog::builtin();
        let setup = sample_setup(&catalog);
        let service = PipelineService::new(Arc::new(Renderer::new()));
        let data = service.load_data(&setup, &manifest(), dir.path()).unwrap();

        let envs = service.environment_variables(&setup, &data);
        // qa selected and configured; hml selected but unconfigured; prd configured but unselected
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].name, "qa");
        assert_eq!(envs[0].variables[0].key, "NAMESPACE");
        assert_eq!(envs[0].variables[0].value, "cd");
    }

    #[test]
    fn repository_variables_map_name_to_key() {
        let dir = tempdir().unwrap();
        write_bundle(dir.path());
        let catalog = Catalog::builtin();
        let setup = sample_setup(&catalog);
        let service = PipelineService::new(Arc::new(Renderer::new()));
        let data = service.load_data(&setup, &manifest(), dir.path()).unwrap();

        let vars = service.repository_variables(&data);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].key, "IMAGE_NAME");
        assert_eq!(vars[0].value, "orders-svc");
        assert!(!vars[1].secure);
    }
}
