//! The setup use-case: validates a request, then drives the ordered step
//! pipeline across the external gateways as an independent task, emitting
//! hierarchical progress along the way.
//!
//! A workflow is fail-stop: the first step error jumps to `finish-setup`
//! with an error terminal. Intermediate side effects are left in place;
//! reruns rely on the gateways' idempotent semantics.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;

use crate::catalog::{Catalog, Manifest, ManifestKind};
use crate::config::Config;
use crate::domain::{
    CreatedData, IntLimits, ProgressEvent, ProgressKind, Setup, SetupEnv, SetupRequest,
};
use crate::errors::InputError;
use crate::gateways::{GitCli, GitHostApi, RegistryApi, SecretsApi, WikiApi};
use crate::progress::ProgressStore;
use crate::progress::bus::MessageBus;
use crate::render::Renderer;
use crate::services::gitops::GitOpsService;
use crate::services::pipeline::PipelineService;
use crate::services::registry::RegistryService;
use crate::services::secret::SecretService;
use crate::services::wiki::WikiService;
use crate::validate::validate_setup;

/// The synchronous outcome of `exec`: either an accepted process ID or the
/// collected validation errors.
#[derive(Debug)]
pub struct SetupAccepted {
    pub process_id: String,
    pub errors: Vec<InputError>,
}

/// All destination paths of one workflow, with `{{process-id}}` resolved.
struct ProcessPaths {
    id: String,
    root_dir: PathBuf,
    templates_repository: String,
    templates_branch: String,
    templates_dir: PathBuf,
    git_ops_repository: String,
    git_ops_branch: String,
    git_ops_dir: PathBuf,
    git_ops_tools_repository: String,
    git_ops_tools_branch: String,
    git_ops_tools_dir: PathBuf,
    config_map_repository: String,
    config_map_branch: String,
    config_map_dir: PathBuf,
    application_branch: String,
    application_dir: PathBuf,
    default_manifests: Vec<Manifest>,
}

impl ProcessPaths {
    fn new(cfg: &Config, id: &str, default_manifests: Vec<Manifest>) -> Self {
        let sc = &cfg.setup;
        let sub = |s: &str| s.replace("{{process-id}}", id);
        Self {
            id: id.to_string(),
            root_dir: PathBuf::from(sub(&sc.root_destinations_path)),
            templates_repository: sc.templates_repository.clone(),
            templates_branch: sc.templates_repository_branch.clone(),
            templates_dir: PathBuf::from(sub(&sc.templates_destination_dir)),
            git_ops_repository: sc.git_ops_repository.clone(),
            git_ops_branch: sc.git_ops_repository_branch.clone(),
            git_ops_dir: PathBuf::from(sub(&sc.git_ops_destination_dir)),
            git_ops_tools_repository: sc.git_ops_tools_repository.clone(),
            git_ops_tools_branch: sc.git_ops_tools_repository_branch.clone(),
            git_ops_tools_dir: PathBuf::from(sub(&sc.git_ops_tools_destination_dir)),
            config_map_repository: sc.config_map_repository.clone(),
            config_map_branch: sc.config_map_repository_branch.clone(),
            config_map_dir: PathBuf::from(sub(&sc.config_map_destination_dir)),
            application_branch: sc.application_main_branch.clone(),
            application_dir: PathBuf::from(sub(&sc.application_destination_dir)),
            default_manifests,
        }
    }

    fn custom_branch(&self, slug: &str, additional: &str) -> String {
        if additional.is_empty() {
            format!("feature/{slug}")
        } else {
            format!("feature/{slug}/{additional}")
        }
    }
}

/// Emission coordinates for one hierarchical step.
#[derive(Clone)]
struct Step {
    id: String,
    step: String,
}

struct PullRequest<'a> {
    step: &'a Step,
    local_dir: &'a Path,
    repository: &'a str,
    target_branch: &'a str,
    actual_branch: String,
    message: String,
    title: String,
    merge: bool,
}

pub struct Orchestrator {
    config: Arc<Config>,
    catalog: Arc<Catalog>,
    bus: Arc<MessageBus>,
    store: Arc<dyn ProgressStore>,
    git: Arc<dyn GitCli>,
    git_host: Arc<dyn GitHostApi>,
    renderer: Arc<Renderer>,
    registry_service: RegistryService,
    gitops_service: GitOpsService,
    pipeline_service: PipelineService,
    secret_service: SecretService,
    wiki_service: WikiService,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<Catalog>,
        bus: Arc<MessageBus>,
        store: Arc<dyn ProgressStore>,
        git: Arc<dyn GitCli>,
        git_host: Arc<dyn GitHostApi>,
        registry_api: Arc<dyn RegistryApi>,
        secrets_api: Arc<dyn SecretsApi>,
        wiki_api: Arc<dyn WikiApi>,
    ) -> Self {
        let renderer = Arc::new(Renderer::new());
        Self {
            registry_service: RegistryService::new(registry_api),
            gitops_service: GitOpsService::new(config.setup.clone(), renderer.clone()),
            pipeline_service: PipelineService::new(renderer.clone()),
            secret_service: SecretService::new(secrets_api),
            wiki_service: WikiService::new(config.git.clone(), wiki_api, renderer.clone()),
            config,
            catalog,
            bus,
            store,
            git,
            git_host,
            renderer,
        }
    }

    /// Validate and accept a setup request. On success the workflow runs as
    /// an independent task and the process ID is returned immediately.
    pub fn exec(self: &Arc<Self>, input: SetupRequest) -> SetupAccepted {
        tracing::debug!(template = %input.template, squad = %input.squad, "received setup request");
        let process_id = self.bus.generate_id();
        let (setup, mut errors) = self.make_setup(&input, &process_id);
        if let Some(setup) = &setup {
            errors.extend(validate_setup(setup));
        }
        let Some(setup) = setup else {
            return SetupAccepted {
                process_id: String::new(),
                errors,
            };
        };
        if !errors.is_empty() {
            tracing::debug!(?errors, "setup validation failed");
            return SetupAccepted {
                process_id: String::new(),
                errors,
            };
        }

        let paths = ProcessPaths::new(
            &self.config,
            &process_id,
            self.catalog.default_manifests().to_vec(),
        );
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.process(setup, paths).await;
        });
        SetupAccepted {
            process_id,
            errors: Vec::new(),
        }
    }

    /// Resolve the request against the catalogs. Unresolvable codes and empty
    /// required fields become `InputError`s.
    fn make_setup(&self, input: &SetupRequest, id: &str) -> (Option<Setup>, Vec<InputError>) {
        let mut errors = Vec::new();

        let mut envs = Vec::new();
        for (index, selection) in input.envs.iter().enumerate() {
            if selection.code.is_empty() {
                errors.push(InputError::new(format!("env.{index}.code"), "env cannot be empty"));
                continue;
            }
            match self.catalog.environment(&selection.code) {
                Ok(env) => envs.push(SetupEnv {
                    env: env.clone(),
                    replicas: IntLimits {
                        min: selection.replicas.min,
                        max: selection.replicas.max,
                    },
                }),
                Err(err) => errors.push(InputError::new(
                    format!("envs.{}", selection.code),
                    err.to_string(),
                )),
            }
        }

        let template = if input.template.is_empty() {
            errors.push(InputError::new("template", "template cannot be empty"));
            None
        } else {
            match self.catalog.template(&input.template) {
                Ok(template) => Some(template.clone()),
                Err(err) => {
                    errors.push(InputError::new("template", err.to_string()));
                    None
                }
            }
        };

        let squad = if input.squad.is_empty() {
            errors.push(InputError::new("squad", "squad cannot be empty"));
            None
        } else {
            match self.catalog.squad(&input.squad) {
                Ok(squad) => Some(squad.clone()),
                Err(err) => {
                    errors.push(InputError::new("squad", err.to_string()));
                    None
                }
            }
        };

        let (Some(template), Some(squad)) = (template, squad) else {
            return (None, errors);
        };

        let mut manifests = Vec::new();
        for code in &input.manifests {
            match template.manifests.iter().find(|m| &m.code == code) {
                Some(manifest) => manifests.push(manifest.clone()),
                None => errors.push(InputError::new(
                    format!("manifests.{code}"),
                    "template does not have this manifest",
                )),
            }
        }

        let setup = Setup::new(
            id,
            template,
            envs,
            manifests,
            squad,
            input.application.clone(),
            input.ingress.clone(),
        );
        (Some(setup), errors)
    }

    // ── Workflow task ────────────────────────────────────────────────

    async fn process(self: Arc<Self>, setup: Setup, paths: ProcessPaths) {
        tracing::debug!(id = %paths.id, "processing setup");
        let mut created = CreatedData::default();
        let mut extra_data = Vec::new();
        let outcome = AssertUnwindSafe(self.run(&setup, &paths, &mut created, &mut extra_data))
            .catch_unwind()
            .await;
        match outcome {
            Ok(errored) => self.finish(&paths, extra_data, errored).await,
            Err(_) => {
                tracing::error!(id = %paths.id, "workflow task panicked");
                self.finish(
                    &paths,
                    vec!["Process interrupted by internal error".to_string()],
                    true,
                )
                .await;
            }
        }
    }

    /// The ordered step pipeline. Returns whether the workflow errored; the
    /// offending step has already emitted its error leaves.
    async fn run(
        &self,
        setup: &Setup,
        paths: &ProcessPaths,
        created: &mut CreatedData,
        extra_data: &mut Vec<String>,
    ) -> bool {
        // Step: pre-process, cloning the application repository.
        let step = Step {
            id: paths.id.clone(),
            step: "pre-process-setup-ci-cd-automation".to_string(),
        };
        self.emit(&step, "Pre Process Setup Ci/CD Automation", ProgressKind::Progress, true)
            .await;
        if self
            .step_clone(
                &paths.id,
                setup.application_name(),
                setup.application_name(),
                &paths.application_branch,
                &paths.application_dir,
                Some(&step),
            )
            .await
            .is_err()
        {
            return true;
        }

        // Step: clone the templates bundle.
        if self
            .step_clone(
                &paths.id,
                "Templates",
                &paths.templates_repository,
                &paths.templates_branch,
                &paths.templates_dir,
                None,
            )
            .await
            .is_err()
        {
            return true;
        }

        // Step: secrets.
        let secret_manifests = self.manifests_of(setup, paths, ManifestKind::Secret);
        if !secret_manifests.is_empty() {
            match self.setup_secrets(setup, paths, &secret_manifests).await {
                Ok(lines) => extra_data.extend(lines),
                Err(()) => return true,
            }
        }

        // Step: container registry.
        let registry_manifests = self.manifests_of(setup, paths, ManifestKind::Registry);
        if !registry_manifests.is_empty() {
            match self
                .create_registry(setup, paths, created, &registry_manifests)
                .await
            {
                Ok(lines) => extra_data.extend(lines),
                Err(()) => return true,
            }
        }

        // Step group: GitOps repositories, k8s manifests, GitOps manifests.
        let gitops_manifests = self.manifests_of(setup, paths, ManifestKind::GitOps);
        if !gitops_manifests.is_empty() {
            let step = Step {
                id: paths.id.clone(),
                step: "clone-git-ops-repositories".to_string(),
            };
            self.emit(&step, "Cloning GitOps repositories", ProgressKind::Progress, true)
                .await;
            if self
                .step_clone(
                    &paths.id,
                    "GitOps",
                    &paths.git_ops_repository,
                    &paths.git_ops_branch,
                    &paths.git_ops_dir,
                    Some(&step),
                )
                .await
                .is_err()
            {
                return true;
            }
            if self
                .step_clone(
                    &paths.id,
                    "GitOps-Tools",
                    &paths.git_ops_tools_repository,
                    &paths.git_ops_tools_branch,
                    &paths.git_ops_tools_dir,
                    Some(&step),
                )
                .await
                .is_err()
            {
                return true;
            }
            if self.config.setup.external_config_map
                && self
                    .step_clone(
                        &paths.id,
                        "ConfigMap",
                        &paths.config_map_repository,
                        &paths.config_map_branch,
                        &paths.config_map_dir,
                        Some(&step),
                    )
                    .await
                    .is_err()
            {
                return true;
            }

            match self
                .create_k8s_manifests(setup, paths, created, &gitops_manifests)
                .await
            {
                Ok(lines) => extra_data.extend(lines),
                Err(()) => return true,
            }
            match self
                .create_git_ops_manifests(setup, paths, &gitops_manifests)
                .await
            {
                Ok(lines) => extra_data.extend(lines),
                Err(()) => return true,
            }
        }

        // Step: repository pipeline.
        let pipeline_manifests = self.manifests_of(setup, paths, ManifestKind::Pipeline);
        if !pipeline_manifests.is_empty()
            && self
                .create_pipeline(setup, paths, &pipeline_manifests)
                .await
                .is_err()
        {
            return true;
        }

        // Step: wiki page.
        let wiki_manifests = self.manifests_of(setup, paths, ManifestKind::Wiki);
        if !wiki_manifests.is_empty() {
            match self.setup_wiki(setup, paths, created, &wiki_manifests).await {
                Ok(lines) => extra_data.extend(lines),
                Err(()) => return true,
            }
        }

        false
    }

    fn manifests_of(
        &self,
        setup: &Setup,
        paths: &ProcessPaths,
        kind: ManifestKind,
    ) -> Vec<Manifest> {
        setup
            .manifests
            .iter()
            .chain(paths.default_manifests.iter())
            .filter(|m| m.kind == kind)
            .cloned()
            .collect()
    }

    // ── Steps ────────────────────────────────────────────────────────

    async fn step_clone(
        &self,
        id: &str,
        name: &str,
        repository: &str,
        branch: &str,
        destination: &Path,
        parent: Option<&Step>,
    ) -> Result<(), ()> {
        let step = match parent {
            Some(step) => step.clone(),
            None => {
                let step = Step {
                    id: id.to_string(),
                    step: format!("clone-{}-repository", name.to_lowercase()),
                };
                self.emit(&step, &format!("Cloning {name} repository"), ProgressKind::Progress, true)
                    .await;
                step
            }
        };

        self.emit(
            &step,
            &format!(
                "Cloning {repository} on branch {branch} into {}",
                destination.display()
            ),
            ProgressKind::Progress,
            false,
        )
        .await;
        if let Err(err) = self.git.clone_repository(repository, branch, destination).await {
            self.emit_error(
                &step,
                &err.into(),
                &format!("Error cloning {repository} into {}", destination.display()),
            )
            .await;
            return Err(());
        }
        self.emit(
            &step,
            &format!("Repository {repository} cloned into {}", destination.display()),
            ProgressKind::Success,
            false,
        )
        .await;
        Ok(())
    }

    async fn setup_secrets(
        &self,
        setup: &Setup,
        paths: &ProcessPaths,
        manifests: &[Manifest],
    ) -> Result<Vec<String>, ()> {
        let step = Step {
            id: paths.id.clone(),
            step: "setup-secrets".to_string(),
        };
        self.emit(&step, "Creating Secrets", ProgressKind::Progress, true).await;

        let mut extra_data = Vec::new();
        for manifest in manifests {
            self.emit(
                &step,
                &format!(
                    "Creating {} for {} using {} manifests",
                    manifest.label,
                    setup.application_name(),
                    manifest.code
                ),
                ProgressKind::Progress,
                false,
            )
            .await;
            let data = match self
                .secret_service
                .load_data(setup, manifest, &paths.templates_dir)
            {
                Ok(data) => data,
                Err(err) => {
                    self.emit_error(
                        &step,
                        &err,
                        &format!("Error creating secret with {} manifests", manifest.code),
                    )
                    .await;
                    return Err(());
                }
            };
            for env in &setup.envs {
                if let Err(err) = self.secret_service.setup_new_secret(&data, env).await {
                    self.emit_error(
                        &step,
                        &err,
                        &format!("Error creating secret with {} manifests", manifest.code),
                    )
                    .await;
                    return Err(());
                }
                extra_data.push(format!(
                    " -- {}: {} - {}",
                    manifest.label,
                    data.config.root_path(env),
                    data.config.secret_path(env)
                ));
                self.emit(
                    &step,
                    &format!(
                        "{}'s secrets created for {}'s service",
                        manifest.label, setup.slug
                    ),
                    ProgressKind::Success,
                    false,
                )
                .await;
            }
        }
        if !extra_data.is_empty() {
            extra_data.insert(0, "Secrets created:".to_string());
        }
        Ok(extra_data)
    }

    async fn create_registry(
        &self,
        setup: &Setup,
        paths: &ProcessPaths,
        created: &mut CreatedData,
        manifests: &[Manifest],
    ) -> Result<Vec<String>, ()> {
        let step = Step {
            id: paths.id.clone(),
            step: "create-registry".to_string(),
        };
        self.emit(&step, "Creating Registry", ProgressKind::Progress, true).await;

        let mut extra_data = Vec::new();
        for manifest in manifests {
            self.emit(
                &step,
                &format!(
                    "Creating {} {} using {} manifests",
                    manifest.label,
                    setup.application_name(),
                    manifest.code
                ),
                ProgressKind::Progress,
                false,
            )
            .await;
            let outcome = match self
                .registry_service
                .load_data(setup, manifest, &paths.templates_dir)
            {
                Ok(data) => self.registry_service.create(&data).await,
                Err(err) => Err(err),
            };
            let url = match outcome {
                Ok(url) => url,
                Err(err) => {
                    self.emit_error(
                        &step,
                        &err,
                        &format!("Error creating registry with {} manifests", manifest.code),
                    )
                    .await;
                    return Err(());
                }
            };
            extra_data.push(format!("Registry url: https://{url}"));
            created.registry_url = url;
            self.emit(
                &step,
                &format!(
                    "{}'s registry created for {}",
                    manifest.label,
                    setup.application_name()
                ),
                ProgressKind::Success,
                false,
            )
            .await;
        }
        Ok(extra_data)
    }

    async fn create_k8s_manifests(
        &self,
        setup: &Setup,
        paths: &ProcessPaths,
        created: &mut CreatedData,
        manifests: &[Manifest],
    ) -> Result<Vec<String>, ()> {
        let step = Step {
            id: paths.id.clone(),
            step: "create-k8s-manifests".to_string(),
        };
        self.emit(&step, "Creating K8s manifests", ProgressKind::Progress, true).await;

        let mut extra_data = Vec::new();
        for manifest in manifests {
            self.emit(&step, "Creating repositories branch for changes", ProgressKind::Progress, false)
                .await;
            let custom_branch = paths.custom_branch(&setup.slug, &manifest.code);
            self.new_branch_from_default(&step, &paths.git_ops_dir, &paths.git_ops_branch, &custom_branch)
                .await?;
            self.new_branch_from_default(
                &step,
                &paths.git_ops_tools_dir,
                &paths.git_ops_tools_branch,
                &custom_branch,
            )
            .await?;
            if self.config.setup.external_config_map {
                self.new_branch_from_default(
                    &step,
                    &paths.config_map_dir,
                    &paths.config_map_branch,
                    &custom_branch,
                )
                .await?;
            }

            self.emit(
                &step,
                &format!("Creating {} k8s manifests", manifest.code),
                ProgressKind::Progress,
                false,
            )
            .await;
            let data = match self
                .gitops_service
                .load_data(setup, manifest, &paths.templates_dir)
            {
                Ok(data) => data,
                Err(err) => {
                    self.emit_error(
                        &step,
                        &err,
                        &format!("Error loading data from {} manifest", manifest.code),
                    )
                    .await;
                    return Err(());
                }
            };

            self.emit(&step, "Configuring common utilities with k8s manifests", ProgressKind::Progress, false)
                .await;
            if let Err(err) = self.gitops_service.setup_base_utilities(
                &data,
                &paths.templates_dir,
                &paths.git_ops_tools_dir,
            ) {
                self.emit_error(
                    &step,
                    &err,
                    &format!(
                        "Error creating base utilities manifests from {} k8s templates",
                        manifest.code
                    ),
                )
                .await;
                return Err(());
            }

            self.emit(&step, "Configuring namespace utilities with k8s manifests", ProgressKind::Progress, false)
                .await;
            if let Err(err) = self.gitops_service.setup_namespaced_utilities(
                setup,
                &data,
                &paths.templates_dir,
                &paths.git_ops_tools_dir,
            ) {
                self.emit_error(
                    &step,
                    &err,
                    &format!(
                        "Error creating namespace utilities manifests from {} k8s templates",
                        manifest.code
                    ),
                )
                .await;
                return Err(());
            }

            self.emit(&step, "Configuring k8s manifests for service", ProgressKind::Progress, false)
                .await;
            match self.gitops_service.setup_k8s_manifests(
                setup,
                &data,
                created,
                &paths.templates_dir,
                &paths.git_ops_dir,
                &paths.config_map_dir,
            ) {
                Ok(lines) => extra_data.extend(lines),
                Err(err) => {
                    self.emit_error(
                        &step,
                        &err,
                        &format!("Error creating k8s manifests from {} templates", manifest.code),
                    )
                    .await;
                    return Err(());
                }
            }

            let commit_message = format!(
                "feat: add {} - {} manifests [Setup Ci/CD Automation]",
                setup.slug, manifest.label
            );
            let mut pr = PullRequest {
                step: &step,
                local_dir: &paths.git_ops_dir,
                repository: &paths.git_ops_repository,
                target_branch: &paths.git_ops_branch,
                actual_branch: custom_branch.clone(),
                message: commit_message,
                title: format!("Create {}'s {} manifests", setup.slug, manifest.label),
                merge: true,
            };
            self.make_pr(&pr, true).await?;
            created.git_ops_path = format!(
                "{}/{}",
                self.config.git.repository_url(&paths.git_ops_repository),
                data.config.k8s_application_destination_path
            );

            pr.local_dir = &paths.git_ops_tools_dir;
            pr.target_branch = &paths.git_ops_tools_branch;
            pr.repository = &paths.git_ops_tools_repository;
            self.make_pr(&pr, true).await?;

            if self.config.setup.external_config_map {
                pr.local_dir = &paths.config_map_dir;
                pr.target_branch = &paths.config_map_branch;
                pr.repository = &paths.config_map_repository;
                self.make_pr(&pr, true).await?;
            }
            created.config_map_path = format!(
                "{}/{}",
                self.config.git.repository_url(pr.repository),
                data.config.k8s_config_map_destination_path
            );

            self.emit(
                &step,
                &format!(
                    "{}'s manifests created for {}'s service",
                    manifest.code, setup.slug
                ),
                ProgressKind::Success,
                false,
            )
            .await;
        }
        Ok(extra_data)
    }

    async fn create_git_ops_manifests(
        &self,
        setup: &Setup,
        paths: &ProcessPaths,
        manifests: &[Manifest],
    ) -> Result<Vec<String>, ()> {
        let step = Step {
            id: paths.id.clone(),
            step: "create-git-ops-manifests".to_string(),
        };
        self.emit(&step, "Creating GitOps manifests", ProgressKind::Progress, true).await;

        let mut extra_data = Vec::new();
        for manifest in manifests {
            self.emit(
                &step,
                &format!("Creating {} gitOps manifests", manifest.code),
                ProgressKind::Progress,
                false,
            )
            .await;
            let data = match self
                .gitops_service
                .load_data(setup, manifest, &paths.templates_dir)
            {
                Ok(data) => data,
                Err(err) => {
                    self.emit_error(
                        &step,
                        &err,
                        &format!("Error loading data from {} manifest", manifest.code),
                    )
                    .await;
                    return Err(());
                }
            };
            for env in &setup.envs {
                self.emit(
                    &step,
                    &format!(
                        "Creating repositories branch for changes on {} environment",
                        env.env.code
                    ),
                    ProgressKind::Progress,
                    false,
                )
                .await;
                let custom_branch = paths.custom_branch(
                    &setup.slug,
                    &format!("{}/{}", env.env.code, manifest.code),
                );
                self.new_branch_from_default(
                    &step,
                    &paths.git_ops_tools_dir,
                    &paths.git_ops_tools_branch,
                    &custom_branch,
                )
                .await?;

                self.emit(
                    &step,
                    &format!("Creating manifests for {} environment", env.env.code),
                    ProgressKind::Progress,
                    false,
                )
                .await;
                if let Err(err) = self.gitops_service.setup_gitops_manifests(
                    setup,
                    &data,
                    &paths.templates_dir,
                    &paths.git_ops_tools_dir,
                    env,
                ) {
                    self.emit_error(
                        &step,
                        &err,
                        &format!(
                            "Error creating manifests from {} gitOps templates on environment {}",
                            manifest.code, env.env.code
                        ),
                    )
                    .await;
                    return Err(());
                }

                let pr = PullRequest {
                    step: &step,
                    local_dir: &paths.git_ops_tools_dir,
                    repository: &paths.git_ops_tools_repository,
                    target_branch: &paths.git_ops_tools_branch,
                    actual_branch: custom_branch,
                    message: format!(
                        "feat: add {} - {} manifests at {} environment [Setup Ci/CD Automation]",
                        setup.slug, manifest.label, env.env.label
                    ),
                    title: format!(
                        "Deploy {} at {} environment with {}",
                        setup.slug, env.env.label, manifest.label
                    ),
                    merge: !env.env.require_approval,
                };
                let pr_url = self.make_pr(&pr, true).await?;
                if !pr_url.is_empty() {
                    extra_data.push(format!(" -- {pr_url}"));
                }
                self.emit(
                    &step,
                    &format!(
                        "{}'s manifests created for {}'s environment of {}'s service",
                        manifest.code, env.env.code, setup.slug
                    ),
                    ProgressKind::Success,
                    false,
                )
                .await;
            }
        }
        if !extra_data.is_empty() {
            extra_data.insert(0, "Pull requests:".to_string());
        }
        Ok(extra_data)
    }

    async fn create_pipeline(
        &self,
        setup: &Setup,
        paths: &ProcessPaths,
        manifests: &[Manifest],
    ) -> Result<(), ()> {
        let step = Step {
            id: paths.id.clone(),
            step: "create-pipeline-manifests".to_string(),
        };
        self.emit(&step, "Creating Pipeline", ProgressKind::Progress, true).await;

        for manifest in manifests {
            let data = match self
                .pipeline_service
                .load_data(setup, manifest, &paths.templates_dir)
            {
                Ok(data) => data,
                Err(err) => {
                    self.emit_error(
                        &step,
                        &err,
                        &format!("Error loading data from {} manifest", manifest.code),
                    )
                    .await;
                    return Err(());
                }
            };

            let repository = setup.application_name();
            self.emit(
                &step,
                &format!("Enabling pipelines on {repository} repository"),
                ProgressKind::Progress,
                false,
            )
            .await;
            if let Err(err) = self.git_host.enable_pipelines(repository).await {
                self.emit_error(
                    &step,
                    &err.into(),
                    &format!("Error enabling pipelines on {repository} repository"),
                )
                .await;
                return Err(());
            }

            self.emit(
                &step,
                &format!("Setting up variables on {repository} repository"),
                ProgressKind::Progress,
                false,
            )
            .await;
            let variables = self.pipeline_service.repository_variables(&data);
            if let Err(err) = self.git_host.set_repository_variables(repository, &variables).await
            {
                self.emit_error(
                    &step,
                    &err.into(),
                    &format!("Error setting up variables on {repository} repository"),
                )
                .await;
                return Err(());
            }

            for env in &setup.envs {
                self.emit(
                    &step,
                    &format!(
                        "Setting up variables on {repository} repository for {} environment",
                        env.env.code
                    ),
                    ProgressKind::Progress,
                    false,
                )
                .await;
            }
            let environments = self.pipeline_service.environment_variables(setup, &data);
            if let Err(err) = self
                .git_host
                .set_environment_variables(repository, &environments)
                .await
            {
                self.emit_error(
                    &step,
                    &err.into(),
                    &format!("Error setting up environments' variables on {repository} repository"),
                )
                .await;
                return Err(());
            }

            self.emit(&step, "Creating new branch for add pipeline files", ProgressKind::Progress, false)
                .await;
            let custom_branch = paths.custom_branch(&setup.slug, &manifest.code);
            self.new_branch_from_default(
                &step,
                &paths.application_dir,
                &paths.application_branch,
                &custom_branch,
            )
            .await?;

            self.emit(
                &step,
                &format!("Creating {} pipeline", manifest.code),
                ProgressKind::Progress,
                false,
            )
            .await;
            if let Err(err) = self.pipeline_service.setup_pipeline(
                setup,
                &data,
                &paths.templates_dir,
                &paths.application_dir,
            ) {
                self.emit_error(
                    &step,
                    &err,
                    &format!("Error creating pipeline from {} templates", manifest.code),
                )
                .await;
                return Err(());
            }

            let pr = PullRequest {
                step: &step,
                local_dir: &paths.application_dir,
                repository,
                target_branch: &paths.application_branch,
                actual_branch: custom_branch,
                message: "feat: add pipeline files [Setup Ci/CD Automation] [skip ci]".to_string(),
                title: "Create pipeline [Setup Ci/CD Automation] [skip ci]".to_string(),
                merge: true,
            };
            self.make_pr(&pr, true).await?;

            self.emit(
                &step,
                &format!(
                    "{}'s pipeline created for {}'s service",
                    manifest.code, setup.slug
                ),
                ProgressKind::Success,
                false,
            )
            .await;
        }
        Ok(())
    }

    async fn setup_wiki(
        &self,
        setup: &Setup,
        paths: &ProcessPaths,
        created: &CreatedData,
        manifests: &[Manifest],
    ) -> Result<Vec<String>, ()> {
        let step = Step {
            id: paths.id.clone(),
            step: "setup-wiki".to_string(),
        };
        self.emit(&step, "Creating Wiki", ProgressKind::Progress, true).await;

        let mut extra_data = Vec::new();
        for manifest in manifests {
            self.emit(
                &step,
                &format!(
                    "Creating {} wiki for {} using {} manifests",
                    manifest.label,
                    setup.application_name(),
                    manifest.code
                ),
                ProgressKind::Progress,
                false,
            )
            .await;
            let outcome = match self
                .wiki_service
                .load_data(setup, manifest, &paths.templates_dir)
            {
                Ok(data) => {
                    self.wiki_service
                        .setup_wiki(setup, created, &data, &paths.templates_dir)
                        .await
                }
                Err(err) => Err(err),
            };
            match outcome {
                Ok(lines) => extra_data.extend(lines),
                Err(err) => {
                    self.emit_error(
                        &step,
                        &err,
                        &format!("Error creating wiki with {} manifests", manifest.code),
                    )
                    .await;
                    return Err(());
                }
            }
            self.emit(
                &step,
                &format!(
                    "{}'s wiki created for {}'s service",
                    manifest.label,
                    setup.application_name()
                ),
                ProgressKind::Success,
                false,
            )
            .await;
        }
        Ok(extra_data)
    }

    async fn finish(&self, paths: &ProcessPaths, extra_data: Vec<String>, errored: bool) {
        let step = Step {
            id: paths.id.clone(),
            step: "finish-setup".to_string(),
        };
        let (kind, message) = if errored {
            (ProgressKind::Error, "Process finish with errors")
        } else {
            (ProgressKind::Success, "Process finish with success")
        };
        self.emit(&step, message, kind, true).await;
        for line in &extra_data {
            self.emit(&step, line, kind, false).await;
        }

        self.emit(&step, "Cleaning setup state", kind, false).await;
        if self.config.setup.cleanup_on_finish
            && let Err(err) = self.renderer.remove_dir(&paths.root_dir)
        {
            tracing::error!(%err, "failed to clean process root directory");
        }
        self.emit(&step, "Setup state cleaned", kind, false).await;

        tracing::debug!(id = %paths.id, "finishing process");
        if let Err(err) = self.store.mark_finished(&paths.id).await {
            tracing::error!(%err, "error marking process as finished");
        }
        self.bus.close(&paths.id);
        tracing::debug!(id = %paths.id, "processing finished");
    }

    // ── Shared protocols ─────────────────────────────────────────────

    /// Checkout the default branch, pull it, and create a fresh branch. A
    /// pull failure is reported but not fatal (a fresh clone is up to date).
    async fn new_branch_from_default(
        &self,
        step: &Step,
        path: &Path,
        default_branch: &str,
        new_branch: &str,
    ) -> Result<(), ()> {
        self.emit(
            step,
            &format!("Checking out default branch on {}", path.display()),
            ProgressKind::Progress,
            false,
        )
        .await;
        if let Err(err) = self.git.checkout(path, default_branch).await {
            self.emit_error(
                step,
                &err.into(),
                &format!("Error checking out default branch on {}", path.display()),
            )
            .await;
            return Err(());
        }

        self.emit(
            step,
            &format!("Pulling default branch on {}", path.display()),
            ProgressKind::Progress,
            false,
        )
        .await;
        if let Err(err) = self.git.pull(path, default_branch).await {
            self.emit_error(
                step,
                &err.into(),
                &format!("Error pulling default branch on {}", path.display()),
            )
            .await;
        }

        self.emit(
            step,
            &format!("Creating {} branch on {}", new_branch, path.display()),
            ProgressKind::Progress,
            false,
        )
        .await;
        if let Err(err) = self.git.branch(path, new_branch).await {
            self.emit_error(
                step,
                &err.into(),
                &format!("Error creating {} branch on {}", new_branch, path.display()),
            )
            .await;
            return Err(());
        }
        Ok(())
    }

    /// Commit, push, open a PR, and optionally merge it. Returns the PR's
    /// html URL when it is left open, empty otherwise.
    async fn make_pr(&self, pr: &PullRequest<'_>, commit: bool) -> Result<String, ()> {
        let has_changes = match self.git.has_changes(pr.local_dir).await {
            Ok(has_changes) => has_changes,
            Err(err) => {
                self.emit_error(
                    pr.step,
                    &err.into(),
                    &format!("Error checking changes on {}", pr.local_dir.display()),
                )
                .await;
                return Err(());
            }
        };
        if !has_changes {
            self.emit(
                pr.step,
                &format!("No changes on {}", pr.local_dir.display()),
                ProgressKind::Progress,
                false,
            )
            .await;
            return Ok(String::new());
        }

        if commit {
            self.emit(
                pr.step,
                &format!("Committing changes on {}", pr.local_dir.display()),
                ProgressKind::Progress,
                false,
            )
            .await;
            if let Err(err) = self.git.commit(pr.local_dir, &pr.message).await {
                self.emit_error(
                    pr.step,
                    &err.into(),
                    &format!("Error committing changes on {}", pr.local_dir.display()),
                )
                .await;
                return Err(());
            }
        }

        self.emit(
            pr.step,
            &format!("Pushing changes on {}", pr.local_dir.display()),
            ProgressKind::Progress,
            false,
        )
        .await;
        if let Err(err) = self.git.push(pr.local_dir, &pr.actual_branch).await {
            self.emit_error(
                pr.step,
                &err.into(),
                &format!("Error pushing changes on {}", pr.local_dir.display()),
            )
            .await;
            return Err(());
        }

        let created = match self
            .git_host
            .create_pull_request(
                pr.repository,
                &pr.actual_branch,
                pr.target_branch,
                &pr.title,
                &pr.message,
            )
            .await
        {
            Ok(created) => created,
            Err(err) => {
                self.emit_error(
                    pr.step,
                    &err.into(),
                    &format!("Error creating PR on {}", pr.repository),
                )
                .await;
                return Err(());
            }
        };

        if pr.merge {
            if let Err(err) = self.git_host.merge_pull_request(pr.repository, created.id).await {
                self.emit_error(
                    pr.step,
                    &err.into(),
                    &format!("Error merging PR on {}", pr.repository),
                )
                .await;
                return Err(());
            }
            return Ok(String::new());
        }
        Ok(created.html_url)
    }

    // ── Progress emission ────────────────────────────────────────────

    async fn emit(&self, step: &Step, message: &str, kind: ProgressKind, node: bool) {
        tracing::debug!(id = %step.id, step = %step.step, message, "update progress");
        let event = ProgressEvent::new(&step.step, message, kind, node);
        if let Ok(payload) = serde_json::to_vec(&event) {
            self.bus.broadcast(&step.id, &payload);
        }
        if let Err(err) = self.store.append(&step.id, &event).await {
            tracing::error!(%err, "failed to persist progress event");
        }
    }

    async fn emit_error(&self, step: &Step, err: &anyhow::Error, message: &str) {
        self.emit(step, message, ProgressKind::Error, false).await;
        self.emit(step, &format!("Error: {err}"), ProgressKind::Error, false).await;
    }
}

#[cfg(test)]
pub(crate) mod test_support;
