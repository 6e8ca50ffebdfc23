//! Workflow test harness: in-memory progress store, fake gateways, and a
//! complete on-disk template bundle, wired into a real orchestrator.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::config::{
    Config, CorsConfig, GitConfig, GitProtocol, HttpConfig, RedisConfig, SecretStoreConfig,
    SetupConfig, WikiConfig, WsConfig,
};
use crate::domain::{SetupRequest, Tag};
use crate::errors::GatewayError;
use crate::gateways::{
    CreatedPullRequest, EnvironmentVariables, GitCli, GitHostApi, RegistryApi, RegistrySpec,
    RepoVariable, SecretsApi, WikiApi, WikiPageRef,
};
use crate::progress::MemoryProgressStore;
use crate::progress::bus::MessageBus;
use crate::render::Renderer;

use super::Orchestrator;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nowhere,
    Push,
    Secrets,
}

// ── Fake gateways ────────────────────────────────────────────────────

pub struct FakeGit {
    bundle: PathBuf,
    templates_repository: String,
    fail_push: bool,
    pub clones: Mutex<Vec<String>>,
    pub branches: Mutex<Vec<(PathBuf, String)>>,
}

#[async_trait]
impl GitCli for FakeGit {
    async fn clone_repository(
        &self,
        repository: &str,
        _branch: &str,
        path: &Path,
    ) -> Result<(), GatewayError> {
        self.clones.lock().unwrap().push(repository.to_string());
        std::fs::create_dir_all(path).unwrap();
        if repository == self.templates_repository {
            Renderer::new().copy_dir(&self.bundle, path).unwrap();
        }
        Ok(())
    }

    async fn checkout(&self, _path: &Path, _branch: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn branch(&self, path: &Path, branch: &str) -> Result<(), GatewayError> {
        self.branches
            .lock()
            .unwrap()
            .push((path.to_path_buf(), branch.to_string()));
        Ok(())
    }

    async fn commit(&self, _path: &Path, _message: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn push(&self, _path: &Path, branch: &str) -> Result<(), GatewayError> {
        if self.fail_push {
            return Err(GatewayError::Command {
                action: format!("pushing changes to {branch} branch"),
                detail: "remote: rejected\nexit status: 1".to_string(),
            });
        }
        Ok(())
    }

    async fn pull(&self, _path: &Path, _branch: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn has_changes(&self, _path: &Path) -> Result<bool, GatewayError> {
        Ok(true)
    }
}

#[derive(Default)]
pub struct FakeGitHost {
    next_id: AtomicU64,
    pub created: Mutex<Vec<(u64, String, String)>>,
    pub merged: Mutex<Vec<String>>,
    pub pipelines_enabled: Mutex<Vec<String>>,
    pub repo_variables: Mutex<Vec<(String, Vec<RepoVariable>)>>,
    pub env_variables: Mutex<Vec<(String, Vec<EnvironmentVariables>)>>,
}

impl FakeGitHost {
    /// Titles of PRs created but never merged.
    pub fn open_pr_titles(&self) -> Vec<String> {
        let merged = self.merged.lock().unwrap();
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, title)| !merged.contains(title))
            .map(|(_, _, title)| title.clone())
            .collect()
    }
}

#[async_trait]
impl GitHostApi for FakeGitHost {
    async fn create_pull_request(
        &self,
        repository: &str,
        _source_branch: &str,
        _destination_branch: &str,
        title: &str,
        _description: &str,
    ) -> Result<CreatedPullRequest, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.created
            .lock()
            .unwrap()
            .push((id, repository.to_string(), title.to_string()));
        Ok(CreatedPullRequest {
            id,
            html_url: format!("https://bitbucket.org/tempo/{repository}/pull-requests/{id}"),
        })
    }

    async fn merge_pull_request(&self, _repository: &str, id: u64) -> Result<(), GatewayError> {
        let title = self
            .created
            .lock()
            .unwrap()
            .iter()
            .find(|(pr_id, _, _)| *pr_id == id)
            .map(|(_, _, title)| title.clone())
            .unwrap_or_default();
        self.merged.lock().unwrap().push(title);
        Ok(())
    }

    async fn enable_pipelines(&self, repository: &str) -> Result<(), GatewayError> {
        self.pipelines_enabled
            .lock()
            .unwrap()
            .push(repository.to_string());
        Ok(())
    }

    async fn set_repository_variables(
        &self,
        repository: &str,
        variables: &[RepoVariable],
    ) -> Result<(), GatewayError> {
        self.repo_variables
            .lock()
            .unwrap()
            .push((repository.to_string(), variables.to_vec()));
        Ok(())
    }

    async fn set_environment_variables(
        &self,
        repository: &str,
        environments: &[EnvironmentVariables],
    ) -> Result<(), GatewayError> {
        self.env_variables
            .lock()
            .unwrap()
            .push((repository.to_string(), environments.to_vec()));
        Ok(())
    }
}

pub struct FakeRegistry;

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn create(
        &self,
        name: &str,
        _policy: &str,
        spec: &RegistrySpec,
        _tags: &[Tag],
    ) -> Result<String, GatewayError> {
        Ok(format!(
            "{}.dkr.ecr.{}.amazonaws.com/{name}",
            spec.registry_id, spec.region
        ))
    }
}

pub struct FakeSecrets {
    fail: bool,
    pub created: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SecretsApi for FakeSecrets {
    async fn create_blank(&self, location: &str, path: &str) -> Result<(), GatewayError> {
        if self.fail {
            return Err(GatewayError::Api {
                service: "vault",
                detail: "permission denied".to_string(),
            });
        }
        self.created
            .lock()
            .unwrap()
            .push((location.to_string(), path.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeWiki {
    pub pages: Mutex<Vec<String>>,
}

#[async_trait]
impl WikiApi for FakeWiki {
    async fn create_page(
        &self,
        title: &str,
        _space_id: &str,
        _parent_id: &str,
        _content: &[u8],
    ) -> Result<String, GatewayError> {
        self.pages.lock().unwrap().push(title.to_string());
        Ok(format!(
            "https://wiki.example.com/wiki/spaces/DEV/pages/{}",
            self.pages.lock().unwrap().len()
        ))
    }

    async fn list_sub_pages(
        &self,
        _space_id: &str,
        _parent_id: &str,
    ) -> Result<Vec<WikiPageRef>, GatewayError> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, title)| WikiPageRef {
                id: i.to_string(),
                title: title.clone(),
                link: format!("/wiki/x/{i}"),
            })
            .collect())
    }

    async fn update_page(
        &self,
        _page_id: &str,
        _content: &[u8],
        _message: &str,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

// ── Request and bundle fixtures ──────────────────────────────────────

/// The spring-boot onboarding request used across workflow tests.
pub fn sample_request() -> SetupRequest {
    serde_json::from_value(serde_json::json!({
        "template": "spring-boot",
        "squad": "cd",
        "envs": [
            {"code": "qa", "replicas": {"min": 1, "max": 2}},
            {"code": "hml", "replicas": {"min": 1, "max": 2}}
        ],
        "manifests": ["aws-ecr", "argo-cd", "bitbucket-pipelines"],
        "application": {
            "name": "Orders Svc",
            "rootPath": "/orders",
            "healthCheckPath": "/orders/actuator/health",
            "port": 8080,
            "resources": {
                "cpu": {"min": 0.05, "max": 0.3},
                "memory": {"min": 256, "max": 512}
            }
        },
        "ingress": {"customHost": "", "customPath": "orders", "authentication": true}
    }))
    .unwrap()
}

/// Write a complete template bundle covering all five manifest kinds.
fn write_bundle(root: &Path) {
    let write = |rel: &str, contents: &str| {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    };

    write(
        "manifests/registry/aws-ecr/config.yaml",
        "region: sa-east-1\nregistryId: \"123456789012\"\nimageScanningConfiguration:\n  scanOnPush: true\n",
    );
    write(
        "manifests/registry/aws-ecr/policy.json",
        r#"{"Version": "2012-10-17", "Statement": []}"#,
    );

    write(
        "manifests/git-ops/argo-cd/config.yaml",
        "k8sBaseTemplatesPath: k8s/base-utilities\n\
         k8sBaseDestinationPath: utilities/base\n\
         k8sNamespaceUtilitiesTemplatesPath: k8s/namespace-utilities\n\
         k8sNamespaceUtilitiesDestinationPath: utilities/<namespace>\n\
         k8sApplicationTemplatesPath: k8s/application\n\
         k8sApplicationDestinationPath: k8s/<namespace>/<applicationName>\n\
         k8sConfigMapTemplatesPath: k8s/config-map\n\
         k8sConfigMapDestinationPath: config/<namespace>/<applicationName>\n\
         gitOpsKustomizationTemplatePath: git-ops/kustomization.yaml\n\
         gitOpsAppTemplatesPath: git-ops/application.yaml\n\
         gitOpsAppNamespaceUtilitiesTemplatesPath: git-ops/_base.yaml\n\
         gitOpsBaseDestinationPath: apps/<environment>\n",
    );
    write("k8s/base-utilities/limits.yaml", "kind: LimitRange\n");
    write("k8s/namespace-utilities/quota.yaml", "namespace: {{ .Namespace }}\n");
    write(
        "k8s/application/base/deployment.yaml",
        "app: {{ .ApplicationName }}\ncpu: {{ .ApplicationCpuLimit }}\n",
    );
    write(
        "k8s/application/overlays/overlay/ingress.yaml",
        "host: {{ .IngressHost }}\npath: {{ .IngressPath }}\nreplicas: {{ .ApplicationMaxReplicas }}\n",
    );
    write("k8s/config-map/overlay/config.yaml", "ns: {{ .Namespace }}\n");
    write("git-ops/kustomization.yaml", "resources:\n");
    write(
        "git-ops/application.yaml",
        "name: {{ .ApplicationName }}\ncluster: {{ .DestinationCluster }}\n",
    );
    write("git-ops/_base.yaml", "utilities: {{ .K8sNamespaceUtilitiesPath }}\n");

    write(
        "manifests/pipeline/bitbucket-pipelines/spring-boot/config.yaml",
        "templatesPath: pipeline/templates\n\
         destinationPath: pipelines\n\
         initialPipeline: build\n\
         defaultVariables:\n\
           - name: IMAGE_NAME\n\
             value: <applicationName>\n\
         environments:\n\
           qa:\n\
             variables:\n\
               - name: NAMESPACE\n\
                 value: <namespace>\n",
    );
    write(
        "pipeline/templates/bitbucket-pipelines.yml",
        "image: builder\n{{#each DefaultVariables}}# {{name}}={{value}}\n{{/each}}",
    );

    write(
        "manifests/secret/vault-kv-v2/config.yaml",
        "rootPath: <environmentMountPath>\nsecretPath: <namespace>/<applicationName>\n",
    );

    write(
        "manifests/wiki/confluence/config.yaml",
        "templatePagePath: wiki/services-index.html\n\
         templateServicePath: wiki/service-page.html\n\
         spaceId: \"99\"\n\
         servicesPageId: \"55\"\n\
         servicesPageTitle: Services\n",
    );
    write(
        "wiki/service-page.html",
        "<h1>{{ .ApplicationName }}</h1><p>{{ .RegistryUrl }}</p>",
    );
    write(
        "wiki/services-index.html",
        "<ul>{{#each Pages}}<li>{{title}}</li>{{/each}}</ul>",
    );
}

fn test_config(tmp: &Path) -> Config {
    let dir = |name: &str| {
        tmp.join("{{process-id}}")
            .join(name)
            .to_string_lossy()
            .to_string()
    };
    Config {
        log_level: "debug".to_string(),
        http: HttpConfig {
            path: "api".to_string(),
            port: 0,
        },
        websocket: WsConfig {
            read_buffer_size: 1024,
            write_buffer_size: 1024,
            handshake_timeout: Duration::ZERO,
        },
        redis: RedisConfig {
            addr: "localhost:6379".to_string(),
            password: String::new(),
            db: 0,
        },
        cors: CorsConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allowed_methods: vec!["*".to_string()],
            allow_headers: vec!["*".to_string()],
            expose_headers: vec!["Content-Length".to_string()],
            allow_credentials: false,
            max_age: Duration::from_secs(43_200),
        },
        setup: SetupConfig {
            root_destinations_path: tmp.join("{{process-id}}").to_string_lossy().to_string(),
            templates_repository: "devportal-templates".to_string(),
            templates_repository_branch: "develop".to_string(),
            templates_destination_dir: dir("templates"),
            git_ops_repository: "git-ops".to_string(),
            git_ops_repository_branch: "develop".to_string(),
            git_ops_destination_dir: dir("git-ops"),
            git_ops_tools_repository: "git-ops-tools".to_string(),
            git_ops_tools_repository_branch: "develop".to_string(),
            git_ops_tools_destination_dir: dir("git-ops-tools"),
            default_image_name: "tempocloud/template-api".to_string(),
            default_image_tag: "latest".to_string(),
            external_config_map: false,
            config_map_repository: "config-maps".to_string(),
            config_map_repository_branch: "develop".to_string(),
            config_map_destination_dir: dir("config-maps"),
            application_main_branch: "master".to_string(),
            application_destination_dir: dir("application"),
            cleanup_on_finish: false,
        },
        git: GitConfig {
            host: "bitbucket.org".to_string(),
            user_name: "devportal".to_string(),
            token: "token".to_string(),
            project: "tempo".to_string(),
            protocol: GitProtocol::Https,
        },
        wiki: WikiConfig {
            base_url: "https://wiki.example.com".to_string(),
            user_name: "devportal".to_string(),
            token: "token".to_string(),
        },
        secret: SecretStoreConfig {
            base_url: "https://vault.internal:8200".to_string(),
            user_name: "devportal".to_string(),
            token: "token".to_string(),
        },
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<MemoryProgressStore>,
    pub bus: Arc<MessageBus>,
    pub git: Arc<FakeGit>,
    pub git_host: Arc<FakeGitHost>,
    pub secrets: Arc<FakeSecrets>,
    pub wiki: Arc<FakeWiki>,
    _tmp: tempfile::TempDir,
}

impl Harness {
    pub async fn new(fail_at: FailAt) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = tmp.path().join("bundle");
        write_bundle(&bundle);

        let config = Arc::new(test_config(&tmp.path().join("work")));
        let store = Arc::new(MemoryProgressStore::new());
        let bus = Arc::new(MessageBus::new());
        let git = Arc::new(FakeGit {
            bundle,
            templates_repository: config.setup.templates_repository.clone(),
            fail_push: fail_at == FailAt::Push,
            clones: Mutex::new(vec![]),
            branches: Mutex::new(vec![]),
        });
        let git_host = Arc::new(FakeGitHost::default());
        let secrets = Arc::new(FakeSecrets {
            fail: fail_at == FailAt::Secrets,
            created: Mutex::new(vec![]),
        });
        let wiki = Arc::new(FakeWiki::default());

        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            Arc::new(Catalog::builtin()),
            bus.clone(),
            store.clone(),
            git.clone(),
            git_host.clone(),
            Arc::new(FakeRegistry),
            secrets.clone(),
            wiki.clone(),
        ));
        Self {
            config,
            orchestrator,
            store,
            bus,
            git,
            git_host,
            secrets,
            wiki,
            _tmp: tmp,
        }
    }
}
