//! Git host gateway backed by the Bitbucket Cloud 2.0 REST API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GitConfig;
use crate::errors::GatewayError;

use super::{CreatedPullRequest, EnvironmentVariables, GitHostApi, RepoVariable};

const DEFAULT_BASE_URL: &str = "https://api.bitbucket.org/2.0";
const SERVICE: &str = "bitbucket";

pub struct BitbucketApi {
    http: reqwest::Client,
    cfg: GitConfig,
    base_url: String,
}

// ── Response shapes ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PrLinks {
    html: PrLink,
}

#[derive(Debug, Deserialize)]
struct PrLink {
    href: String,
}

#[derive(Debug, Deserialize)]
struct PrResponse {
    id: u64,
    links: PrLinks,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct VariableRow {
    uuid: String,
    key: String,
    /// Secured variables come back without a value.
    value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EnvironmentRow {
    uuid: String,
    name: String,
}

// ── Sync planning ────────────────────────────────────────────────────

/// Decide which existing variables must be deleted and which desired ones
/// must be (re)created. Equal key+value pairs are left alone; a differing or
/// unreadable value is replaced.
fn plan_variable_sync(
    existing: &[VariableRow],
    desired: &[RepoVariable],
) -> (Vec<String>, Vec<RepoVariable>) {
    let mut to_delete = Vec::new();
    let mut to_add = Vec::new();
    for var in desired {
        match existing.iter().find(|row| row.key == var.key) {
            Some(row) if row.value.as_deref() == Some(var.value.as_str()) => {
                tracing::debug!(key = %var.key, "variable already up to date, skipping");
            }
            Some(row) => {
                to_delete.push(row.uuid.clone());
                to_add.push(var.clone());
            }
            None => to_add.push(var.clone()),
        }
    }
    (to_delete, to_add)
}

/// Environments to remove (present remotely, absent from the input) and to
/// create (requested but missing remotely).
fn plan_environment_sync(
    existing: &[EnvironmentRow],
    desired: &[EnvironmentVariables],
) -> (Vec<String>, Vec<String>) {
    let to_remove = existing
        .iter()
        .filter(|row| !desired.iter().any(|d| d.name == row.name))
        .map(|row| row.uuid.clone())
        .collect();
    let to_create = desired
        .iter()
        .filter(|d| !existing.iter().any(|row| row.name == d.name))
        .map(|d| d.name.clone())
        .collect();
    (to_remove, to_create)
}

// ── Adapter ──────────────────────────────────────────────────────────

impl BitbucketApi {
    pub fn new(cfg: GitConfig) -> Self {
        Self::with_base_url(cfg, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(cfg: GitConfig, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
            base_url: base_url.into(),
        }
    }

    fn repo_url(&self, repository: &str, suffix: &str) -> String {
        format!(
            "{}/repositories/{}{}",
            self.base_url,
            self.cfg.repository_path(repository),
            suffix
        )
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.cfg.user_name, Some(&self.cfg.token))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            service: SERVICE,
            status: status.as_u16(),
            body,
        })
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let resp = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| GatewayError::Api {
                service: SERVICE,
                detail: e.to_string(),
            })?;
        Self::check(resp).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, GatewayError> {
        resp.json().await.map_err(|e| GatewayError::Api {
            service: SERVICE,
            detail: e.to_string(),
        })
    }

    /// Follow `next` links until the collection is exhausted.
    async fn get_all<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> Result<Vec<T>, GatewayError> {
        let mut values = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next {
            let resp = self.send(self.http.get(&url)).await?;
            let page: Page<T> = Self::decode(resp).await?;
            values.extend(page.values);
            next = page.next;
        }
        Ok(values)
    }

    async fn delete_environment(&self, repository: &str, uuid: &str) -> Result<(), GatewayError> {
        tracing::debug!(repository, uuid, "removing deployment environment");
        self.send(
            self.http
                .delete(self.repo_url(repository, &format!("/environments/{uuid}"))),
        )
        .await?;
        Ok(())
    }

    async fn sync_environment_variables(
        &self,
        repository: &str,
        env_uuid: &str,
        variables: &[RepoVariable],
    ) -> Result<(), GatewayError> {
        let base = self.repo_url(
            repository,
            &format!("/deployments_config/environments/{env_uuid}/variables"),
        );
        let existing: Vec<VariableRow> = self.get_all(base.clone()).await?;
        let (to_delete, to_add) = plan_variable_sync(&existing, variables);
        for uuid in to_delete {
            self.send(self.http.delete(format!("{base}/{uuid}"))).await?;
        }
        for var in to_add {
            self.send(self.http.post(&base).json(&serde_json::json!({
                "key": var.key,
                "value": var.value,
                "secured": var.secure,
            })))
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl GitHostApi for BitbucketApi {
    async fn create_pull_request(
        &self,
        repository: &str,
        source_branch: &str,
        destination_branch: &str,
        title: &str,
        description: &str,
    ) -> Result<CreatedPullRequest, GatewayError> {
        let body = serde_json::json!({
            "title": title,
            "description": description,
            "close_source_branch": true,
            "source": {"branch": {"name": source_branch}},
            "destination": {"branch": {"name": destination_branch}},
        });
        let resp = self
            .send(self.http.post(self.repo_url(repository, "/pullrequests")).json(&body))
            .await?;
        let pr: PrResponse = Self::decode(resp).await?;
        tracing::debug!(repository, id = pr.id, "pull request created");
        Ok(CreatedPullRequest {
            id: pr.id,
            html_url: pr.links.html.href,
        })
    }

    async fn merge_pull_request(&self, repository: &str, id: u64) -> Result<(), GatewayError> {
        self.send(
            self.http
                .post(self.repo_url(repository, &format!("/pullrequests/{id}/merge")))
                .json(&serde_json::json!({"close_source_branch": true})),
        )
        .await?;
        tracing::debug!(repository, id, "pull request merged");
        Ok(())
    }

    async fn enable_pipelines(&self, repository: &str) -> Result<(), GatewayError> {
        tracing::debug!(repository, "enabling pipelines");
        self.send(
            self.http
                .put(self.repo_url(repository, "/pipelines_config"))
                .json(&serde_json::json!({"enabled": true})),
        )
        .await?;
        Ok(())
    }

    async fn set_repository_variables(
        &self,
        repository: &str,
        variables: &[RepoVariable],
    ) -> Result<(), GatewayError> {
        let base = self.repo_url(repository, "/pipelines_config/variables/");
        let existing: Vec<VariableRow> = self.get_all(base.clone()).await?;
        let (to_delete, to_add) = plan_variable_sync(&existing, variables);
        for uuid in to_delete {
            self.send(self.http.delete(format!("{base}{uuid}"))).await?;
        }
        for var in to_add {
            self.send(self.http.post(&base).json(&serde_json::json!({
                "key": var.key,
                "value": var.value,
                "secured": var.secure,
            })))
            .await?;
        }
        Ok(())
    }

    async fn set_environment_variables(
        &self,
        repository: &str,
        environments: &[EnvironmentVariables],
    ) -> Result<(), GatewayError> {
        let base = self.repo_url(repository, "/environments/");
        let existing: Vec<EnvironmentRow> = self.get_all(base.clone()).await?;

        let (to_remove, to_create) = plan_environment_sync(&existing, environments);
        for uuid in &to_remove {
            self.delete_environment(repository, uuid).await?;
        }

        let mut uuids: Vec<(String, String)> = existing
            .iter()
            .filter(|row| environments.iter().any(|d| d.name == row.name))
            .map(|row| (row.name.clone(), row.uuid.clone()))
            .collect();
        for name in to_create {
            let resp = self
                .send(self.http.post(&base).json(&serde_json::json!({"name": name})))
                .await?;
            let created: EnvironmentRow = Self::decode(resp).await?;
            uuids.push((created.name, created.uuid));
        }

        for env in environments {
            let Some((_, uuid)) = uuids.iter().find(|(name, _)| name == &env.name) else {
                continue;
            };
            self.sync_environment_variables(repository, uuid, &env.variables)
                .await?;
        }
        Ok(())
    }
}
