//! Capability contracts for the external systems a setup touches, plus the
//! production adapters behind them.
//!
//! The orchestrator and domain services only see these traits; tests swap in
//! in-memory fakes.

pub mod bitbucket;
pub mod confluence;
pub mod ecr;
pub mod git;
pub mod vault;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Tag;
use crate::errors::GatewayError;

// ── Shared gateway types ─────────────────────────────────────────────

/// A repository-level pipeline variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoVariable {
    pub key: String,
    pub value: String,
    pub secure: bool,
}

/// A deployment environment and the variables it should end up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentVariables {
    pub name: String,
    pub variables: Vec<RepoVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPullRequest {
    pub id: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiPageRef {
    pub id: String,
    pub title: String,
    pub link: String,
}

/// Parameters for creating a container-registry repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySpec {
    pub region: String,
    pub registry_id: String,
    pub scan_on_push: bool,
}

// ── Contracts ────────────────────────────────────────────────────────

/// The local git command line.
#[async_trait]
pub trait GitCli: Send + Sync {
    /// Clone a repository (by catalog name; the adapter derives the URL) on
    /// the given branch into `path`.
    async fn clone_repository(
        &self,
        repository: &str,
        branch: &str,
        path: &Path,
    ) -> Result<(), GatewayError>;

    async fn checkout(&self, path: &Path, branch: &str) -> Result<(), GatewayError>;

    /// Create a branch and switch to it.
    async fn branch(&self, path: &Path, branch: &str) -> Result<(), GatewayError>;

    /// Stage everything and commit; silently skips when nothing is staged.
    async fn commit(&self, path: &Path, message: &str) -> Result<(), GatewayError>;

    async fn push(&self, path: &Path, branch: &str) -> Result<(), GatewayError>;

    async fn pull(&self, path: &Path, branch: &str) -> Result<(), GatewayError>;

    async fn has_changes(&self, path: &Path) -> Result<bool, GatewayError>;
}

/// The git hosting provider's management API.
#[async_trait]
pub trait GitHostApi: Send + Sync {
    async fn create_pull_request(
        &self,
        repository: &str,
        source_branch: &str,
        destination_branch: &str,
        title: &str,
        description: &str,
    ) -> Result<CreatedPullRequest, GatewayError>;

    async fn merge_pull_request(&self, repository: &str, id: u64) -> Result<(), GatewayError>;

    async fn enable_pipelines(&self, repository: &str) -> Result<(), GatewayError>;

    /// Upsert semantics: an existing variable with an equal value is skipped;
    /// a differing value is replaced; missing variables are created.
    async fn set_repository_variables(
        &self,
        repository: &str,
        variables: &[RepoVariable],
    ) -> Result<(), GatewayError>;

    /// Diff-sync semantics: environments absent from the input are deleted,
    /// missing ones are created, and per-environment variables are upserted.
    async fn set_environment_variables(
        &self,
        repository: &str,
        environments: &[EnvironmentVariables],
    ) -> Result<(), GatewayError>;
}

/// The container registry's management API.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Create a repository (an existing one is success), always apply the
    /// policy, and return the canonical registry URL.
    async fn create(
        &self,
        name: &str,
        policy: &str,
        spec: &RegistrySpec,
        tags: &[Tag],
    ) -> Result<String, GatewayError>;
}

/// The secrets vault.
#[async_trait]
pub trait SecretsApi: Send + Sync {
    /// Create an empty secret at `(location, path)`; never overwrites an
    /// existing one.
    async fn create_blank(&self, location: &str, path: &str) -> Result<(), GatewayError>;
}

/// The wiki's page API.
#[async_trait]
pub trait WikiApi: Send + Sync {
    async fn create_page(
        &self,
        title: &str,
        space_id: &str,
        parent_id: &str,
        content: &[u8],
    ) -> Result<String, GatewayError>;

    /// Direct children of `parent_id`, unioned across all result pages.
    async fn list_sub_pages(
        &self,
        space_id: &str,
        parent_id: &str,
    ) -> Result<Vec<WikiPageRef>, GatewayError>;

    async fn update_page(
        &self,
        page_id: &str,
        content: &[u8],
        message: &str,
    ) -> Result<(), GatewayError>;
}
