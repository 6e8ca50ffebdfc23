//! Read-only catalogs: templates, environments, squads, and the default
//! manifest set.
//!
//! This release compiles the catalog data in (see [`builtin`]); the accessor
//! surface is the seam where a persistent store can be swapped in later.

mod builtin;

use serde::{Deserialize, Serialize};

use crate::domain::types::{PathSpec, ResourceRange};
use crate::errors::CatalogError;

// ── Catalog entities ─────────────────────────────────────────────────

/// The closed set of manifest kinds the orchestrator dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ManifestKind {
    GitOps,
    Pipeline,
    Registry,
    Wiki,
    Secret,
}

/// A named, typed bundle of templates + config under the templates repo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub code: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ManifestKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dir: String,
}

/// Application defaults carried by a template: suggested paths, port,
/// resource bounds, and probe timings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDefaults {
    pub root_path: PathSpec,
    pub health_check_path: PathSpec,
    pub port: i32,
    pub memory: ResourceRange,
    pub cpu: ResourceRange,
    /// readiness probe
    pub health_check_initial_delay_seconds: i32,
    /// liveness probe
    pub health_check_second_delay_seconds: i32,
    /// both probes
    pub health_check_period_seconds: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressDefaults {
    pub enabled: bool,
    pub host: PathSpec,
    pub path: PathSpec,
    pub authentication: bool,
    pub frontend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub code: String,
    pub label: String,
    pub application_defaults: ApplicationDefaults,
    pub ingress_defaults: IngressDefaults,
    pub manifests: Vec<Manifest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub code: String,
    pub label: String,
    pub accent_color: String,
    pub default_active: bool,
    pub default_replicas: ResourceRange,
    /// Codes of environments this one cannot be selected together with.
    pub concurrences: Vec<String>,
    pub require_approval: bool,
    pub destination_cluster: String,
    pub project: String,
    pub secrets_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Squad {
    pub code: String,
    pub label: String,
}

// ── Catalog store ────────────────────────────────────────────────────

pub struct Catalog {
    templates: Vec<Template>,
    environments: Vec<Environment>,
    squads: Vec<Squad>,
    default_manifests: Vec<Manifest>,
}

impl Catalog {
    /// The compiled-in catalog for this release.
    pub fn builtin() -> Self {
        Self {
            templates: builtin::templates(),
            environments: builtin::environments(),
            squads: builtin::squads(),
            default_manifests: builtin::default_manifests(),
        }
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    pub fn squads(&self) -> &[Squad] {
        &self.squads
    }

    /// Manifests included in every setup regardless of template.
    pub fn default_manifests(&self) -> &[Manifest] {
        &self.default_manifests
    }

    pub fn template(&self, code: &str) -> Result<&Template, CatalogError> {
        self.templates
            .iter()
            .find(|t| t.code == code)
            .ok_or(CatalogError::TemplateNotFound)
    }

    pub fn environment(&self, code: &str) -> Result<&Environment, CatalogError> {
        self.environments
            .iter()
            .find(|e| e.code == code)
            .ok_or(CatalogError::EnvironmentNotFound)
    }

    pub fn squad(&self, code: &str) -> Result<&Squad, CatalogError> {
        self.squads
            .iter()
            .find(|s| s.code == code)
            .ok_or(CatalogError::SquadNotFound)
    }
}
