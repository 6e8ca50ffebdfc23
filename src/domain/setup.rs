//! The setup entity: an immutable, validated description of one onboarding
//! request, plus the mutable [`CreatedData`] bag collecting workflow outputs.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{Environment, Manifest, Squad, Template};

use super::types::{IntLimits, ResourceLimits};

// ── Input DTO ────────────────────────────────────────────────────────

/// The request body of `POST /ci-cd/setup`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetupRequest {
    pub template: String,
    pub envs: Vec<EnvSelection>,
    pub manifests: Vec<String>,
    pub squad: String,
    pub application: ApplicationInput,
    pub ingress: IngressInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnvSelection {
    pub code: String,
    pub replicas: IntLimits,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationInput {
    pub name: String,
    pub root_path: String,
    pub health_check_path: String,
    pub resources: ResourceLimits,
    pub port: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressInput {
    pub custom_host: String,
    pub custom_path: String,
    pub authentication: bool,
}

// ── Setup entity ─────────────────────────────────────────────────────

/// A selected environment with its requested replica range.
#[derive(Debug, Clone)]
pub struct SetupEnv {
    pub env: Environment,
    pub replicas: IntLimits,
}

/// The resolved setup entity. Immutable after construction; workflow outputs
/// accumulate in a separate [`CreatedData`] passed alongside it.
#[derive(Debug, Clone)]
pub struct Setup {
    pub id: String,
    pub template: Template,
    pub envs: Vec<SetupEnv>,
    pub manifests: Vec<Manifest>,
    pub squad: Squad,
    pub slug: String,
    pub application: ApplicationInput,
    pub ingress: IngressInput,
}

static SLUG_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9-]").expect("slug pattern"));

/// Derive the URL/DNS-safe identifier from an application name: spaces and
/// underscores map to dashes, the result is lowercased, and every remaining
/// character outside `[a-z0-9-]` is stripped. No trimming is applied.
pub fn slugify(name: &str) -> String {
    let slug = name.replace([' ', '_'], "-").to_lowercase();
    SLUG_STRIP.replace_all(&slug, "").into_owned()
}

impl Setup {
    pub fn new(
        id: impl Into<String>,
        template: Template,
        envs: Vec<SetupEnv>,
        manifests: Vec<Manifest>,
        squad: Squad,
        application: ApplicationInput,
        ingress: IngressInput,
    ) -> Self {
        let slug = slugify(&application.name);
        Self {
            id: id.into(),
            template,
            envs,
            manifests,
            squad,
            slug,
            application,
            ingress,
        }
    }

    pub fn application_name(&self) -> &str {
        &self.application.name
    }

    /// The application root path, normalized to a single leading slash.
    pub fn application_root_path(&self) -> String {
        format!("/{}", self.application.root_path.trim_matches('/'))
    }

    /// The health check path, normalized to a single leading slash.
    pub fn application_health_check_path(&self) -> String {
        format!("/{}", self.application.health_check_path.trim_matches('/'))
    }

    pub fn ingress_custom_host(&self) -> &str {
        self.ingress.custom_host.trim_matches('/')
    }

    pub fn ingress_custom_path(&self) -> &str {
        self.ingress.custom_path.trim_matches('/')
    }

    /// Whether the ingress should strip the matched path prefix before
    /// forwarding. Frontend templates never strip; a backend keeps its prefix
    /// when the root path's first segment already equals the custom path.
    pub fn ingress_strip_path(&self) -> bool {
        if self.template.ingress_defaults.frontend {
            return false;
        }
        let root = self.application.root_path.trim_matches('/');
        if let Some(first) = root.split('/').next()
            && first == self.ingress.custom_path.trim_matches('/')
        {
            return false;
        }
        true
    }

    /// The ingress host for one environment: custom host (if any) followed by
    /// the template's fixed host, with common tokens substituted.
    pub fn ingress_host(&self, env_code: &str) -> String {
        let mut host = String::new();
        if !self.ingress_custom_host().is_empty() {
            host.push_str(self.ingress_custom_host());
        }
        host.push_str(self.template.ingress_defaults.host.fixed.trim_matches('/'));
        self.replace_common_tokens(&host, env_code)
    }

    /// The ingress path for one environment: the template's fixed path plus
    /// the custom path, with common tokens substituted.
    pub fn ingress_path(&self, env_code: &str) -> String {
        let mut path = format!(
            "/{}",
            self.template.ingress_defaults.path.fixed.trim_matches('/')
        );
        if !self.ingress_custom_path().is_empty() {
            path.push('/');
            path.push_str(self.ingress_custom_path());
        }
        self.replace_common_tokens(&path, env_code)
    }

    pub fn ingress_full(&self, env_code: &str) -> String {
        format!("{}{}", self.ingress_host(env_code), self.ingress_path(env_code))
    }

    /// Substitute every recognized spelling of the environment, squad,
    /// namespace, and application-name tokens in a configured value.
    pub fn replace_common_tokens(&self, value: &str, env_code: &str) -> String {
        let mut value = value.to_string();
        for (name, replacement) in [
            ("environment", env_code),
            ("squadName", self.squad.code.as_str()),
            ("namespace", self.squad.code.as_str()),
            ("applicationName", self.slug.as_str()),
        ] {
            value = value
                .replace(&format!("<{name}>"), replacement)
                .replace(&format!("{{{name}}}"), replacement)
                .replace(&format!("{{{{{name}}}}}"), replacement)
                .replace(&format!("{{{{.{}}}}}", upper_first(name)), replacement);
        }
        value
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ── Workflow outputs ─────────────────────────────────────────────────

/// Per-environment output recorded while rendering k8s manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentCreated {
    pub label: String,
    pub code: String,
    pub url: String,
    pub application_name: String,
}

/// The per-workflow output bag, populated by successive steps and consumed
/// by later ones (e.g. the registry URL feeds the wiki page).
#[derive(Debug, Clone, Default)]
pub struct CreatedData {
    pub registry_url: String,
    pub environments: Vec<EnvironmentCreated>,
    pub git_ops_path: String,
    pub config_map_path: String,
}

// ── Test fixtures ────────────────────────────────────────────────────

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::catalog::Catalog;
    use crate::domain::types::FloatLimits;

    /// A resolved spring-boot setup for the `cd` squad on qa + hml, matching
    /// the catalog's builtin data.
    pub fn sample_setup(catalog: &Catalog) -> Setup {
        let template = catalog.template("spring-boot").unwrap().clone();
        let envs = vec![
            SetupEnv {
                env: catalog.environment("qa").unwrap().clone(),
                replicas: IntLimits { min: 1, max: 2 },
            },
            SetupEnv {
                env: catalog.environment("hml").unwrap().clone(),
                replicas: IntLimits { min: 1, max: 2 },
            },
        ];
        let manifests = template.manifests.clone();
        Setup::new(
            "01234567-89ab-cdef-0123-456789abcdef",
            template,
            envs,
            manifests,
            catalog.squad("cd").unwrap().clone(),
            ApplicationInput {
                name: "Orders Svc".to_string(),
                root_path: "/orders".to_string(),
                health_check_path: "/orders/actuator/health".to_string(),
                resources: ResourceLimits {
                    cpu: FloatLimits { min: 0.05, max: 0.3 },
                    memory: FloatLimits {
                        min: 256.0,
                        max: 512.0,
                    },
                },
                port: 8080,
            },
            IngressInput {
                custom_host: String::new(),
                custom_path: "orders".to_string(),
                authentication: true,
            },
        )
    }
}
