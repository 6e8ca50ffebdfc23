//! Typed error hierarchy for the slipway backend.
//!
//! Four top-level types cover the four failure classes:
//! - `InputError` — structured per-field validation failures, surfaced as 400s
//! - `CatalogError` — unresolved catalog codes, folded into `InputError`s
//! - `GatewayError` — failures from external collaborators (git, registry, vault, wiki)
//! - `RenderError` — template-parse and file-I/O failures during rendering
//!
//! Workflow steps propagate `GatewayError`/`RenderError` through `anyhow` and
//! surface them as `error` progress events; they never reach HTTP clients.

use thiserror::Error;

/// A structured validation failure for a single input field.
///
/// `input` is the dotted path of the offending field
/// (e.g. `env.hml.replicas.max`, `application.resources.cpu.min`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{input}: {}", messages.join("; "))]
pub struct InputError {
    pub input: String,
    pub messages: Vec<String>,
}

impl InputError {
    pub fn new(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            messages: vec![message.into()],
        }
    }
}

/// An unresolved code in one of the read-only catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("template not found")]
    TemplateNotFound,

    #[error("environment not found")]
    EnvironmentNotFound,

    #[error("squad not found")]
    SquadNotFound,
}

/// A failure returned by an external gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A subprocess could not be spawned at all.
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A subprocess ran and failed; `detail` joins stderr and exit status.
    #[error("{action}: {detail}")]
    Command { action: String, detail: String },

    /// An API request could not be sent or its response not decoded.
    #[error("{service} request failed: {detail}")]
    Api { service: &'static str, detail: String },

    /// An API responded with a non-success status.
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
}

/// A template-rendering or filesystem failure.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("error {action}: {source}")]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error rendering {path}: {detail}")]
    Template { path: String, detail: String },
}
