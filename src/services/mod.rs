//! Per-concern builders invoked by the orchestrator.
//!
//! Every service follows the same shape: `load_data` reads the manifest's
//! `config.yaml` under the templates bundle, deserializes it into a typed
//! config, applies the namespace/application-name pre-substitution to its
//! path fields, and bundles the default tag set. The `setup_*` operations
//! then drive the renderer and gateway primitives.

pub mod gitops;
pub mod pipeline;
pub mod registry;
pub mod secret;
pub mod wiki;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::catalog::Manifest;
use crate::domain::Setup;

/// Read and deserialize `<templates_root>/<manifest.dir>/config.yaml`.
fn read_manifest_config<T: DeserializeOwned>(
    templates_root: &Path,
    manifest: &Manifest,
) -> Result<T> {
    let path = manifest_file(templates_root, manifest, "config.yaml");
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn manifest_file(templates_root: &Path, manifest: &Manifest, name: &str) -> PathBuf {
    templates_root.join(&manifest.dir).join(name)
}

/// The pre-substitution applied to configuration-derived strings before any
/// rendering: literal `<namespace>` and `<applicationName>` tokens resolve to
/// the squad code and the application slug.
fn pre_substitute(value: &str, setup: &Setup) -> String {
    value
        .replace("<namespace>", &setup.squad.code)
        .replace("<applicationName>", &setup.slug)
}
