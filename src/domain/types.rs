//! Shared value objects used by the catalog, the input DTO, and rendering.

use serde::{Deserialize, Serialize};

/// A numeric field with a default value, an increment step, and hard bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberRange {
    pub value: f32,
    pub step: f32,
    pub min: f32,
    pub max: f32,
}

/// A min/max pair of [`NumberRange`]s (e.g. replica or resource defaults).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRange {
    pub min: NumberRange,
    pub max: NumberRange,
}

/// A path (or host) that may carry a fixed part, a suggested default, and a
/// flag telling the frontend whether the user may override it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSpec {
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub fixed: String,
    #[serde(default)]
    pub customizable: bool,
}

/// Integer min/max limits, used for replica counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntLimits {
    pub min: i32,
    pub max: i32,
}

/// Float min/max limits, used for cpu/memory requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FloatLimits {
    pub min: f32,
    pub max: f32,
}

/// Requested cpu and memory limits for an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: FloatLimits,
    pub memory: FloatLimits,
}

/// Format a cpu quantity the way it appears in k8s manifests:
/// below one core as millicores, otherwise with two decimals.
pub fn format_cpu(cpu: f32) -> String {
    if cpu < 1.0 {
        format!("{}m", (cpu * 1000.0) as i32)
    } else {
        format!("{:.2}", cpu)
    }
}

/// Format a memory quantity (in Mi) the way it appears in k8s manifests:
/// below 1024 as whole Mi, otherwise as Gi with two decimals.
pub fn format_memory(memory: f32) -> String {
    if memory < 1024.0 {
        format!("{}Mi", memory as i32)
    } else {
        format!("{:.2}Gi", memory / 1024.0)
    }
}
