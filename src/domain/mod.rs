//! Core domain model: the setup entity, progress events, and shared value types.

pub mod progress;
pub mod setup;
pub mod tags;
pub mod types;

pub use progress::{ProgressEvent, ProgressKind};
pub use setup::{
    ApplicationInput, CreatedData, EnvSelection, EnvironmentCreated, IngressInput, Setup, SetupEnv,
    SetupRequest, slugify,
};
pub use tags::{Tag, default_tags};
pub use types::{
    FloatLimits, IntLimits, NumberRange, PathSpec, ResourceLimits, ResourceRange, format_cpu,
    format_memory,
};
