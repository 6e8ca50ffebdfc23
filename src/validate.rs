//! Pure validation of a resolved setup against its template and environment
//! defaults. Checks run independently and every failure is collected, so the
//! client sees all field errors at once.

use crate::domain::{Setup, SetupEnv, format_cpu, format_memory};
use crate::errors::InputError;

pub fn validate_setup(setup: &Setup) -> Vec<InputError> {
    let mut errors = Vec::new();
    if setup.envs.is_empty() {
        errors.push(InputError::new("envs", "envs cannot be empty"));
    }
    for env in &setup.envs {
        if let Some(err) = check_env_concurrency(&env.env.code, &setup.envs) {
            errors.push(err);
        }
        errors.extend(check_env_replicas(env));
    }
    for manifest in &setup.manifests {
        let offered = setup
            .template
            .manifests
            .iter()
            .any(|m| m.code == manifest.code);
        if !offered {
            errors.push(InputError::new(
                format!("manifests.{}", manifest.code),
                "template does not have this manifest",
            ));
        }
    }
    errors.extend(check_resources(setup));
    errors.extend(check_application(setup));
    errors.extend(check_ingress(setup));
    errors
}

fn check_env_concurrency(code: &str, envs: &[SetupEnv]) -> Option<InputError> {
    for other in envs {
        if other.env.concurrences.iter().any(|c| c == code) {
            return Some(InputError::new(
                format!("env.{code}"),
                format!(
                    "this env cannot be used in concurrency with {} env",
                    other.env.code
                ),
            ));
        }
    }
    None
}

fn check_env_replicas(env: &SetupEnv) -> Vec<InputError> {
    let mut errors = Vec::new();
    let code = &env.env.code;
    if env.replicas.min > env.replicas.max {
        errors.push(InputError::new(
            format!("env.{code}.replicas.min"),
            "min cannot be greater than max",
        ));
    }
    let min_limit = env.env.default_replicas.min.min as i32;
    let max_limit = env.env.default_replicas.max.max as i32;
    if env.replicas.min < min_limit {
        errors.push(InputError::new(
            format!("env.{code}.replicas.min"),
            format!("min cannot be less than {min_limit}"),
        ));
    }
    if env.replicas.max > max_limit {
        errors.push(InputError::new(
            format!("env.{code}.replicas.max"),
            format!("max cannot be greater than {max_limit}"),
        ));
    }
    errors
}

fn check_resources(setup: &Setup) -> Vec<InputError> {
    let mut errors = Vec::new();
    let requested = &setup.application.resources;
    let defaults = &setup.template.application_defaults;

    if requested.cpu.min > requested.cpu.max {
        errors.push(InputError::new(
            "application.resources.cpu.min",
            "min cannot be greater than max",
        ));
    }
    if requested.cpu.min < defaults.cpu.min.min {
        errors.push(InputError::new(
            "application.resources.cpu.min",
            format!("min cannot be less than {}", format_cpu(defaults.cpu.min.min)),
        ));
    }
    if requested.cpu.max > defaults.cpu.max.max {
        errors.push(InputError::new(
            "application.resources.cpu.max",
            format!("max cannot be greater than {}", format_cpu(defaults.cpu.max.max)),
        ));
    }

    if requested.memory.min > requested.memory.max {
        errors.push(InputError::new(
            "application.resources.memory.min",
            "min cannot be greater than max",
        ));
    }
    if requested.memory.min < defaults.memory.min.min {
        errors.push(InputError::new(
            "application.resources.memory.min",
            format!(
                "min cannot be less than {}",
                format_memory(defaults.memory.min.min)
            ),
        ));
    }
    if requested.memory.max > defaults.memory.max.max {
        errors.push(InputError::new(
            "application.resources.memory.max",
            format!(
                "max cannot be greater than {}",
                format_memory(defaults.memory.max.max)
            ),
        ));
    }
    errors
}

fn check_application(setup: &Setup) -> Vec<InputError> {
    let mut errors = Vec::new();
    if setup.application.name.is_empty() {
        errors.push(InputError::new("application.name", "name cannot be empty"));
    }
    if setup.application.root_path.trim_matches('/').is_empty() {
        errors.push(InputError::new(
            "application.rootPath",
            "root path cannot be empty",
        ));
    }
    if setup.application.health_check_path.trim_matches('/').is_empty() {
        errors.push(InputError::new(
            "application.healthCheckPath",
            "health check path cannot be empty",
        ));
    }
    if setup.application.port < 0 || setup.application.port > 65535 {
        errors.push(InputError::new(
            "application.port",
            "port must be between 0 and 65535",
        ));
    }
    errors
}

fn check_ingress(setup: &Setup) -> Vec<InputError> {
    let mut errors = Vec::new();
    let ingress = &setup.template.ingress_defaults;
    if setup.ingress_custom_host().is_empty() && ingress.host.customizable {
        errors.push(InputError::new(
            "ingress.customHost",
            "ingress host cannot be empty",
        ));
    }
    // With a customizable host the path is part of it; skip the path check.
    if ingress.host.customizable {
        return errors;
    }
    if setup.ingress_custom_path().is_empty() && ingress.path.customizable {
        errors.push(InputError::new(
            "ingress.customPath",
            "ingress path cannot be empty",
        ));
    }
    errors
}
