//! Compiled-in catalog data for this release.

use crate::domain::types::{NumberRange, PathSpec, ResourceRange};

use super::{
    ApplicationDefaults, Environment, IngressDefaults, Manifest, ManifestKind, Squad, Template,
};

fn manifest(code: &str, label: &str, kind: ManifestKind, dir: &str) -> Manifest {
    Manifest {
        code: code.to_string(),
        label: label.to_string(),
        kind,
        dir: dir.to_string(),
    }
}

fn shared_manifests() -> Vec<Manifest> {
    vec![
        manifest(
            "aws-ecr",
            "Aws ECR",
            ManifestKind::Registry,
            "manifests/registry/aws-ecr",
        ),
        manifest(
            "argo-cd",
            "Argo manifests",
            ManifestKind::GitOps,
            "manifests/git-ops/argo-cd",
        ),
    ]
}

pub(super) fn templates() -> Vec<Template> {
    let mut spring_manifests = shared_manifests();
    spring_manifests.push(manifest(
        "bitbucket-pipelines",
        "Bitbucket pipelines",
        ManifestKind::Pipeline,
        "manifests/pipeline/bitbucket-pipelines/spring-boot",
    ));
    let mut react_manifests = shared_manifests();
    react_manifests.push(manifest(
        "bitbucket-pipelines",
        "Bitbucket pipelines",
        ManifestKind::Pipeline,
        "manifests/pipeline/bitbucket-pipelines/react-js",
    ));

    vec![
        Template {
            code: "spring-boot".to_string(),
            label: "SpringBoot".to_string(),
            application_defaults: ApplicationDefaults {
                root_path: PathSpec {
                    default: "/{applicationName}".to_string(),
                    customizable: true,
                    ..PathSpec::default()
                },
                health_check_path: PathSpec {
                    default: "/{applicationName}/actuator/health".to_string(),
                    customizable: true,
                    ..PathSpec::default()
                },
                port: 8080,
                memory: ResourceRange {
                    min: NumberRange {
                        value: 256.0,
                        step: 128.0,
                        min: 128.0,
                        max: 2048.0,
                    },
                    max: NumberRange {
                        value: 512.0,
                        step: 128.0,
                        min: 128.0,
                        max: 4096.0,
                    },
                },
                cpu: ResourceRange {
                    min: NumberRange {
                        value: 0.05,
                        step: 0.01,
                        min: 0.01,
                        max: 2.0,
                    },
                    max: NumberRange {
                        value: 0.3,
                        step: 0.1,
                        min: 0.1,
                        max: 4.0,
                    },
                },
                health_check_initial_delay_seconds: 120,
                health_check_second_delay_seconds: 180,
                health_check_period_seconds: 30,
            },
            ingress_defaults: IngressDefaults {
                enabled: true,
                host: PathSpec {
                    fixed: "gw.<environment>.tempoassist.cloud".to_string(),
                    customizable: false,
                    ..PathSpec::default()
                },
                path: PathSpec {
                    fixed: "/{squadName}/".to_string(),
                    default: "{applicationName}".to_string(),
                    customizable: true,
                },
                authentication: true,
                frontend: false,
            },
            manifests: spring_manifests,
        },
        Template {
            code: "react-js".to_string(),
            label: "ReactJs".to_string(),
            application_defaults: ApplicationDefaults {
                root_path: PathSpec {
                    default: "/".to_string(),
                    customizable: true,
                    ..PathSpec::default()
                },
                health_check_path: PathSpec {
                    default: "/health".to_string(),
                    customizable: true,
                    ..PathSpec::default()
                },
                port: 3000,
                memory: ResourceRange {
                    min: NumberRange {
                        value: 64.0,
                        step: 64.0,
                        min: 64.0,
                        max: 512.0,
                    },
                    max: NumberRange {
                        value: 128.0,
                        step: 64.0,
                        min: 64.0,
                        max: 1024.0,
                    },
                },
                cpu: ResourceRange {
                    min: NumberRange {
                        value: 0.01,
                        step: 0.01,
                        min: 0.01,
                        max: 0.5,
                    },
                    max: NumberRange {
                        value: 0.1,
                        step: 0.01,
                        min: 0.1,
                        max: 1.0,
                    },
                },
                ..ApplicationDefaults::default()
            },
            ingress_defaults: IngressDefaults {
                enabled: true,
                host: PathSpec {
                    fixed: ".<environment>.tempoassist.cloud".to_string(),
                    default: "{applicationName}".to_string(),
                    customizable: true,
                },
                path: PathSpec {
                    fixed: "/".to_string(),
                    customizable: false,
                    ..PathSpec::default()
                },
                authentication: false,
                frontend: true,
            },
            manifests: react_manifests,
        },
    ]
}

pub(super) fn environments() -> Vec<Environment> {
    let small = ResourceRange {
        min: NumberRange {
            value: 1.0,
            step: 1.0,
            min: 1.0,
            max: 2.0,
        },
        max: NumberRange {
            value: 1.0,
            step: 1.0,
            min: 1.0,
            max: 2.0,
        },
    };
    vec![
        Environment {
            code: "qa".to_string(),
            label: "Quality Assurance".to_string(),
            accent_color: "orange".to_string(),
            default_active: true,
            default_replicas: small,
            concurrences: vec!["dev".to_string()],
            require_approval: false,
            destination_cluster: "qa".to_string(),
            project: "qa".to_string(),
            secrets_path: "qa".to_string(),
        },
        Environment {
            code: "dev".to_string(),
            label: "Development".to_string(),
            accent_color: "blue".to_string(),
            default_active: false,
            default_replicas: small,
            concurrences: vec!["qa".to_string()],
            require_approval: false,
            destination_cluster: "dev".to_string(),
            project: "dev".to_string(),
            secrets_path: "qa".to_string(),
        },
        Environment {
            code: "hml".to_string(),
            label: "Homologation".to_string(),
            accent_color: "green".to_string(),
            default_active: true,
            default_replicas: ResourceRange {
                min: NumberRange {
                    value: 1.0,
                    step: 1.0,
                    min: 1.0,
                    max: 5.0,
                },
                max: NumberRange {
                    value: 1.0,
                    step: 1.0,
                    min: 1.0,
                    max: 5.0,
                },
            },
            concurrences: vec![],
            require_approval: true,
            destination_cluster: "hml".to_string(),
            project: "hml".to_string(),
            secrets_path: "hml".to_string(),
        },
        Environment {
            code: "prd".to_string(),
            label: "Production".to_string(),
            accent_color: "red".to_string(),
            default_active: true,
            default_replicas: ResourceRange {
                min: NumberRange {
                    value: 2.0,
                    step: 1.0,
                    min: 1.0,
                    max: 20.0,
                },
                max: NumberRange {
                    value: 4.0,
                    step: 1.0,
                    min: 1.0,
                    max: 20.0,
                },
            },
            concurrences: vec![],
            require_approval: true,
            destination_cluster: "PRD".to_string(),
            project: "prd".to_string(),
            secrets_path: "prd".to_string(),
        },
    ]
}

pub(super) fn squads() -> Vec<Squad> {
    [
        ("atendimento", "Atendimento"),
        ("cca", "CCA"),
        ("cco", "CCO"),
        ("cd", "CD"),
        ("devops", "Devops"),
        ("erp-prestadores", "Erp Prestadores"),
        ("mms", "MMS"),
        ("processamento", "Processamento"),
        ("rpa", "RPA"),
    ]
    .into_iter()
    .map(|(code, label)| Squad {
        code: code.to_string(),
        label: label.to_string(),
    })
    .collect()
}

pub(super) fn default_manifests() -> Vec<Manifest> {
    vec![
        manifest(
            "confluence",
            "Confluence Wiki",
            ManifestKind::Wiki,
            "manifests/wiki/confluence",
        ),
        manifest(
            "vault-kv-v2",
            "Vault kv v2",
            ManifestKind::Secret,
            "manifests/secret/vault-kv-v2",
        ),
    ]
}
