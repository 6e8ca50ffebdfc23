//! Container registry gateway backed by AWS ECR.

use async_trait::async_trait;
use aws_sdk_ecr::config::Region;
use aws_sdk_ecr::types::{ImageScanningConfiguration, Tag as EcrTag};

use crate::domain::Tag;
use crate::errors::GatewayError;

use super::{RegistryApi, RegistrySpec};

pub struct EcrApi {
    base: aws_config::SdkConfig,
}

impl EcrApi {
    /// Build from the ambient AWS credential chain.
    pub async fn from_env() -> Self {
        Self {
            base: aws_config::load_from_env().await,
        }
    }

    /// The manifest config names the region per registry, so the client is
    /// derived per call instead of fixed at construction.
    fn client(&self, region: &str) -> aws_sdk_ecr::Client {
        let conf = aws_sdk_ecr::config::Builder::from(&self.base)
            .region(Region::new(region.to_string()))
            .build();
        aws_sdk_ecr::Client::from_conf(conf)
    }
}

fn registry_url(registry_id: &str, region: &str, name: &str) -> String {
    format!("{registry_id}.dkr.ecr.{region}.amazonaws.com/{name}")
}

#[async_trait]
impl RegistryApi for EcrApi {
    async fn create(
        &self,
        name: &str,
        policy: &str,
        spec: &RegistrySpec,
        tags: &[Tag],
    ) -> Result<String, GatewayError> {
        let client = self.client(&spec.region);
        let ecr_tags: Vec<EcrTag> = tags
            .iter()
            .map(|t| EcrTag::builder().key(&t.key).value(&t.value).build())
            .collect::<Result<_, _>>()
            .map_err(|err| GatewayError::Api {
                service: "ecr",
                detail: err.to_string(),
            })?;

        let created = client
            .create_repository()
            .repository_name(name)
            .registry_id(&spec.registry_id)
            .image_scanning_configuration(
                ImageScanningConfiguration::builder()
                    .scan_on_push(spec.scan_on_push)
                    .build(),
            )
            .set_tags(Some(ecr_tags))
            .send()
            .await;

        match created {
            Ok(output) => {
                tracing::info!(name, repository = ?output.repository, "repository created");
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_repository_already_exists_exception() {
                    tracing::info!(name, "repository already exists");
                } else {
                    return Err(GatewayError::Api {
                        service: "ecr",
                        detail: service_err.to_string(),
                    });
                }
            }
        }

        // The policy is (re)applied even when the repository pre-existed.
        client
            .set_repository_policy()
            .repository_name(name)
            .registry_id(&spec.registry_id)
            .policy_text(policy)
            .force(false)
            .send()
            .await
            .map_err(|err| GatewayError::Api {
                service: "ecr",
                detail: err.into_service_error().to_string(),
            })?;
        tracing::info!(name, "repository policy set");

        Ok(registry_url(&spec.registry_id, &spec.region, name))
    }
}
