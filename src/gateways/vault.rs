//! Secrets gateway backed by HashiCorp Vault's KV v2 HTTP API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SecretStoreConfig;
use crate::errors::GatewayError;

use super::SecretsApi;

const SERVICE: &str = "vault";

pub struct VaultApi {
    http: reqwest::Client,
    cfg: SecretStoreConfig,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: String,
}

impl VaultApi {
    pub fn new(cfg: SecretStoreConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    /// Userpass login; a fresh token is obtained before every operation so a
    /// long-lived workflow never runs into lease expiry.
    async fn login(&self) -> Result<String, GatewayError> {
        let url = format!(
            "{}/v1/auth/userpass/login/{}",
            self.cfg.base_url, self.cfg.user_name
        );
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({"password": self.cfg.token}))
            .send()
            .await
            .map_err(|e| GatewayError::Api {
                service: SERVICE,
                detail: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }
        let login: LoginResponse = resp.json().await.map_err(|e| GatewayError::Api {
            service: SERVICE,
            detail: e.to_string(),
        })?;
        Ok(login.auth.client_token)
    }

    fn data_url(&self, location: &str, path: &str) -> String {
        format!("{}/v1/{}/data/{}", self.cfg.base_url, location, path)
    }
}

#[async_trait]
impl SecretsApi for VaultApi {
    async fn create_blank(&self, location: &str, path: &str) -> Result<(), GatewayError> {
        let token = self.login().await?;
        let url = self.data_url(location, path);

        let existing = self
            .http
            .get(&url)
            .header("X-Vault-Token", &token)
            .send()
            .await
            .map_err(|e| GatewayError::Api {
                service: SERVICE,
                detail: e.to_string(),
            })?;
        match existing.status() {
            status if status.is_success() => {
                tracing::info!(location, path, "secret already exists, skipping");
                return Ok(());
            }
            reqwest::StatusCode::NOT_FOUND => {}
            status => {
                let body = existing.text().await.unwrap_or_default();
                return Err(GatewayError::Status {
                    service: SERVICE,
                    status: status.as_u16(),
                    body,
                });
            }
        }

        let resp = self
            .http
            .post(&url)
            .header("X-Vault-Token", &token)
            .json(&serde_json::json!({"data": {}}))
            .send()
            .await
            .map_err(|e| GatewayError::Api {
                service: SERVICE,
                detail: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
