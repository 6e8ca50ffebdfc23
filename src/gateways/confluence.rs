//! Wiki gateway backed by the Confluence Cloud v2 pages API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::WikiConfig;
use crate::errors::GatewayError;

use super::{WikiApi, WikiPageRef};

const SERVICE: &str = "confluence";
const PAGE_LIMIT: u32 = 250;

pub struct ConfluenceApi {
    http: reqwest::Client,
    cfg: WikiConfig,
}

// ── Response shapes ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PageLinks {
    #[serde(default)]
    webui: String,
}

#[derive(Debug, Deserialize)]
struct PageResult {
    id: String,
    title: String,
    #[serde(default, rename = "parentId")]
    parent_id: Option<String>,
    #[serde(rename = "_links")]
    links: PageLinks,
}

#[derive(Debug, Default, Deserialize)]
struct ListLinks {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageListResponse {
    #[serde(default = "Vec::new")]
    results: Vec<PageResult>,
    #[serde(default, rename = "_links")]
    links: ListLinks,
}

#[derive(Debug, Deserialize)]
struct PageVersion {
    number: i64,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    id: String,
    #[serde(rename = "spaceId")]
    space_id: String,
    status: String,
    title: String,
    version: PageVersion,
    #[serde(rename = "_links")]
    links: PageLinks,
}

/// Pull the `cursor` query parameter out of a pagination link.
fn next_cursor(link: &str) -> Option<String> {
    let (_, query) = link.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("cursor="))
        .map(str::to_string)
}

impl ConfluenceApi {
    pub fn new(cfg: WikiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    fn api_url(&self, suffix: &str) -> String {
        format!("{}/wiki/api/v2{}", self.cfg.base_url, suffix)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let resp = builder
            .basic_auth(&self.cfg.user_name, Some(&self.cfg.token))
            .send()
            .await
            .map_err(|e| GatewayError::Api {
                service: SERVICE,
                detail: e.to_string(),
            })?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            service: SERVICE,
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, GatewayError> {
        resp.json().await.map_err(|e| GatewayError::Api {
            service: SERVICE,
            detail: e.to_string(),
        })
    }

    async fn get_page(&self, page_id: &str) -> Result<PageResponse, GatewayError> {
        let resp = self.send(self.http.get(self.api_url(&format!("/pages/{page_id}")))).await?;
        Self::decode(resp).await
    }
}

#[async_trait]
impl WikiApi for ConfluenceApi {
    async fn create_page(
        &self,
        title: &str,
        space_id: &str,
        parent_id: &str,
        content: &[u8],
    ) -> Result<String, GatewayError> {
        tracing::debug!(title, "creating wiki page");
        let body = serde_json::json!({
            "status": "current",
            "title": title,
            "spaceId": space_id,
            "parentId": parent_id,
            "body": {
                "representation": "storage",
                "value": String::from_utf8_lossy(content),
            },
        });
        let resp = self
            .send(self.http.post(self.api_url("/pages")).json(&body))
            .await?;
        let page: PageResponse = Self::decode(resp).await?;
        Ok(format!("{}/wiki{}", self.cfg.base_url, page.links.webui))
    }

    async fn list_sub_pages(
        &self,
        space_id: &str,
        parent_id: &str,
    ) -> Result<Vec<WikiPageRef>, GatewayError> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut req = self
                .http
                .get(self.api_url(&format!("/spaces/{space_id}/pages")))
                .query(&[
                    ("limit", PAGE_LIMIT.to_string()),
                    ("sort", "title".to_string()),
                    ("status", "current".to_string()),
                ]);
            if let Some(cursor) = &cursor {
                req = req.query(&[("cursor", cursor)]);
            }
            let resp = self.send(req).await?;
            let list: PageListResponse = Self::decode(resp).await?;
            for result in list.results {
                if result.parent_id.as_deref() == Some(parent_id) {
                    pages.push(WikiPageRef {
                        id: result.id,
                        title: result.title,
                        link: format!("/wiki{}", result.links.webui),
                    });
                }
            }
            match list.links.next.as_deref().and_then(next_cursor) {
                Some(next) => cursor = Some(next),
                None => return Ok(pages),
            }
        }
    }

    async fn update_page(
        &self,
        page_id: &str,
        content: &[u8],
        message: &str,
    ) -> Result<(), GatewayError> {
        let page = self.get_page(page_id).await?;
        let body = serde_json::json!({
            "id": page.id,
            "spaceId": page.space_id,
            "status": page.status,
            "title": page.title,
            "body": {
                "representation": "storage",
                "value": String::from_utf8_lossy(content),
            },
            "version": {
                "number": page.version.number + 1,
                "message": message,
            },
        });
        self.send(
            self.http
                .put(self.api_url(&format!("/pages/{page_id}")))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
