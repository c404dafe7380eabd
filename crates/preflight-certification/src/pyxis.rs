//! Pyxis certification API client.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default Pyxis API host.
pub const DEFAULT_PYXIS_HOST: &str = "catalog.redhat.com/api/containers";

/// A certified image known to Pyxis.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CertifiedImage {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub uncompressed_top_layer_id: Option<String>,
}

/// Queries the certification backend.
#[async_trait]
pub trait CertificationApi: Send + Sync {
    /// Certified images whose top layer is one of `layer_ids`.
    async fn certified_images_containing_layers(
        &self,
        layer_ids: &[String],
    ) -> anyhow::Result<Vec<CertifiedImage>>;
}

/// [`CertificationApi`] backed by the Pyxis REST API.
pub struct PyxisClient {
    host: String,
    api_token: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ImageList {
    #[serde(default)]
    data: Vec<CertifiedImage>,
}

impl PyxisClient {
    pub fn new(host: impl Into<String>, api_token: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("preflight/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            host: host.into(),
            api_token: api_token.into(),
            http,
        })
    }

    pub(crate) fn images_url(&self) -> String {
        format!("https://{}/v1/images", self.host.trim_end_matches('/'))
    }
}

pub(crate) fn layer_filter(layer_ids: &[String]) -> String {
    format!("uncompressed_top_layer_id=in=({})", layer_ids.join(","))
}

#[async_trait]
impl CertificationApi for PyxisClient {
    async fn certified_images_containing_layers(
        &self,
        layer_ids: &[String],
    ) -> anyhow::Result<Vec<CertifiedImage>> {
        if layer_ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.images_url();
        debug!(%url, layers = layer_ids.len(), "querying pyxis for certified images");

        let mut request = self
            .http
            .get(&url)
            .query(&[("filter", layer_filter(layer_ids))]);
        if !self.api_token.is_empty() {
            request = request.header("X-API-KEY", &self.api_token);
        }

        let list: ImageList = request.send().await?.error_for_status()?.json().await?;
        Ok(list.data)
    }
}
