//! Container registry access for tag listing.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{PreflightError, Result};

const DOCKER_HUB: &str = "docker.io";
const DOCKER_HUB_API: &str = "registry-1.docker.io";

/// A parsed `registry/repository[:tag][@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(PreflightError::Config("image reference is empty".to_string()));
        }

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (reference, None),
        };

        let (name, tag) = match name.rfind(':') {
            Some(idx) if !name[idx..].contains('/') => {
                (&name[..idx], Some(name[idx + 1..].to_string()))
            }
            _ => (name, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            Some(_) => (DOCKER_HUB.to_string(), name.to_string()),
            None => (DOCKER_HUB.to_string(), format!("library/{name}")),
        };

        if repository.is_empty() || tag.as_deref() == Some("") {
            return Err(PreflightError::Config(format!(
                "invalid image reference {reference}"
            )));
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Host serving the registry v2 API.
    pub fn api_host(&self) -> &str {
        if self.registry == DOCKER_HUB {
            DOCKER_HUB_API
        } else {
            &self.registry
        }
    }
}

/// Credentials from a Docker `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuth>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DockerAuth {
    #[serde(default)]
    auth: Option<String>,
}

impl DockerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            PreflightError::io(format!("could not read docker config {}", path.display()), e)
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PreflightError::parse("malformed docker config", e))
    }

    /// Base64 `user:password` for a registry, if configured.
    pub fn basic_auth(&self, registry: &str) -> Option<&str> {
        let mut candidates = vec![
            registry.to_string(),
            format!("https://{registry}"),
            format!("https://{registry}/v1/"),
        ];
        if registry == DOCKER_HUB {
            candidates.push("https://index.docker.io/v1/".to_string());
        }
        candidates
            .iter()
            .find_map(|key| self.auths.get(key))
            .and_then(|entry| entry.auth.as_deref())
    }
}

/// Lists tags for a repository.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn list_tags(&self, image: &ImageReference) -> anyhow::Result<Vec<String>>;
}

/// [`RegistryClient`] speaking the registry v2 HTTP API.
pub struct HttpRegistryClient {
    http: reqwest::Client,
    credentials: DockerConfig,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl HttpRegistryClient {
    pub fn new(credentials: DockerConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("preflight/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, credentials })
    }

    async fn bearer_token(
        &self,
        challenge: &str,
        image: &ImageReference,
    ) -> anyhow::Result<String> {
        let params = parse_bearer_challenge(challenge)
            .ok_or_else(|| anyhow::anyhow!("unsupported auth challenge: {}", challenge))?;
        let realm = params
            .get("realm")
            .ok_or_else(|| anyhow::anyhow!("auth challenge has no realm"))?;

        let scope = params
            .get("scope")
            .cloned()
            .unwrap_or_else(|| format!("repository:{}:pull", image.repository));
        let mut query = vec![("scope", scope)];
        if let Some(service) = params.get("service") {
            query.push(("service", service.clone()));
        }

        let mut request = self.http.get(realm.as_str()).query(&query);
        if let Some(auth) = self.credentials.basic_auth(&image.registry) {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Basic {auth}"));
        }
        let response: TokenResponse = request.send().await?.error_for_status()?.json().await?;
        response
            .token
            .or(response.access_token)
            .ok_or_else(|| anyhow::anyhow!("token endpoint returned no token"))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn list_tags(&self, image: &ImageReference) -> anyhow::Result<Vec<String>> {
        let url = format!("https://{}/v2/{}/tags/list", image.api_host(), image.repository);
        debug!(%url, "listing repository tags");

        let mut request = self.http.get(&url);
        if let Some(auth) = self.credentials.basic_auth(&image.registry) {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Basic {auth}"));
        }
        let mut response = request.send().await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let token = self.bearer_token(&challenge, image).await?;
            response = self.http.get(&url).bearer_auth(token).send().await?;
        }

        let list: TagList = response.error_for_status()?.json().await?;
        Ok(list.tags.unwrap_or_default())
    }
}

/// Parse `Bearer realm="...",service="...",scope="..."`.
fn parse_bearer_challenge(header: &str) -> Option<HashMap<String, String>> {
    let rest = header.trim().strip_prefix("Bearer ")?;
    let mut params = HashMap::new();
    let mut remaining = rest.trim();
    while !remaining.is_empty() {
        let (key, after_key) = remaining.split_once('=')?;
        let after_key = after_key.trim_start();
        let (value, after_value) = if let Some(quoted) = after_key.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            }
        };
        params.insert(key.trim().to_string(), value.to_string());
        remaining = after_value.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }
    Some(params)
}
