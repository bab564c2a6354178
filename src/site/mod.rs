//! Site metadata for request contexts and environment views.
//!
//! # Data Flow
//! ```text
//! [site] api_url / site_id / auth_token
//!     → ApiSiteProvider  (GET {api_url}/sites/{site_id})
//!     → OfflineSiteProvider (local URL only)
//!     → SiteMetadata { info, env }
//!     → RequestContext.site, EnvSources.remote
//! ```
//!
//! # Design Decisions
//! - Fetched once at startup; a failed fetch degrades to offline metadata
//! - Only dev-context values of remote variables are kept

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::schema::SiteConfig;

/// Site identity exposed to handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub url: String,
    pub account_slug: Option<String>,
}

/// Site identity plus remote environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteMetadata {
    pub info: SiteInfo,
    pub env: BTreeMap<String, String>,
}

impl SiteMetadata {
    /// Metadata when no remote site is linked.
    pub fn offline(local_url: &str, site_id: Option<String>) -> Self {
        Self {
            info: SiteInfo {
                id: site_id,
                name: None,
                url: local_url.to_string(),
                account_slug: None,
            },
            env: BTreeMap::new(),
        }
    }
}

/// Errors raised while fetching site metadata.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("site API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("site API returned status {status} for `{url}`")]
    Status { status: u16, url: String },

    #[error("invalid auth token header")]
    InvalidToken,
}

/// Source of site metadata.
#[async_trait]
pub trait SiteMetadataProvider: Send + Sync {
    async fn fetch(&self) -> Result<SiteMetadata, SiteError>;
}

/// Metadata without any remote lookup.
#[derive(Debug, Clone)]
pub struct OfflineSiteProvider {
    metadata: SiteMetadata,
}

impl OfflineSiteProvider {
    pub fn new(local_url: &str, site_id: Option<String>) -> Self {
        Self {
            metadata: SiteMetadata::offline(local_url, site_id),
        }
    }
}

#[async_trait]
impl SiteMetadataProvider for OfflineSiteProvider {
    async fn fetch(&self) -> Result<SiteMetadata, SiteError> {
        Ok(self.metadata.clone())
    }
}

/// Metadata from the platform API.
#[derive(Debug, Clone)]
pub struct ApiSiteProvider {
    client: reqwest::Client,
    api_url: String,
    site_id: String,
    token: String,
    local_url: String,
}

#[derive(Debug, Deserialize)]
struct SitePayload {
    id: Option<String>,
    name: Option<String>,
    ssl_url: Option<String>,
    url: Option<String>,
    account_slug: Option<String>,
    #[serde(default)]
    build_settings: BuildSettingsPayload,
}

#[derive(Debug, Default, Deserialize)]
struct BuildSettingsPayload {
    #[serde(default)]
    env: BTreeMap<String, serde_json::Value>,
}

impl ApiSiteProvider {
    pub fn new(api_url: &str, site_id: &str, token: &str, local_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            site_id: site_id.to_string(),
            token: token.to_string(),
            local_url: local_url.to_string(),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, SiteError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token)).map_err(|_| SiteError::InvalidToken)?,
        );
        let url = format!("{}/{}", self.api_url, path);
        let response = self.client.get(&url).headers(headers).send().await?;
        if !response.status().is_success() {
            return Err(SiteError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl SiteMetadataProvider for ApiSiteProvider {
    async fn fetch(&self) -> Result<SiteMetadata, SiteError> {
        let site: SitePayload = self.get(&format!("sites/{}", self.site_id)).await?.json().await?;

        let env = site
            .build_settings
            .env
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key, s)),
                serde_json::Value::Null => None,
                other => Some((key, other.to_string())),
            })
            .collect();

        tracing::info!(site_id = %self.site_id, "Fetched site metadata");
        Ok(SiteMetadata {
            info: SiteInfo {
                id: site.id.or_else(|| Some(self.site_id.clone())),
                name: site.name,
                url: site.ssl_url.or(site.url).unwrap_or_else(|| self.local_url.clone()),
                account_slug: site.account_slug,
            },
            env,
        })
    }
}

/// Pick a provider for the configuration.
///
/// The API provider needs a site id and a token; without them, or in
/// offline mode, metadata is local only.
pub fn provider_for(config: &SiteConfig, offline: bool, local_url: &str) -> Box<dyn SiteMetadataProvider> {
    match (&config.site_id, &config.auth_token) {
        (Some(site_id), Some(token)) if !offline => {
            Box::new(ApiSiteProvider::new(&config.api_url, site_id, token, local_url))
        }
        _ => Box::new(OfflineSiteProvider::new(local_url, config.site_id.clone())),
    }
}

/// Fetch metadata, degrading to offline metadata on failure.
pub async fn resolve_metadata(provider: &dyn SiteMetadataProvider, local_url: &str, site_id: Option<String>) -> SiteMetadata {
    match provider.fetch().await {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to fetch site metadata, continuing offline");
            SiteMetadata::offline(local_url, site_id)
        }
    }
}
