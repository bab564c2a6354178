//! Request context shared by every invocation of one request.

use serde::Serialize;

use crate::conditions::{Identity, RequestFacts};
use crate::edge::env::EnvViews;
use crate::site::SiteInfo;

/// Deploy the request is served from. Always the local dev deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployInfo {
    pub context: String,
    pub id: String,
    pub published: bool,
}

impl Default for DeployInfo {
    fn default() -> Self {
        Self {
            context: "dev".to_string(),
            id: "0".to_string(),
            published: false,
        }
    }
}

/// Resolved location of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Geo {
    pub country: String,
}

/// Read-mostly per-request value serialized for the sandbox.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub request_id: String,
    pub identity: Option<Identity>,
    pub geo: Geo,
    pub deploy: DeployInfo,
    pub site: SiteInfo,
    pub env: EnvViews,
}

impl RequestContext {
    pub fn new(request_id: String, facts: &RequestFacts, site: SiteInfo, env: EnvViews) -> Self {
        Self {
            request_id,
            identity: facts.identity.clone(),
            geo: Geo {
                country: facts.country.clone(),
            },
            deploy: DeployInfo::default(),
            site,
            env,
        }
    }
}
