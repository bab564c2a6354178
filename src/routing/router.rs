//! Request routing through the configured pipeline.
//!
//! # Responsibilities
//! - Build the request context once per request
//! - Pin one registry snapshot for the whole request
//! - Run the pipeline stages in configured order
//! - Bound rewrite hops and map routing failures to responses
//!
//! # Design Decisions
//! - Immutable after construction; cloned cheaply into every request
//! - Redirect rewrites continue with the following stages and cost no hop
//! - Edge function rewrites restart the pipeline and cost one hop
//! - Explicit 404 when no stage produced a response

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::conditions::{ConditionEvaluator, CountryResolver, IdentityDecoder, RequestFacts};
use crate::config::schema::{DevConfig, Stage};
use crate::edge::cancel::Cancellation;
use crate::edge::chain::{resolve_chain, ChainParts, ChainState, Downstream};
use crate::edge::context::RequestContext;
use crate::edge::env::{EnvSources, EnvViews};
use crate::edge::sandbox::Sandbox;
use crate::http::request::{clone_request, request_host, request_id, retarget, rewrite_path};
use crate::http::{response, EdgeRequest, EdgeResponse};
use crate::observability::metrics;
use crate::origin::{Origin, OriginError};
use crate::redirects::{RedirectDecision, RedirectRequest};
use crate::registry::{Registry, RegistryHandle};
use crate::site::SiteMetadata;

/// Failures of routing itself.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("rewrite limit of {limit} exceeded")]
    RewriteLoop { limit: usize },

    #[error("invalid rewrite target `{target}`: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: axum::http::Error,
    },

    #[error("invalid URL `{target}`: {reason}")]
    InvalidUrl { target: String, reason: String },

    #[error("origin: {0}")]
    Origin(#[from] OriginError),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::RewriteLoop { .. } => StatusCode::LOOP_DETECTED,
            RouteError::Origin(_) => StatusCode::BAD_GATEWAY,
            RouteError::InvalidTarget { .. } | RouteError::InvalidUrl { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Routes requests against the active registry snapshot.
#[derive(Clone)]
pub struct Router {
    registry: RegistryHandle,
    origin: Arc<dyn Origin>,
    sandbox: Arc<dyn Sandbox>,
    conditions: Arc<ConditionEvaluator>,
    env: Arc<EnvSources>,
    pipeline: Arc<[Stage]>,
    max_rewrites: usize,
    function_timeout: Duration,
}

impl Router {
    pub fn new(config: &DevConfig, registry: RegistryHandle, origin: Arc<dyn Origin>, sandbox: Arc<dyn Sandbox>) -> Self {
        let local_url = format!("http://{}", config.listener.bind_address);
        let site = SiteMetadata::offline(&local_url, config.site.site_id.clone());
        Self {
            registry,
            origin,
            sandbox,
            conditions: Arc::new(ConditionEvaluator::new(
                IdentityDecoder::new(&config.dev.jwt_secret, &config.dev.jwt_role_path),
                CountryResolver::new(config.dev.country.as_deref()),
            )),
            env: Arc::new(EnvSources {
                site: site.info,
                ..EnvSources::default()
            }),
            pipeline: config.routing.pipeline.clone().into(),
            max_rewrites: config.routing.max_rewrites,
            function_timeout: Duration::from_secs(config.timeouts.function_secs),
        }
    }

    /// Use fetched site metadata for contexts and environment views.
    pub fn with_site(mut self, metadata: SiteMetadata) -> Self {
        let env = Arc::make_mut(&mut self.env);
        env.site = metadata.info;
        env.remote = metadata.env;
        self
    }

    /// Variables read from local environment files.
    pub fn with_env_files(mut self, files: std::collections::BTreeMap<String, String>) -> Self {
        Arc::make_mut(&mut self.env).files = files;
        self
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Route one request to a response. Never fails: routing errors
    /// become error responses.
    pub async fn route(&self, request: EdgeRequest) -> EdgeResponse {
        let started = std::time::Instant::now();
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let request_id = request_id(&request).unwrap_or_else(|| Uuid::new_v4().to_string());

        let facts = self.conditions.facts(request.headers());
        let context = Arc::new(RequestContext::new(
            request_id.clone(),
            &facts,
            self.env.site.clone(),
            EnvViews::build(&self.env),
        ));
        let run = Arc::new(RequestRun {
            router: self.clone(),
            snapshot: self.registry.load(),
            facts,
            context,
            deadline: Instant::now() + self.function_timeout,
            cancel: Cancellation::new(),
        });

        let response = match run.clone().stages(request, 0, 0).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(request_id = %request_id, path = %path, error = %e, "Routing failed");
                response::text(e.status(), e.to_string())
            }
        };
        run.cancel.cancel();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            generation = run.snapshot.generation,
            "Request routed"
        );
        metrics::record_request(&method, response.status().as_u16(), started);
        response
    }
}

/// State of one request across stages and rewrite hops.
struct RequestRun {
    router: Router,
    snapshot: Arc<Registry>,
    facts: RequestFacts,
    context: Arc<RequestContext>,
    deadline: Instant,
    cancel: Cancellation,
}

impl RequestRun {
    fn stages(self: Arc<Self>, request: EdgeRequest, from: usize, hops: usize) -> BoxFuture<'static, Result<EdgeResponse, RouteError>> {
        Box::pin(async move {
            let pipeline = self.router.pipeline.clone();
            for (position, stage) in pipeline.iter().enumerate().skip(from) {
                match stage {
                    Stage::EdgeFunctions => {
                        let bindings = resolve_chain(request.uri().path(), &self.snapshot);
                        if bindings.is_empty() {
                            continue;
                        }
                        let chain = ChainState::new(ChainParts {
                            bindings,
                            sandbox: self.router.sandbox.clone(),
                            downstream: Arc::new(Continuation {
                                run: self.clone(),
                                resume_at: position + 1,
                                hops,
                            }),
                            context: self.context.clone(),
                            import_map: self.snapshot.import_map.clone(),
                            deadline: self.deadline,
                            budget: self.router.function_timeout,
                            cancel: self.cancel.clone(),
                        });
                        return chain.execute(request).await;
                    }
                    Stage::Redirects => match self.redirect(&request) {
                        None | Some(RedirectDecision::PassThrough) => continue,
                        Some(RedirectDecision::Redirect { status, location }) => {
                            return Ok(response::redirect(status, &location));
                        }
                        Some(RedirectDecision::Status(status)) => return Ok(response::status(status)),
                        Some(RedirectDecision::Deny) => return Ok(response::denied()),
                        Some(RedirectDecision::Rewrite { status, target }) => {
                            let mut response = if target.starts_with("http://") || target.starts_with("https://") {
                                let proxied = retarget(request, &target).map_err(|source| RouteError::InvalidTarget {
                                    target: target.clone(),
                                    source,
                                })?;
                                self.router.origin.proxy_to_framework(proxied).await?
                            } else {
                                let rewritten = rewrite_path(request, &target).map_err(|source| RouteError::InvalidTarget {
                                    target: target.clone(),
                                    source,
                                })?;
                                self.clone().stages(rewritten, position + 1, hops).await?
                            };
                            if status != StatusCode::OK {
                                *response.status_mut() = status;
                            }
                            return Ok(response);
                        }
                    },
                    Stage::Origin => {
                        if let Some(response) = self.router.origin.serve_static(request.uri().path()).await {
                            return Ok(response);
                        }
                        match self.router.origin.proxy_to_framework(clone_request(&request)).await {
                            Ok(response) => return Ok(response),
                            Err(OriginError::NoFramework) => continue,
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
            }
            Ok(response::not_found())
        })
    }

    fn redirect(&self, request: &EdgeRequest) -> Option<RedirectDecision> {
        let host = request_host(request);
        let origin = &self.router.origin;
        self.snapshot
            .redirects
            .match_request(
                &RedirectRequest {
                    host: host.as_deref(),
                    path: request.uri().path(),
                    facts: &self.facts,
                },
                |path| origin.asset_exists(path),
            )
            .map(|matched| matched.decision)
    }
}

/// Pipeline continuation handed to an edge function chain.
struct Continuation {
    run: Arc<RequestRun>,
    resume_at: usize,
    hops: usize,
}

#[async_trait]
impl Downstream for Continuation {
    async fn resume(&self, request: EdgeRequest) -> Result<EdgeResponse, RouteError> {
        self.run.clone().stages(request, self.resume_at, self.hops).await
    }

    async fn reroute(&self, request: EdgeRequest) -> Result<EdgeResponse, RouteError> {
        let hops = self.hops + 1;
        let limit = self.run.router.max_rewrites;
        if hops > limit {
            return Err(RouteError::RewriteLoop { limit });
        }
        self.run.clone().stages(request, 0, hops).await
    }

    async fn proxy(&self, request: EdgeRequest) -> Result<EdgeResponse, RouteError> {
        Ok(self.run.router.origin.proxy_to_framework(request).await?)
    }

    async fn fallback(&self, path: &str) -> Option<EdgeResponse> {
        self.run.router.origin.serve_static(path).await
    }
}
