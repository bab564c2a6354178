//! Invocation chain execution.
//!
//! # Responsibilities
//! - Resolve the ordered chain of bindings for a path
//! - Run bindings depth-first, each wrapping the rest of the chain
//! - Follow rewrites and legacy URL returns
//! - Contain handler failures according to each binding's error policy
//!
//! # Design Decisions
//! - The continuation is an explicit value: shared chain state plus the
//!   index of the next binding
//! - One deadline per request; expiry cancels every pending invocation
//! - Failures of routing a handler delegated to are never masked by the
//!   handler's own error policy

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use tokio::time::{timeout_at, Instant};
use url::Url;

use crate::edge::cancel::Cancellation;
use crate::edge::context::RequestContext;
use crate::edge::sandbox::{HandlerOutcome, Invocation, Sandbox, SandboxError};
use crate::http::request::{clone_request, request_host, retarget, rewrite_path};
use crate::http::{response, EdgeRequest, EdgeResponse};
use crate::manifest::{EdgeFunctionBinding, ImportMap, OnError};
use crate::observability::metrics;
use crate::registry::Registry;
use crate::routing::matcher::host_matches;
use crate::routing::RouteError;

/// Bindings that intercept `path`, in registry order.
pub fn resolve_chain(path: &str, registry: &Registry) -> Vec<Arc<EdgeFunctionBinding>> {
    registry
        .bindings
        .iter()
        .filter(|binding| binding.matches(path))
        .cloned()
        .collect()
}

/// Routing that continues after, or instead of, the chain.
#[async_trait]
pub trait Downstream: Send + Sync {
    /// Run the pipeline stages that follow the edge function stage.
    async fn resume(&self, request: EdgeRequest) -> Result<EdgeResponse, RouteError>;

    /// Restart routing from the entry point. Costs one rewrite hop.
    async fn reroute(&self, request: EdgeRequest) -> Result<EdgeResponse, RouteError>;

    /// Proxy a request addressed to an absolute URL.
    async fn proxy(&self, request: EdgeRequest) -> Result<EdgeResponse, RouteError>;

    /// Origin content at `path`, if any.
    async fn fallback(&self, path: &str) -> Option<EdgeResponse>;
}

/// State shared by every step of one chain.
pub struct ChainState {
    bindings: Vec<Arc<EdgeFunctionBinding>>,
    sandbox: Arc<dyn Sandbox>,
    downstream: Arc<dyn Downstream>,
    context: Arc<RequestContext>,
    import_map: Arc<ImportMap>,
    deadline: Instant,
    budget: Duration,
    cancel: Cancellation,
}

/// Builder input for a chain.
pub struct ChainParts {
    pub bindings: Vec<Arc<EdgeFunctionBinding>>,
    pub sandbox: Arc<dyn Sandbox>,
    pub downstream: Arc<dyn Downstream>,
    pub context: Arc<RequestContext>,
    pub import_map: Arc<ImportMap>,
    pub deadline: Instant,
    pub budget: Duration,
    pub cancel: Cancellation,
}

impl ChainState {
    pub fn new(parts: ChainParts) -> Arc<Self> {
        Arc::new(Self {
            bindings: parts.bindings,
            sandbox: parts.sandbox,
            downstream: parts.downstream,
            context: parts.context,
            import_map: parts.import_map,
            deadline: parts.deadline,
            budget: parts.budget,
            cancel: parts.cancel,
        })
    }

    /// Run the chain from its first binding.
    pub async fn execute(self: Arc<Self>, request: EdgeRequest) -> Result<EdgeResponse, RouteError> {
        let scope = Scope {
            deadline: self.deadline,
            cancel: self.cancel.clone(),
        };
        self.invoke(0, request, scope).await
    }

    fn invoke(
        self: Arc<Self>,
        index: usize,
        request: EdgeRequest,
        scope: Scope,
    ) -> BoxFuture<'static, Result<EdgeResponse, RouteError>> {
        Box::pin(async move {
            let Some(binding) = self.bindings.get(index).cloned() else {
                return self.downstream.resume(request).await;
            };

            let original = clone_request(&request);
            let cancel = scope.cancel.child();
            let invocation = Invocation {
                binding: binding.clone(),
                request,
                context: self.context.clone(),
                import_map: self.import_map.clone(),
                next: Next {
                    chain: self.clone(),
                    index: index + 1,
                    scope: Scope {
                        deadline: scope.deadline,
                        cancel: cancel.clone(),
                    },
                },
                cancel: cancel.clone(),
            };

            tracing::debug!(
                request_id = %self.context.request_id,
                function = %binding.name,
                position = index,
                "Invoking edge function"
            );

            let started = std::time::Instant::now();
            let result = match timeout_at(scope.deadline, self.sandbox.execute(invocation)).await {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    Err(SandboxError::Timeout {
                        function: binding.name.clone(),
                        after: self.budget,
                    })
                }
            };
            metrics::record_invocation(&binding.name, result.is_ok(), started);

            match result {
                Ok(outcome) => self.follow(outcome, original).await,
                Err(SandboxError::Downstream(e)) => Err(e),
                Err(error) => self.recover(index, &binding, original, error, scope).await,
            }
        })
    }

    async fn follow(&self, outcome: HandlerOutcome, original: EdgeRequest) -> Result<EdgeResponse, RouteError> {
        match outcome {
            HandlerOutcome::Response(response) => Ok(response),
            HandlerOutcome::Rewrite(path) => self.rewrite(original, &path).await,
            HandlerOutcome::Url(target) if target.starts_with('/') => self.rewrite(original, &target).await,
            HandlerOutcome::Url(target) => {
                let url = Url::parse(&target).map_err(|e| RouteError::InvalidUrl {
                    target: target.clone(),
                    reason: e.to_string(),
                })?;
                let host = url.host_str().map(|h| match url.port() {
                    Some(port) => format!("{}:{}", h, port),
                    None => h.to_string(),
                });
                let same_origin = host
                    .as_deref()
                    .map(|h| host_matches(h, request_host(&original).as_deref()))
                    .unwrap_or(false);
                if same_origin {
                    let path = match url.query() {
                        Some(query) => format!("{}?{}", url.path(), query),
                        None => url.path().to_string(),
                    };
                    self.rewrite(original, &path).await
                } else {
                    let request = retarget(original, url.as_str()).map_err(|source| RouteError::InvalidTarget {
                        target: target.clone(),
                        source,
                    })?;
                    self.downstream.proxy(request).await
                }
            }
        }
    }

    async fn rewrite(&self, original: EdgeRequest, path: &str) -> Result<EdgeResponse, RouteError> {
        tracing::debug!(request_id = %self.context.request_id, to = %path, "Edge function rewrite");
        let request = rewrite_path(original, path).map_err(|source| RouteError::InvalidTarget {
            target: path.to_string(),
            source,
        })?;
        self.downstream.reroute(request).await
    }

    async fn recover(
        self: Arc<Self>,
        index: usize,
        binding: &EdgeFunctionBinding,
        original: EdgeRequest,
        error: SandboxError,
        scope: Scope,
    ) -> Result<EdgeResponse, RouteError> {
        match &binding.on_error {
            OnError::Bypass => {
                tracing::debug!(function = %binding.name, error = %error, "Edge function failed, bypassing");
                let scope = scope.renewed(self.budget);
                self.invoke(index + 1, original, scope).await
            }
            OnError::Fallback(path) => {
                tracing::warn!(function = %binding.name, error = %error, fallback = %path, "Edge function failed, serving fallback");
                match self.downstream.fallback(path).await {
                    Some(mut response) => {
                        *response.status_mut() = StatusCode::OK;
                        Ok(response)
                    }
                    None => Ok(failure(binding, &error)),
                }
            }
            OnError::Fail => Ok(failure(binding, &error)),
        }
    }
}

/// Deadline and signal the invocations at one depth of the chain run under.
#[derive(Clone)]
struct Scope {
    deadline: Instant,
    cancel: Cancellation,
}

impl Scope {
    /// Scope for the bindings after a bypassed failure. A binding that
    /// used up the budget leaves a fresh one behind.
    fn renewed(self, budget: Duration) -> Self {
        let now = Instant::now();
        if now < self.deadline {
            return self;
        }
        Self {
            deadline: now + budget,
            cancel: self.cancel,
        }
    }
}

fn failure(binding: &EdgeFunctionBinding, error: &SandboxError) -> EdgeResponse {
    tracing::error!(function = %binding.name, error = %error, "Edge function failed");
    metrics::record_function_failure(&binding.name);
    response::text(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

/// Continuation handed to a handler: the rest of the chain.
#[derive(Clone)]
pub struct Next {
    chain: Arc<ChainState>,
    index: usize,
    scope: Scope,
}

impl Next {
    /// Run the remaining bindings, then the rest of the pipeline.
    pub async fn run(self, request: EdgeRequest) -> Result<EdgeResponse, SandboxError> {
        Ok(self.chain.invoke(self.index, request, self.scope).await?)
    }

    /// Position of the binding this continuation starts at.
    pub fn index(&self) -> usize {
        self.index
    }
}
