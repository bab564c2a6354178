//! Execution sandboxes for edge function handlers.
//!
//! # Responsibilities
//! - Define the invocation handed to a handler and its possible outcomes
//! - Run handlers in-process (`NativeSandbox`)
//! - Forward invocations to an external runtime over HTTP (`HttpSandbox`)
//!
//! # Design Decisions
//! - Handlers receive the chain continuation as an explicit `Next` value
//! - Cancellation is observed by the sandbox; the chain enforces deadlines

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::edge::cancel::Cancellation;
use crate::edge::chain::Next;
use crate::edge::context::RequestContext;
use crate::http::request::request_host;
use crate::http::{EdgeRequest, EdgeResponse};
use crate::manifest::{EdgeFunctionBinding, ImportMap};
use crate::routing::RouteError;

/// Everything a handler needs for one call.
pub struct Invocation {
    pub binding: Arc<EdgeFunctionBinding>,
    pub request: EdgeRequest,
    pub context: Arc<RequestContext>,
    pub import_map: Arc<ImportMap>,
    /// Continuation to the rest of the chain.
    pub next: Next,
    pub cancel: Cancellation,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("function", &self.binding.name)
            .field("uri", self.request.uri())
            .field("request_id", &self.context.request_id)
            .finish_non_exhaustive()
    }
}

/// What a handler produced.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Terminate the chain with this response.
    Response(EdgeResponse),
    /// Restart routing at `path`.
    Rewrite(String),
    /// Legacy bare target URL. Same-origin targets rewrite, others proxy.
    Url(String),
}

/// Handler failures.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("{0}")]
    Handler(String),

    #[error("edge function `{function}` timed out after {after:?}")]
    Timeout { function: String, after: Duration },

    #[error("no handler registered for edge function `{0}`")]
    NotFound(String),

    #[error("invalid sandbox reply: {0}")]
    Protocol(String),

    #[error("sandbox request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request cancelled")]
    Cancelled,

    /// Failure of the routing the handler delegated to.
    #[error(transparent)]
    Downstream(#[from] RouteError),
}

/// Runs edge function handlers.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(&self, invocation: Invocation) -> Result<HandlerOutcome, SandboxError>;
}

/// Future returned by a native handler.
pub type HandlerFuture = BoxFuture<'static, Result<HandlerOutcome, SandboxError>>;

type Handler = Arc<dyn Fn(Invocation) -> HandlerFuture + Send + Sync>;

/// In-process handler table keyed by function name.
#[derive(Clone, Default)]
pub struct NativeSandbox {
    handlers: HashMap<String, Handler>,
}

impl NativeSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for function `name`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutcome, SandboxError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |invocation| -> HandlerFuture { Box::pin(handler(invocation)) });
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn with_handler<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutcome, SandboxError>> + Send + 'static,
    {
        self.register(name, handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for NativeSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("NativeSandbox").field("handlers", &names).finish()
    }
}

#[async_trait]
impl Sandbox for NativeSandbox {
    async fn execute(&self, invocation: Invocation) -> Result<HandlerOutcome, SandboxError> {
        let Some(handler) = self.handlers.get(&invocation.binding.name).cloned() else {
            return Err(SandboxError::NotFound(invocation.binding.name.clone()));
        };
        handler(invocation).await
    }
}

/// Forwards invocations to an external runtime as JSON.
#[derive(Debug, Clone)]
pub struct HttpSandbox {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct RequestPayload {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl RequestPayload {
    fn new(request: &EdgeRequest) -> Self {
        let host = request_host(request).unwrap_or_else(|| "localhost".to_string());
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        Self {
            method: request.method().to_string(),
            url: format!("http://{}{}", host, path),
            headers: request
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect(),
            body: STANDARD.encode(request.body()),
        }
    }
}

#[derive(Debug, Serialize)]
struct InvocationPayload<'a> {
    function: &'a str,
    source: &'a std::path::Path,
    request: RequestPayload,
    context: &'a RequestContext,
    import_map: &'a ImportMap,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    /// Base64 encoded.
    #[serde(default)]
    body: String,
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Default, Deserialize)]
struct NextPayload {
    /// Set when the runtime wants the downstream response handed back.
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Reply {
    Response(ResponsePayload),
    Rewrite(String),
    Url(String),
    Next(NextPayload),
    Error(String),
}

/// Downstream response returned to a runtime that called `next`.
#[derive(Debug, Serialize)]
struct ResumePayload<'a> {
    invocation_id: &'a str,
    response: DownstreamPayload,
}

#[derive(Debug, Serialize)]
struct DownstreamPayload {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl DownstreamPayload {
    fn new(response: &EdgeResponse) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect(),
            body: STANDARD.encode(response.body()),
        }
    }
}

fn merge_headers(response: &mut EdgeResponse, headers: BTreeMap<String, String>) -> Result<(), SandboxError> {
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| SandboxError::Protocol(e.to_string()))?;
        let value = HeaderValue::from_str(&value).map_err(|e| SandboxError::Protocol(e.to_string()))?;
        response.headers_mut().insert(name, value);
    }
    Ok(())
}

impl ResponsePayload {
    fn into_response(self) -> Result<EdgeResponse, SandboxError> {
        let body = STANDARD
            .decode(self.body.as_bytes())
            .map_err(|e| SandboxError::Protocol(format!("response body: {}", e)))?;
        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() =
            StatusCode::from_u16(self.status).map_err(|e| SandboxError::Protocol(e.to_string()))?;
        merge_headers(&mut response, self.headers)?;
        Ok(response)
    }
}

impl Reply {
    /// Outcome of a reply that does not delegate downstream.
    fn settle(self) -> Result<HandlerOutcome, SandboxError> {
        match self {
            Reply::Response(payload) => Ok(HandlerOutcome::Response(payload.into_response()?)),
            Reply::Rewrite(path) => Ok(HandlerOutcome::Rewrite(path)),
            Reply::Url(url) => Ok(HandlerOutcome::Url(url)),
            Reply::Error(message) => Err(SandboxError::Handler(message)),
            Reply::Next(_) => Err(SandboxError::Protocol("next called twice".into())),
        }
    }
}

impl HttpSandbox {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    async fn post<T: Serialize + Sync>(&self, payload: &T, cancel: &Cancellation) -> Result<Reply, SandboxError> {
        let send = self.client.post(&self.url).json(payload).send();
        tokio::select! {
            result = send => Ok(result?.error_for_status()?.json().await?),
            _ = cancel.cancelled() => Err(SandboxError::Cancelled),
        }
    }
}

#[async_trait]
impl Sandbox for HttpSandbox {
    async fn execute(&self, invocation: Invocation) -> Result<HandlerOutcome, SandboxError> {
        let reply = {
            let payload = InvocationPayload {
                function: &invocation.binding.name,
                source: &invocation.binding.source.path,
                request: RequestPayload::new(&invocation.request),
                context: &invocation.context,
                import_map: &invocation.import_map,
            };
            self.post(&payload, &invocation.cancel).await?
        };

        let payload = match reply {
            Reply::Next(payload) => payload,
            other => return other.settle(),
        };

        let Invocation { request, next, cancel, .. } = invocation;
        let mut response = next.run(request).await?;
        match payload.invocation_id {
            Some(invocation_id) => {
                let resume = ResumePayload {
                    invocation_id: &invocation_id,
                    response: DownstreamPayload::new(&response),
                };
                self.post(&resume, &cancel).await?.settle()
            }
            None => {
                merge_headers(&mut response, payload.headers)?;
                Ok(HandlerOutcome::Response(response))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_variants_decode() {
        let reply: Reply = serde_json::from_str(r#"{"rewrite": "/goodbye"}"#).unwrap();
        assert!(matches!(reply, Reply::Rewrite(p) if p == "/goodbye"));

        let reply: Reply = serde_json::from_str(r#"{"next": {"headers": {"x-yell": "1"}}}"#).unwrap();
        assert!(matches!(reply, Reply::Next(n) if n.headers["x-yell"] == "1" && n.invocation_id.is_none()));

        let reply: Reply = serde_json::from_str(r#"{"next": {"invocation_id": "abc"}}"#).unwrap();
        assert!(matches!(reply, Reply::Next(n) if n.invocation_id.as_deref() == Some("abc")));

        let reply: Reply = serde_json::from_str(r#"{"error": "boom"}"#).unwrap();
        assert!(matches!(reply, Reply::Error(m) if m == "boom"));
    }

    #[test]
    fn test_response_payload_decodes_base64_body() {
        let reply: Reply = serde_json::from_str(
            r#"{"response": {"status": 201, "headers": {"content-type": "text/plain"}, "body": "SGVsbG8="}}"#,
        )
        .unwrap();
        let Reply::Response(payload) = reply else {
            panic!("expected response");
        };
        let response = payload.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.body().as_ref(), b"Hello");
    }

    #[test]
    fn test_downstream_payload_encodes_response() {
        let mut response = Response::new(Bytes::from_static(b"Hello"));
        response.headers_mut().insert("x-a", HeaderValue::from_static("1"));
        let value = serde_json::to_value(ResumePayload {
            invocation_id: "abc",
            response: DownstreamPayload::new(&response),
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "invocation_id": "abc",
                "response": {"status": 200, "headers": [["x-a", "1"]], "body": "SGVsbG8="}
            })
        );
    }

    #[test]
    fn test_resumed_reply_cannot_delegate_again() {
        let reply: Reply = serde_json::from_str(r#"{"next": {}}"#).unwrap();
        assert!(matches!(reply.settle(), Err(SandboxError::Protocol(_))));
    }

    #[test]
    fn test_response_payload_rejects_bad_status() {
        let payload = ResponsePayload {
            status: 42,
            headers: BTreeMap::new(),
            body: String::new(),
        };
        assert!(matches!(payload.into_response(), Err(SandboxError::Protocol(_))));
    }

    #[test]
    fn test_native_sandbox_debug_lists_handlers() {
        let sandbox = NativeSandbox::new()
            .with_handler("yell", |_| async { Ok(HandlerOutcome::Rewrite("/".into())) })
            .with_handler("hello", |_| async { Ok(HandlerOutcome::Url("/goodbye".into())) });
        assert_eq!(sandbox.len(), 2);
        assert!(format!("{:?}", sandbox).contains("[\"hello\", \"yell\"]"));
    }
}
