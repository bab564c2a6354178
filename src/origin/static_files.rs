//! Static file origin with an optional framework proxy.
//!
//! # Responsibilities
//! - Resolve request paths to files in the publish directory
//! - Serve files with a content type
//! - Forward unmatched requests to a framework dev server
//! - Proxy requests addressed to external URLs
//!
//! # Design Decisions
//! - Pretty URLs: `/about` serves `about`, `about.html` or `about/index.html`
//! - Paths are percent-decoded before they touch the filesystem
//! - Paths with `..`, dotfiles or dot-directories never resolve
//! - Routing control files are not served

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Uri};
use bytes::Bytes;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use percent_encoding::percent_decode_str;

use crate::http::{EdgeRequest, EdgeResponse};
use crate::origin::{mime, Origin, OriginError};

/// Largest upstream body buffered.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const HIDDEN_FILES: &[&str] = &["_redirects", "_headers"];

/// Serves the publish directory.
#[derive(Clone)]
pub struct StaticOrigin {
    root: PathBuf,
    framework_port: Option<u16>,
    client: Client<HttpConnector, Body>,
    external: reqwest::Client,
}

impl std::fmt::Debug for StaticOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticOrigin")
            .field("root", &self.root)
            .field("framework_port", &self.framework_port)
            .finish_non_exhaustive()
    }
}

impl StaticOrigin {
    pub fn new(root: impl Into<PathBuf>, framework_port: Option<u16>) -> Self {
        Self {
            root: root.into(),
            framework_port,
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            external: reqwest::Client::new(),
        }
    }

    /// File that would serve `path`.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let decoded = percent_decode_str(path).decode_utf8().ok()?;
        let path: &str = &decoded;
        let relative = Path::new(path.trim_start_matches('/'));
        let visible = relative.components().all(|c| match c {
            Component::Normal(name) => !name.to_string_lossy().starts_with('.'),
            _ => false,
        });
        if !visible {
            return None;
        }
        let base = self.root.join(relative);

        let mut candidates = Vec::with_capacity(3);
        if !path.ends_with('/') && !relative.as_os_str().is_empty() {
            candidates.push(base.clone());
            let mut html = base.clone().into_os_string();
            html.push(".html");
            candidates.push(PathBuf::from(html));
        }
        candidates.push(base.join("index.html"));

        candidates.into_iter().find(|candidate| {
            let hidden = candidate
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| HIDDEN_FILES.contains(&n))
                .unwrap_or(false);
            !hidden && candidate.is_file()
        })
    }

    async fn forward_to_framework(&self, request: EdgeRequest, port: u16) -> Result<EdgeResponse, OriginError> {
        let (mut parts, body) = request.into_parts();

        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(Authority::from_str(&format!("127.0.0.1:{}", port)).map_err(axum::http::Error::from)?);
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some(axum::http::uri::PathAndQuery::from_static("/"));
        }
        parts.uri = Uri::from_parts(uri_parts).map_err(axum::http::Error::from)?;

        tracing::debug!(uri = %parts.uri, "Proxying to framework server");
        let response: Response<hyper::body::Incoming> = self
            .client
            .request(Request::from_parts(parts, Body::from(body)))
            .await
            .map_err(|e| OriginError::Upstream(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(Body::new(body), MAX_BODY_BYTES)
            .await
            .map_err(|e| OriginError::Body(e.to_string()))?;
        Ok(Response::from_parts(parts, bytes))
    }

    async fn forward_external(&self, request: EdgeRequest) -> Result<EdgeResponse, OriginError> {
        let (parts, body) = request.into_parts();
        let mut headers = parts.headers;
        headers.remove(header::HOST);

        tracing::debug!(uri = %parts.uri, "Proxying to external URL");
        let upstream = self
            .external
            .request(parts.method, parts.uri.to_string())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| OriginError::Upstream(e.to_string()))?;

        let status = upstream.status();
        let headers = upstream.headers().clone();
        let bytes = upstream.bytes().await.map_err(|e| OriginError::Body(e.to_string()))?;

        let mut response = Response::new(bytes);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        // The body is already decoded and buffered.
        response.headers_mut().remove(header::TRANSFER_ENCODING);
        response.headers_mut().remove(header::CONTENT_ENCODING);
        Ok(response)
    }
}

#[async_trait]
impl Origin for StaticOrigin {
    async fn serve_static(&self, path: &str) -> Option<EdgeResponse> {
        let file = self.resolve(path)?;
        let content = match tokio::fs::read(&file).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "Failed to read static asset");
                return None;
            }
        };
        let mut response = Response::new(Bytes::from(content));
        *response.status_mut() = StatusCode::OK;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(mime::from_path(&file)));
        Some(response)
    }

    async fn proxy_to_framework(&self, request: EdgeRequest) -> Result<EdgeResponse, OriginError> {
        if request.uri().scheme().is_some() && request.uri().authority().is_some() {
            return self.forward_external(request).await;
        }
        match self.framework_port {
            Some(port) => self.forward_to_framework(request, port).await,
            None => Err(OriginError::NoFramework),
        }
    }

    fn asset_exists(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tokio::net::TcpListener;

    fn site() -> (tempfile::TempDir, StaticOrigin) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "home").unwrap();
        fs::write(dir.path().join("about.html"), "about").unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/index.html"), "docs").unwrap();
        fs::write(dir.path().join("app.js"), "js").unwrap();
        fs::write(dir.path().join("_redirects"), "/a /b").unwrap();
        let origin = StaticOrigin::new(dir.path(), None);
        (dir, origin)
    }

    #[test]
    fn test_pretty_url_resolution() {
        let (dir, origin) = site();
        assert_eq!(origin.resolve("/").unwrap(), dir.path().join("index.html"));
        assert_eq!(origin.resolve("/about").unwrap(), dir.path().join("about.html"));
        assert_eq!(origin.resolve("/docs").unwrap(), dir.path().join("docs/index.html"));
        assert_eq!(origin.resolve("/docs/").unwrap(), dir.path().join("docs/index.html"));
        assert_eq!(origin.resolve("/app.js").unwrap(), dir.path().join("app.js"));
        assert!(origin.resolve("/missing").is_none());
    }

    #[test]
    fn test_traversal_and_control_files_do_not_resolve() {
        let (_dir, origin) = site();
        assert!(origin.resolve("/../etc/passwd").is_none());
        assert!(origin.resolve("/_redirects").is_none());
        assert!(!origin.asset_exists("/_redirects"));
        assert!(origin.resolve("/%2e%2e/etc/passwd").is_none());
    }

    #[tokio::test]
    async fn test_dotfiles_are_never_served() {
        let (dir, origin) = site();
        fs::write(dir.path().join(".env"), "API_SECRET=hunter2").unwrap();
        fs::create_dir_all(dir.path().join(".netlify/edge-functions-dist")).unwrap();
        fs::write(dir.path().join(".netlify/edge-functions-dist/manifest.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join(".well-hidden")).unwrap();
        fs::write(dir.path().join(".well-hidden/index.html"), "hidden").unwrap();

        assert!(origin.serve_static("/.env").await.is_none());
        assert!(!origin.asset_exists("/.env"));
        assert!(origin.serve_static("/%2Eenv").await.is_none());
        assert!(origin.serve_static("/.netlify/edge-functions-dist/manifest.json").await.is_none());
        assert!(origin.serve_static("/.well-hidden/").await.is_none());
    }

    #[tokio::test]
    async fn test_percent_encoded_paths_resolve() {
        let (dir, origin) = site();
        fs::write(dir.path().join("my page.html"), "spaced").unwrap();
        fs::write(dir.path().join("caf\u{e9}.txt"), "coffee").unwrap();

        assert!(origin.asset_exists("/my%20page"));
        let response = origin.serve_static("/my%20page").await.unwrap();
        assert_eq!(response.body().as_ref(), b"spaced");
        assert_eq!(origin.resolve("/caf%C3%A9.txt").unwrap(), dir.path().join("caf\u{e9}.txt"));
        assert!(origin.resolve("/bad%FFutf8").is_none());
    }

    #[tokio::test]
    async fn test_serve_static_sets_content_type() {
        let (_dir, origin) = site();
        let response = origin.serve_static("/about").await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], mime::HTML);
        assert_eq!(response.body().as_ref(), b"about");
    }

    #[tokio::test]
    async fn test_without_framework_proxy_is_unavailable() {
        let (_dir, origin) = site();
        let request = Request::builder().uri("/api").body(Bytes::new()).unwrap();
        assert!(matches!(origin.proxy_to_framework(request).await, Err(OriginError::NoFramework)));
    }

    #[tokio::test]
    async fn test_proxies_to_framework_port() {
        let app = axum::Router::new().fallback(|uri: Uri| async move { format!("framework saw {}", uri) });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let origin = StaticOrigin::new(dir.path(), Some(port));
        let request = Request::builder().uri("/api/users?x=1").body(Bytes::new()).unwrap();
        let response = origin.proxy_to_framework(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"framework saw /api/users?x=1");
    }
}
