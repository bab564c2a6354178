//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Bind server to listener and stop on shutdown
//! - Buffer request bodies and dispatch to the routing engine

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::schema::DevConfig;
use crate::http::request::request_id_header;
use crate::http::response;
use crate::origin::static_files::MAX_BODY_BYTES;
use crate::routing::Router as EdgeRouter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: EdgeRouter,
    pub body_limit: usize,
}

/// HTTP server for the edge router.
pub struct HttpServer {
    app: Router,
}

impl HttpServer {
    pub fn new(config: &DevConfig, router: EdgeRouter) -> Self {
        let state = AppState {
            router,
            body_limit: MAX_BODY_BYTES,
        };
        Self {
            app: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DevConfig, state: AppState) -> Router {
        let header = request_id_header();
        Router::new()
            .fallback(edge_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(header.clone()))
            .layer(SetRequestIdLayer::new(header, MakeRequestUuid))
    }

    /// The router as a service, for tests and embedding.
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler. Buffers the body and hands the request to routing.
async fn edge_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };
    let response = state.router.route(Request::from_parts(parts, bytes)).await;
    response::into_axum(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::sandbox::NativeSandbox;
    use crate::origin::StaticOrigin;
    use crate::registry::{Registry, RegistryHandle};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn server(root: &std::path::Path) -> HttpServer {
        let config = DevConfig::default();
        let router = EdgeRouter::new(
            &config,
            RegistryHandle::new(Registry::empty()),
            Arc::new(StaticOrigin::new(root, None)),
            Arc::new(NativeSandbox::new()),
        );
        HttpServer::new(&config, router)
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "home").unwrap();

        let response = server(dir.path())
            .app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()["x-nf-request-id"].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_incoming_request_id_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let response = server(dir.path())
            .app()
            .oneshot(
                Request::builder()
                    .uri("/missing")
                    .header("x-nf-request-id", "abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-nf-request-id"], "abc");
    }
}
