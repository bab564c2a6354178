//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::{header, Request};
use bytes::Bytes;
use edge_router::config::{load_project, DevConfig};
use edge_router::edge::{HandlerOutcome, NativeSandbox, SandboxError};
use edge_router::http::{response, EdgeRequest, EdgeResponse, HttpServer};
use edge_router::lifecycle::{bootstrap, Services, Shutdown};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const FUNCTIONS_DIR: &str = "netlify/edge-functions";
pub const INTERNAL_DIR: &str = ".netlify/edge-functions";

/// A project directory laid out on disk.
pub struct TestSite {
    dir: TempDir,
}

impl TestSite {
    pub fn new() -> Self {
        let site = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        site.write("public/index.html", "home");
        site
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Write `netlify.toml`. `publish = "public"` is prepended.
    pub fn with_config(self, toml: &str) -> Self {
        self.write("netlify.toml", &format!("[build]\npublish = \"public\"\n\n{}", toml));
        self
    }

    pub fn with_file(self, relative: &str, content: &str) -> Self {
        self.write(relative, content);
        self
    }

    /// A user function with an in-source config.
    pub fn with_edge_function(self, name: &str, config: &str) -> Self {
        self.write(&format!("{}/{}.ts", FUNCTIONS_DIR, name), "export default () => {}");
        self.write(&format!("{}/{}.config.json", FUNCTIONS_DIR, name), config);
        self
    }

    /// A user function declared only in `netlify.toml`.
    pub fn with_function_source(self, name: &str) -> Self {
        self.write(&format!("{}/{}.ts", FUNCTIONS_DIR, name), "export default () => {}");
        self
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).unwrap();
    }

    pub fn config(&self) -> DevConfig {
        let mut config = load_project(self.root()).unwrap();
        if !self.path("netlify.toml").exists() {
            config.build.publish = PathBuf::from("public");
        }
        config
    }

    pub async fn start(&self, sandbox: NativeSandbox) -> Services {
        bootstrap(self.config(), Arc::new(sandbox)).await.unwrap()
    }
}

pub fn get(path: &str) -> EdgeRequest {
    Request::builder()
        .uri(path)
        .header(header::HOST, "localhost:8888")
        .body(Bytes::new())
        .unwrap()
}

pub fn with_cookie(mut request: EdgeRequest, cookie: &str) -> EdgeRequest {
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    request
}

pub fn sign_jwt(claims: Value, secret: &str) -> String {
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

pub fn body_text(response: &EdgeResponse) -> String {
    String::from_utf8(response.body().to_vec()).unwrap()
}

/// Sandbox with the handlers used across tests.
///
/// - `hello`: responds "Hello world"
/// - `yell`: uppercases the downstream body
/// - `goodbye-rewrite`: rewrites to `/goodbye`
/// - `broken`: always fails
pub fn sandbox() -> NativeSandbox {
    NativeSandbox::new()
        .with_handler("hello", |_| async {
            Ok(HandlerOutcome::Response(response::text(axum::http::StatusCode::OK, "Hello world")))
        })
        .with_handler("yell", |inv| async move {
            let downstream = inv.next.run(inv.request).await?;
            let (parts, body) = downstream.into_parts();
            let loud = String::from_utf8_lossy(&body).to_uppercase();
            Ok::<_, SandboxError>(HandlerOutcome::Response(EdgeResponse::from_parts(parts, Bytes::from(loud))))
        })
        .with_handler("goodbye-rewrite", |_| async { Ok(HandlerOutcome::Rewrite("/goodbye".into())) })
        .with_handler("broken", |_| async {
            Err(SandboxError::Handler("boom".into()))
        })
}

/// Serve `services` on an ephemeral port.
pub async fn spawn_server(services: &Services) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(&services.config, services.router.clone());
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    (addr, shutdown)
}
