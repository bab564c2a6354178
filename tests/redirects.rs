//! Redirect, rewrite and condition behaviour through the router.

use axum::http::{header, StatusCode};
use edge_router::edge::NativeSandbox;
use serde_json::json;

mod common;
use common::{body_text, get, sign_jwt, with_cookie, TestSite};

#[tokio::test]
async fn test_first_matching_rule_wins() {
    let site = TestSite::new()
        .with_config(
            r#"
[[redirects]]
from = "/docs/*"
to = "/handbook/:splat"
status = 301

[[redirects]]
from = "/docs/intro"
to = "/never"
status = 302
"#,
        )
        .with_file("public/_redirects", "/old /new 302\n/old /other 302\n");
    let services = site.start(NativeSandbox::new()).await;

    let response = services.router.route(get("/docs/intro")).await;
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()[header::LOCATION], "/handbook/intro");

    let response = services.router.route(get("/old")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/new");
}

#[tokio::test]
async fn test_role_condition_with_default_secret() {
    let site = TestSite::new()
        .with_file("public/admin/index.html", "admin area")
        .with_file("public/_redirects", "/admin/* /admin/:splat 200! Role=admin\n");
    let services = site.start(NativeSandbox::new()).await;

    let anonymous = services.router.route(get("/admin/")).await;
    assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(&anonymous), "Not Found");

    let token = sign_jwt(
        json!({"sub": "1", "app_metadata": {"authorization": {"roles": ["admin"]}}}),
        "secret",
    );
    let admin = services
        .router
        .route(with_cookie(get("/admin/"), &format!("nf_jwt={}", token)))
        .await;
    assert_eq!(admin.status(), StatusCode::OK);
    assert_eq!(body_text(&admin), "admin area");

    let editor = sign_jwt(
        json!({"sub": "2", "app_metadata": {"authorization": {"roles": ["editor"]}}}),
        "secret",
    );
    let denied = services
        .router
        .route(with_cookie(get("/admin/"), &format!("nf_jwt={}", editor)))
        .await;
    assert_eq!(denied.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_condition_with_custom_secret_and_path() {
    let site = TestSite::new()
        .with_config(
            r#"
[dev]
jwt_secret = "custom-secret"
jwt_role_path = "roles"

[[redirects]]
from = "/members"
to = "/index.html"
status = 200
force = true
conditions = { Role = ["member"] }
"#,
        );
    let services = site.start(NativeSandbox::new()).await;

    let token = sign_jwt(json!({"sub": "1", "roles": ["member"]}), "custom-secret");
    let member = services
        .router
        .route(with_cookie(get("/members"), &format!("nf_jwt={}", token)))
        .await;
    assert_eq!(member.status(), StatusCode::OK);
    assert_eq!(body_text(&member), "home");

    let forged = sign_jwt(json!({"sub": "1", "roles": ["member"]}), "secret");
    let response = services
        .router
        .route(with_cookie(get("/members"), &format!("nf_jwt={}", forged)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_country_condition_from_cookie_and_default() {
    let site = TestSite::new()
        .with_file("public/_redirects", "/shop /shop-es 302 Country=es\n/shop /shop-us 302 Country=us\n");
    let services = site.start(NativeSandbox::new()).await;

    let spain = services.router.route(with_cookie(get("/shop"), "nf_country=es")).await;
    assert_eq!(spain.headers()[header::LOCATION], "/shop-es");

    let default = services.router.route(get("/shop")).await;
    assert_eq!(default.headers()[header::LOCATION], "/shop-us");
}

#[tokio::test]
async fn test_country_override_wins_over_cookie() {
    let site = TestSite::new()
        .with_config("[dev]\ncountry = \"es\"\n")
        .with_file("public/_redirects", "/shop /shop-es 302 Country=es\n/shop /shop-us 302\n");
    let services = site.start(NativeSandbox::new()).await;

    let response = services.router.route(with_cookie(get("/shop"), "nf_country=us")).await;
    assert_eq!(response.headers()[header::LOCATION], "/shop-es");
}

#[tokio::test]
async fn test_host_restricted_rule() {
    let site = TestSite::new().with_file(
        "public/_redirects",
        "http://localhost/hello-world /index.html 200\nhttp://example.com/hello-world /elsewhere 302\n",
    );
    let services = site.start(NativeSandbox::new()).await;

    let response = services.router.route(get("/hello-world")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "home");
}

#[tokio::test]
async fn test_static_asset_shadows_unforced_rule() {
    let site = TestSite::new()
        .with_file("public/about.html", "about page")
        .with_file("public/_redirects", "/about /index.html 200\n/index.html /about 200!\n");
    let services = site.start(NativeSandbox::new()).await;

    let shadowed = services.router.route(get("/about")).await;
    assert_eq!(body_text(&shadowed), "about page");

    let forced = services.router.route(get("/index.html")).await;
    assert_eq!(body_text(&forced), "about page");
}

#[tokio::test]
async fn test_percent_encoded_asset_shadows_unforced_rule() {
    let site = TestSite::new()
        .with_file("public/my page.html", "spaced page")
        .with_file("public/_redirects", "/my%20page /index.html 301\n/.env /index.html 200\n")
        .with_file("public/.env", "API_SECRET=hunter2");
    let services = site.start(NativeSandbox::new()).await;

    let shadowed = services.router.route(get("/my%20page")).await;
    assert_eq!(shadowed.status(), StatusCode::OK);
    assert_eq!(body_text(&shadowed), "spaced page");

    let hidden = services.router.route(get("/.env")).await;
    assert_eq!(body_text(&hidden), "home");
}

#[tokio::test]
async fn test_status_only_and_unmatched() {
    let site = TestSite::new().with_file("public/_redirects", "/gone 410\n");
    let services = site.start(NativeSandbox::new()).await;

    assert_eq!(services.router.route(get("/gone")).await.status(), StatusCode::GONE);

    let missing = services.router.route(get("/nothing-here")).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(&missing), "404 Not Found");
}
