//! End-to-end tests against the HTTP router.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vizgate_server::config::StaticFilesConfig;
use vizgate_server::embed::EmbedClaims;
use vizgate_server::{AppState, ServerConfig, create_router};

const EMBED_SECRET: &str = "embed-secret";

fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.auth.session_secret = Some("session-secret".to_string());
    config.embed.secret = Some(EMBED_SECRET.to_string());
    config
}

fn app(config: ServerConfig) -> Router {
    create_router(AppState::new(config).unwrap())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"username": username, "password": password}).to_string(),
        ))
        .unwrap()
}

async fn login(app: &Router) -> String {
    let (status, body) = send(app, login_request("admin", "password")).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

fn embed_claims(token: &str) -> EmbedClaims {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["tableau"]);
    decode::<EmbedClaims>(
        token,
        &DecodingKey::from_secret(EMBED_SECRET.as_bytes()),
        &validation,
    )
    .unwrap()
    .claims
}

#[tokio::test]
async fn test_login_list_and_embed() {
    let app = app(config());
    let token = login(&app).await;

    let (status, body) = send(&app, get("/api/verify", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["user"]["id"], 1);
    assert_eq!(body["user"]["username"], "admin");

    let (status, body) = send(&app, get("/api/workbooks", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "fallback");
    assert!(!body["workbooks"].as_array().unwrap().is_empty());

    let (status, body) = send(
        &app,
        get("/api/tableau-token?workbook=Sales&view=Overview", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workbook"], "Sales");
    assert_eq!(body["view"], "Overview");

    let claims = embed_claims(body["embedToken"].as_str().unwrap());
    assert_eq!(claims.sub, "admin");
    assert_eq!(claims.oda.content.workbook, "Sales");
    assert_eq!(claims.oda.content.view, "Overview");
    assert_eq!(body["expiresAt"], claims.exp);
}

#[tokio::test]
async fn test_embed_defaults() {
    let app = app(config());
    let token = login(&app).await;

    let (status, body) = send(&app, get("/api/tableau-token", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workbook"], "Superstore");
    assert_eq!(body["view"], "Dashboard");
}

#[tokio::test]
async fn test_bad_credentials_rejected() {
    let app = app(config());

    for (username, password) in [("admin", "nope"), ("ghost", "password")] {
        let (status, body) = send(&app, login_request(username, password)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "authentication_failed");
        assert!(body.get("token").is_none());
    }
}

#[tokio::test]
async fn test_malformed_login_body() {
    let app = app(config());
    let request = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_protected_endpoints_require_token() {
    let app = app(config());

    for uri in ["/api/verify", "/api/workbooks", "/api/tableau-token"] {
        let (status, body) = send(&app, get(uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"]["code"], "authentication_failed");
        assert!(body.get("workbooks").is_none());
        assert!(body.get("embedToken").is_none());

        let (status, _) = send(&app, get(uri, Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_health_and_headers() {
    let app = app(config());

    let request = Request::builder()
        .uri("/api/health")
        .header("X-Request-Id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    assert!(response.headers().contains_key("x-response-time"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mode"], "static");
    assert_eq!(body["cache"], "empty");
    assert!(body["uptimeSeconds"].is_u64());
}

#[tokio::test]
async fn test_portal_served() {
    let app = app(config());
    let response = app.clone().oneshot(get("/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Dashboard Portal"));
}

#[tokio::test]
async fn test_static_dir_keeps_api_misses_as_json() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("index.html"), "<h1>Custom Portal</h1>").unwrap();
    let mut config = config();
    config.static_files = Some(StaticFilesConfig {
        root: root.path().to_path_buf(),
        index: "index.html".to_string(),
    });
    let app = app(config);

    let (status, body) = send(&app, get("/api/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert_eq!(body["error"]["message"], "Not found: /api/nope");

    // Client-side routes still get the portal.
    let response = app.clone().oneshot(get("/dashboards/sales", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("Custom Portal"));

    let (status, _) = send(&app, get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_live_directory_from_tableau() {
    let tableau = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/3.21/auth/signin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "credentials": {"token": "tab-token", "site": {"id": "site-1", "contentUrl": ""}}
        })))
        .expect(1)
        .mount(&tableau)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/3.21/sites/site-1/workbooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pagination": {"pageNumber": "1", "pageSize": "100", "totalAvailable": "2"},
            "workbooks": {"workbook": [
                {"id": "wb-1", "name": "Dashboard Home", "contentUrl": "home",
                 "owner": {"id": "u-1", "name": "analyst"}},
                {"id": "wb-2", "name": "Sales", "contentUrl": "Sales", "description": "Sales KPIs"}
            ]}
        })))
        .expect(1)
        .mount(&tableau)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/3.21/auth/signout"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&tableau)
        .await;

    let mut config = config();
    config.tableau.server_url = Some(tableau.uri());
    config.tableau.username = "svc".to_string();
    config.tableau.password = "secret".to_string();
    let app = app(config);
    let token = login(&app).await;

    let (status, body) = send(&app, get("/api/workbooks", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "live");
    assert_eq!(
        body["workbooks"],
        json!([
            {"id": "wb-1", "name": "Dashboard Home", "workbook": "home", "view": "Home",
             "description": "Workbook Dashboard Home", "owner": "analyst", "tags": []},
            {"id": "wb-2", "name": "Sales", "workbook": "Sales", "view": "Dashboard",
             "description": "Sales KPIs", "tags": []}
        ])
    );

    let (_, body) = send(&app, get("/api/workbooks", Some(&token))).await;
    assert_eq!(body["source"], "cached");

    let (_, health) = send(&app, get("/api/health", None)).await;
    assert_eq!(health["mode"], "live");
    assert_eq!(health["cache"], "active");

    let (_, body) = send(
        &app,
        get("/api/tableau-token?workbook=home&view=Home", Some(&token)),
    )
    .await;
    assert_eq!(body["vizUrl"], format!("{}/views/home/Home", tableau.uri()));
}

#[tokio::test]
async fn test_unreachable_tableau_falls_back() {
    let mut config = config();
    config.tableau.server_url = Some("http://127.0.0.1:9".to_string());
    config.tableau.timeout = 2;
    let app = app(config);
    let token = login(&app).await;

    let (status, body) = send(&app, get("/api/workbooks", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "fallback");
    assert_eq!(body["workbooks"].as_array().unwrap().len(), 10);
}
