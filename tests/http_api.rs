//! HTTP API driven through the router
//!
//! Requests go through `tower::ServiceExt::oneshot`; no socket is bound.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use hostmaster::auth::TokenManager;
use hostmaster::cli::Config;
use hostmaster::http_server::HttpServer;
use hostmaster::master::Master;
use hostmaster::store::{Seed, Store, Table};

struct Harness {
    router: Router,
    tokens: TokenManager,
}

/// root(1) -> acme(2); other(3). Host 10 granted to acme.
fn harness() -> Harness {
    let seed = Seed::default()
        .with_row(Table::Accounts, json!({"id": 1, "name": "root", "parent": null}))
        .with_row(Table::Accounts, json!({"id": 2, "name": "acme", "parent": 1}))
        .with_row(Table::Accounts, json!({"id": 3, "name": "other", "parent": 1}))
        .with_row(Table::Hosts, json!({"id": 10, "name": "web1"}))
        .with_row(Table::AccountHosts, json!({"id": 11, "account": 2, "host": 10}))
        .with_row(Table::Packages, json!({"id": 20, "account": 3, "name": "elsewhere"}))
        .with_row(
            Table::MasterUsers,
            json!({"id": 30, "username": "root", "hosts": [], "permissions": ["set_password"]}),
        )
        .with_row(Table::Administrators, json!({"id": 31, "username": "alice", "account": 2}));

    let config = Config::with_secret("http-api-test-secret");
    let master = Master::with_store(&config, Store::from_seed(seed).unwrap()).unwrap();
    let router = HttpServer::new(config.http.clone(), master.api_state()).router();

    Harness {
        router,
        tokens: TokenManager::new(config.token_config()),
    }
}

impl Harness {
    async fn call(&self, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            let token = self.tokens.issue(user).unwrap();
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(&self, user: &str, request: Value) -> u64 {
        let (status, body) = self.call(Method::POST, "/api/resources", Some(user), Some(request)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["resource"]["id"].as_u64().unwrap()
    }
}

#[tokio::test]
async fn health_needs_no_token() {
    let h = harness();
    let (status, body) = h.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = h.call(Method::GET, "/observability/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operations_committed"], 0);
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let h = harness();
    let (status, body) = h.call(Method::GET, "/api/resources/package/20", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_REQUIRED");

    // signed with another secret
    let forged = TokenManager::new(Config::with_secret("some-other-secret").token_config())
        .issue("root")
        .unwrap();
    let request = Request::builder()
        .uri("/api/resources/package/20")
        .header(header::AUTHORIZATION, format!("Bearer {}", forged))
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // a valid token for a principal missing from the registry
    let (status, _) = h.call(Method::GET, "/api/resources/package/20", Some("ghost"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_disable_enable_remove() {
    let h = harness();
    let package = h
        .create("alice", json!({"kind": "package", "account": 2, "name": "hosting"}))
        .await;

    let uri = format!("/api/resources/package/{}", package);
    let (status, body) = h.call(Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "hosting");

    let (status, body) = h
        .call(Method::POST, &format!("{}/disable", uri), Some("alice"), Some(json!({"reason": "unpaid"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["disable_log"].as_u64().is_some());

    let (status, body) = h
        .call(Method::POST, &format!("{}/disable", uri), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PRECONDITION_FAILED");

    let (status, _) = h.call(Method::POST, &format!("{}/enable", uri), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = h.call(Method::GET, &format!("{}/owner", uri), Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"], 2);

    let (status, body) = h.call(Method::DELETE, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"].as_array().unwrap().len(), 1);

    let (status, _) = h.call(Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let h = harness();

    let (status, body) = h.call(Method::GET, "/api/resources/package/20", Some("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCESS_DENIED");

    let (status, _) = h.call(Method::GET, "/api/resources/spaceship/1", Some("root"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h
        .call(
            Method::POST,
            "/api/resources",
            Some("root"),
            Some(json!({"kind": "package", "account": 2, "name": "Bad Name"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = h.call(Method::POST, "/api/reconcile", Some("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = h.call(Method::POST, "/api/reconcile", Some("root"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failed"], 0);
}

#[tokio::test]
async fn password_change_commits_even_without_daemon() {
    let h = harness();
    let package = h
        .create("root", json!({"kind": "package", "account": 2, "name": "hosting"}))
        .await;
    let username = h
        .create("root", json!({"kind": "username", "package": package, "name": "bob"}))
        .await;
    let mysql = h
        .create("root", json!({"kind": "mysql_user", "username": username, "host": 10}))
        .await;

    let uri = format!("/api/resources/mysql_user/{}/password", mysql);
    let (status, body) = h
        .call(Method::PUT, &uri, Some("root"), Some(json!({"password": "n3w-secret"})))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["host"], 10);
    assert_eq!(body["daemon"]["status"], "deferred");

    // administrators lack the set_password bit
    let (status, _) = h
        .call(Method::PUT, &uri, Some("alice"), Some(json!({"password": "x"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the stored hash never leaves the master
    let (_, body) = h
        .call(Method::GET, &format!("/api/resources/mysql_user/{}", mysql), Some("root"), None)
        .await;
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn sessions_listing_is_operator_only() {
    let h = harness();
    let (status, body) = h.call(Method::GET, "/realtime/sessions", Some("root"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, _) = h.call(Method::GET, "/realtime/sessions", Some("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
