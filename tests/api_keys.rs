mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{spawn_app, Call, TestApp};

async fn issue_key(app: &TestApp, token: &str, permissions: &[&str]) -> (String, String) {
    let (status, body) = app
        .send(
            Call::new(Method::POST, "/api-keys")
                .bearer(token)
                .json(json!({ "name": "monitoring", "permissions": permissions })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    (
        body["api_key"]["id"].as_str().unwrap().to_string(),
        body["raw_key"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_issued_key_authenticates_and_hides_digest() {
    let app = spawn_app();
    let token = app.admin_token().await;
    let (_, raw_key) = issue_key(&app, &token, &["read:stats"]).await;

    assert_eq!(raw_key.len(), 64);

    let (status, body) = app.send(Call::new(Method::GET, "/api/v1/whoami").bearer(&raw_key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "monitoring");
    assert_eq!(body["key_prefix"], raw_key[..8]);
    assert!(body.get("key").is_none());

    let (_, keys) = app.send(Call::new(Method::GET, "/api-keys").bearer(&token)).await;
    let listed = &keys.as_array().unwrap()[0];
    assert!(listed.get("key").is_none());
    assert!(listed["last_used_at"].is_string());
}

#[tokio::test]
async fn test_bad_credentials_are_rejected() {
    let app = spawn_app();

    let (status, body) = app.send(Call::new(Method::GET, "/api/v1/whoami")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Missing Authorization header");

    let (status, body) = app
        .send(Call::new(Method::GET, "/api/v1/whoami").bearer("deadbeef"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid API key");

    // Admin sessions are not API keys
    let token = app.admin_token().await;
    let (status, _) = app.send(Call::new(Method::GET, "/api/v1/whoami").bearer(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_permissions_are_enforced_per_route() {
    let app = spawn_app();
    let token = app.admin_token().await;
    let (id, raw_key) = issue_key(&app, &token, &["read:stats"]).await;

    let (status, _) = app
        .send(Call::new(Method::GET, "/api/v1/security/events").bearer(&raw_key))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Call::new(Method::GET, "/api/v1/server/security-settings").bearer(&raw_key))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "API key does not have required permission: read:server");

    let (status, _) = app
        .send(
            Call::new(Method::PUT, &format!("/api-keys/{}", id))
                .bearer(&token)
                .json(json!({
                    "name": "monitoring",
                    "permissions": ["read:server"],
                    "enabled": true,
                })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Call::new(Method::GET, "/api/v1/server/security-settings").bearer(&raw_key))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["brute_force_enabled"], true);

    // Reading does not imply writing
    let (status, body) = app
        .send(
            Call::new(Method::PUT, "/api/v1/server/security-settings")
                .bearer(&raw_key)
                .json(json!({
                    "brute_force_enabled": true,
                    "brute_force_max_attempts": 3,
                    "brute_force_window_minutes": 10,
                    "brute_force_block_minutes": 60,
                    "ip_blocking_enabled": true,
                    "geoip_enabled": false,
                    "geoip_default_action": "allow",
                })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "API key does not have required permission: write:server");
}

#[tokio::test]
async fn test_disabled_key_is_refused() {
    let app = spawn_app();
    let token = app.admin_token().await;
    let (id, raw_key) = issue_key(&app, &token, &["read:stats"]).await;

    app.send(
        Call::new(Method::PUT, &format!("/api-keys/{}", id))
            .bearer(&token)
            .json(json!({ "name": "monitoring", "permissions": ["read:stats"], "enabled": false })),
    )
    .await;

    let (status, body) = app.send(Call::new(Method::GET, "/api/v1/whoami").bearer(&raw_key)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "API key is disabled");

    let (status, body) = app
        .send(Call::new(Method::DELETE, &format!("/api-keys/{}", id)).bearer(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "API key deleted successfully");

    let (status, _) = app.send(Call::new(Method::GET, "/api/v1/whoami").bearer(&raw_key)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Call::new(Method::DELETE, &format!("/api-keys/{}", id)).bearer(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_every_authenticated_call_is_logged_with_its_status() {
    let app = spawn_app();
    let token = app.admin_token().await;
    let (id, raw_key) = issue_key(&app, &token, &["read:stats"]).await;

    app.send(Call::new(Method::GET, "/api/v1/whoami").bearer(&raw_key)).await;
    app.send(Call::new(Method::GET, "/api/v1/server/security-settings").bearer(&raw_key))
        .await;
    app.send(Call::new(Method::GET, "/api/v1/whoami").bearer("deadbeef")).await;

    let (status, logs) = app
        .send(Call::new(Method::GET, &format!("/api-keys/{}/logs", id)).bearer(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 2);

    // Newest first
    assert_eq!(logs[0]["endpoint"], "/api/v1/server/security-settings");
    assert_eq!(logs[0]["status_code"], 403);
    assert_eq!(logs[1]["endpoint"], "/api/v1/whoami");
    assert_eq!(logs[1]["status_code"], 200);
    assert_eq!(logs[1]["method"], "GET");
    assert_eq!(logs[1]["ip_address"], "127.0.0.1");

    let (_, stats) = app.send(Call::new(Method::GET, "/api-keys/statistics").bearer(&token)).await;
    assert_eq!(stats["log_count"], 2);
    assert_eq!(stats["api_keys"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_api_auth_fails_closed_when_store_is_down() {
    let app = spawn_app();
    let token = app.admin_token().await;
    let (_, raw_key) = issue_key(&app, &token, &["read:stats"]).await;

    app.store.set_outage(true);
    let (status, body) = app.send(Call::new(Method::GET, "/api/v1/whoami").bearer(&raw_key)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "Service temporarily unavailable");

    app.store.set_outage(false);
    let (status, _) = app.send(Call::new(Method::GET, "/api/v1/whoami").bearer(&raw_key)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_key_creation_validates_input() {
    let app = spawn_app();
    let token = app.admin_token().await;

    let (status, body) = app
        .send(
            Call::new(Method::POST, "/api-keys")
                .bearer(&token)
                .json(json!({ "name": "", "permissions": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "API key name is required");

    let (status, _) = app
        .send(
            Call::new(Method::POST, "/api-keys")
                .bearer(&token)
                .json(json!({ "name": "ops", "permissions": ["admin:*"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, keys): (_, Value) = app.send(Call::new(Method::GET, "/api-keys").bearer(&token)).await;
    assert_eq!(keys, json!([]));
}
