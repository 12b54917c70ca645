#![allow(dead_code)]

use std::str::FromStr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower::ServiceExt;

use skyfleet_server::app_state::AppState;
use skyfleet_server::handlers;
use skyfleet_server::throttle::Throttle;

const SCHEMA_SQL: &str = include_str!("../../res/sql/sqlite/schema.sql");

/// In-memory SQLite app with throttling disabled. A single pool
/// connection keeps the `:memory:` database alive and shared.
pub async fn test_app() -> Router {
    let throttle = Throttle::new(false, Duration::from_secs(3600), 1000, 1000);
    test_app_with_throttle(throttle).await
}

pub async fn test_app_with_throttle(throttle: Throttle) -> Router {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("sqlite options")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("sqlite connect");

    for stmt in SCHEMA_SQL.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        sqlx::query(stmt).execute(&pool).await.expect("schema apply");
    }

    let state = AppState {
        sqlite: Some(pool),
        postgres: None,
        token_ttl_seconds: 3600,
        throttle,
    };
    handlers::router(state)
}

pub async fn request(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("request build"),
        None => builder.body(Body::empty()).expect("request build"),
    };

    let response = app.clone().oneshot(request).await.expect("request send");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collect")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body json")
    };
    (status, value)
}

pub async fn get(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    request(app, Method::GET, uri, token, None).await
}

pub async fn post(
    app: &Router,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    request(app, Method::POST, uri, token, Some(body)).await
}

pub async fn put(app: &Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    request(app, Method::PUT, uri, token, Some(body)).await
}

pub async fn patch(
    app: &Router,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    request(app, Method::PATCH, uri, token, Some(body)).await
}

pub async fn delete(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    request(app, Method::DELETE, uri, token, None).await
}

/// Registers an account and returns a live bearer token for it.
pub async fn register_and_login(app: &Router, username: &str, password: &str) -> String {
    let (status, _) = post(
        app,
        "/v1/users",
        None,
        serde_json::json!({ "username": username, "password": password }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "user registration failed");

    let (status, body) = post(
        app,
        "/v1/auth/login",
        None,
        serde_json::json!({ "username": username, "password": password }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed");
    body["token"].as_str().expect("token in response").to_string()
}

pub async fn create_category(app: &Router, name: &str) -> Value {
    let (status, body) = post(
        app,
        "/v1/drone-categories",
        None,
        serde_json::json!({ "name": name }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "category create failed");
    body
}

pub async fn create_drone(app: &Router, token: &str, name: &str, category: &str) -> Value {
    let (status, body) = post(
        app,
        "/v1/drones",
        Some(token),
        serde_json::json!({
            "name": name,
            "drone_category": category,
            "manufacturing_date": "2024-03-01T00:00:00Z",
            "has_it_completed_missions": false,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "drone create failed");
    body
}

pub async fn create_pilot(app: &Router, token: &str, name: &str, gender: &str, races: i64) -> Value {
    let (status, body) = post(
        app,
        "/v1/pilots",
        Some(token),
        serde_json::json!({ "name": name, "gender": gender, "races_count": races }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "pilot create failed");
    body
}
