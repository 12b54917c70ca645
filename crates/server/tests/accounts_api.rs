mod support;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn register_login_logout_lifecycle() {
    let app = support::test_app().await;

    let (status, user) = support::post(
        &app,
        "/v1/users",
        None,
        json!({ "username": "user01", "password": "user01P4ss" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["username"], "user01");

    let (status, login) = support::post(
        &app,
        "/v1/auth/login",
        None,
        json!({ "username": "user01", "password": "user01P4ss" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["token_type"], "bearer");
    let token = login["token"].as_str().unwrap().to_string();

    // token works, then logout revokes it
    let (status, _) = support::get(&app, "/v1/pilots", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = support::post(&app, "/v1/auth/logout", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = support::get(&app, "/v1/pilots", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_credentials_are_rejected() {
    let app = support::test_app().await;
    support::register_and_login(&app, "user01", "user01P4ss").await;

    let (status, _) = support::post(
        &app,
        "/v1/auth/login",
        None,
        json!({ "username": "user01", "password": "wrong" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = support::post(
        &app,
        "/v1/auth/login",
        None,
        json!({ "username": "ghost", "password": "whatever" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_usernames_conflict() {
    let app = support::test_app().await;
    support::register_and_login(&app, "user01", "user01P4ss").await;

    let (status, _) = support::post(
        &app,
        "/v1/users",
        None,
        json!({ "username": "user01", "password": "other-pass" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn password_change_invalidates_the_old_password() {
    let app = support::test_app().await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;

    let (status, _) = support::post(
        &app,
        "/v1/users/password",
        Some(&token),
        json!({ "current_password": "wrong", "new_password": "fresh-pass1" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = support::post(
        &app,
        "/v1/users/password",
        Some(&token),
        json!({ "current_password": "user01P4ss", "new_password": "fresh-pass1" }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = support::post(
        &app,
        "/v1/auth/login",
        None,
        json!({ "username": "user01", "password": "user01P4ss" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = support::post(
        &app,
        "/v1/auth/login",
        None,
        json!({ "username": "user01", "password": "fresh-pass1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn deleting_an_account_cascades_tokens_and_owned_drones() {
    let app = support::test_app().await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;
    support::create_category(&app, "Quadcopter").await;
    support::create_drone(&app, &token, "Atom", "Quadcopter").await;

    let (status, _) = support::delete(&app, "/v1/users/me", Some(&token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = support::get(&app, "/v1/pilots", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, listing) = support::get(&app, "/v1/drones", None).await;
    assert_eq!(listing["count"], 0);
}

#[tokio::test]
async fn api_root_and_health() {
    let app = support::test_app().await;

    let (status, health) = support::get(&app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");

    let (status, root) = support::get(&app, "/v1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(root["drones"], "/v1/drones");
    assert_eq!(root["drone-categories"], "/v1/drone-categories");
    assert_eq!(root["pilots"], "/v1/pilots");
    assert_eq!(root["competitions"], "/v1/competitions");
    assert_eq!(root["toys"], "/v1/toys");
}
