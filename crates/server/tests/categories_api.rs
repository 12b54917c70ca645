mod support;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn post_and_get_drone_category() {
    let app = support::test_app().await;

    let body = support::create_category(&app, "Hexacopter").await;
    assert_eq!(body["name"], "Hexacopter");
    assert_eq!(body["url"], format!("/v1/drone-categories/{}", body["pk"]));
    assert!(body["drones"].as_array().unwrap().is_empty());

    let (status, listing) = support::get(&app, "/v1/drone-categories", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["results"][0]["name"], "Hexacopter");
}

#[tokio::test]
async fn post_existing_drone_category_name_conflicts() {
    let app = support::test_app().await;

    support::create_category(&app, "Duplicated Copter").await;
    let (status, _) = support::post(
        &app,
        "/v1/drone-categories",
        None,
        json!({ "name": "Duplicated Copter" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn blank_category_name_is_rejected() {
    let app = support::test_app().await;

    let (status, _) =
        support::post(&app, "/v1/drone-categories", None, json!({ "name": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn filter_drone_category_by_name() {
    let app = support::test_app().await;

    support::create_category(&app, "Hexacopter").await;
    support::create_category(&app, "Octocopter").await;

    let (status, listing) =
        support::get(&app, "/v1/drone-categories?name=Hexacopter", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["results"][0]["name"], "Hexacopter");
}

#[tokio::test]
async fn search_matches_name_prefixes_only() {
    let app = support::test_app().await;

    support::create_category(&app, "Hexacopter").await;
    support::create_category(&app, "Octocopter").await;

    let (status, listing) = support::get(&app, "/v1/drone-categories?search=Hexa", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 1);

    // "copter" only appears mid-name
    let (_, listing) = support::get(&app, "/v1/drone-categories?search=copter", None).await;
    assert_eq!(listing["count"], 0);
}

#[tokio::test]
async fn ordering_can_be_reversed() {
    let app = support::test_app().await;

    support::create_category(&app, "Hexacopter").await;
    support::create_category(&app, "Octocopter").await;

    let (_, listing) = support::get(&app, "/v1/drone-categories?ordering=-name", None).await;
    assert_eq!(listing["results"][0]["name"], "Octocopter");
    assert_eq!(listing["results"][1]["name"], "Hexacopter");

    let (status, _) = support::get(&app, "/v1/drone-categories?ordering=pk", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_drone_category() {
    let app = support::test_app().await;

    let created = support::create_category(&app, "Initial Name").await;
    let url = created["url"].as_str().unwrap().to_string();

    let (status, patched) =
        support::patch(&app, &url, None, json!({ "name": "Updated Name" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["name"], "Updated Name");

    let (status, replaced) = support::put(&app, &url, None, json!({ "name": "Final Name" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["name"], "Final Name");

    let (status, fetched) = support::get(&app, &url, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Final Name");
}

#[tokio::test]
async fn empty_patch_returns_current_state() {
    let app = support::test_app().await;

    let created = support::create_category(&app, "Quadcopter").await;
    let url = created["url"].as_str().unwrap().to_string();

    let (status, body) = support::patch(&app, &url, None, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Quadcopter");
}

#[tokio::test]
async fn delete_drone_category_then_404() {
    let app = support::test_app().await;

    let created = support::create_category(&app, "Short Lived").await;
    let url = created["url"].as_str().unwrap().to_string();

    let (status, _) = support::delete(&app, &url, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = support::get(&app, &url, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = support::delete(&app, &url, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn category_detail_links_member_drones() {
    let app = support::test_app().await;
    let token = support::register_and_login(&app, "hangar01", "s3cret-pass").await;

    let category = support::create_category(&app, "Hexacopter").await;
    let drone = support::create_drone(&app, &token, "Night Hawk", "Hexacopter").await;

    let url = category["url"].as_str().unwrap().to_string();
    let (status, fetched) = support::get(&app, &url, None).await;
    assert_eq!(status, StatusCode::OK);
    let members = fetched["drones"].as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0], drone["url"]);
}
