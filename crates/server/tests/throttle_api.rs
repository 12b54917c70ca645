mod support;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use skyfleet_server::throttle::Throttle;

#[tokio::test]
async fn anonymous_drone_traffic_is_throttled_per_scope() {
    let throttle = Throttle::new(true, Duration::from_secs(3600), 3, 100);
    let app = support::test_app_with_throttle(throttle).await;

    for _ in 0..3 {
        let (status, _) = support::get(&app, "/v1/drones", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = support::get(&app, "/v1/drones", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "throttled");

    // other scopes keep flowing
    let (status, _) = support::get(&app, "/v1/toys", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn authenticated_callers_have_separate_budgets() {
    let throttle = Throttle::new(true, Duration::from_secs(3600), 2, 100);
    let app = support::test_app_with_throttle(throttle).await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;

    // two anonymous reads exhaust the anon budget
    for _ in 0..2 {
        let (status, _) = support::get(&app, "/v1/drones", None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = support::get(&app, "/v1/drones", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // the logged-in user still has their own
    let (status, _) = support::get(&app, "/v1/drones", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn pilot_scope_counts_writes_and_reads_together() {
    let throttle = Throttle::new(true, Duration::from_secs(3600), 2, 2);
    let app = support::test_app_with_throttle(throttle).await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;

    let (status, _) = support::post(
        &app,
        "/v1/pilots",
        Some(&token),
        json!({ "name": "Gaston", "gender": "M", "races_count": 5 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = support::get(&app, "/v1/pilots", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = support::get(&app, "/v1/pilots", Some(&token)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
