mod support;

use axum::http::StatusCode;
use axum::Router;
use serde_json::json;

async fn seed_competitions(app: &Router, token: &str) {
    support::create_category(app, "Quadcopter").await;
    support::create_drone(app, token, "Atom", "Quadcopter").await;
    support::create_drone(app, token, "Zephyr", "Quadcopter").await;
    support::create_pilot(app, token, "Gaston", "M", 5).await;
    support::create_pilot(app, token, "Penelope", "F", 9).await;

    for (pilot, drone, distance, date) in [
        ("Gaston", "Atom", 800, "2025-03-10T12:00:00Z"),
        ("Penelope", "Atom", 2300, "2025-05-20T12:00:00Z"),
        ("Penelope", "Zephyr", 1500, "2025-07-01T12:00:00Z"),
    ] {
        let (status, _) = support::post(
            app,
            "/v1/competitions",
            None,
            json!({
                "pilot": pilot,
                "drone": drone,
                "distance_in_feet": distance,
                "distance_achievement_date": date,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn competitions_list_defaults_to_longest_first() {
    let app = support::test_app().await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;
    seed_competitions(&app, &token).await;

    let (status, listing) = support::get(&app, "/v1/competitions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 3);
    assert_eq!(listing["results"][0]["distance_in_feet"], 2300);
    assert_eq!(listing["results"][0]["pilot"], "Penelope");
    assert_eq!(listing["results"][0]["drone"], "Atom");
}

#[tokio::test]
async fn distance_and_date_ranges_filter_competitions() {
    let app = support::test_app().await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;
    seed_competitions(&app, &token).await;

    let (_, listing) = support::get(&app, "/v1/competitions?min_distance_in_feet=1000", None).await;
    assert_eq!(listing["count"], 2);

    let (_, listing) = support::get(&app, "/v1/competitions?max_distance_in_feet=1000", None).await;
    assert_eq!(listing["count"], 1);

    let (_, listing) = support::get(
        &app,
        "/v1/competitions?from_achievement_date=2025-05-01T00:00:00Z&to_achievement_date=2025-06-01T00:00:00Z",
        None,
    )
    .await;
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["results"][0]["distance_in_feet"], 2300);

    let (_, listing) = support::get(&app, "/v1/competitions?drone_name=Zephyr", None).await;
    assert_eq!(listing["count"], 1);

    let (_, listing) = support::get(&app, "/v1/competitions?pilot_name=Penelope", None).await;
    assert_eq!(listing["count"], 2);

    let (_, listing) = support::get(&app, "/v1/competitions?distance_in_feet=800", None).await;
    assert_eq!(listing["count"], 1);

    let (status, _) = support::get(
        &app,
        "/v1/competitions?from_achievement_date=not-a-date",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pagination_envelope_reports_progress() {
    let app = support::test_app().await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;
    seed_competitions(&app, &token).await;

    let (_, page) = support::get(&app, "/v1/competitions?limit=2", None).await;
    assert_eq!(page["count"], 3);
    assert_eq!(page["results"].as_array().unwrap().len(), 2);
    assert_eq!(page["next_offset"], 2);

    let (_, tail) = support::get(&app, "/v1/competitions?limit=2&offset=2", None).await;
    assert_eq!(tail["count"], 3);
    assert_eq!(tail["results"].as_array().unwrap().len(), 1);
    assert!(tail["next_offset"].is_null());
}

#[tokio::test]
async fn unknown_slugs_name_the_offending_field() {
    let app = support::test_app().await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;
    support::create_category(&app, "Quadcopter").await;
    support::create_drone(&app, &token, "Atom", "Quadcopter").await;
    support::create_pilot(&app, &token, "Gaston", "M", 5).await;

    let (status, body) = support::post(
        &app,
        "/v1/competitions",
        None,
        json!({
            "pilot": "Nobody",
            "drone": "Atom",
            "distance_in_feet": 100,
            "distance_achievement_date": "2025-03-10T12:00:00Z",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("Nobody"));

    let (status, body) = support::post(
        &app,
        "/v1/competitions",
        None,
        json!({
            "pilot": "Gaston",
            "drone": "Ghost",
            "distance_in_feet": 100,
            "distance_achievement_date": "2025-03-10T12:00:00Z",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("Ghost"));
}

#[tokio::test]
async fn competition_update_and_patch() {
    let app = support::test_app().await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;
    seed_competitions(&app, &token).await;

    let (_, listing) = support::get(&app, "/v1/competitions?distance_in_feet=800", None).await;
    let url = listing["results"][0]["url"].as_str().unwrap().to_string();

    let (status, patched) =
        support::patch(&app, &url, None, json!({ "distance_in_feet": 950 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["distance_in_feet"], 950);
    assert_eq!(patched["pilot"], "Gaston");

    let (status, replaced) = support::put(
        &app,
        &url,
        None,
        json!({
            "pilot": "Penelope",
            "drone": "Zephyr",
            "distance_in_feet": 1000,
            "distance_achievement_date": "2025-08-01T00:00:00Z",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["pilot"], "Penelope");
    assert_eq!(replaced["drone"], "Zephyr");

    let (status, _) = support::delete(&app, &url, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = support::get(&app, &url, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ordering_by_achievement_date() {
    let app = support::test_app().await;
    let token = support::register_and_login(&app, "user01", "user01P4ss").await;
    seed_competitions(&app, &token).await;

    let (_, listing) = support::get(
        &app,
        "/v1/competitions?ordering=distance_achievement_date",
        None,
    )
    .await;
    assert_eq!(listing["results"][0]["distance_in_feet"], 800);

    let (_, listing) = support::get(
        &app,
        "/v1/competitions?ordering=-distance_achievement_date",
        None,
    )
    .await;
    assert_eq!(listing["results"][0]["distance_in_feet"], 1500);
}
