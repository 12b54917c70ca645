mod auth;
mod categories;
mod competitions;
mod drones;
mod health;
mod pilots;
mod root;
mod toys;
mod users;

use axum::routing::{delete, get, patch, post, put};
use axum::Router;

use crate::app_state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1", get(root::api_root))
        .route("/v1/users", post(users::create_user))
        .route("/v1/users/password", post(users::change_password))
        .route("/v1/users/me", delete(users::delete_user))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/drone-categories", get(categories::list_categories))
        .route("/v1/drone-categories", post(categories::create_category))
        .route("/v1/drone-categories/:category_id", get(categories::category_detail))
        .route("/v1/drone-categories/:category_id", put(categories::update_category))
        .route("/v1/drone-categories/:category_id", patch(categories::patch_category))
        .route("/v1/drone-categories/:category_id", delete(categories::delete_category))
        .route("/v1/drones", get(drones::list_drones))
        .route("/v1/drones", post(drones::create_drone))
        .route("/v1/drones/:drone_id", get(drones::drone_detail))
        .route("/v1/drones/:drone_id", put(drones::update_drone))
        .route("/v1/drones/:drone_id", patch(drones::patch_drone))
        .route("/v1/drones/:drone_id", delete(drones::delete_drone))
        .route("/v1/pilots", get(pilots::list_pilots))
        .route("/v1/pilots", post(pilots::create_pilot))
        .route("/v1/pilots/:pilot_id", get(pilots::pilot_detail))
        .route("/v1/pilots/:pilot_id", put(pilots::update_pilot))
        .route("/v1/pilots/:pilot_id", patch(pilots::patch_pilot))
        .route("/v1/pilots/:pilot_id", delete(pilots::delete_pilot))
        .route("/v1/competitions", get(competitions::list_competitions))
        .route("/v1/competitions", post(competitions::create_competition))
        .route("/v1/competitions/:competition_id", get(competitions::competition_detail))
        .route("/v1/competitions/:competition_id", put(competitions::update_competition))
        .route("/v1/competitions/:competition_id", patch(competitions::patch_competition))
        .route("/v1/competitions/:competition_id", delete(competitions::delete_competition))
        .route("/v1/toys", get(toys::list_toys))
        .route("/v1/toys", post(toys::create_toy))
        .route("/v1/toys/:toy_id", get(toys::toy_detail))
        .route("/v1/toys/:toy_id", put(toys::update_toy))
        .route("/v1/toys/:toy_id", delete(toys::delete_toy))
        .with_state(state)
}
