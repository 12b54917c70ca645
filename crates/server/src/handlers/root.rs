use axum::Json;

use crate::links;

/// Entry point of the API: resource collections by name.
pub async fn api_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "drone-categories": links::CATEGORIES,
        "drones": links::DRONES,
        "pilots": links::PILOTS,
        "competitions": links::COMPETITIONS,
        "toys": links::TOYS,
    }))
}
