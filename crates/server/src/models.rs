//! Request, response and row types for every resource, plus the small
//! conversions between stored values (epoch milliseconds, gender codes)
//! and their JSON representations (RFC 3339 strings, display labels).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;
use crate::links;

pub const GENDER_MALE: &str = "M";
pub const GENDER_FEMALE: &str = "F";

/// Pagination envelope for hyperlinked list endpoints: `count` is the
/// total matching rows, `next_offset` the offset of the following page or
/// null once the listing is exhausted.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub count: i64,
    pub results: Vec<T>,
    pub next_offset: Option<i64>,
}

impl<T> ListResponse<T> {
    pub fn page(count: i64, results: Vec<T>, offset: i64, limit: i64) -> Self {
        let consumed = offset + results.len() as i64;
        let next_offset = if results.is_empty() || consumed >= count || limit == 0 {
            None
        } else {
            Some(consumed)
        };
        Self {
            count,
            results,
            next_offset,
        }
    }
}

// ---------------------------------------------------------------------------
// accounts

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}

// ---------------------------------------------------------------------------
// drone categories

#[derive(Debug, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub url: String,
    pub pk: i64,
    pub name: String,
    pub drones: Vec<String>,
}

impl CategoryRow {
    pub fn into_response(self, drones: Vec<String>) -> CategoryResponse {
        CategoryResponse {
            url: links::category(self.id),
            pk: self.id,
            name: self.name,
            drones,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryWriteRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryPatchRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryListQuery {
    pub name: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ---------------------------------------------------------------------------
// drones

#[derive(Debug, sqlx::FromRow)]
pub struct DroneRow {
    pub id: i64,
    pub name: String,
    pub category_name: String,
    pub owner_name: String,
    pub manufacturing_date_ms: i64,
    pub has_completed_missions: bool,
    pub inserted_at_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct DroneResponse {
    pub url: String,
    pub name: String,
    pub drone_category: String,
    pub owner: String,
    pub manufacturing_date: String,
    pub has_it_completed_missions: bool,
    pub inserted_timestamp: String,
}

impl DroneRow {
    pub fn into_response(self) -> DroneResponse {
        DroneResponse {
            url: links::drone(self.id),
            name: self.name,
            drone_category: self.category_name,
            owner: self.owner_name,
            manufacturing_date: rfc3339_from_ms(self.manufacturing_date_ms),
            has_it_completed_missions: self.has_completed_missions,
            inserted_timestamp: rfc3339_from_ms(self.inserted_at_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DroneWriteRequest {
    pub name: String,
    pub drone_category: String,
    pub manufacturing_date: String,
    pub has_it_completed_missions: bool,
}

#[derive(Debug, Deserialize)]
pub struct DronePatchRequest {
    pub name: Option<String>,
    pub drone_category: Option<String>,
    pub manufacturing_date: Option<String>,
    pub has_it_completed_missions: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DroneListQuery {
    pub name: Option<String>,
    pub drone_category: Option<String>,
    pub manufacturing_date: Option<String>,
    pub has_it_completed_missions: Option<bool>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ---------------------------------------------------------------------------
// pilots

#[derive(Debug, sqlx::FromRow)]
pub struct PilotRow {
    pub id: i64,
    pub name: String,
    pub gender: String,
    pub races_count: i64,
    pub inserted_at_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct PilotResponse {
    pub url: String,
    pub name: String,
    pub gender: String,
    pub gender_description: String,
    pub races_count: i64,
    pub inserted_timestamp: String,
    pub competitions: Vec<CompetitionNested>,
}

impl PilotRow {
    pub fn into_response(self, competitions: Vec<CompetitionNested>) -> PilotResponse {
        let gender_description = gender_description(&self.gender).to_string();
        PilotResponse {
            url: links::pilot(self.id),
            name: self.name,
            gender: self.gender,
            gender_description,
            races_count: self.races_count,
            inserted_timestamp: rfc3339_from_ms(self.inserted_at_ms),
            competitions,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PilotWriteRequest {
    pub name: String,
    pub gender: String,
    pub races_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct PilotPatchRequest {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub races_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PilotListQuery {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub races_count: Option<i64>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ---------------------------------------------------------------------------
// competitions

#[derive(Debug, sqlx::FromRow)]
pub struct CompetitionRow {
    pub id: i64,
    pub pilot_name: String,
    pub drone_name: String,
    pub distance_in_feet: i64,
    pub distance_achievement_date_ms: i64,
}

/// Top-level competition representation: pilot and drone appear by name.
#[derive(Debug, Serialize)]
pub struct CompetitionResponse {
    pub url: String,
    pub pk: i64,
    pub distance_in_feet: i64,
    pub distance_achievement_date: String,
    pub pilot: String,
    pub drone: String,
}

impl CompetitionRow {
    pub fn into_response(self) -> CompetitionResponse {
        CompetitionResponse {
            url: links::competition(self.id),
            pk: self.id,
            distance_in_feet: self.distance_in_feet,
            distance_achievement_date: rfc3339_from_ms(self.distance_achievement_date_ms),
            pilot: self.pilot_name,
            drone: self.drone_name,
        }
    }
}

/// Competition as nested under a pilot: the drone is fully expanded.
#[derive(Debug, Serialize)]
pub struct CompetitionNested {
    pub url: String,
    pub pk: i64,
    pub drone: DroneResponse,
    pub distance_in_feet: i64,
    pub distance_achievement_date: String,
}

/// Join row feeding [`CompetitionNested`]; one query covers a whole page
/// of pilots.
#[derive(Debug, sqlx::FromRow)]
pub struct PilotCompetitionRow {
    pub id: i64,
    pub pilot_id: i64,
    pub distance_in_feet: i64,
    pub distance_achievement_date_ms: i64,
    pub drone_id: i64,
    pub drone_name: String,
    pub category_name: String,
    pub owner_name: String,
    pub manufacturing_date_ms: i64,
    pub has_completed_missions: bool,
    pub drone_inserted_at_ms: i64,
}

impl PilotCompetitionRow {
    pub fn into_nested(self) -> (i64, CompetitionNested) {
        let drone = DroneRow {
            id: self.drone_id,
            name: self.drone_name,
            category_name: self.category_name,
            owner_name: self.owner_name,
            manufacturing_date_ms: self.manufacturing_date_ms,
            has_completed_missions: self.has_completed_missions,
            inserted_at_ms: self.drone_inserted_at_ms,
        };
        let nested = CompetitionNested {
            url: links::competition(self.id),
            pk: self.id,
            drone: drone.into_response(),
            distance_in_feet: self.distance_in_feet,
            distance_achievement_date: rfc3339_from_ms(self.distance_achievement_date_ms),
        };
        (self.pilot_id, nested)
    }
}

#[derive(Debug, Deserialize)]
pub struct CompetitionWriteRequest {
    pub pilot: String,
    pub drone: String,
    pub distance_in_feet: i64,
    pub distance_achievement_date: String,
}

#[derive(Debug, Deserialize)]
pub struct CompetitionPatchRequest {
    pub pilot: Option<String>,
    pub drone: Option<String>,
    pub distance_in_feet: Option<i64>,
    pub distance_achievement_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompetitionListQuery {
    pub distance_in_feet: Option<i64>,
    pub from_achievement_date: Option<String>,
    pub to_achievement_date: Option<String>,
    pub min_distance_in_feet: Option<i64>,
    pub max_distance_in_feet: Option<i64>,
    pub drone_name: Option<String>,
    pub pilot_name: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ---------------------------------------------------------------------------
// toys

#[derive(Debug, sqlx::FromRow)]
pub struct ToyRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub toy_category: String,
    pub release_date_ms: i64,
    pub was_included_in_home: bool,
    pub created_at_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct ToyResponse {
    pub pk: i64,
    pub name: String,
    pub description: String,
    pub toy_category: String,
    pub release_date: String,
    pub was_included_in_home: bool,
    pub created: String,
}

impl ToyRow {
    pub fn into_response(self) -> ToyResponse {
        ToyResponse {
            pk: self.id,
            name: self.name,
            description: self.description,
            toy_category: self.toy_category,
            release_date: rfc3339_from_ms(self.release_date_ms),
            was_included_in_home: self.was_included_in_home,
            created: rfc3339_from_ms(self.created_at_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToyWriteRequest {
    pub name: String,
    pub description: String,
    pub toy_category: String,
    pub release_date: String,
    #[serde(default)]
    pub was_included_in_home: bool,
}

// ---------------------------------------------------------------------------
// shared value mapping

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn rfc3339_from_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

pub fn ms_from_rfc3339(raw: &str, field: &str) -> Result<i64, ServerError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| {
            ServerError::bad_request(format!("invalid {field}: expected an RFC 3339 datetime"))
        })
}

pub fn validate_gender(raw: &str) -> Result<String, ServerError> {
    let trimmed = raw.trim();
    if trimmed == GENDER_MALE || trimmed == GENDER_FEMALE {
        return Ok(trimmed.to_string());
    }
    Err(ServerError::bad_request(format!(
        "invalid gender '{raw}': expected '{GENDER_MALE}' or '{GENDER_FEMALE}'"
    )))
}

pub fn gender_description(code: &str) -> &'static str {
    match code {
        GENDER_MALE => "Male",
        GENDER_FEMALE => "Female",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_through_rfc3339() {
        let ms = ms_from_rfc3339("2025-11-02T09:30:00Z", "manufacturing_date").unwrap();
        assert_eq!(ms, 1_762_075_800_000);
        assert_eq!(rfc3339_from_ms(ms), "2025-11-02T09:30:00+00:00");
    }

    #[test]
    fn timestamps_honour_offsets() {
        let ms = ms_from_rfc3339("2025-11-02T10:30:00+01:00", "release_date").unwrap();
        assert_eq!(ms, 1_762_075_800_000);
        assert!(ms_from_rfc3339("yesterday", "release_date").is_err());
    }

    #[test]
    fn gender_codes_map_to_descriptions() {
        assert_eq!(validate_gender(" M ").unwrap(), "M");
        assert_eq!(validate_gender("F").unwrap(), "F");
        assert!(validate_gender("X").is_err());
        assert_eq!(gender_description("M"), "Male");
        assert_eq!(gender_description("F"), "Female");
    }

    #[test]
    fn list_pages_compute_next_offset() {
        let page = ListResponse::page(5, vec![1, 2], 0, 2);
        assert_eq!(page.next_offset, Some(2));

        let tail = ListResponse::page(5, vec![5], 4, 2);
        assert_eq!(tail.next_offset, None);

        let empty: ListResponse<i64> = ListResponse::page(0, vec![], 0, 50);
        assert_eq!(empty.next_offset, None);
    }
}
