use std::collections::HashMap;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::{Pool, Postgres, QueryBuilder, Sqlite};

use crate::app_state::AppState;
use crate::auth::{auth_user_id, sqlite_pool};
use crate::errors::{map_db_error, ServerError};
use crate::filters::{ordering_clause, page_window, prefix_pattern};
use crate::models::{
    now_ms, validate_gender, CompetitionNested, ListResponse, PilotCompetitionRow, PilotListQuery,
    PilotPatchRequest, PilotResponse, PilotRow, PilotWriteRequest,
};
use crate::throttle::{caller_key, SCOPE_PILOTS};

const ORDERING: &[(&str, &str)] = &[("name", "name"), ("races_count", "races_count")];
const DEFAULT_ORDER: &str = "name ASC";
const DUPLICATE_MSG: &str = "pilot with this name already exists";

const SELECT_PILOT: &str = "SELECT id, name, gender, races_count, inserted_at_ms FROM pilots";

/// Join feeding the nested competition list; one query serves a whole
/// page of pilots.
const SELECT_PILOT_COMPETITIONS: &str = "SELECT c.id, c.pilot_id, c.distance_in_feet, \
    c.distance_achievement_date_ms, d.id AS drone_id, d.name AS drone_name, \
    dc.name AS category_name, u.username AS owner_name, d.manufacturing_date_ms, \
    d.has_completed_missions, d.inserted_at_ms AS drone_inserted_at_ms \
    FROM competitions c \
    JOIN drones d ON d.id = c.drone_id \
    JOIN drone_categories dc ON dc.id = d.category_id \
    JOIN users u ON u.id = d.owner_id";

pub async fn list_pilots(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PilotListQuery>,
) -> Result<Json<ListResponse<PilotResponse>>, ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_PILOTS, &caller_key(Some(user_id)))?;

    let (limit, offset) = page_window(query.limit, query.offset);
    let order = ordering_clause(query.ordering.as_deref(), ORDERING, DEFAULT_ORDER)?;

    if let Some(pool) = &state.postgres {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM pilots WHERE 1=1");
        push_filters_pg(&mut count, &query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(pool)
            .await
            .map_err(ServerError::db)?;

        let mut builder = QueryBuilder::<Postgres>::new(format!("{SELECT_PILOT} WHERE 1=1"));
        push_filters_pg(&mut builder, &query);
        builder.push(format!(" ORDER BY {order} LIMIT "));
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);
        let rows = builder
            .build_query_as::<PilotRow>()
            .fetch_all(pool)
            .await
            .map_err(ServerError::db)?;

        let results = expand_pg(pool, rows).await?;
        return Ok(Json(ListResponse::page(total, results, offset, limit)));
    }

    let pool = sqlite_pool(&state)?;
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM pilots WHERE 1=1");
    push_filters_sqlite(&mut count, &query);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await
        .map_err(ServerError::db)?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!("{SELECT_PILOT} WHERE 1=1"));
    push_filters_sqlite(&mut builder, &query);
    builder.push(format!(" ORDER BY {order} LIMIT "));
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);
    let rows = builder
        .build_query_as::<PilotRow>()
        .fetch_all(pool)
        .await
        .map_err(ServerError::db)?;

    let results = expand_sqlite(pool, rows).await?;
    Ok(Json(ListResponse::page(total, results, offset, limit)))
}

pub async fn create_pilot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PilotWriteRequest>,
) -> Result<(StatusCode, Json<PilotResponse>), ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_PILOTS, &caller_key(Some(user_id)))?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ServerError::bad_request("name required"));
    }
    let gender = validate_gender(&payload.gender)?;

    let row = if let Some(pool) = &state.postgres {
        sqlx::query_as::<_, PilotRow>(
            "INSERT INTO pilots (name, gender, races_count, inserted_at_ms) \
             VALUES ($1, $2, $3, $4) RETURNING id, name, gender, races_count, inserted_at_ms",
        )
        .bind(name)
        .bind(&gender)
        .bind(payload.races_count)
        .bind(now_ms())
        .fetch_one(pool)
        .await
        .map_err(|e| map_db_error(e, DUPLICATE_MSG))?
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query_as::<_, PilotRow>(
            "INSERT INTO pilots (name, gender, races_count, inserted_at_ms) \
             VALUES (?1, ?2, ?3, ?4) RETURNING id, name, gender, races_count, inserted_at_ms",
        )
        .bind(name)
        .bind(&gender)
        .bind(payload.races_count)
        .bind(now_ms())
        .fetch_one(pool)
        .await
        .map_err(|e| map_db_error(e, DUPLICATE_MSG))?
    };

    Ok((StatusCode::CREATED, Json(row.into_response(Vec::new()))))
}

pub async fn pilot_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(pilot_id): AxumPath<i64>,
) -> Result<Json<PilotResponse>, ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_PILOTS, &caller_key(Some(user_id)))?;

    let response = load_pilot(&state, pilot_id).await?;
    Ok(Json(response))
}

async fn load_pilot(state: &AppState, pilot_id: i64) -> Result<PilotResponse, ServerError> {
    if let Some(pool) = &state.postgres {
        let row = sqlx::query_as::<_, PilotRow>(&format!("{SELECT_PILOT} WHERE id = $1"))
            .bind(pilot_id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::db)?
            .ok_or_else(|| ServerError::not_found("pilot not found"))?;
        let mut results = expand_pg(pool, vec![row]).await?;
        return results
            .pop()
            .ok_or_else(|| ServerError::internal("pilot expansion failed"));
    }

    let pool = sqlite_pool(state)?;
    let row = sqlx::query_as::<_, PilotRow>(&format!("{SELECT_PILOT} WHERE id = ?1"))
        .bind(pilot_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::not_found("pilot not found"))?;
    let mut results = expand_sqlite(pool, vec![row]).await?;
    results
        .pop()
        .ok_or_else(|| ServerError::internal("pilot expansion failed"))
}

pub async fn update_pilot(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(pilot_id): AxumPath<i64>,
    Json(payload): Json<PilotWriteRequest>,
) -> Result<Json<PilotResponse>, ServerError> {
    let patch = PilotPatchRequest {
        name: Some(payload.name),
        gender: Some(payload.gender),
        races_count: Some(payload.races_count),
    };
    apply_pilot_write(state, headers, pilot_id, patch).await
}

pub async fn patch_pilot(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(pilot_id): AxumPath<i64>,
    Json(payload): Json<PilotPatchRequest>,
) -> Result<Json<PilotResponse>, ServerError> {
    apply_pilot_write(state, headers, pilot_id, payload).await
}

pub async fn delete_pilot(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(pilot_id): AxumPath<i64>,
) -> Result<StatusCode, ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_PILOTS, &caller_key(Some(user_id)))?;

    let rows = if let Some(pool) = &state.postgres {
        sqlx::query("DELETE FROM pilots WHERE id = $1")
            .bind(pilot_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query("DELETE FROM pilots WHERE id = ?1")
            .bind(pilot_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    };

    if rows == 0 {
        return Err(ServerError::not_found("pilot not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(sqlx::FromRow)]
struct PilotCore {
    name: String,
    gender: String,
    races_count: i64,
}

async fn apply_pilot_write(
    state: AppState,
    headers: HeaderMap,
    pilot_id: i64,
    patch: PilotPatchRequest,
) -> Result<Json<PilotResponse>, ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_PILOTS, &caller_key(Some(user_id)))?;

    let name = match &patch.name {
        Some(name) => {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(ServerError::bad_request("name required"));
            }
            Some(trimmed.to_string())
        }
        None => None,
    };
    let gender = patch
        .gender
        .as_deref()
        .map(validate_gender)
        .transpose()?;

    if let Some(pool) = &state.postgres {
        let current = sqlx::query_as::<_, PilotCore>(
            "SELECT name, gender, races_count FROM pilots WHERE id = $1",
        )
        .bind(pilot_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::not_found("pilot not found"))?;

        sqlx::query("UPDATE pilots SET name = $1, gender = $2, races_count = $3 WHERE id = $4")
            .bind(name.unwrap_or(current.name))
            .bind(gender.unwrap_or(current.gender))
            .bind(patch.races_count.unwrap_or(current.races_count))
            .bind(pilot_id)
            .execute(pool)
            .await
            .map_err(|e| map_db_error(e, DUPLICATE_MSG))?;
    } else {
        let pool = sqlite_pool(&state)?;
        let current = sqlx::query_as::<_, PilotCore>(
            "SELECT name, gender, races_count FROM pilots WHERE id = ?1",
        )
        .bind(pilot_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::not_found("pilot not found"))?;

        sqlx::query("UPDATE pilots SET name = ?1, gender = ?2, races_count = ?3 WHERE id = ?4")
            .bind(name.unwrap_or(current.name))
            .bind(gender.unwrap_or(current.gender))
            .bind(patch.races_count.unwrap_or(current.races_count))
            .bind(pilot_id)
            .execute(pool)
            .await
            .map_err(|e| map_db_error(e, DUPLICATE_MSG))?;
    }

    let response = load_pilot(&state, pilot_id).await?;
    Ok(Json(response))
}

async fn expand_pg(
    pool: &Pool<Postgres>,
    rows: Vec<PilotRow>,
) -> Result<Vec<PilotResponse>, ServerError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("{SELECT_PILOT_COMPETITIONS} WHERE c.pilot_id IN ("));
    let mut separated = builder.separated(", ");
    for row in &rows {
        separated.push_bind(row.id);
    }
    builder.push(") ORDER BY c.distance_in_feet DESC");
    let competitions = builder
        .build_query_as::<PilotCompetitionRow>()
        .fetch_all(pool)
        .await
        .map_err(ServerError::db)?;
    Ok(zip_competitions(rows, competitions))
}

async fn expand_sqlite(
    pool: &Pool<Sqlite>,
    rows: Vec<PilotRow>,
) -> Result<Vec<PilotResponse>, ServerError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder =
        QueryBuilder::<Sqlite>::new(format!("{SELECT_PILOT_COMPETITIONS} WHERE c.pilot_id IN ("));
    let mut separated = builder.separated(", ");
    for row in &rows {
        separated.push_bind(row.id);
    }
    builder.push(") ORDER BY c.distance_in_feet DESC");
    let competitions = builder
        .build_query_as::<PilotCompetitionRow>()
        .fetch_all(pool)
        .await
        .map_err(ServerError::db)?;
    Ok(zip_competitions(rows, competitions))
}

fn zip_competitions(
    rows: Vec<PilotRow>,
    competitions: Vec<PilotCompetitionRow>,
) -> Vec<PilotResponse> {
    let mut by_pilot: HashMap<i64, Vec<CompetitionNested>> = HashMap::new();
    for row in competitions {
        let (pilot_id, nested) = row.into_nested();
        by_pilot.entry(pilot_id).or_default().push(nested);
    }
    rows.into_iter()
        .map(|row| {
            let competitions = by_pilot.remove(&row.id).unwrap_or_default();
            row.into_response(competitions)
        })
        .collect()
}

fn push_filters_pg(builder: &mut QueryBuilder<Postgres>, query: &PilotListQuery) {
    if let Some(name) = &query.name {
        builder.push(" AND name = ");
        builder.push_bind(name.clone());
    }
    if let Some(gender) = &query.gender {
        builder.push(" AND gender = ");
        builder.push_bind(gender.clone());
    }
    if let Some(races_count) = query.races_count {
        builder.push(" AND races_count = ");
        builder.push_bind(races_count);
    }
    if let Some(term) = &query.search {
        builder.push(" AND name LIKE ");
        builder.push_bind(prefix_pattern(term));
        builder.push(" ESCAPE '\\'");
    }
}

fn push_filters_sqlite(builder: &mut QueryBuilder<Sqlite>, query: &PilotListQuery) {
    if let Some(name) = &query.name {
        builder.push(" AND name = ");
        builder.push_bind(name.clone());
    }
    if let Some(gender) = &query.gender {
        builder.push(" AND gender = ");
        builder.push_bind(gender.clone());
    }
    if let Some(races_count) = query.races_count {
        builder.push(" AND races_count = ");
        builder.push_bind(races_count);
    }
    if let Some(term) = &query.search {
        builder.push(" AND name LIKE ");
        builder.push_bind(prefix_pattern(term));
        builder.push(" ESCAPE '\\'");
    }
}
