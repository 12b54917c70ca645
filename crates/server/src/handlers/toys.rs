use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::{Pool, Postgres, Sqlite};

use crate::app_state::AppState;
use crate::auth::sqlite_pool;
use crate::errors::ServerError;
use crate::models::{ms_from_rfc3339, now_ms, ToyResponse, ToyRow, ToyWriteRequest};

const SELECT_TOY: &str = "SELECT id, name, description, toy_category, release_date_ms, \
    was_included_in_home, created_at_ms FROM toys";

/// The toy listing is a plain array ordered by name; the toy endpoints
/// predate the paginated hyperlinked resources and keep their flat shape.
pub async fn list_toys(
    State(state): State<AppState>,
) -> Result<Json<Vec<ToyResponse>>, ServerError> {
    let rows = if let Some(pool) = &state.postgres {
        sqlx::query_as::<_, ToyRow>(&format!("{SELECT_TOY} ORDER BY name"))
            .fetch_all(pool)
            .await
            .map_err(ServerError::db)?
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query_as::<_, ToyRow>(&format!("{SELECT_TOY} ORDER BY name"))
            .fetch_all(pool)
            .await
            .map_err(ServerError::db)?
    };

    Ok(Json(rows.into_iter().map(ToyRow::into_response).collect()))
}

pub async fn create_toy(
    State(state): State<AppState>,
    Json(payload): Json<ToyWriteRequest>,
) -> Result<(StatusCode, Json<ToyResponse>), ServerError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ServerError::bad_request("name required"));
    }
    let release_ms = ms_from_rfc3339(&payload.release_date, "release_date")?;

    let row = if let Some(pool) = &state.postgres {
        sqlx::query_as::<_, ToyRow>(
            "INSERT INTO toys (name, description, toy_category, release_date_ms, \
             was_included_in_home, created_at_ms) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, name, description, toy_category, release_date_ms, \
             was_included_in_home, created_at_ms",
        )
        .bind(name)
        .bind(&payload.description)
        .bind(&payload.toy_category)
        .bind(release_ms)
        .bind(payload.was_included_in_home)
        .bind(now_ms())
        .fetch_one(pool)
        .await
        .map_err(ServerError::db)?
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query_as::<_, ToyRow>(
            "INSERT INTO toys (name, description, toy_category, release_date_ms, \
             was_included_in_home, created_at_ms) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             RETURNING id, name, description, toy_category, release_date_ms, \
             was_included_in_home, created_at_ms",
        )
        .bind(name)
        .bind(&payload.description)
        .bind(&payload.toy_category)
        .bind(release_ms)
        .bind(payload.was_included_in_home)
        .bind(now_ms())
        .fetch_one(pool)
        .await
        .map_err(ServerError::db)?
    };

    Ok((StatusCode::CREATED, Json(row.into_response())))
}

pub async fn toy_detail(
    State(state): State<AppState>,
    AxumPath(toy_id): AxumPath<i64>,
) -> Result<Json<ToyResponse>, ServerError> {
    let row = if let Some(pool) = &state.postgres {
        fetch_toy_pg(pool, toy_id).await?
    } else {
        fetch_toy_sqlite(sqlite_pool(&state)?, toy_id).await?
    };

    let row = row.ok_or_else(|| ServerError::not_found("toy not found"))?;
    Ok(Json(row.into_response()))
}

/// Full replace; the member endpoint accepts no partial updates.
pub async fn update_toy(
    State(state): State<AppState>,
    AxumPath(toy_id): AxumPath<i64>,
    Json(payload): Json<ToyWriteRequest>,
) -> Result<Json<ToyResponse>, ServerError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ServerError::bad_request("name required"));
    }
    let release_ms = ms_from_rfc3339(&payload.release_date, "release_date")?;

    let rows = if let Some(pool) = &state.postgres {
        sqlx::query(
            "UPDATE toys SET name = $1, description = $2, toy_category = $3, \
             release_date_ms = $4, was_included_in_home = $5 WHERE id = $6",
        )
        .bind(name)
        .bind(&payload.description)
        .bind(&payload.toy_category)
        .bind(release_ms)
        .bind(payload.was_included_in_home)
        .bind(toy_id)
        .execute(pool)
        .await
        .map_err(ServerError::db)?
        .rows_affected()
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query(
            "UPDATE toys SET name = ?1, description = ?2, toy_category = ?3, \
             release_date_ms = ?4, was_included_in_home = ?5 WHERE id = ?6",
        )
        .bind(name)
        .bind(&payload.description)
        .bind(&payload.toy_category)
        .bind(release_ms)
        .bind(payload.was_included_in_home)
        .bind(toy_id)
        .execute(pool)
        .await
        .map_err(ServerError::db)?
        .rows_affected()
    };

    if rows == 0 {
        return Err(ServerError::not_found("toy not found"));
    }
    toy_detail(State(state), AxumPath(toy_id)).await
}

pub async fn delete_toy(
    State(state): State<AppState>,
    AxumPath(toy_id): AxumPath<i64>,
) -> Result<StatusCode, ServerError> {
    let rows = if let Some(pool) = &state.postgres {
        sqlx::query("DELETE FROM toys WHERE id = $1")
            .bind(toy_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query("DELETE FROM toys WHERE id = ?1")
            .bind(toy_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    };

    if rows == 0 {
        return Err(ServerError::not_found("toy not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_toy_pg(pool: &Pool<Postgres>, toy_id: i64) -> Result<Option<ToyRow>, ServerError> {
    sqlx::query_as::<_, ToyRow>(&format!("{SELECT_TOY} WHERE id = $1"))
        .bind(toy_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)
}

async fn fetch_toy_sqlite(pool: &Pool<Sqlite>, toy_id: i64) -> Result<Option<ToyRow>, ServerError> {
    sqlx::query_as::<_, ToyRow>(&format!("{SELECT_TOY} WHERE id = ?1"))
        .bind(toy_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)
}
