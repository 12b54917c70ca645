use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::{Pool, Postgres, QueryBuilder, Sqlite};

use crate::app_state::AppState;
use crate::auth::{auth_user_id, optional_user_id, sqlite_pool};
use crate::errors::{map_db_error, ServerError};
use crate::filters::{ordering_clause, page_window, prefix_pattern};
use crate::models::{
    ms_from_rfc3339, now_ms, DroneListQuery, DronePatchRequest, DroneResponse, DroneRow,
    DroneWriteRequest, ListResponse,
};
use crate::throttle::{caller_key, SCOPE_DRONES};

const ORDERING: &[(&str, &str)] = &[
    ("name", "d.name"),
    ("manufacturing_date", "d.manufacturing_date_ms"),
];
const DEFAULT_ORDER: &str = "d.name ASC";
const DUPLICATE_MSG: &str = "drone with this name already exists";

const SELECT_DRONE: &str = "SELECT d.id, d.name, c.name AS category_name, \
    u.username AS owner_name, d.manufacturing_date_ms, d.has_completed_missions, \
    d.inserted_at_ms \
    FROM drones d \
    JOIN drone_categories c ON c.id = d.category_id \
    JOIN users u ON u.id = d.owner_id";

const COUNT_DRONES: &str = "SELECT COUNT(*) \
    FROM drones d \
    JOIN drone_categories c ON c.id = d.category_id \
    JOIN users u ON u.id = d.owner_id";

/// Fields the drone filter set compares against, with dates already
/// normalized to epoch milliseconds.
struct DroneFilters {
    name: Option<String>,
    category: Option<String>,
    manufacturing_date_ms: Option<i64>,
    has_completed_missions: Option<bool>,
    search: Option<String>,
}

impl DroneFilters {
    fn from_query(query: &DroneListQuery) -> Result<Self, ServerError> {
        let manufacturing_date_ms = query
            .manufacturing_date
            .as_deref()
            .map(|raw| ms_from_rfc3339(raw, "manufacturing_date"))
            .transpose()?;
        Ok(Self {
            name: query.name.clone(),
            category: query.drone_category.clone(),
            manufacturing_date_ms,
            has_completed_missions: query.has_it_completed_missions,
            search: query.search.clone(),
        })
    }
}

pub async fn list_drones(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DroneListQuery>,
) -> Result<Json<ListResponse<DroneResponse>>, ServerError> {
    let user_id = optional_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_DRONES, &caller_key(user_id))?;

    let (limit, offset) = page_window(query.limit, query.offset);
    let order = ordering_clause(query.ordering.as_deref(), ORDERING, DEFAULT_ORDER)?;
    let filters = DroneFilters::from_query(&query)?;

    if let Some(pool) = &state.postgres {
        let mut count = QueryBuilder::<Postgres>::new(format!("{COUNT_DRONES} WHERE 1=1"));
        push_filters_pg(&mut count, &filters);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(pool)
            .await
            .map_err(ServerError::db)?;

        let mut builder = QueryBuilder::<Postgres>::new(format!("{SELECT_DRONE} WHERE 1=1"));
        push_filters_pg(&mut builder, &filters);
        builder.push(format!(" ORDER BY {order} LIMIT "));
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);
        let rows = builder
            .build_query_as::<DroneRow>()
            .fetch_all(pool)
            .await
            .map_err(ServerError::db)?;

        let results = rows.into_iter().map(DroneRow::into_response).collect();
        return Ok(Json(ListResponse::page(total, results, offset, limit)));
    }

    let pool = sqlite_pool(&state)?;
    let mut count = QueryBuilder::<Sqlite>::new(format!("{COUNT_DRONES} WHERE 1=1"));
    push_filters_sqlite(&mut count, &filters);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await
        .map_err(ServerError::db)?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!("{SELECT_DRONE} WHERE 1=1"));
    push_filters_sqlite(&mut builder, &filters);
    builder.push(format!(" ORDER BY {order} LIMIT "));
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);
    let rows = builder
        .build_query_as::<DroneRow>()
        .fetch_all(pool)
        .await
        .map_err(ServerError::db)?;

    let results = rows.into_iter().map(DroneRow::into_response).collect();
    Ok(Json(ListResponse::page(total, results, offset, limit)))
}

/// Creating a drone records the caller as its owner.
pub async fn create_drone(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DroneWriteRequest>,
) -> Result<(StatusCode, Json<DroneResponse>), ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_DRONES, &caller_key(Some(user_id)))?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ServerError::bad_request("name required"));
    }
    let manufacturing_ms = ms_from_rfc3339(&payload.manufacturing_date, "manufacturing_date")?;

    if let Some(pool) = &state.postgres {
        let category_id = resolve_category_pg(pool, &payload.drone_category).await?;
        let drone_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO drones (name, category_id, owner_id, manufacturing_date_ms, \
             has_completed_missions, inserted_at_ms) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(name)
        .bind(category_id)
        .bind(user_id)
        .bind(manufacturing_ms)
        .bind(payload.has_it_completed_missions)
        .bind(now_ms())
        .fetch_one(pool)
        .await
        .map_err(|e| map_db_error(e, DUPLICATE_MSG))?;

        let row = fetch_drone_pg(pool, drone_id)
            .await?
            .ok_or_else(|| ServerError::internal("drone row missing after insert"))?;
        return Ok((StatusCode::CREATED, Json(row.into_response())));
    }

    let pool = sqlite_pool(&state)?;
    let category_id = resolve_category_sqlite(pool, &payload.drone_category).await?;
    let drone_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO drones (name, category_id, owner_id, manufacturing_date_ms, \
         has_completed_missions, inserted_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id",
    )
    .bind(name)
    .bind(category_id)
    .bind(user_id)
    .bind(manufacturing_ms)
    .bind(payload.has_it_completed_missions)
    .bind(now_ms())
    .fetch_one(pool)
    .await
    .map_err(|e| map_db_error(e, DUPLICATE_MSG))?;

    let row = fetch_drone_sqlite(pool, drone_id)
        .await?
        .ok_or_else(|| ServerError::internal("drone row missing after insert"))?;
    Ok((StatusCode::CREATED, Json(row.into_response())))
}

pub async fn drone_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(drone_id): AxumPath<i64>,
) -> Result<Json<DroneResponse>, ServerError> {
    let user_id = optional_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_DRONES, &caller_key(user_id))?;

    let row = if let Some(pool) = &state.postgres {
        fetch_drone_pg(pool, drone_id).await?
    } else {
        fetch_drone_sqlite(sqlite_pool(&state)?, drone_id).await?
    };

    let row = row.ok_or_else(|| ServerError::not_found("drone not found"))?;
    Ok(Json(row.into_response()))
}

pub async fn update_drone(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(drone_id): AxumPath<i64>,
    Json(payload): Json<DroneWriteRequest>,
) -> Result<Json<DroneResponse>, ServerError> {
    let patch = DronePatchRequest {
        name: Some(payload.name),
        drone_category: Some(payload.drone_category),
        manufacturing_date: Some(payload.manufacturing_date),
        has_it_completed_missions: Some(payload.has_it_completed_missions),
    };
    apply_drone_write(state, headers, drone_id, patch).await
}

pub async fn patch_drone(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(drone_id): AxumPath<i64>,
    Json(payload): Json<DronePatchRequest>,
) -> Result<Json<DroneResponse>, ServerError> {
    apply_drone_write(state, headers, drone_id, payload).await
}

pub async fn delete_drone(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(drone_id): AxumPath<i64>,
) -> Result<StatusCode, ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_DRONES, &caller_key(Some(user_id)))?;

    if let Some(pool) = &state.postgres {
        require_owner_pg(pool, drone_id, user_id).await?;
        sqlx::query("DELETE FROM drones WHERE id = $1")
            .bind(drone_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?;
    } else {
        let pool = sqlite_pool(&state)?;
        require_owner_sqlite(pool, drone_id, user_id).await?;
        sqlx::query("DELETE FROM drones WHERE id = ?1")
            .bind(drone_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?;
    }

    Ok(StatusCode::NO_CONTENT)
}

#[derive(sqlx::FromRow)]
struct DroneCore {
    name: String,
    category_id: i64,
    manufacturing_date_ms: i64,
    has_completed_missions: bool,
}

/// Shared write path for PUT and PATCH: the owner check runs first, then
/// absent fields fall back to the stored values.
async fn apply_drone_write(
    state: AppState,
    headers: HeaderMap,
    drone_id: i64,
    patch: DronePatchRequest,
) -> Result<Json<DroneResponse>, ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;
    state.throttle.check(SCOPE_DRONES, &caller_key(Some(user_id)))?;

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
    let manufacturing_ms = patch
        .manufacturing_date
        .as_deref()
        .map(|raw| ms_from_rfc3339(raw, "manufacturing_date"))
        .transpose()?;

    if let Some(pool) = &state.postgres {
        require_owner_pg(pool, drone_id, user_id).await?;
        let current = sqlx::query_as::<_, DroneCore>(
            "SELECT name, category_id, manufacturing_date_ms, has_completed_missions \
             FROM drones WHERE id = $1",
        )
        .bind(drone_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::not_found("drone not found"))?;

        let category_id = match &patch.drone_category {
            Some(category) => resolve_category_pg(pool, category).await?,
            None => current.category_id,
        };

        sqlx::query(
            "UPDATE drones SET name = $1, category_id = $2, manufacturing_date_ms = $3, \
             has_completed_missions = $4 WHERE id = $5",
        )
        .bind(name.unwrap_or(current.name))
        .bind(category_id)
        .bind(manufacturing_ms.unwrap_or(current.manufacturing_date_ms))
        .bind(
            patch
                .has_it_completed_missions
                .unwrap_or(current.has_completed_missions),
        )
        .bind(drone_id)
        .execute(pool)
        .await
        .map_err(|e| map_db_error(e, DUPLICATE_MSG))?;

        let row = fetch_drone_pg(pool, drone_id)
            .await?
            .ok_or_else(|| ServerError::not_found("drone not found"))?;
        return Ok(Json(row.into_response()));
    }

    let pool = sqlite_pool(&state)?;
    require_owner_sqlite(pool, drone_id, user_id).await?;
    let current = sqlx::query_as::<_, DroneCore>(
        "SELECT name, category_id, manufacturing_date_ms, has_completed_missions \
         FROM drones WHERE id = ?1",
    )
    .bind(drone_id)
    .fetch_optional(pool)
    .await
    .map_err(ServerError::db)?
    .ok_or_else(|| ServerError::not_found("drone not found"))?;

    let category_id = match &patch.drone_category {
        Some(category) => resolve_category_sqlite(pool, category).await?,
        None => current.category_id,
    };

    sqlx::query(
        "UPDATE drones SET name = ?1, category_id = ?2, manufacturing_date_ms = ?3, \
         has_completed_missions = ?4 WHERE id = ?5",
    )
    .bind(name.unwrap_or(current.name))
    .bind(category_id)
    .bind(manufacturing_ms.unwrap_or(current.manufacturing_date_ms))
    .bind(
        patch
            .has_it_completed_missions
            .unwrap_or(current.has_completed_missions),
    )
    .bind(drone_id)
    .execute(pool)
    .await
    .map_err(|e| map_db_error(e, DUPLICATE_MSG))?;

    let row = fetch_drone_sqlite(pool, drone_id)
        .await?
        .ok_or_else(|| ServerError::not_found("drone not found"))?;
    Ok(Json(row.into_response()))
}

/// Owner-or-read-only: unsafe methods are refused unless the caller owns
/// the drone.
async fn require_owner_pg(
    pool: &Pool<Postgres>,
    drone_id: i64,
    user_id: i64,
) -> Result<(), ServerError> {
    let owner_id = sqlx::query_scalar::<_, i64>("SELECT owner_id FROM drones WHERE id = $1")
        .bind(drone_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::not_found("drone not found"))?;
    if owner_id != user_id {
        return Err(ServerError::forbidden("only the owner may modify a drone"));
    }
    Ok(())
}

async fn require_owner_sqlite(
    pool: &Pool<Sqlite>,
    drone_id: i64,
    user_id: i64,
) -> Result<(), ServerError> {
    let owner_id = sqlx::query_scalar::<_, i64>("SELECT owner_id FROM drones WHERE id = ?1")
        .bind(drone_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::not_found("drone not found"))?;
    if owner_id != user_id {
        return Err(ServerError::forbidden("only the owner may modify a drone"));
    }
    Ok(())
}

async fn resolve_category_pg(pool: &Pool<Postgres>, name: &str) -> Result<i64, ServerError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM drone_categories WHERE name = $1")
        .bind(name.trim())
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::bad_request(format!("unknown drone_category '{name}'")))
}

async fn resolve_category_sqlite(pool: &Pool<Sqlite>, name: &str) -> Result<i64, ServerError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM drone_categories WHERE name = ?1")
        .bind(name.trim())
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::bad_request(format!("unknown drone_category '{name}'")))
}

async fn fetch_drone_pg(
    pool: &Pool<Postgres>,
    drone_id: i64,
) -> Result<Option<DroneRow>, ServerError> {
    sqlx::query_as::<_, DroneRow>(&format!("{SELECT_DRONE} WHERE d.id = $1"))
        .bind(drone_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)
}

async fn fetch_drone_sqlite(
    pool: &Pool<Sqlite>,
    drone_id: i64,
) -> Result<Option<DroneRow>, ServerError> {
    sqlx::query_as::<_, DroneRow>(&format!("{SELECT_DRONE} WHERE d.id = ?1"))
        .bind(drone_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)
}

fn push_filters_pg(builder: &mut QueryBuilder<Postgres>, filters: &DroneFilters) {
    if let Some(name) = &filters.name {
        builder.push(" AND d.name = ");
        builder.push_bind(name.clone());
    }
    if let Some(category) = &filters.category {
        builder.push(" AND c.name = ");
        builder.push_bind(category.clone());
    }
    if let Some(ms) = filters.manufacturing_date_ms {
        builder.push(" AND d.manufacturing_date_ms = ");
        builder.push_bind(ms);
    }
    if let Some(flag) = filters.has_completed_missions {
        builder.push(" AND d.has_completed_missions = ");
        builder.push_bind(flag);
    }
    if let Some(term) = &filters.search {
        builder.push(" AND d.name LIKE ");
        builder.push_bind(prefix_pattern(term));
        builder.push(" ESCAPE '\\'");
    }
}

fn push_filters_sqlite(builder: &mut QueryBuilder<Sqlite>, filters: &DroneFilters) {
    if let Some(name) = &filters.name {
        builder.push(" AND d.name = ");
        builder.push_bind(name.clone());
    }
    if let Some(category) = &filters.category {
        builder.push(" AND c.name = ");
        builder.push_bind(category.clone());
    }
    if let Some(ms) = filters.manufacturing_date_ms {
        builder.push(" AND d.manufacturing_date_ms = ");
        builder.push_bind(ms);
    }
    if let Some(flag) = filters.has_completed_missions {
        builder.push(" AND d.has_completed_missions = ");
        builder.push_bind(flag);
    }
    if let Some(term) = &filters.search {
        builder.push(" AND d.name LIKE ");
        builder.push_bind(prefix_pattern(term));
        builder.push(" ESCAPE '\\'");
    }
}
