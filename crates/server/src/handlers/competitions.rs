use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::{Pool, Postgres, QueryBuilder, Sqlite};

use crate::app_state::AppState;
use crate::auth::sqlite_pool;
use crate::errors::ServerError;
use crate::filters::{ordering_clause, page_window};
use crate::models::{
    ms_from_rfc3339, CompetitionListQuery, CompetitionPatchRequest, CompetitionResponse,
    CompetitionRow, CompetitionWriteRequest, ListResponse,
};

const ORDERING: &[(&str, &str)] = &[
    ("distance_in_feet", "c.distance_in_feet"),
    ("distance_achievement_date", "c.distance_achievement_date_ms"),
];
// Longest flights first, the registry's historical ordering.
const DEFAULT_ORDER: &str = "c.distance_in_feet DESC";

const SELECT_COMPETITION: &str = "SELECT c.id, p.name AS pilot_name, d.name AS drone_name, \
    c.distance_in_feet, c.distance_achievement_date_ms \
    FROM competitions c \
    JOIN pilots p ON p.id = c.pilot_id \
    JOIN drones d ON d.id = c.drone_id";

const COUNT_COMPETITIONS: &str = "SELECT COUNT(*) \
    FROM competitions c \
    JOIN pilots p ON p.id = c.pilot_id \
    JOIN drones d ON d.id = c.drone_id";

/// Range and slug predicates, dates pre-parsed to epoch milliseconds.
struct CompetitionFilters {
    distance_in_feet: Option<i64>,
    from_achievement_ms: Option<i64>,
    to_achievement_ms: Option<i64>,
    min_distance_in_feet: Option<i64>,
    max_distance_in_feet: Option<i64>,
    drone_name: Option<String>,
    pilot_name: Option<String>,
}

impl CompetitionFilters {
    fn from_query(query: &CompetitionListQuery) -> Result<Self, ServerError> {
        let from_achievement_ms = query
            .from_achievement_date
            .as_deref()
            .map(|raw| ms_from_rfc3339(raw, "from_achievement_date"))
            .transpose()?;
        let to_achievement_ms = query
            .to_achievement_date
            .as_deref()
            .map(|raw| ms_from_rfc3339(raw, "to_achievement_date"))
            .transpose()?;
        Ok(Self {
            distance_in_feet: query.distance_in_feet,
            from_achievement_ms,
            to_achievement_ms,
            min_distance_in_feet: query.min_distance_in_feet,
            max_distance_in_feet: query.max_distance_in_feet,
            drone_name: query.drone_name.clone(),
            pilot_name: query.pilot_name.clone(),
        })
    }
}

pub async fn list_competitions(
    State(state): State<AppState>,
    Query(query): Query<CompetitionListQuery>,
) -> Result<Json<ListResponse<CompetitionResponse>>, ServerError> {
    let (limit, offset) = page_window(query.limit, query.offset);
    let order = ordering_clause(query.ordering.as_deref(), ORDERING, DEFAULT_ORDER)?;
    let filters = CompetitionFilters::from_query(&query)?;

    if let Some(pool) = &state.postgres {
        let mut count = QueryBuilder::<Postgres>::new(format!("{COUNT_COMPETITIONS} WHERE 1=1"));
        push_filters_pg(&mut count, &filters);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(pool)
            .await
            .map_err(ServerError::db)?;

        let mut builder = QueryBuilder::<Postgres>::new(format!("{SELECT_COMPETITION} WHERE 1=1"));
        push_filters_pg(&mut builder, &filters);
        builder.push(format!(" ORDER BY {order} LIMIT "));
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);
        let rows = builder
            .build_query_as::<CompetitionRow>()
            .fetch_all(pool)
            .await
            .map_err(ServerError::db)?;

        let results = rows.into_iter().map(CompetitionRow::into_response).collect();
        return Ok(Json(ListResponse::page(total, results, offset, limit)));
    }

    let pool = sqlite_pool(&state)?;
    let mut count = QueryBuilder::<Sqlite>::new(format!("{COUNT_COMPETITIONS} WHERE 1=1"));
    push_filters_sqlite(&mut count, &filters);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await
        .map_err(ServerError::db)?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!("{SELECT_COMPETITION} WHERE 1=1"));
    push_filters_sqlite(&mut builder, &filters);
    builder.push(format!(" ORDER BY {order} LIMIT "));
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);
    let rows = builder
        .build_query_as::<CompetitionRow>()
        .fetch_all(pool)
        .await
        .map_err(ServerError::db)?;

    let results = rows.into_iter().map(CompetitionRow::into_response).collect();
    Ok(Json(ListResponse::page(total, results, offset, limit)))
}

pub async fn create_competition(
    State(state): State<AppState>,
    Json(payload): Json<CompetitionWriteRequest>,
) -> Result<(StatusCode, Json<CompetitionResponse>), ServerError> {
    let achievement_ms =
        ms_from_rfc3339(&payload.distance_achievement_date, "distance_achievement_date")?;

    if let Some(pool) = &state.postgres {
        let pilot_id = resolve_pilot_pg(pool, &payload.pilot).await?;
        let drone_id = resolve_drone_pg(pool, &payload.drone).await?;
        let competition_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO competitions (pilot_id, drone_id, distance_in_feet, \
             distance_achievement_date_ms) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(pilot_id)
        .bind(drone_id)
        .bind(payload.distance_in_feet)
        .bind(achievement_ms)
        .fetch_one(pool)
        .await
        .map_err(ServerError::db)?;

        let row = fetch_competition_pg(pool, competition_id)
            .await?
            .ok_or_else(|| ServerError::internal("competition row missing after insert"))?;
        return Ok((StatusCode::CREATED, Json(row.into_response())));
    }

    let pool = sqlite_pool(&state)?;
    let pilot_id = resolve_pilot_sqlite(pool, &payload.pilot).await?;
    let drone_id = resolve_drone_sqlite(pool, &payload.drone).await?;
    let competition_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO competitions (pilot_id, drone_id, distance_in_feet, \
         distance_achievement_date_ms) VALUES (?1, ?2, ?3, ?4) RETURNING id",
    )
    .bind(pilot_id)
    .bind(drone_id)
    .bind(payload.distance_in_feet)
    .bind(achievement_ms)
    .fetch_one(pool)
    .await
    .map_err(ServerError::db)?;

    let row = fetch_competition_sqlite(pool, competition_id)
        .await?
        .ok_or_else(|| ServerError::internal("competition row missing after insert"))?;
    Ok((StatusCode::CREATED, Json(row.into_response())))
}

pub async fn competition_detail(
    State(state): State<AppState>,
    AxumPath(competition_id): AxumPath<i64>,
) -> Result<Json<CompetitionResponse>, ServerError> {
    let row = if let Some(pool) = &state.postgres {
        fetch_competition_pg(pool, competition_id).await?
    } else {
        fetch_competition_sqlite(sqlite_pool(&state)?, competition_id).await?
    };

    let row = row.ok_or_else(|| ServerError::not_found("competition not found"))?;
    Ok(Json(row.into_response()))
}

pub async fn update_competition(
    State(state): State<AppState>,
    AxumPath(competition_id): AxumPath<i64>,
    Json(payload): Json<CompetitionWriteRequest>,
) -> Result<Json<CompetitionResponse>, ServerError> {
    let patch = CompetitionPatchRequest {
        pilot: Some(payload.pilot),
        drone: Some(payload.drone),
        distance_in_feet: Some(payload.distance_in_feet),
        distance_achievement_date: Some(payload.distance_achievement_date),
    };
    apply_competition_write(state, competition_id, patch).await
}

pub async fn patch_competition(
    State(state): State<AppState>,
    AxumPath(competition_id): AxumPath<i64>,
    Json(payload): Json<CompetitionPatchRequest>,
) -> Result<Json<CompetitionResponse>, ServerError> {
    apply_competition_write(state, competition_id, payload).await
}

pub async fn delete_competition(
    State(state): State<AppState>,
    AxumPath(competition_id): AxumPath<i64>,
) -> Result<StatusCode, ServerError> {
    let rows = if let Some(pool) = &state.postgres {
        sqlx::query("DELETE FROM competitions WHERE id = $1")
            .bind(competition_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query("DELETE FROM competitions WHERE id = ?1")
            .bind(competition_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    };

    if rows == 0 {
        return Err(ServerError::not_found("competition not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(sqlx::FromRow)]
struct CompetitionCore {
    pilot_id: i64,
    drone_id: i64,
    distance_in_feet: i64,
    distance_achievement_date_ms: i64,
}

async fn apply_competition_write(
    state: AppState,
    competition_id: i64,
    patch: CompetitionPatchRequest,
) -> Result<Json<CompetitionResponse>, ServerError> {
    let achievement_ms = patch
        .distance_achievement_date
        .as_deref()
        .map(|raw| ms_from_rfc3339(raw, "distance_achievement_date"))
        .transpose()?;

    if let Some(pool) = &state.postgres {
        let current = sqlx::query_as::<_, CompetitionCore>(
            "SELECT pilot_id, drone_id, distance_in_feet, distance_achievement_date_ms \
             FROM competitions WHERE id = $1",
        )
        .bind(competition_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::not_found("competition not found"))?;

        let pilot_id = match &patch.pilot {
            Some(pilot) => resolve_pilot_pg(pool, pilot).await?,
            None => current.pilot_id,
        };
        let drone_id = match &patch.drone {
            Some(drone) => resolve_drone_pg(pool, drone).await?,
            None => current.drone_id,
        };

        sqlx::query(
            "UPDATE competitions SET pilot_id = $1, drone_id = $2, distance_in_feet = $3, \
             distance_achievement_date_ms = $4 WHERE id = $5",
        )
        .bind(pilot_id)
        .bind(drone_id)
        .bind(patch.distance_in_feet.unwrap_or(current.distance_in_feet))
        .bind(achievement_ms.unwrap_or(current.distance_achievement_date_ms))
        .bind(competition_id)
        .execute(pool)
        .await
        .map_err(ServerError::db)?;

        let row = fetch_competition_pg(pool, competition_id)
            .await?
            .ok_or_else(|| ServerError::not_found("competition not found"))?;
        return Ok(Json(row.into_response()));
    }

    let pool = sqlite_pool(&state)?;
    let current = sqlx::query_as::<_, CompetitionCore>(
        "SELECT pilot_id, drone_id, distance_in_feet, distance_achievement_date_ms \
         FROM competitions WHERE id = ?1",
    )
    .bind(competition_id)
    .fetch_optional(pool)
    .await
    .map_err(ServerError::db)?
    .ok_or_else(|| ServerError::not_found("competition not found"))?;

    let pilot_id = match &patch.pilot {
        Some(pilot) => resolve_pilot_sqlite(pool, pilot).await?,
        None => current.pilot_id,
    };
    let drone_id = match &patch.drone {
        Some(drone) => resolve_drone_sqlite(pool, drone).await?,
        None => current.drone_id,
    };

    sqlx::query(
        "UPDATE competitions SET pilot_id = ?1, drone_id = ?2, distance_in_feet = ?3, \
         distance_achievement_date_ms = ?4 WHERE id = ?5",
    )
    .bind(pilot_id)
    .bind(drone_id)
    .bind(patch.distance_in_feet.unwrap_or(current.distance_in_feet))
    .bind(achievement_ms.unwrap_or(current.distance_achievement_date_ms))
    .bind(competition_id)
    .execute(pool)
    .await
    .map_err(ServerError::db)?;

    let row = fetch_competition_sqlite(pool, competition_id)
        .await?
        .ok_or_else(|| ServerError::not_found("competition not found"))?;
    Ok(Json(row.into_response()))
}

async fn resolve_pilot_pg(pool: &Pool<Postgres>, name: &str) -> Result<i64, ServerError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM pilots WHERE name = $1")
        .bind(name.trim())
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::bad_request(format!("unknown pilot '{name}'")))
}

async fn resolve_pilot_sqlite(pool: &Pool<Sqlite>, name: &str) -> Result<i64, ServerError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM pilots WHERE name = ?1")
        .bind(name.trim())
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::bad_request(format!("unknown pilot '{name}'")))
}

async fn resolve_drone_pg(pool: &Pool<Postgres>, name: &str) -> Result<i64, ServerError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM drones WHERE name = $1")
        .bind(name.trim())
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::bad_request(format!("unknown drone '{name}'")))
}

async fn resolve_drone_sqlite(pool: &Pool<Sqlite>, name: &str) -> Result<i64, ServerError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM drones WHERE name = ?1")
        .bind(name.trim())
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::bad_request(format!("unknown drone '{name}'")))
}

async fn fetch_competition_pg(
    pool: &Pool<Postgres>,
    competition_id: i64,
) -> Result<Option<CompetitionRow>, ServerError> {
    sqlx::query_as::<_, CompetitionRow>(&format!("{SELECT_COMPETITION} WHERE c.id = $1"))
        .bind(competition_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)
}

async fn fetch_competition_sqlite(
    pool: &Pool<Sqlite>,
    competition_id: i64,
) -> Result<Option<CompetitionRow>, ServerError> {
    sqlx::query_as::<_, CompetitionRow>(&format!("{SELECT_COMPETITION} WHERE c.id = ?1"))
        .bind(competition_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)
}

fn push_filters_pg(builder: &mut QueryBuilder<Postgres>, filters: &CompetitionFilters) {
    if let Some(distance) = filters.distance_in_feet {
        builder.push(" AND c.distance_in_feet = ");
        builder.push_bind(distance);
    }
    if let Some(from_ms) = filters.from_achievement_ms {
        builder.push(" AND c.distance_achievement_date_ms >= ");
        builder.push_bind(from_ms);
    }
    if let Some(to_ms) = filters.to_achievement_ms {
        builder.push(" AND c.distance_achievement_date_ms <= ");
        builder.push_bind(to_ms);
    }
    if let Some(min) = filters.min_distance_in_feet {
        builder.push(" AND c.distance_in_feet >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filters.max_distance_in_feet {
        builder.push(" AND c.distance_in_feet <= ");
        builder.push_bind(max);
    }
    if let Some(drone_name) = &filters.drone_name {
        builder.push(" AND d.name = ");
        builder.push_bind(drone_name.clone());
    }
    if let Some(pilot_name) = &filters.pilot_name {
        builder.push(" AND p.name = ");
        builder.push_bind(pilot_name.clone());
    }
}

fn push_filters_sqlite(builder: &mut QueryBuilder<Sqlite>, filters: &CompetitionFilters) {
    if let Some(distance) = filters.distance_in_feet {
        builder.push(" AND c.distance_in_feet = ");
        builder.push_bind(distance);
    }
    if let Some(from_ms) = filters.from_achievement_ms {
        builder.push(" AND c.distance_achievement_date_ms >= ");
        builder.push_bind(from_ms);
    }
    if let Some(to_ms) = filters.to_achievement_ms {
        builder.push(" AND c.distance_achievement_date_ms <= ");
        builder.push_bind(to_ms);
    }
    if let Some(min) = filters.min_distance_in_feet {
        builder.push(" AND c.distance_in_feet >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filters.max_distance_in_feet {
        builder.push(" AND c.distance_in_feet <= ");
        builder.push_bind(max);
    }
    if let Some(drone_name) = &filters.drone_name {
        builder.push(" AND d.name = ");
        builder.push_bind(drone_name.clone());
    }
    if let Some(pilot_name) = &filters.pilot_name {
        builder.push(" AND p.name = ");
        builder.push_bind(pilot_name.clone());
    }
}
