use std::collections::HashMap;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::{Pool, Postgres, QueryBuilder, Sqlite};

use crate::app_state::AppState;
use crate::auth::sqlite_pool;
use crate::errors::{map_db_error, ServerError};
use crate::filters::{ordering_clause, page_window, prefix_pattern};
use crate::links;
use crate::models::{
    CategoryListQuery, CategoryPatchRequest, CategoryResponse, CategoryRow, CategoryWriteRequest,
    ListResponse,
};

const ORDERING: &[(&str, &str)] = &[("name", "name")];
const DEFAULT_ORDER: &str = "name ASC";
const DUPLICATE_MSG: &str = "drone category with this name already exists";

pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<CategoryListQuery>,
) -> Result<Json<ListResponse<CategoryResponse>>, ServerError> {
    let (limit, offset) = page_window(query.limit, query.offset);
    let order = ordering_clause(query.ordering.as_deref(), ORDERING, DEFAULT_ORDER)?;

    if let Some(pool) = &state.postgres {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM drone_categories WHERE 1=1");
        push_filters_pg(&mut count, &query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(pool)
            .await
            .map_err(ServerError::db)?;

        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT id, name FROM drone_categories WHERE 1=1");
        push_filters_pg(&mut builder, &query);
        builder.push(format!(" ORDER BY {order} LIMIT "));
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);
        let rows = builder
            .build_query_as::<CategoryRow>()
            .fetch_all(pool)
            .await
            .map_err(ServerError::db)?;

        let results = expand_pg(pool, rows).await?;
        return Ok(Json(ListResponse::page(total, results, offset, limit)));
    }

    let pool = sqlite_pool(&state)?;
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM drone_categories WHERE 1=1");
    push_filters_sqlite(&mut count, &query);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await
        .map_err(ServerError::db)?;

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT id, name FROM drone_categories WHERE 1=1");
    push_filters_sqlite(&mut builder, &query);
    builder.push(format!(" ORDER BY {order} LIMIT "));
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);
    let rows = builder
        .build_query_as::<CategoryRow>()
        .fetch_all(pool)
        .await
        .map_err(ServerError::db)?;

    let results = expand_sqlite(pool, rows).await?;
    Ok(Json(ListResponse::page(total, results, offset, limit)))
}

pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CategoryWriteRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ServerError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ServerError::bad_request("name required"));
    }

    let row = if let Some(pool) = &state.postgres {
        sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO drone_categories (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|e| map_db_error(e, DUPLICATE_MSG))?
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO drone_categories (name) VALUES (?1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|e| map_db_error(e, DUPLICATE_MSG))?
    };

    Ok((StatusCode::CREATED, Json(row.into_response(Vec::new()))))
}

pub async fn category_detail(
    State(state): State<AppState>,
    AxumPath(category_id): AxumPath<i64>,
) -> Result<Json<CategoryResponse>, ServerError> {
    if let Some(pool) = &state.postgres {
        let row =
            sqlx::query_as::<_, CategoryRow>("SELECT id, name FROM drone_categories WHERE id = $1")
                .bind(category_id)
                .fetch_optional(pool)
                .await
                .map_err(ServerError::db)?
                .ok_or_else(|| ServerError::not_found("drone category not found"))?;
        let mut results = expand_pg(pool, vec![row]).await?;
        let response = results
            .pop()
            .ok_or_else(|| ServerError::internal("category expansion failed"))?;
        return Ok(Json(response));
    }

    let pool = sqlite_pool(&state)?;
    let row = sqlx::query_as::<_, CategoryRow>("SELECT id, name FROM drone_categories WHERE id = ?1")
        .bind(category_id)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::not_found("drone category not found"))?;
    let mut results = expand_sqlite(pool, vec![row]).await?;
    let response = results
        .pop()
        .ok_or_else(|| ServerError::internal("category expansion failed"))?;
    Ok(Json(response))
}

pub async fn update_category(
    State(state): State<AppState>,
    AxumPath(category_id): AxumPath<i64>,
    Json(payload): Json<CategoryWriteRequest>,
) -> Result<Json<CategoryResponse>, ServerError> {
    rename_category(state, category_id, payload.name).await
}

/// PATCH with no fields is a no-op that returns the current state.
pub async fn patch_category(
    State(state): State<AppState>,
    AxumPath(category_id): AxumPath<i64>,
    Json(payload): Json<CategoryPatchRequest>,
) -> Result<Json<CategoryResponse>, ServerError> {
    match payload.name {
        Some(name) => rename_category(state, category_id, name).await,
        None => category_detail(State(state), AxumPath(category_id)).await,
    }
}

pub async fn delete_category(
    State(state): State<AppState>,
    AxumPath(category_id): AxumPath<i64>,
) -> Result<StatusCode, ServerError> {
    let rows = if let Some(pool) = &state.postgres {
        sqlx::query("DELETE FROM drone_categories WHERE id = $1")
            .bind(category_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query("DELETE FROM drone_categories WHERE id = ?1")
            .bind(category_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    };

    if rows == 0 {
        return Err(ServerError::not_found("drone category not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn rename_category(
    state: AppState,
    category_id: i64,
    name: String,
) -> Result<Json<CategoryResponse>, ServerError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServerError::bad_request("name required"));
    }

    if let Some(pool) = &state.postgres {
        let row = sqlx::query_as::<_, CategoryRow>(
            "UPDATE drone_categories SET name = $1 WHERE id = $2 RETURNING id, name",
        )
        .bind(name)
        .bind(category_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_db_error(e, DUPLICATE_MSG))?
        .ok_or_else(|| ServerError::not_found("drone category not found"))?;
        let mut results = expand_pg(pool, vec![row]).await?;
        let response = results
            .pop()
            .ok_or_else(|| ServerError::internal("category expansion failed"))?;
        return Ok(Json(response));
    }

    let pool = sqlite_pool(&state)?;
    let row = sqlx::query_as::<_, CategoryRow>(
        "UPDATE drone_categories SET name = ?1 WHERE id = ?2 RETURNING id, name",
    )
    .bind(name)
    .bind(category_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_db_error(e, DUPLICATE_MSG))?
    .ok_or_else(|| ServerError::not_found("drone category not found"))?;
    let mut results = expand_sqlite(pool, vec![row]).await?;
    let response = results
        .pop()
        .ok_or_else(|| ServerError::internal("category expansion failed"))?;
    Ok(Json(response))
}

fn push_filters_pg(builder: &mut QueryBuilder<Postgres>, query: &CategoryListQuery) {
    if let Some(name) = &query.name {
        builder.push(" AND name = ");
        builder.push_bind(name.clone());
    }
    if let Some(term) = &query.search {
        builder.push(" AND name LIKE ");
        builder.push_bind(prefix_pattern(term));
        builder.push(" ESCAPE '\\'");
    }
}

fn push_filters_sqlite(builder: &mut QueryBuilder<Sqlite>, query: &CategoryListQuery) {
    if let Some(name) = &query.name {
        builder.push(" AND name = ");
        builder.push_bind(name.clone());
    }
    if let Some(term) = &query.search {
        builder.push(" AND name LIKE ");
        builder.push_bind(prefix_pattern(term));
        builder.push(" ESCAPE '\\'");
    }
}

/// Expands each category with the URLs of its member drones; one query
/// covers the whole page.
async fn expand_pg(
    pool: &Pool<Postgres>,
    rows: Vec<CategoryRow>,
) -> Result<Vec<CategoryResponse>, ServerError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT id, category_id FROM drones WHERE category_id IN (");
    let mut separated = builder.separated(", ");
    for row in &rows {
        separated.push_bind(row.id);
    }
    builder.push(") ORDER BY id");
    let members: Vec<(i64, i64)> = builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(ServerError::db)?;
    Ok(zip_members(rows, members))
}

async fn expand_sqlite(
    pool: &Pool<Sqlite>,
    rows: Vec<CategoryRow>,
) -> Result<Vec<CategoryResponse>, ServerError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder =
        QueryBuilder::<Sqlite>::new("SELECT id, category_id FROM drones WHERE category_id IN (");
    let mut separated = builder.separated(", ");
    for row in &rows {
        separated.push_bind(row.id);
    }
    builder.push(") ORDER BY id");
    let members: Vec<(i64, i64)> = builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(ServerError::db)?;
    Ok(zip_members(rows, members))
}

fn zip_members(rows: Vec<CategoryRow>, members: Vec<(i64, i64)>) -> Vec<CategoryResponse> {
    let mut by_category: HashMap<i64, Vec<String>> = HashMap::new();
    for (drone_id, category_id) in members {
        by_category
            .entry(category_id)
            .or_default()
            .push(links::drone(drone_id));
    }
    rows.into_iter()
        .map(|row| {
            let drones = by_category.remove(&row.id).unwrap_or_default();
            row.into_response(drones)
        })
        .collect()
}
