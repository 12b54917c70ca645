use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::app_state::AppState;
use crate::auth::{auth_user_id, hash_password, sqlite_pool, verify_password};
use crate::errors::{map_db_error, ServerError};
use crate::models::{CreateUserRequest, PasswordChangeRequest, UserResponse};

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ServerError> {
    let username = payload.username.trim();
    let password = payload.password.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ServerError::bad_request("username and password required"));
    }

    let password_hash = hash_password(password).map_err(ServerError::internal)?;

    let user_id = if let Some(pool) = &state.postgres {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, password_hash, created_at) \
             VALUES ($1, $2, NOW()) RETURNING id",
        )
        .bind(username)
        .bind(&password_hash)
        .fetch_one(pool)
        .await
        .map_err(|e| map_db_error(e, "username already taken"))?
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, password_hash, created_at) \
             VALUES (?1, ?2, datetime('now')) RETURNING id",
        )
        .bind(username)
        .bind(&password_hash)
        .fetch_one(pool)
        .await
        .map_err(|e| map_db_error(e, "username already taken"))?
    };

    tracing::info!(username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user_id,
            username: username.to_string(),
        }),
    ))
}

pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PasswordChangeRequest>,
) -> Result<StatusCode, ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;

    let current_password = payload.current_password.trim();
    let new_password = payload.new_password.trim();
    if current_password.is_empty() || new_password.is_empty() {
        return Err(ServerError::bad_request(
            "current_password and new_password required",
        ));
    }

    let password_hash = if let Some(pool) = &state.postgres {
        sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::db)?
            .ok_or_else(|| ServerError::not_found("user not found"))?
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(ServerError::db)?
            .ok_or_else(|| ServerError::not_found("user not found"))?
    };

    verify_password(&password_hash, current_password)
        .map_err(|_| ServerError::unauthorized("invalid credentials"))?;

    let new_hash = hash_password(new_password).map_err(ServerError::internal)?;

    if let Some(pool) = &state.postgres {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(&new_hash)
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?;
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query("UPDATE users SET password_hash = ?1 WHERE id = ?2")
            .bind(&new_hash)
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Removes the account along with its tokens and owned drones (cascade).
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ServerError> {
    let user_id = auth_user_id(&state, &headers).await?;

    let rows = if let Some(pool) = &state.postgres {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    } else {
        let pool = sqlite_pool(&state)?;
        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(ServerError::db)?
            .rows_affected()
    };

    if rows == 0 {
        return Err(ServerError::not_found("user not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
