use argon2::{
    password_hash::{rand_core::OsRng, rand_core::RngCore, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::app_state::AppState;
use crate::errors::ServerError;

/// Resolves the bearer token to a user id. 401 when the header is missing,
/// the token is unknown, or it has expired.
pub async fn auth_user_id(state: &AppState, headers: &HeaderMap) -> Result<i64, ServerError> {
    let token = bearer_token(headers)?;
    let token_hash = hash_token(&token);

    if let Some(pool) = &state.postgres {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM user_tokens WHERE token_hash = $1 AND expires_at > NOW()",
        )
        .bind(&token_hash)
        .fetch_optional(pool)
        .await
        .map_err(ServerError::db)?
        .ok_or_else(|| ServerError::unauthorized("invalid token"))?;
        return Ok(id);
    }

    let pool = sqlite_pool(state)?;
    let id = sqlx::query_scalar::<_, i64>(
        "SELECT user_id FROM user_tokens WHERE token_hash = ?1 AND expires_at > datetime('now')",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await
    .map_err(ServerError::db)?
    .ok_or_else(|| ServerError::unauthorized("invalid token"))?;
    Ok(id)
}

/// Like [`auth_user_id`], but a missing Authorization header is not an
/// error; routes that allow anonymous reads use this. A header that is
/// present but invalid still fails.
pub async fn optional_user_id(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<i64>, ServerError> {
    if !headers.contains_key(axum::http::header::AUTHORIZATION) {
        return Ok(None);
    }
    auth_user_id(state, headers).await.map(Some)
}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, ServerError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let token = value.strip_prefix("Bearer ").unwrap_or("").trim();
    if token.is_empty() {
        return Err(ServerError::unauthorized("missing bearer token"));
    }
    Ok(token.to_string())
}

pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| format!("password hash error: {e}"))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(hash: &str, password: &str) -> Result<(), String> {
    let parsed = PasswordHash::new(hash).map_err(|e| format!("password hash parse error: {e}"))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|e| format!("password verify error: {e}"))
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Only the SHA-256 digest of a token is ever stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn sqlite_pool(state: &AppState) -> Result<&sqlx::SqlitePool, ServerError> {
    state
        .sqlite
        .as_ref()
        .ok_or_else(|| ServerError::internal("database pool missing"))
}
