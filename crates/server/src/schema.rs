use std::path::Path;

use sqlx::{Pool, Postgres, Sqlite};
use tokio::fs;

use crate::app_state::AppState;
use crate::config::{ConfigError, ServerConfig, SqlDialect};

/// Applies the per-dialect schema file at startup. Every statement is
/// `CREATE TABLE IF NOT EXISTS`, so reapplying is harmless.
pub async fn apply_server_schema(
    config: &ServerConfig,
    state: &AppState,
    config_path: &Path,
) -> Result<(), ConfigError> {
    let base_dir = config_path
        .parent()
        .ok_or_else(|| ConfigError::Invalid("config path has no parent".into()))?;

    match config.dialect()? {
        SqlDialect::Sqlite => {
            let pool = state
                .sqlite
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("sqlite pool missing".into()))?;
            let schema_path = base_dir.join("sql").join("sqlite").join("schema.sql");
            let content = fs::read_to_string(&schema_path).await.map_err(|_| {
                ConfigError::Invalid(format!("schema not found at {}", schema_path.display()))
            })?;
            execute_schema_sqlite(pool, &content).await?;
        }
        SqlDialect::Postgres => {
            let pool = state
                .postgres
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("postgres pool missing".into()))?;
            let schema_path = base_dir.join("sql").join("postgres").join("schema.sql");
            let content = fs::read_to_string(&schema_path).await.map_err(|_| {
                ConfigError::Invalid(format!("schema not found at {}", schema_path.display()))
            })?;
            execute_schema_postgres(pool, &content).await?;
        }
    }
    Ok(())
}

async fn execute_schema_sqlite(pool: &Pool<Sqlite>, content: &str) -> Result<(), ConfigError> {
    for stmt in split_statements(content) {
        sqlx::query(&stmt)
            .execute(pool)
            .await
            .map_err(|e| ConfigError::Invalid(format!("schema apply error: {e}")))?;
    }
    Ok(())
}

async fn execute_schema_postgres(pool: &Pool<Postgres>, content: &str) -> Result<(), ConfigError> {
    for stmt in split_statements(content) {
        sqlx::query(&stmt)
            .execute(pool)
            .await
            .map_err(|e| ConfigError::Invalid(format!("schema apply error: {e}")))?;
    }
    Ok(())
}

fn split_statements(content: &str) -> Vec<String> {
    content
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}
