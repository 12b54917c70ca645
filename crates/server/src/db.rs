use std::path::Path;
use std::str::FromStr;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqliteConnectOptions;

use crate::app_state::AppState;
use crate::auth::hash_password;
use crate::config::{validate_schema_name, ConfigError, ServerConfig, SqlDialect};
use crate::throttle::Throttle;

pub async fn connect_db(config: &ServerConfig, config_path: &Path) -> Result<AppState, ConfigError> {
    let throttle = Throttle::from_config(&config.throttle);

    match config.dialect()? {
        SqlDialect::Sqlite => {
            let base_dir = config_path
                .parent()
                .ok_or_else(|| ConfigError::Invalid("config path has no parent".into()))?;
            let path = config.sqlite_path(base_dir);

            // Cascading deletes rely on the foreign_keys pragma.
            let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
                .map_err(|e| ConfigError::Invalid(format!("sqlite options invalid: {e}")))?
                .create_if_missing(true)
                .foreign_keys(true);
            let pool = sqlx::SqlitePool::connect_with(options)
                .await
                .map_err(|e| ConfigError::Invalid(format!("sqlite connect failed: {e}")))?;

            Ok(AppState {
                sqlite: Some(pool),
                postgres: None,
                token_ttl_seconds: config.auth.token_ttl_seconds,
                throttle,
            })
        }
        SqlDialect::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("postgres section missing".into()))?;
            let schema = validate_schema_name(&pg.schema)?;

            let url = format!(
                "postgres://{}:{}@{}:{}/{}?sslmode={}",
                pg.user, pg.password, pg.host, pg.port, pg.database, pg.ssl_mode
            );
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .after_connect(set_search_path(schema))
                .connect(&url)
                .await
                .map_err(|e| ConfigError::Invalid(format!("postgres connect failed: {e}")))?;

            Ok(AppState {
                sqlite: None,
                postgres: Some(pool),
                token_ttl_seconds: config.auth.token_ttl_seconds,
                throttle,
            })
        }
    }
}

/// Dev-mode wipe. Child tables go first so the sqlite path works without
/// relying on cascades.
pub async fn reset_server_data(config: &ServerConfig, state: &AppState) -> Result<(), ConfigError> {
    let tables = [
        "user_tokens",
        "competitions",
        "drones",
        "pilots",
        "drone_categories",
        "toys",
        "users",
    ];

    match config.dialect()? {
        SqlDialect::Sqlite => {
            let pool = state
                .sqlite
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("sqlite pool missing".into()))?;
            for table in tables {
                let query = format!("DELETE FROM {table}");
                if let Err(e) = sqlx::query(&query).execute(pool).await {
                    if !is_missing_table_error(&e) {
                        return Err(ConfigError::Invalid(format!("cleanup {table} failed: {e}")));
                    }
                }
            }
        }
        SqlDialect::Postgres => {
            let pool = state
                .postgres
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("postgres pool missing".into()))?;
            let schema = config
                .postgres
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("postgres section missing".into()))?
                .schema
                .as_str();
            let schema = validate_schema_name(schema)?;

            let table_list = tables
                .iter()
                .map(|t| format!("{}.{}", quote_ident(&schema), quote_ident(t)))
                .collect::<Vec<_>>()
                .join(", ");
            let stmt = format!("TRUNCATE TABLE {table_list} RESTART IDENTITY CASCADE");
            if let Err(e) = sqlx::query(&stmt).execute(pool).await {
                if !is_missing_table_error(&e) {
                    return Err(ConfigError::Invalid(format!("cleanup failed: {e}")));
                }
            }
        }
    }

    Ok(())
}

pub async fn ensure_default_user(
    config: &ServerConfig,
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<(), ConfigError> {
    let password_hash =
        hash_password(password).map_err(|e| ConfigError::Invalid(format!("hash password: {e}")))?;

    match config.dialect()? {
        SqlDialect::Sqlite => {
            let pool = state
                .sqlite
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("sqlite pool missing".into()))?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO users (username, password_hash, created_at) \
                 VALUES (?1, ?2, datetime('now'))",
            )
            .bind(username)
            .bind(password_hash)
            .execute(pool)
            .await
            .map_err(|e| ConfigError::Invalid(format!("default user insert failed: {e}")))?;

            if result.rows_affected() > 0 {
                tracing::info!(username, "default user created");
            }
        }
        SqlDialect::Postgres => {
            let pool = state
                .postgres
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("postgres pool missing".into()))?;
            let result = sqlx::query(
                "INSERT INTO users (username, password_hash, created_at) \
                 VALUES ($1, $2, NOW()) ON CONFLICT (username) DO NOTHING",
            )
            .bind(username)
            .bind(password_hash)
            .execute(pool)
            .await
            .map_err(|e| ConfigError::Invalid(format!("default user insert failed: {e}")))?;

            if result.rows_affected() > 0 {
                tracing::info!(username, "default user created");
            }
        }
    }

    Ok(())
}

#[allow(clippy::type_complexity)]
fn set_search_path(
    schema: String,
) -> impl Fn(
    &mut sqlx::PgConnection,
    sqlx::pool::PoolConnectionMetadata,
) -> std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<(), sqlx::Error>> + Send + '_>,
> {
    move |conn, _meta| {
        let schema_ident = quote_ident(&schema);
        Box::pin(async move {
            let create_stmt = format!("CREATE SCHEMA IF NOT EXISTS {schema_ident}");
            sqlx::query(&create_stmt).execute(&mut *conn).await?;

            let search_stmt = format!("SET search_path TO {schema_ident}");
            sqlx::query(&search_stmt).execute(&mut *conn).await?;
            Ok(())
        })
    }
}

// 42P01: undefined_table
fn is_missing_table_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("42P01")
            || db_err.message().contains("no such table")
    )
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idents_are_double_quoted() {
        assert_eq!(quote_ident("skyfleet"), "\"skyfleet\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
