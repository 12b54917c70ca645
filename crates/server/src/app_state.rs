use sqlx::{Pool, Postgres, Sqlite};

use crate::throttle::Throttle;

#[derive(Clone)]
pub struct AppState {
    pub sqlite: Option<Pool<Sqlite>>,
    pub postgres: Option<Pool<Postgres>>,
    pub token_ttl_seconds: u64,
    pub throttle: Throttle,
}
