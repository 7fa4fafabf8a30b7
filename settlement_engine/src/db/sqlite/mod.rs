mod db;

pub mod disputes;
pub mod payees;
pub mod purchases;
pub mod refunds;
pub mod webhook_events;

use std::{env, str::FromStr, time::Duration};

pub use db::SqliteDatabase;
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::traits::SettlementError;

const SQLITE_DB_URL: &str = "sqlite://data/settlement_store.db";

pub fn db_url() -> String {
    let result = env::var("MPS_DATABASE_URL").unwrap_or_else(|_| {
        info!("MPS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SettlementError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| SettlementError::DatabaseError(e.to_string()))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SettlementError> {
    sqlx::migrate!("./src/db/sqlite/migrations")
        .run(pool)
        .await
        .map_err(|e| SettlementError::DatabaseError(e.to_string()))
}
