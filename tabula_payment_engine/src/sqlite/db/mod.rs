//! # SQLite database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an atomic
//! transaction as the need arises and call through to the functions without any other changes.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod attempts;
pub mod credentials;
pub mod intents;

const SQLITE_DB_URL: &str = "sqlite://data/tabula_store.db";

pub fn db_url() -> String {
    let result = env::var("TAB_DATABASE_URL").unwrap_or_else(|_| {
        info!("TAB_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

/// The schema is applied on every pool creation; every statement is a no-op when its object already exists.
const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS payment_intents (
        id TEXT PRIMARY KEY NOT NULL,
        order_id TEXT NOT NULL,
        amount INTEGER NOT NULL,
        currency TEXT NOT NULL,
        channel TEXT NOT NULL,
        card_origin TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'Created',
        chosen_provider TEXT,
        provider_attempt_count INTEGER NOT NULL DEFAULT 0,
        attempted_providers TEXT NOT NULL DEFAULT '[]',
        provider_reference TEXT,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        version INTEGER NOT NULL DEFAULT 0
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS provider_attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        intent_id TEXT NOT NULL REFERENCES payment_intents (id),
        provider TEXT NOT NULL,
        attempt_ref TEXT NOT NULL UNIQUE,
        started_at DATETIME NOT NULL,
        finished_at DATETIME,
        outcome TEXT,
        provider_reference TEXT,
        raw_code TEXT
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_attempts_intent ON provider_attempts (intent_id);",
    "CREATE INDEX IF NOT EXISTS idx_attempts_provider_ref ON provider_attempts (provider, provider_reference);",
    r#"
    CREATE TABLE IF NOT EXISTS provider_credentials (
        provider TEXT PRIMARY KEY NOT NULL,
        sealed_material BLOB NOT NULL,
        token_expiry DATETIME,
        updated_at DATETIME NOT NULL
    );
    "#,
];

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    // Writers queue behind the busy handler instead of surfacing SQLITE_BUSY to callers. Every write in this
    // module is a single statement, so a waiting writer can always make progress once the lock frees up.
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true).busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }
    Ok(pool)
}
