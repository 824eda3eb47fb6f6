//! # courier-store
//!
//! Durable stores for the Courier messaging backend.
//!
//! Two seams, each an async trait with a SQLite implementation and an
//! in-memory one:
//!
//! - **UserStore** - registered user records (credential hash included)
//! - **MessageStore** - the append-only message history
//!
//! The message store is the durability boundary of the fan-out pipeline:
//! once `append` returns, the message is part of history regardless of
//! what live delivery does afterwards.

pub mod memory;
pub mod message;
pub mod user;

pub use memory::{MemoryMessageStore, MemoryUserStore};
pub use message::{Message, MessageStore, NewMessage, SqliteMessageStore};
pub use user::{verify_password, ProfileUpdate, SqliteUserStore, User, UserStore};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Email is already registered.
    #[error("email already registered")]
    DuplicateEmail,

    /// Message content must be non-empty.
    #[error("message content cannot be empty")]
    EmptyContent,

    /// Credential hashing failed.
    #[error("credential hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    /// The underlying database is unavailable or rejected the operation.
    #[error("storage unavailable: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted record failed to decode.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Open a SQLite pool for the given database URL, creating the file if
/// missing.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the database cannot be opened.
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await?;

    info!(url = %database_url, "Connected to database");
    Ok(pool)
}

/// Create the schema if it does not exist.
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id               TEXT PRIMARY KEY,
            email            TEXT NOT NULL UNIQUE,
            password_hash    TEXT NOT NULL,
            first_name       TEXT,
            last_name        TEXT,
            avatar_color     TEXT,
            profile_complete INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id           TEXT PRIMARY KEY,
            sender       TEXT NOT NULL,
            recipient    TEXT NOT NULL,
            content      TEXT NOT NULL,
            message_type TEXT NOT NULL DEFAULT 'text',
            timestamp    TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_participants ON messages(sender, recipient)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // A shared in-memory database: one connection, or each checkout would
    // see its own empty database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
