//! Database initialization
//!
//! Creates the database file on first run and brings the schema up to date.
//! All `CREATE` statements are idempotent, so opening an existing database is safe.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// How long SQLite itself waits on a locked database before reporting SQLITE_BUSY
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// The pool holds exactly one connection that never expires, because every
/// SQLite in-memory connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create every table and index
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_users_table(pool).await?;
    create_songs_table(pool).await?;
    create_setlist_tables(pool).await?;
    create_song_list_tables(pool, "set_templates", "set_template_songs", "template_id").await?;
    create_song_list_tables(pool, "song_collections", "song_collection_songs", "collection_id").await?;
    create_performance_tables(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            role TEXT,
            user_level INTEGER NOT NULL DEFAULT 1 CHECK (user_level BETWEEN 1 AND 3),
            token_hash TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Songs carry no uniqueness constraint; the (artist, title) check lives in
/// the songs service.
async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id TEXT PRIMARY KEY,
            original_artist TEXT NOT NULL,
            title TEXT NOT NULL,
            key_signature TEXT,
            lyrics TEXT,
            performance_note TEXT,
            tempo INTEGER CHECK (tempo IS NULL OR tempo > 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_songs_artist_title ON songs(original_artist COLLATE NOCASE, title COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_setlist_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS setlists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            is_public INTEGER NOT NULL DEFAULT 0,
            user_id TEXT NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            setlist_id TEXT NOT NULL REFERENCES setlists(id),
            set_order INTEGER NOT NULL CHECK (set_order >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sets_setlist ON sets(setlist_id, set_order)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS set_songs (
            set_id TEXT NOT NULL REFERENCES sets(id),
            song_id TEXT NOT NULL REFERENCES songs(id),
            song_order INTEGER NOT NULL CHECK (song_order >= 0),
            PRIMARY KEY (set_id, song_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_set_songs_song ON set_songs(song_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Templates and collections share one layout: a named list plus an ordered junction
async fn create_song_list_tables(
    pool: &SqlitePool,
    table: &str,
    junction: &str,
    owner_column: &str,
) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            is_public INTEGER NOT NULL DEFAULT 0,
            user_id TEXT NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {junction} (
            {owner_column} TEXT NOT NULL REFERENCES {table}(id),
            song_id TEXT NOT NULL REFERENCES songs(id),
            song_order INTEGER NOT NULL CHECK (song_order >= 0),
            PRIMARY KEY ({owner_column}, song_id)
        )
        "#
    ))
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_performance_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS performance_sessions (
            id TEXT PRIMARY KEY,
            setlist_id TEXT NOT NULL REFERENCES setlists(id),
            leader_id TEXT NOT NULL REFERENCES users(id),
            current_set_id TEXT,
            current_song_id TEXT,
            mode TEXT NOT NULL DEFAULT 'led' CHECK (mode IN ('led', 'standalone')),
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_setlist_active ON performance_sessions(setlist_id, is_active)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_participants (
            session_id TEXT NOT NULL REFERENCES performance_sessions(id),
            user_id TEXT NOT NULL REFERENCES users(id),
            joined_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (session_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leadership_requests (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES performance_sessions(id),
            requester_id TEXT NOT NULL REFERENCES users(id),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected', 'cancelled')),
            created_at TEXT NOT NULL,
            auto_approve_at TEXT NOT NULL,
            resolved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_leadership_requests_session ON leadership_requests(session_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
