//! Database access layer
//!
//! One module per entity. Every operation that touches more than one row
//! runs inside a single transaction; helpers that may run inside a
//! transaction take `&mut SqliteConnection` instead of the pool.

use std::collections::HashSet;

use setlist_common::config::DEFAULT_DB_MAX_LOCK_WAIT_MS;
use setlist_common::db::retry_on_lock;
use setlist_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use uuid::Uuid;

pub mod access;
pub mod performance;
pub mod setlists;
pub mod sets;
pub mod song_lists;
pub mod songs;
pub mod users;

/// Open a write transaction holding SQLite's write lock from the start
///
/// A deferred `BEGIN` reads under a snapshot and fails with SQLITE_BUSY when
/// it later upgrades to write, so duplicate checks and their inserts would
/// race. `BEGIN IMMEDIATE` takes the lock up front; waiting for it is covered
/// by the busy timeout and then by `retry_on_lock`.
pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    retry_on_lock("begin write transaction", DEFAULT_DB_MAX_LOCK_WAIT_MS, || async {
        pool.begin_with("BEGIN IMMEDIATE").await.map_err(Error::from)
    })
    .await
}

/// Trim a required name, rejecting blanks
pub(crate) fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blank becomes `None`
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reject a song id list that names the same song twice
pub(crate) fn reject_repeated(song_ids: &[Uuid]) -> Result<()> {
    let mut seen = HashSet::with_capacity(song_ids.len());
    for id in song_ids {
        if !seen.insert(*id) {
            return Err(Error::InvalidInput(format!(
                "Song {} is listed more than once",
                id
            )));
        }
    }
    Ok(())
}

/// True when `proposed` holds exactly the ids in `existing`, in any order
pub(crate) fn is_permutation(existing: &[Uuid], proposed: &[Uuid]) -> bool {
    if existing.len() != proposed.len() {
        return false;
    }
    let existing: HashSet<&Uuid> = existing.iter().collect();
    let proposed_set: HashSet<&Uuid> = proposed.iter().collect();
    proposed_set.len() == proposed.len() && existing == proposed_set
}

/// Fail with NotFound if any of the songs does not exist
pub(crate) async fn ensure_songs_exist(conn: &mut SqliteConnection, song_ids: &[Uuid]) -> Result<()> {
    for id in song_ids {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM songs WHERE id = ?)")
            .bind(id.to_string())
            .fetch_one(&mut *conn)
            .await?;
        if !exists {
            return Err(Error::NotFound(format!("Song {}", id)));
        }
    }
    Ok(())
}

/// Ordered song ids of one owner row in a junction table
pub(crate) async fn load_junction_song_ids(
    conn: &mut SqliteConnection,
    junction: &str,
    owner_column: &str,
    owner_id: Uuid,
) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT song_id FROM {junction} WHERE {owner_column} = ? ORDER BY song_order"
    ))
    .bind(owner_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    ids.iter()
        .map(|id| setlist_common::uuid_utils::parse_column(id))
        .collect()
}

/// Replace the songs of one owner row, numbering them 0..n in the given order
pub(crate) async fn write_junction_songs(
    conn: &mut SqliteConnection,
    junction: &str,
    owner_column: &str,
    owner_id: Uuid,
    song_ids: &[Uuid],
) -> Result<()> {
    sqlx::query(&format!("DELETE FROM {junction} WHERE {owner_column} = ?"))
        .bind(owner_id.to_string())
        .execute(&mut *conn)
        .await?;

    for (order, song_id) in song_ids.iter().enumerate() {
        sqlx::query(&format!(
            "INSERT INTO {junction} ({owner_column}, song_id, song_order) VALUES (?, ?, ?)"
        ))
        .bind(owner_id.to_string())
        .bind(song_id.to_string())
        .bind(order as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Remove one song from every row of a junction table and close the gaps it leaves
pub(crate) async fn remove_song_everywhere(
    conn: &mut SqliteConnection,
    junction: &str,
    owner_column: &str,
    song_id: Uuid,
) -> Result<usize> {
    let owners: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT {owner_column} FROM {junction} WHERE song_id = ?"
    ))
    .bind(song_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    for owner in &owners {
        let owner_id = setlist_common::uuid_utils::parse_column(owner)?;
        let mut ids = load_junction_song_ids(conn, junction, owner_column, owner_id).await?;
        ids.retain(|id| *id != song_id);
        write_junction_songs(conn, junction, owner_column, owner_id, &ids).await?;
    }

    Ok(owners.len())
}
