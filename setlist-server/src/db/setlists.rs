//! Setlist database operations
//!
//! Names are unique per owner. A private setlist of another user is reported
//! as missing rather than forbidden.

use serde::Deserialize;
use setlist_common::db::models::{Setlist, SetlistDetail, SetlistSummary, User};
use setlist_common::db::retry_on_lock;
use setlist_common::events::SessionEvent;
use setlist_common::uuid_utils::{generate, parse_column};
use setlist_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::access::{can_view, require_owner_or_admin};
use super::{begin_write, required_text};
use super::sets::{load_set_songs, load_sets};
use crate::realtime::SessionHub;

pub const DUPLICATE_SETLIST_MESSAGE: &str = "A setlist with this name already exists.";

const SETLIST_COLUMNS: &str = "id, name, is_public, user_id, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewSetlist {
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetlistUpdate {
    pub name: Option<String>,
    pub is_public: Option<bool>,
}

pub(crate) fn setlist_from_row(row: &SqliteRow) -> Result<Setlist> {
    Ok(Setlist {
        id: parse_column(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        is_public: row.try_get("is_public")?,
        user_id: parse_column(&row.try_get::<String, _>("user_id")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Load a setlist the caller may see; anything else is NotFound
pub(crate) async fn load_visible_setlist(
    conn: &mut SqliteConnection,
    user: &User,
    id: Uuid,
) -> Result<Setlist> {
    let row = sqlx::query(&format!("SELECT {SETLIST_COLUMNS} FROM setlists WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Setlist {}", id)))?;
    let setlist = setlist_from_row(&row)?;

    if !can_view(user, setlist.user_id, setlist.is_public) {
        return Err(Error::NotFound(format!("Setlist {}", id)));
    }
    Ok(setlist)
}

/// Setlist row only, for callers that need to check visibility
pub async fn get_visible_setlist(pool: &SqlitePool, user: &User, id: Uuid) -> Result<Setlist> {
    let mut conn = pool.acquire().await?;
    load_visible_setlist(&mut conn, user, id).await
}

/// Load a setlist the caller may modify
pub(crate) async fn load_owned_setlist(
    conn: &mut SqliteConnection,
    user: &User,
    id: Uuid,
) -> Result<Setlist> {
    let setlist = load_visible_setlist(conn, user, id).await?;
    require_owner_or_admin(user, setlist.user_id, "setlist")?;
    Ok(setlist)
}

async fn name_taken(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    name: &str,
    exclude: Option<Uuid>,
) -> Result<bool> {
    let exclude = exclude.map(|id| id.to_string());
    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM setlists
            WHERE user_id = ? AND name = ? COLLATE NOCASE AND (? IS NULL OR id <> ?)
        )
        "#,
    )
    .bind(owner_id.to_string())
    .bind(name)
    .bind(&exclude)
    .bind(&exclude)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

async fn fetch_setlists(pool: &SqlitePool, user: &User) -> Result<Vec<SetlistSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name, s.is_public, s.user_id, s.created_at, s.updated_at,
               (SELECT COUNT(*) FROM sets WHERE sets.setlist_id = s.id) AS set_count,
               (SELECT COUNT(*) FROM set_songs ss JOIN sets ON sets.id = ss.set_id
                 WHERE sets.setlist_id = s.id) AS song_count
        FROM setlists s
        WHERE s.user_id = ? OR s.is_public = 1 OR ? = 1
        ORDER BY s.name COLLATE NOCASE
        "#,
    )
    .bind(user.id.to_string())
    .bind(user.is_admin())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(SetlistSummary {
                setlist: setlist_from_row(row)?,
                set_count: row.try_get("set_count")?,
                song_count: row.try_get("song_count")?,
            })
        })
        .collect()
}

/// Setlists the caller owns plus public ones, ordered by name
pub async fn list_setlists(pool: &SqlitePool, user: &User, max_wait_ms: u64) -> Result<Vec<SetlistSummary>> {
    retry_on_lock("list setlists", max_wait_ms, || fetch_setlists(pool, user)).await
}

pub(crate) async fn load_setlist_detail(conn: &mut SqliteConnection, setlist: Setlist) -> Result<SetlistDetail> {
    let mut sets = Vec::new();
    for set in load_sets(conn, setlist.id).await? {
        sets.push(load_set_songs(conn, set).await?);
    }
    Ok(SetlistDetail { setlist, sets })
}

/// Setlist with its sets in order, each with its songs in order
pub async fn get_setlist(pool: &SqlitePool, user: &User, id: Uuid) -> Result<SetlistDetail> {
    let mut conn = pool.acquire().await?;
    let setlist = load_visible_setlist(&mut conn, user, id).await?;
    load_setlist_detail(&mut conn, setlist).await
}

async fn insert_setlist(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    name: &str,
    is_public: bool,
) -> Result<Uuid> {
    let id = generate();
    let now = time::now_string();
    sqlx::query(
        "INSERT INTO setlists (id, name, is_public, user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(is_public)
    .bind(owner_id.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn create_setlist(pool: &SqlitePool, user: &User, new_setlist: NewSetlist) -> Result<Setlist> {
    let name = required_text("name", &new_setlist.name)?;

    let mut tx = begin_write(pool).await?;
    if name_taken(&mut tx, user.id, &name, None).await? {
        return Err(Error::Conflict(DUPLICATE_SETLIST_MESSAGE.to_string()));
    }

    let id = insert_setlist(&mut tx, user.id, &name, new_setlist.is_public).await?;
    let setlist = load_visible_setlist(&mut tx, user, id).await?;
    tx.commit().await?;

    info!(setlist_id = %id, name = %setlist.name, "Setlist created");
    Ok(setlist)
}

pub async fn update_setlist(pool: &SqlitePool, user: &User, id: Uuid, update: SetlistUpdate) -> Result<Setlist> {
    let mut tx = begin_write(pool).await?;
    let current = load_owned_setlist(&mut tx, user, id).await?;

    let name = match update.name {
        Some(name) => {
            let name = required_text("name", &name)?;
            if name_taken(&mut tx, current.user_id, &name, Some(id)).await? {
                return Err(Error::Conflict(DUPLICATE_SETLIST_MESSAGE.to_string()));
            }
            name
        }
        None => current.name,
    };
    let is_public = update.is_public.unwrap_or(current.is_public);

    sqlx::query("UPDATE setlists SET name = ?, is_public = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(is_public)
        .bind(time::now_string())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    let setlist = load_visible_setlist(&mut tx, user, id).await?;
    tx.commit().await?;

    info!(setlist_id = %id, "Setlist updated");
    Ok(setlist)
}

/// Delete a setlist with its sets, song placements and sessions
///
/// Followers of a session that was still running get `SessionEnded`.
pub async fn delete_setlist(pool: &SqlitePool, hub: &SessionHub, user: &User, id: Uuid) -> Result<()> {
    let mut tx = begin_write(pool).await?;
    load_owned_setlist(&mut tx, user, id).await?;
    let setlist_id = id.to_string();

    let active_sessions: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM performance_sessions WHERE setlist_id = ? AND is_active = 1",
    )
    .bind(&setlist_id)
    .fetch_all(&mut *tx)
    .await?;

    let session_filter = "SELECT id FROM performance_sessions WHERE setlist_id = ?";
    sqlx::query(&format!("DELETE FROM session_participants WHERE session_id IN ({session_filter})"))
        .bind(&setlist_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("DELETE FROM leadership_requests WHERE session_id IN ({session_filter})"))
        .bind(&setlist_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM performance_sessions WHERE setlist_id = ?")
        .bind(&setlist_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM set_songs WHERE set_id IN (SELECT id FROM sets WHERE setlist_id = ?)")
        .bind(&setlist_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM sets WHERE setlist_id = ?")
        .bind(&setlist_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM setlists WHERE id = ?")
        .bind(&setlist_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    for session_id in &active_sessions {
        let session_id = parse_column(session_id)?;
        hub.publish(id, SessionEvent::SessionEnded { session_id }).await;
    }

    info!(setlist_id = %id, ended_sessions = active_sessions.len(), "Setlist deleted");
    Ok(())
}

/// Copy a visible setlist with all of its sets and songs into a new setlist owned by the caller
pub async fn duplicate_setlist(pool: &SqlitePool, user: &User, id: Uuid, new_name: &str) -> Result<SetlistDetail> {
    let name = required_text("name", new_name)?;

    let mut tx = begin_write(pool).await?;
    let source = load_visible_setlist(&mut tx, user, id).await?;
    if name_taken(&mut tx, user.id, &name, None).await? {
        return Err(Error::Conflict(DUPLICATE_SETLIST_MESSAGE.to_string()));
    }

    let copy_id = insert_setlist(&mut tx, user.id, &name, false).await?;

    for set in load_sets(&mut tx, source.id).await? {
        let set_id = generate();
        sqlx::query("INSERT INTO sets (id, name, setlist_id, set_order) VALUES (?, ?, ?, ?)")
            .bind(set_id.to_string())
            .bind(&set.name)
            .bind(copy_id.to_string())
            .bind(set.set_order)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO set_songs (set_id, song_id, song_order) SELECT ?, song_id, song_order FROM set_songs WHERE set_id = ?",
        )
        .bind(set_id.to_string())
        .bind(set.id.to_string())
        .execute(&mut *tx)
        .await?;
    }

    let copy = load_visible_setlist(&mut tx, user, copy_id).await?;
    let detail = load_setlist_detail(&mut tx, copy).await?;
    tx.commit().await?;

    info!(source_id = %id, setlist_id = %copy_id, "Setlist duplicated");
    Ok(detail)
}
