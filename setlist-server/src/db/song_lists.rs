//! Set templates and song collections
//!
//! Both are named, ordered song lists owned by one user and optionally shared.
//! They only differ in table names and wording, so every operation takes a
//! [`SongListKind`].

use serde::Deserialize;
use setlist_common::db::models::{Song, SongList, SongListDetail, SongListKind, User};
use setlist_common::uuid_utils::{generate, parse_column};
use setlist_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::access::{can_view, require_owner_or_admin};
use super::songs::song_from_row;
use super::{
    begin_write, ensure_songs_exist, load_junction_song_ids, optional_text, reject_repeated, required_text,
    write_junction_songs,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewSongList {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub song_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongListUpdate {
    pub name: Option<String>,
    /// Blank clears the description
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub song_ids: Option<Vec<Uuid>>,
}

/// "A template with this name already exists." and friends
pub fn duplicate_name_message(kind: SongListKind) -> String {
    format!("A {} with this name already exists.", kind.noun())
}

fn song_list_from_row(kind: SongListKind, row: &SqliteRow) -> Result<SongList> {
    Ok(SongList {
        id: parse_column(&row.try_get::<String, _>("id")?)?,
        kind,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_public: row.try_get("is_public")?,
        user_id: parse_column(&row.try_get::<String, _>("user_id")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn load_visible_list(
    conn: &mut SqliteConnection,
    user: &User,
    kind: SongListKind,
    id: Uuid,
) -> Result<SongList> {
    let missing = || Error::NotFound(format!("{} {}", capitalize(kind.noun()), id));

    let row = sqlx::query(&format!("SELECT * FROM {} WHERE id = ?", kind.table()))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(missing)?;
    let list = song_list_from_row(kind, &row)?;

    if !can_view(user, list.user_id, list.is_public) {
        return Err(missing());
    }
    Ok(list)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Ordered song ids of a list the caller may see
pub(crate) async fn load_visible_song_ids(
    conn: &mut SqliteConnection,
    user: &User,
    kind: SongListKind,
    id: Uuid,
) -> Result<Vec<Uuid>> {
    load_visible_list(conn, user, kind, id).await?;
    load_junction_song_ids(conn, kind.junction(), kind.owner_column(), id).await
}

async fn load_songs(conn: &mut SqliteConnection, kind: SongListKind, id: Uuid) -> Result<Vec<Song>> {
    let rows = sqlx::query(&format!(
        "SELECT s.* FROM {junction} j JOIN songs s ON s.id = j.song_id WHERE j.{owner} = ? ORDER BY j.song_order",
        junction = kind.junction(),
        owner = kind.owner_column(),
    ))
    .bind(id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(song_from_row).collect()
}

async fn load_detail(conn: &mut SqliteConnection, list: SongList) -> Result<SongListDetail> {
    let songs = load_songs(conn, list.kind, list.id).await?;
    Ok(SongListDetail { list, songs })
}

async fn name_taken(
    conn: &mut SqliteConnection,
    kind: SongListKind,
    owner_id: Uuid,
    name: &str,
    exclude: Option<Uuid>,
) -> Result<bool> {
    let exclude = exclude.map(|id| id.to_string());
    let taken: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE user_id = ? AND name = ? COLLATE NOCASE AND (? IS NULL OR id <> ?))",
        kind.table()
    ))
    .bind(owner_id.to_string())
    .bind(name)
    .bind(&exclude)
    .bind(&exclude)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

/// Lists the caller owns plus public ones, ordered by name
pub async fn list_song_lists(pool: &SqlitePool, user: &User, kind: SongListKind) -> Result<Vec<SongList>> {
    let rows = sqlx::query(&format!(
        "SELECT * FROM {} WHERE user_id = ? OR is_public = 1 OR ? = 1 ORDER BY name COLLATE NOCASE",
        kind.table()
    ))
    .bind(user.id.to_string())
    .bind(user.is_admin())
    .fetch_all(pool)
    .await?;

    rows.iter().map(|row| song_list_from_row(kind, row)).collect()
}

pub async fn get_song_list(pool: &SqlitePool, user: &User, kind: SongListKind, id: Uuid) -> Result<SongListDetail> {
    let mut conn = pool.acquire().await?;
    let list = load_visible_list(&mut conn, user, kind, id).await?;
    load_detail(&mut conn, list).await
}

pub async fn create_song_list(
    pool: &SqlitePool,
    user: &User,
    kind: SongListKind,
    new_list: NewSongList,
) -> Result<SongListDetail> {
    let name = required_text("name", &new_list.name)?;
    reject_repeated(&new_list.song_ids)?;

    let mut tx = begin_write(pool).await?;
    if name_taken(&mut tx, kind, user.id, &name, None).await? {
        return Err(Error::Conflict(duplicate_name_message(kind)));
    }
    ensure_songs_exist(&mut tx, &new_list.song_ids).await?;

    let id = generate();
    let now = time::now_string();
    sqlx::query(&format!(
        "INSERT INTO {} (id, name, description, is_public, user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        kind.table()
    ))
    .bind(id.to_string())
    .bind(&name)
    .bind(optional_text(new_list.description))
    .bind(new_list.is_public)
    .bind(user.id.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    write_junction_songs(&mut tx, kind.junction(), kind.owner_column(), id, &new_list.song_ids).await?;

    let list = load_visible_list(&mut tx, user, kind, id).await?;
    let detail = load_detail(&mut tx, list).await?;
    tx.commit().await?;

    info!(id = %id, kind = kind.noun(), songs = detail.songs.len(), "Song list created");
    Ok(detail)
}

pub async fn update_song_list(
    pool: &SqlitePool,
    user: &User,
    kind: SongListKind,
    id: Uuid,
    update: SongListUpdate,
) -> Result<SongListDetail> {
    let mut tx = begin_write(pool).await?;
    let current = load_visible_list(&mut tx, user, kind, id).await?;
    require_owner_or_admin(user, current.user_id, kind.noun())?;

    let name = match update.name {
        Some(name) => {
            let name = required_text("name", &name)?;
            if name_taken(&mut tx, kind, current.user_id, &name, Some(id)).await? {
                return Err(Error::Conflict(duplicate_name_message(kind)));
            }
            name
        }
        None => current.name,
    };
    let description = match update.description {
        Some(description) => optional_text(Some(description)),
        None => current.description,
    };
    let is_public = update.is_public.unwrap_or(current.is_public);

    sqlx::query(&format!(
        "UPDATE {} SET name = ?, description = ?, is_public = ?, updated_at = ? WHERE id = ?",
        kind.table()
    ))
    .bind(&name)
    .bind(&description)
    .bind(is_public)
    .bind(time::now_string())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    if let Some(song_ids) = update.song_ids {
        reject_repeated(&song_ids)?;
        ensure_songs_exist(&mut tx, &song_ids).await?;
        write_junction_songs(&mut tx, kind.junction(), kind.owner_column(), id, &song_ids).await?;
    }

    let list = load_visible_list(&mut tx, user, kind, id).await?;
    let detail = load_detail(&mut tx, list).await?;
    tx.commit().await?;

    info!(id = %id, kind = kind.noun(), "Song list updated");
    Ok(detail)
}

pub async fn delete_song_list(pool: &SqlitePool, user: &User, kind: SongListKind, id: Uuid) -> Result<()> {
    let mut tx = begin_write(pool).await?;
    let list = load_visible_list(&mut tx, user, kind, id).await?;
    require_owner_or_admin(user, list.user_id, kind.noun())?;

    sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", kind.junction(), kind.owner_column()))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("DELETE FROM {} WHERE id = ?", kind.table()))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(id = %id, kind = kind.noun(), "Song list deleted");
    Ok(())
}
