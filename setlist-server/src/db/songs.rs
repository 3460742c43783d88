//! Song database operations
//!
//! (original_artist, title) is unique, case-insensitively and ignoring
//! surrounding whitespace. The check runs inside the same transaction as the
//! write it guards.

use setlist_common::db::models::{Song, SongInput, User, UserLevel};
use setlist_common::db::retry_on_lock;
use setlist_common::uuid_utils::{generate, parse_column};
use setlist_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::access::require_level;
use super::{begin_write, optional_text, remove_song_everywhere, required_text};

pub const DUPLICATE_SONG_MESSAGE: &str = "A song with this title and artist already exists.";

const MAX_TEMPO: i64 = 400;

pub(crate) const SONG_COLUMNS: &str =
    "id, original_artist, title, key_signature, lyrics, performance_note, tempo, created_at, updated_at";

pub(crate) fn song_from_row(row: &SqliteRow) -> Result<Song> {
    Ok(Song {
        id: parse_column(&row.try_get::<String, _>("id")?)?,
        original_artist: row.try_get("original_artist")?,
        title: row.try_get("title")?,
        key_signature: row.try_get("key_signature")?,
        lyrics: row.try_get("lyrics")?,
        performance_note: row.try_get("performance_note")?,
        tempo: row.try_get("tempo")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Validate and normalise a song payload
fn clean_input(input: SongInput) -> Result<SongInput> {
    let tempo = match input.tempo {
        Some(t) if !(1..=MAX_TEMPO).contains(&t) => {
            return Err(Error::InvalidInput(format!(
                "tempo must be between 1 and {} BPM",
                MAX_TEMPO
            )))
        }
        other => other,
    };

    Ok(SongInput {
        original_artist: required_text("original_artist", &input.original_artist)?,
        title: required_text("title", &input.title)?,
        key_signature: optional_text(input.key_signature),
        lyrics: optional_text(input.lyrics),
        performance_note: optional_text(input.performance_note),
        tempo,
    })
}

/// Escape LIKE wildcards in user search text
fn like_pattern(search: &str) -> String {
    let escaped = search
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

async fn fetch_songs(pool: &SqlitePool, search: Option<&str>) -> Result<Vec<Song>> {
    let rows = match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(term) => {
            let pattern = like_pattern(term);
            sqlx::query(&format!(
                "SELECT {SONG_COLUMNS} FROM songs \
                 WHERE title LIKE ? ESCAPE '\\' OR original_artist LIKE ? ESCAPE '\\' \
                 ORDER BY original_artist COLLATE NOCASE, title COLLATE NOCASE"
            ))
            .bind(&pattern)
            .bind(&pattern)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {SONG_COLUMNS} FROM songs ORDER BY original_artist COLLATE NOCASE, title COLLATE NOCASE"
            ))
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(song_from_row).collect()
}

/// All songs ordered by artist then title, optionally filtered by a search term
pub async fn list_songs(pool: &SqlitePool, search: Option<&str>, max_wait_ms: u64) -> Result<Vec<Song>> {
    retry_on_lock("list songs", max_wait_ms, || fetch_songs(pool, search)).await
}

pub(crate) async fn load_song(conn: &mut SqliteConnection, id: Uuid) -> Result<Song> {
    let row = sqlx::query(&format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Song {}", id)))?;
    song_from_row(&row)
}

pub async fn get_song(pool: &SqlitePool, id: Uuid) -> Result<Song> {
    let mut conn = pool.acquire().await?;
    load_song(&mut conn, id).await
}

/// Existing song with the same artist and title, other than `exclude`
async fn find_duplicate(
    conn: &mut SqliteConnection,
    original_artist: &str,
    title: &str,
    exclude: Option<Uuid>,
) -> Result<Option<Uuid>> {
    let exclude = exclude.map(|id| id.to_string());
    let id: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM songs
        WHERE original_artist = ? COLLATE NOCASE
          AND title = ? COLLATE NOCASE
          AND (? IS NULL OR id <> ?)
        LIMIT 1
        "#,
    )
    .bind(original_artist)
    .bind(title)
    .bind(&exclude)
    .bind(&exclude)
    .fetch_optional(&mut *conn)
    .await?;

    id.as_deref().map(parse_column).transpose()
}

pub async fn create_song(pool: &SqlitePool, actor: &User, input: SongInput) -> Result<Song> {
    require_level(actor, UserLevel::Editor, "Adding songs")?;
    let input = clean_input(input)?;

    let mut tx = begin_write(pool).await?;

    if find_duplicate(&mut tx, &input.original_artist, &input.title, None)
        .await?
        .is_some()
    {
        return Err(Error::Conflict(DUPLICATE_SONG_MESSAGE.to_string()));
    }

    let id = generate();
    let now = time::now_string();
    sqlx::query(
        r#"
        INSERT INTO songs (id, original_artist, title, key_signature, lyrics,
                           performance_note, tempo, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&input.original_artist)
    .bind(&input.title)
    .bind(&input.key_signature)
    .bind(&input.lyrics)
    .bind(&input.performance_note)
    .bind(input.tempo)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let song = load_song(&mut tx, id).await?;
    tx.commit().await?;

    info!(song_id = %id, title = %song.title, artist = %song.original_artist, "Song created");
    Ok(song)
}

/// Replace every field of a song
pub async fn update_song(pool: &SqlitePool, actor: &User, id: Uuid, input: SongInput) -> Result<Song> {
    require_level(actor, UserLevel::Editor, "Editing songs")?;
    let input = clean_input(input)?;

    let mut tx = begin_write(pool).await?;
    load_song(&mut tx, id).await?;

    if find_duplicate(&mut tx, &input.original_artist, &input.title, Some(id))
        .await?
        .is_some()
    {
        return Err(Error::Conflict(DUPLICATE_SONG_MESSAGE.to_string()));
    }

    sqlx::query(
        r#"
        UPDATE songs
        SET original_artist = ?, title = ?, key_signature = ?, lyrics = ?,
            performance_note = ?, tempo = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.original_artist)
    .bind(&input.title)
    .bind(&input.key_signature)
    .bind(&input.lyrics)
    .bind(&input.performance_note)
    .bind(input.tempo)
    .bind(time::now_string())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    let song = load_song(&mut tx, id).await?;
    tx.commit().await?;

    info!(song_id = %id, "Song updated");
    Ok(song)
}

/// Delete a song and every reference to it
pub async fn delete_song(pool: &SqlitePool, actor: &User, id: Uuid) -> Result<()> {
    require_level(actor, UserLevel::Editor, "Deleting songs")?;

    let mut tx = begin_write(pool).await?;
    load_song(&mut tx, id).await?;

    let sets = remove_song_everywhere(&mut tx, "set_songs", "set_id", id).await?;
    let templates = remove_song_everywhere(&mut tx, "set_template_songs", "template_id", id).await?;
    let collections =
        remove_song_everywhere(&mut tx, "song_collection_songs", "collection_id", id).await?;

    sqlx::query("UPDATE performance_sessions SET current_song_id = NULL WHERE current_song_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM songs WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(song_id = %id, sets, templates, collections, "Song deleted");
    Ok(())
}
